use crate::annotation::AnnotationMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ExperimentId = String;
pub type TestId = String;

/// The two photographic checkpoints of a growth test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Day {
    Seven,
    Fourteen,
}

impl Day {
    pub fn as_u8(self) -> u8 {
        match self {
            Day::Seven => 7,
            Day::Fourteen => 14,
        }
    }
}

impl TryFrom<u8> for Day {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(Day::Seven),
            14 => Ok(Day::Fourteen),
            other => Err(format!("day must be 7 or 14, got {other}")),
        }
    }
}

impl From<Day> for u8 {
    fn from(day: Day) -> u8 {
        day.as_u8()
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// One test of one repetition: scalar measurements, per-day photo paths and
/// per-day annotation maps. Owned by its experiment and mutated only through
/// a full-record replace (see `LabState::replace_test`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRecord {
    pub test_id: TestId,
    pub experiment_id: ExperimentId,
    pub repetition_number: u32,
    pub test_number: u32,

    pub unit: Option<String>,
    pub requisition: Option<String>,
    pub test_lot: Option<String>,
    pub matrix_lot: Option<String>,
    pub strain: Option<String>,
    pub mp_lot: Option<String>,

    pub average_humidity: Option<f64>,
    pub bozo: Option<f64>,
    pub sensorial: Option<f64>,
    pub quantity: Option<f64>,

    pub test_type: Option<String>,

    pub date_7_day: Option<String>,
    pub date_14_day: Option<String>,

    pub temp7_chamber: Option<f64>,
    pub temp7_rice: Option<f64>,
    pub temp14_chamber: Option<f64>,
    pub temp14_rice: Option<f64>,

    pub wet_weight: Option<f64>,
    pub dry_weight: Option<f64>,
    pub extracted_conidium_weight: Option<f64>,

    pub photos_7_day_paths: Vec<String>,
    pub photos_14_day_paths: Vec<String>,

    #[serde(deserialize_with = "crate::annotation::deserialize_annotation_map")]
    pub annotations_7_day: AnnotationMap,
    #[serde(deserialize_with = "crate::annotation::deserialize_annotation_map")]
    pub annotations_14_day: AnnotationMap,

    /// Optimistic concurrency token; bumped on every accepted replace.
    pub revision: u64,
}

impl TestRecord {
    pub fn photo_paths_for_day(&self, day: Day) -> &[String] {
        match day {
            Day::Seven => &self.photos_7_day_paths,
            Day::Fourteen => &self.photos_14_day_paths,
        }
    }

    pub fn annotations_for_day(&self, day: Day) -> &AnnotationMap {
        match day {
            Day::Seven => &self.annotations_7_day,
            Day::Fourteen => &self.annotations_14_day,
        }
    }

    pub fn set_photo_paths_for_day(&mut self, day: Day, paths: Vec<String>) {
        match day {
            Day::Seven => self.photos_7_day_paths = paths,
            Day::Fourteen => self.photos_14_day_paths = paths,
        }
    }

    pub fn has_any_photo(&self) -> bool {
        !self.photos_7_day_paths.is_empty() || !self.photos_14_day_paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Day::Seven).unwrap(), "7");
        assert_eq!(serde_json::from_str::<Day>("14").unwrap(), Day::Fourteen);
        assert!(serde_json::from_str::<Day>("10").is_err());
    }

    #[test]
    fn test_record_roundtrip_with_defaults() {
        let json = r#"{ "test_id": "t", "experiment_id": "e", "repetition_number": 1, "test_number": 2 }"#;
        let record: TestRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.revision, 0);
        assert!(record.photos_7_day_paths.is_empty());
        assert!(!record.has_any_photo());
    }

    #[test]
    fn test_record_accepts_legacy_and_null_annotation_columns() {
        let json = r#"{
            "test_id": "t", "experiment_id": "e",
            "repetition_number": 1, "test_number": 1,
            "annotations_7_day": [{ "x": 4.0, "y": 5.0, "size": "large", "caption": "spot" }],
            "annotations_14_day": null
        }"#;
        let record: TestRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.annotations_7_day[&0][0].caption, "spot");
        assert!(record.annotations_14_day.is_empty());

        let json = r##"{
            "test_id": "t", "experiment_id": "e",
            "repetition_number": 1, "test_number": 1,
            "annotations_7_day": { "2": [{ "x": 1.0, "y": 1.0, "size": "small", "caption": "c", "color": "#00FFFF" }] }
        }"##;
        let record: TestRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.annotations_for_day(Day::Seven)[&2][0].color, "#00FFFF");
    }
}
