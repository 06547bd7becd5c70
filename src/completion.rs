// Derives a test's status label from its raw field values and photo
// presence. Two different required-field sets are in play: the full one that
// drives the per-test status badge, and a stricter, smaller one used when
// rolling up whole repetitions (progress.rs). Both are named constants here.

use crate::test_record::TestRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestField {
    Unit,
    Requisition,
    TestLot,
    MatrixLot,
    Strain,
    MpLot,
    AverageHumidity,
    Bozo,
    Sensorial,
    Quantity,
    TestType,
    Date7Day,
    Date14Day,
    Temp7Chamber,
    Temp7Rice,
    Temp14Chamber,
    Temp14Rice,
    WetWeight,
    DryWeight,
    ExtractedConidiumWeight,
}

/// Borrowed view of one field's value, consumed by the single generic
/// "is filled" predicate.
pub enum FieldValue<'a> {
    Number(Option<f64>),
    Text(Option<&'a str>),
}

impl TestField {
    pub fn value_of<'a>(&self, record: &'a TestRecord) -> FieldValue<'a> {
        match self {
            TestField::Unit => FieldValue::Text(record.unit.as_deref()),
            TestField::Requisition => FieldValue::Text(record.requisition.as_deref()),
            TestField::TestLot => FieldValue::Text(record.test_lot.as_deref()),
            TestField::MatrixLot => FieldValue::Text(record.matrix_lot.as_deref()),
            TestField::Strain => FieldValue::Text(record.strain.as_deref()),
            TestField::MpLot => FieldValue::Text(record.mp_lot.as_deref()),
            TestField::AverageHumidity => FieldValue::Number(record.average_humidity),
            TestField::Bozo => FieldValue::Number(record.bozo),
            TestField::Sensorial => FieldValue::Number(record.sensorial),
            TestField::Quantity => FieldValue::Number(record.quantity),
            TestField::TestType => FieldValue::Text(record.test_type.as_deref()),
            TestField::Date7Day => FieldValue::Text(record.date_7_day.as_deref()),
            TestField::Date14Day => FieldValue::Text(record.date_14_day.as_deref()),
            TestField::Temp7Chamber => FieldValue::Number(record.temp7_chamber),
            TestField::Temp7Rice => FieldValue::Number(record.temp7_rice),
            TestField::Temp14Chamber => FieldValue::Number(record.temp14_chamber),
            TestField::Temp14Rice => FieldValue::Number(record.temp14_rice),
            TestField::WetWeight => FieldValue::Number(record.wet_weight),
            TestField::DryWeight => FieldValue::Number(record.dry_weight),
            TestField::ExtractedConidiumWeight => {
                FieldValue::Number(record.extracted_conidium_weight)
            }
        }
    }
}

/// Every measurement the status badge requires.
pub const STATUS_REQUIRED_FIELDS: [TestField; 20] = [
    TestField::Unit,
    TestField::Requisition,
    TestField::TestLot,
    TestField::MatrixLot,
    TestField::Strain,
    TestField::MpLot,
    TestField::AverageHumidity,
    TestField::Bozo,
    TestField::Sensorial,
    TestField::Quantity,
    TestField::TestType,
    TestField::Date7Day,
    TestField::Date14Day,
    TestField::Temp7Chamber,
    TestField::Temp7Rice,
    TestField::Temp14Chamber,
    TestField::Temp14Rice,
    TestField::WetWeight,
    TestField::DryWeight,
    TestField::ExtractedConidiumWeight,
];

/// The stricter subset (no checkpoint dates, temperatures or weights) used
/// when deciding whether a whole repetition is done. Deliberately different
/// from `STATUS_REQUIRED_FIELDS`; the two drive different gates.
pub const ROLLUP_REQUIRED_FIELDS: [TestField; 11] = [
    TestField::Unit,
    TestField::Requisition,
    TestField::TestLot,
    TestField::MatrixLot,
    TestField::Strain,
    TestField::MpLot,
    TestField::AverageHumidity,
    TestField::Bozo,
    TestField::Sensorial,
    TestField::Quantity,
    TestField::TestType,
];

pub fn is_filled(value: &FieldValue<'_>) -> bool {
    match value {
        FieldValue::Number(n) => matches!(n, Some(v) if !v.is_nan()),
        FieldValue::Text(s) => matches!(s, Some(v) if !v.trim().is_empty()),
    }
}

pub fn all_fields_filled(record: &TestRecord, fields: &[TestField]) -> bool {
    fields.iter().all(|f| is_filled(&f.value_of(record)))
}

/// True iff the record passes the roll-up field check and has at least one
/// photo on either checkpoint day.
pub fn rollup_complete(record: &TestRecord) -> bool {
    all_fields_filled(record, &ROLLUP_REQUIRED_FIELDS) && record.has_any_photo()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSeverity {
    Warning,
    Destructive,
    Default,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Pending,
    Closed,
    Completed,
    NeedsPhotos,
    InProgress,
}

impl TestStatus {
    pub fn label(self) -> &'static str {
        match self {
            TestStatus::Pending => "Pending",
            TestStatus::Closed => "Closed",
            TestStatus::Completed => "Completed",
            TestStatus::NeedsPhotos => "Needs photos",
            TestStatus::InProgress => "In progress",
        }
    }

    pub fn severity(self) -> StatusSeverity {
        match self {
            TestStatus::Pending | TestStatus::NeedsPhotos => StatusSeverity::Warning,
            TestStatus::Closed => StatusSeverity::Destructive,
            TestStatus::Completed => StatusSeverity::Default,
            TestStatus::InProgress => StatusSeverity::Info,
        }
    }
}

/// Pure status derivation.
///
/// An absent record is always `Pending`. Once every repetition of the
/// experiment is done the test is `Closed`, terminal and regardless of its
/// own field completeness.
pub fn test_status(
    record: Option<&TestRecord>,
    repetition_fully_done: bool,
    all_repetitions_done: bool,
) -> TestStatus {
    let Some(record) = record else {
        return TestStatus::Pending;
    };
    if all_repetitions_done {
        return TestStatus::Closed;
    }
    if repetition_fully_done {
        return TestStatus::Completed;
    }
    if !all_fields_filled(record, &STATUS_REQUIRED_FIELDS) {
        return TestStatus::Pending;
    }
    if !record.has_any_photo() {
        return TestStatus::NeedsPhotos;
    }
    TestStatus::InProgress
}
