use crate::error::{ErrorCode, LabError};
use crate::test_record::{ExperimentId, TestRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Experiment {
    pub id: ExperimentId,
    pub number: u32,
    pub strain: String,
    pub start_date: String,
    pub repetition_count: u32,
    pub test_count: u32,
}

impl Experiment {
    pub fn total_tests(&self) -> u32 {
        self.repetition_count * self.test_count
    }
}

/// On-disk project state: experiments plus their test records, serialized as
/// one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabState {
    pub experiments: HashMap<ExperimentId, Experiment>,
    pub tests: Vec<TestRecord>,
}

impl LabState {
    pub fn load_from_path(path: &str) -> Result<Self, LabError> {
        let text = std::fs::read_to_string(path).map_err(|e| LabError {
            code: ErrorCode::Io,
            message: format!("Could not read state file '{path}': {e}"),
        })?;
        serde_json::from_str(&text).map_err(|e| LabError {
            code: ErrorCode::InvalidInput,
            message: format!("Could not parse state JSON '{path}': {e}"),
        })
    }

    pub fn save_to_path(&self, path: &str) -> Result<(), LabError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| LabError {
            code: ErrorCode::Internal,
            message: format!("Could not serialize state: {e}"),
        })?;
        std::fs::write(path, text).map_err(|e| LabError {
            code: ErrorCode::Io,
            message: format!("Could not write state file '{path}': {e}"),
        })
    }

    pub fn experiment(&self, id: &str) -> Result<&Experiment, LabError> {
        self.experiments
            .get(id)
            .ok_or_else(|| LabError::not_found(format!("No experiment '{id}'")))
    }

    pub fn upsert_experiment(&mut self, experiment: Experiment) {
        self.experiments.insert(experiment.id.clone(), experiment);
    }

    pub fn tests_of_experiment(&self, experiment_id: &str) -> Vec<&TestRecord> {
        self.tests
            .iter()
            .filter(|t| t.experiment_id == experiment_id)
            .collect()
    }

    pub fn find_test(
        &self,
        experiment_id: &str,
        repetition_number: u32,
        test_number: u32,
    ) -> Option<&TestRecord> {
        self.tests.iter().find(|t| {
            t.experiment_id == experiment_id
                && t.repetition_number == repetition_number
                && t.test_number == test_number
        })
    }

    pub fn find_test_by_id(&self, test_id: &str) -> Option<&TestRecord> {
        self.tests.iter().find(|t| t.test_id == test_id)
    }

    /// Full-record replace with an optimistic revision check.
    ///
    /// The incoming record must carry the revision it was loaded at; a
    /// mismatch means another session replaced the record in the meantime and
    /// the caller has to reload. The stored record gets `revision + 1`.
    /// A record for an unknown `(experiment, repetition, test)` slot is
    /// inserted, and must arrive with revision 0.
    pub fn replace_test(&mut self, record: TestRecord) -> Result<u64, LabError> {
        if record.test_id.trim().is_empty() {
            return Err(LabError::invalid_input("replace_test: empty test_id"));
        }
        let slot = self.tests.iter_mut().find(|t| {
            t.experiment_id == record.experiment_id
                && t.repetition_number == record.repetition_number
                && t.test_number == record.test_number
        });
        match slot {
            Some(existing) => {
                if existing.revision != record.revision {
                    return Err(LabError {
                        code: ErrorCode::Conflict,
                        message: format!(
                            "Test {}/{}.{} was replaced concurrently (stored revision {}, incoming {})",
                            record.experiment_id,
                            record.repetition_number,
                            record.test_number,
                            existing.revision,
                            record.revision
                        ),
                    });
                }
                let next = existing.revision + 1;
                *existing = TestRecord {
                    revision: next,
                    ..record
                };
                Ok(next)
            }
            None => {
                if record.revision != 0 {
                    return Err(LabError::invalid_input(
                        "replace_test: new records must start at revision 0",
                    ));
                }
                self.tests.push(record);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rep: u32, test: u32, revision: u64) -> TestRecord {
        TestRecord {
            test_id: format!("t-{rep}-{test}"),
            experiment_id: "exp-1".to_string(),
            repetition_number: rep,
            test_number: test,
            revision,
            ..TestRecord::default()
        }
    }

    #[test]
    fn test_replace_bumps_revision() {
        let mut state = LabState::default();
        assert_eq!(state.replace_test(record(1, 1, 0)).unwrap(), 0);

        let mut update = record(1, 1, 0);
        update.strain = Some("IBCB 66".to_string());
        assert_eq!(state.replace_test(update).unwrap(), 1);
        assert_eq!(
            state.find_test("exp-1", 1, 1).unwrap().strain.as_deref(),
            Some("IBCB 66")
        );
    }

    #[test]
    fn test_stale_replace_is_a_conflict() {
        let mut state = LabState::default();
        state.replace_test(record(1, 1, 0)).unwrap();
        state.replace_test(record(1, 1, 0)).unwrap(); // now at revision 1

        let err = state.replace_test(record(1, 1, 0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[test]
    fn test_state_roundtrips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = LabState::default();
        state.upsert_experiment(Experiment {
            id: "exp-1".to_string(),
            number: 3,
            strain: "ESALQ 1296".to_string(),
            start_date: "2024-06-01".to_string(),
            repetition_count: 4,
            test_count: 3,
        });
        state.replace_test(record(1, 1, 0)).unwrap();
        state.save_to_path(&path.to_string_lossy()).unwrap();

        let loaded = LabState::load_from_path(&path.to_string_lossy()).unwrap();
        assert_eq!(loaded.experiments["exp-1"].total_tests(), 12);
        assert_eq!(loaded.tests.len(), 1);
    }
}
