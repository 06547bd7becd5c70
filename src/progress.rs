// Sequential unlock chain over an experiment's repetitions. Nothing here is
// persisted; the whole ladder is re-derived from current data on every call.

use crate::completion::{TestStatus, rollup_complete, test_status};
use crate::experiment::Experiment;
use crate::test_record::TestRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepetitionState {
    Locked,
    UnlockedIncomplete,
    UnlockedComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSlotStatus {
    pub test_number: u32,
    pub status: TestStatus,
    /// Display label for the slot: the recorded test type when present.
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepetitionProgress {
    pub number: u32,
    pub state: RepetitionState,
    pub fully_done: bool,
    pub tests: Vec<TestSlotStatus>,
}

impl RepetitionProgress {
    pub fn unlocked(&self) -> bool {
        self.state != RepetitionState::Locked
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentProgress {
    pub experiment_id: String,
    pub repetitions: Vec<RepetitionProgress>,
    pub all_repetitions_done: bool,
}

impl ExperimentProgress {
    pub fn repetition(&self, number: u32) -> Option<&RepetitionProgress> {
        self.repetitions.iter().find(|r| r.number == number)
    }
}

/// Evaluate the full unlock ladder for one experiment.
///
/// A repetition is fully done iff every one of its tests passes the roll-up
/// check (`completion::rollup_complete`). Repetition 1 is always unlocked;
/// repetition r > 1 unlocks iff repetition r-1 is fully done, so no
/// repetition can be skipped regardless of its own completeness.
pub fn evaluate(experiment: &Experiment, records: &[&TestRecord]) -> ExperimentProgress {
    let mut by_slot: HashMap<(u32, u32), &TestRecord> = HashMap::new();
    for record in records.iter().copied() {
        if record.experiment_id == experiment.id {
            by_slot.insert((record.repetition_number, record.test_number), record);
        }
    }

    let mut fully_done = Vec::with_capacity(experiment.repetition_count as usize);
    for rep in 1..=experiment.repetition_count {
        let done = (1..=experiment.test_count).all(|test| {
            by_slot
                .get(&(rep, test))
                .is_some_and(|record| rollup_complete(record))
        });
        fully_done.push(done);
    }
    let all_repetitions_done =
        experiment.repetition_count > 0 && fully_done.iter().all(|done| *done);

    let mut repetitions = Vec::with_capacity(fully_done.len());
    for rep in 1..=experiment.repetition_count {
        let idx = (rep - 1) as usize;
        let done = fully_done[idx];
        let unlocked = rep == 1 || fully_done[idx - 1];
        let state = match (unlocked, done) {
            (false, _) => RepetitionState::Locked,
            (true, false) => RepetitionState::UnlockedIncomplete,
            (true, true) => RepetitionState::UnlockedComplete,
        };

        let tests = (1..=experiment.test_count)
            .map(|test| {
                let record = by_slot.get(&(rep, test)).copied();
                let label = record
                    .and_then(|r| r.test_type.clone())
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| format!("Test #{test}"));
                TestSlotStatus {
                    test_number: test,
                    status: test_status(record, done, all_repetitions_done),
                    label,
                }
            })
            .collect();

        repetitions.push(RepetitionProgress {
            number: rep,
            state,
            fully_done: done,
            tests,
        });
    }

    ExperimentProgress {
        experiment_id: experiment.id.clone(),
        repetitions,
        all_repetitions_done,
    }
}
