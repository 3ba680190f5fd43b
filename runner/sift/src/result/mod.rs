//! Run results: the aggregate, the per-outcome record, and observers.
//!
//! [`OutcomeRecord`] is the unit of record keeping and the unit merged
//! across parallel workers (it is serde so it can travel the worker wire).
//! [`RunResult`] is the authoritative aggregate: counts, buckets, and the
//! stop flag. Exactly one [`ResultObserver`] may be installed per run by a
//! plugin; everything else observes through plugin hooks.

use serde::{Deserialize, Serialize};

use crate::plugin::errorclass::ErrorClass;

pub mod proxy;

pub use proxy::ResultProxy;


/// What kind of outcome a record is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordKind {
    Success,
    Failure,
    Error,
    /// A registered error class (skip, deprecated, plugin-defined).
    Class(ErrorClass),
}

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: String,
    pub kind: RecordKind,
    pub message: Option<String>,
    /// Output captured while the case ran, kept only for non-successes.
    pub captured: Option<String>,
}

impl OutcomeRecord {
    pub fn success(id: impl Into<String>) -> Self {
        OutcomeRecord {
            id: id.into(),
            kind: RecordKind::Success,
            message: None,
            captured: None,
        }
    }
}

/// Sink installed by at most one plugin via `prepare_test_result`.
pub trait ResultObserver: Send {
    fn start_test(&mut self, _id: &str) {}
    fn record(&mut self, _record: &OutcomeRecord) {}
    fn stop_test(&mut self, _id: &str) {}
}

/// Per-error-class bucket.
#[derive(Debug, Clone)]
pub struct ClassTally {
    pub class: ErrorClass,
    pub records: Vec<OutcomeRecord>,
}

/// The authoritative aggregate for a run.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub tests_run: usize,
    pub successes: usize,
    pub failures: Vec<OutcomeRecord>,
    pub errors: Vec<OutcomeRecord>,
    pub class_tallies: Vec<ClassTally>,
    /// Complete record log in execution order (what workers ship back).
    pub records: Vec<OutcomeRecord>,
    should_stop: bool,
    /// Set when a run was cut short by a second interrupt.
    pub aborted: bool,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a test as started.
    pub fn start_test(&mut self, _id: &str) {
        self.tests_run += 1;
    }

    /// File an outcome into its bucket.
    pub fn record(&mut self, record: OutcomeRecord) {
        match &record.kind {
            RecordKind::Success => self.successes += 1,
            RecordKind::Failure => self.failures.push(record.clone()),
            RecordKind::Error => self.errors.push(record.clone()),
            RecordKind::Class(class) => {
                let tally = match self
                    .class_tallies
                    .iter_mut()
                    .find(|t| t.class.class == class.class)
                {
                    Some(tally) => tally,
                    None => {
                        self.class_tallies.push(ClassTally {
                            class: class.clone(),
                            records: Vec::new(),
                        });
                        // Just pushed.
                        self.class_tallies.last_mut().unwrap_or_else(|| unreachable!())
                    }
                };
                tally.records.push(record.clone());
            }
        }
        self.records.push(record);
    }

    /// Records in the named error-class bucket.
    pub fn class_count(&self, attr: &str) -> usize {
        self.class_tallies
            .iter()
            .filter(|t| t.class.attr == attr)
            .map(|t| t.records.len())
            .sum()
    }

    /// No failures, no errors, no failure-kind class outcomes, no abort.
    pub fn was_successful(&self) -> bool {
        !self.aborted
            && self.failures.is_empty()
            && self.errors.is_empty()
            && self
                .class_tallies
                .iter()
                .all(|t| !t.class.is_failure || t.records.is_empty())
    }

    pub fn stop(&mut self) {
        self.should_stop = true;
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop
    }

    pub fn exit_code(&self) -> i32 {
        if self.was_successful() {
            0
        } else {
            1
        }
    }
}
