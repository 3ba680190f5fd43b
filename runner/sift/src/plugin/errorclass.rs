//! Error classes: outcomes that are neither plain failures nor errors.
//!
//! An error class maps a [`TestError::Marked`] tag to a result bucket, a
//! display label, and a failure bit. Classes with the failure bit unset
//! (skips, deprecations) do not affect the run's exit code.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::plugin::interface::Plugin;

/// A registered error class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClass {
    /// The tag carried by `TestError::Marked`.
    pub class: String,
    /// Result bucket name (`skipped`, `deprecated`, ...).
    pub attr: String,
    /// Display label (`SKIP`, `DEPRECATED`, ...).
    pub label: String,
    /// Whether outcomes of this class count against the run.
    pub is_failure: bool,
}

impl ErrorClass {
    pub fn new(
        class: impl Into<String>,
        attr: impl Into<String>,
        label: impl Into<String>,
        is_failure: bool,
    ) -> Self {
        ErrorClass {
            class: class.into(),
            attr: attr.into(),
            label: label.into(),
            is_failure,
        }
    }
}

/// All error classes known to a run, collected at configure time.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassRegistry {
    by_class: FxHashMap<String, ErrorClass>,
}

impl ErrorClassRegistry {
    pub fn register(&mut self, class: ErrorClass) {
        self.by_class.insert(class.class.clone(), class);
    }

    pub fn lookup(&self, class: &str) -> Option<&ErrorClass> {
        self.by_class.get(class)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorClass> {
        self.by_class.values()
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}

/// Builtin plugin providing the `skip` class.
#[derive(Debug, Default)]
pub struct SkipPlugin;

impl Plugin for SkipPlugin {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn error_classes(&self) -> Vec<ErrorClass> {
        vec![ErrorClass::new("skip", "skipped", "SKIP", false)]
    }
}

/// Builtin plugin providing the `deprecated` class.
#[derive(Debug, Default)]
pub struct DeprecatedPlugin;

impl Plugin for DeprecatedPlugin {
    fn name(&self) -> &'static str {
        "deprecated"
    }

    fn error_classes(&self) -> Vec<ErrorClass> {
        vec![ErrorClass::new("deprecated", "deprecated", "DEPRECATED", false)]
    }
}
