//! Test error taxonomy.
//!
//! A test body, fixture hook, or load step either completes (`Ok(())`) or
//! produces a [`TestError`]. Failures are distinguished from errors the
//! usual way: a failure is an assertion that did not hold, an error is
//! everything else. `Marked` carries an error-class tag (such as `skip` or
//! `deprecated`) that the result layer resolves against the registered
//! error classes at record time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of running a test body or fixture hook.
pub type Outcome = Result<(), TestError>;

/// Why a test body, fixture, or load step did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestError {
    /// An assertion did not hold.
    Failure(String),
    /// An unexpected error (including caught panics).
    Error(String),
    /// An error-class marker; `class` is resolved against the registry
    /// of the run that records this outcome.
    Marked { class: String, message: String },
}

impl TestError {
    #[cold]
    pub fn failure(message: impl Into<String>) -> Self {
        TestError::Failure(message.into())
    }

    #[cold]
    pub fn error(message: impl Into<String>) -> Self {
        TestError::Error(message.into())
    }

    #[cold]
    pub fn marked(class: impl Into<String>, message: impl Into<String>) -> Self {
        TestError::Marked {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Shorthand for the builtin `skip` class.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::marked("skip", reason)
    }

    /// Shorthand for the builtin `deprecated` class.
    pub fn deprecated(reason: impl Into<String>) -> Self {
        Self::marked("deprecated", reason)
    }

    /// The human-readable message, whatever the kind.
    pub fn message(&self) -> &str {
        match self {
            TestError::Failure(m) | TestError::Error(m) => m,
            TestError::Marked { message, .. } => message,
        }
    }

    /// The error-class tag, if this is a marked outcome.
    pub fn class(&self) -> Option<&str> {
        match self {
            TestError::Marked { class, .. } => Some(class),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestError::Failure(_))
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Failure(m) => write!(f, "{m}"),
            TestError::Error(m) => write!(f, "{m}"),
            TestError::Marked { class, message } => write!(f, "[{class}] {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn message_is_kind_independent() {
        assert_eq!(TestError::failure("boom").message(), "boom");
        assert_eq!(TestError::error("bang").message(), "bang");
        assert_eq!(TestError::skip("later").message(), "later");
    }

    #[test]
    fn class_only_on_marked() {
        assert_eq!(TestError::failure("x").class(), None);
        assert_eq!(TestError::skip("x").class(), Some("skip"));
        assert_eq!(TestError::deprecated("x").class(), Some("deprecated"));
    }

    #[test]
    fn display_tags_marked_outcomes() {
        let e = TestError::skip("windows only");
        assert_eq!(e.to_string(), "[skip] windows only");
    }
}
