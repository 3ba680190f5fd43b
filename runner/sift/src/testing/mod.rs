#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "test harness — panics provide clear failure messages"
)]
//! Harness helpers for the crate's own tests and for embedders writing
//! theirs: an event trace recorder and shorthand constructors for test
//! bodies and fixture hooks.

use std::sync::Arc;

use parking_lot::Mutex;
use sift_model::entity::{GenCase, GenFn, HookFn, TestFn};
use sift_model::outcome::TestError;

/// Shared, ordered event log. Hooks and test bodies built from it push a
/// label each time they run, so tests can assert exact ordering.
#[derive(Clone, Default)]
pub struct TraceLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// A hook that records `label` and succeeds.
    pub fn hook(&self, label: &str) -> HookFn {
        let log = self.clone();
        let label = label.to_string();
        Arc::new(move |_| {
            log.push(label.clone());
            Ok(())
        })
    }

    /// A hook that records `label` and fails with `message`.
    pub fn failing_hook(&self, label: &str, message: &str) -> HookFn {
        let log = self.clone();
        let label = label.to_string();
        let message = message.to_string();
        Arc::new(move |_| {
            log.push(label.clone());
            Err(TestError::error(message.clone()))
        })
    }

    /// A test body that records `label` and passes.
    pub fn test(&self, label: &str) -> TestFn {
        self.hook(label)
    }

    /// A test body that records `label` and fails.
    pub fn failing_test(&self, label: &str, message: &str) -> TestFn {
        let log = self.clone();
        let label = label.to_string();
        let message = message.to_string();
        Arc::new(move |_| {
            log.push(label.clone());
            Err(TestError::failure(message.clone()))
        })
    }
}

/// A test body that passes without side effects.
pub fn pass() -> TestFn {
    Arc::new(|_| Ok(()))
}

/// A test body that fails with `message`.
pub fn fail(message: &str) -> TestFn {
    let message = message.to_string();
    Arc::new(move |_| Err(TestError::failure(message.clone())))
}

/// A test body that errors with `message`.
pub fn error(message: &str) -> TestFn {
    let message = message.to_string();
    Arc::new(move |_| Err(TestError::error(message.clone())))
}

/// A test body that skips with `reason`.
pub fn skip(reason: &str) -> TestFn {
    let reason = reason.to_string();
    Arc::new(move |_| Err(TestError::skip(reason.clone())))
}

/// A generator yielding one passing case per argument string.
pub fn generator(args: &[&str]) -> GenFn {
    let args: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();
    Arc::new(move |_| {
        Ok(args
            .iter()
            .map(|a| GenCase::new(a.clone(), pass()))
            .collect())
    })
}
