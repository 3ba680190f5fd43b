//! Lazy suite trees.
//!
//! A suite is an ordered collection of cases and sub-suites, optionally
//! carrying the fixture scope its contents share. Directory and module
//! suites are lazy: their contents (and their scope, which needs the
//! module loaded) materialize only when the suite is iterated, so imports
//! and generator expansion happen mid-run, interleaved with execution.

pub mod context;

pub use context::{ContextEngine, FixtureState};


use sift_model::scope::Scope;

use crate::case::Case;

pub enum SuiteItem {
    Case(Case),
    Suite(Suite),
}

type LazyParts = Box<dyn FnOnce() -> (Option<Scope>, Vec<SuiteItem>) + Send>;

enum SuiteSource {
    Eager(Option<Scope>, Vec<SuiteItem>),
    Lazy(LazyParts),
}

pub struct Suite {
    source: SuiteSource,
}

impl Suite {
    pub fn eager(scope: Option<Scope>, items: Vec<SuiteItem>) -> Self {
        Suite {
            source: SuiteSource::Eager(scope, items),
        }
    }

    pub fn lazy(f: impl FnOnce() -> (Option<Scope>, Vec<SuiteItem>) + Send + 'static) -> Self {
        Suite {
            source: SuiteSource::Lazy(Box::new(f)),
        }
    }

    pub fn empty() -> Self {
        Self::eager(None, Vec::new())
    }

    /// Force the suite: materialize its scope and items.
    pub fn into_parts(self) -> (Option<Scope>, Vec<SuiteItem>) {
        match self.source {
            SuiteSource::Eager(scope, items) => (scope, items),
            SuiteSource::Lazy(f) => f(),
        }
    }

    /// Force the whole tree and collect every case in order.
    pub fn flatten(self) -> Vec<Case> {
        let mut cases = Vec::new();
        let (_, items) = self.into_parts();
        for item in items {
            match item {
                SuiteItem::Case(case) => cases.push(case),
                SuiteItem::Suite(sub) => cases.extend(sub.flatten()),
            }
        }
        cases
    }
}
