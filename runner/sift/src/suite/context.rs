//! The context engine: fixture setup/teardown at package, module, and
//! class scope.
//!
//! Each scope has a pending count and a fixture state. Iterating a suite
//! that carries a scope holds the scope for the whole iteration; entering
//! a case bumps every ancestor. Setup runs on first entry, outermost
//! first. Teardown runs when the count returns to zero and setup
//! succeeded, innermost first as suites unwind. A failed setup is sticky:
//! every later entry reports it, and teardown never runs for that scope.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sift_model::capture::TestCtx;
use sift_model::entity::HookFn;
use sift_model::outcome::TestError;
use sift_model::scope::{Scope, ScopeChain, ScopeId};

/// Fixture lifecycle of one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureState {
    Unseen,
    SetupOk,
    SetupFailed(TestError),
    TornDown,
}

struct ScopeEntry {
    scope: Scope,
    pending: usize,
    state: FixtureState,
}

/// One per runner. Never shared across workers: each worker sets up and
/// tears down its own scopes.
#[derive(Default)]
pub struct ContextEngine {
    entries: Mutex<FxHashMap<ScopeId, ScopeEntry>>,
}

impl ContextEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, scope: &Scope) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(scope.id.clone()).or_insert_with(|| ScopeEntry {
            scope: scope.clone(),
            pending: 0,
            state: FixtureState::Unseen,
        });
        entry.pending += 1;
    }

    /// Decrement; when the count reaches zero and setup succeeded, run
    /// teardown and return any teardown failure.
    fn unbump(&self, scope: &Scope, ctx: &TestCtx) -> Option<TestError> {
        let teardown = {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(&scope.id)?;
            entry.pending = entry.pending.saturating_sub(1);
            if entry.pending != 0 || entry.state != FixtureState::SetupOk {
                return None;
            }
            entry.state = FixtureState::TornDown;
            entry.scope.teardown.clone()
        };
        tracing::debug!(scope = %scope.id, "tearing down");
        let hook = teardown?;
        run_hook(&hook, ctx).err()
    }

    /// Hold a scope for the duration of a suite iteration.
    pub fn hold(&self, scope: &Scope) {
        self.bump(scope);
    }

    /// Release a suite's hold; the last release triggers teardown.
    pub fn release(&self, scope: &Scope, ctx: &TestCtx) -> Option<TestError> {
        self.unbump(scope, ctx)
    }

    /// Enter a case: bump every ancestor, then run any setup not yet run,
    /// outermost first. Returns the failing scope and error if any setup
    /// has failed (now or earlier).
    pub fn enter(&self, chain: &ScopeChain, ctx: &TestCtx) -> Result<(), (ScopeId, TestError)> {
        for scope in chain.iter() {
            self.bump(scope);
        }
        for scope in chain.iter() {
            let setup = {
                let mut entries = self.entries.lock();
                // Entry exists: bump() above created it.
                let Some(entry) = entries.get_mut(&scope.id) else {
                    continue;
                };
                match &entry.state {
                    FixtureState::SetupOk | FixtureState::TornDown => continue,
                    FixtureState::SetupFailed(err) => {
                        return Err((scope.id.clone(), err.clone()));
                    }
                    FixtureState::Unseen => match &entry.scope.setup {
                        Some(hook) => hook.clone(),
                        None => {
                            entry.state = FixtureState::SetupOk;
                            continue;
                        }
                    },
                }
            };
            tracing::debug!(scope = %scope.id, "setting up");
            let outcome = run_hook(&setup, ctx);
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&scope.id) {
                match outcome {
                    Ok(()) => entry.state = FixtureState::SetupOk,
                    Err(err) => {
                        entry.state = FixtureState::SetupFailed(err.clone());
                        return Err((scope.id.clone(), err));
                    }
                }
            }
        }
        Ok(())
    }

    /// Exit a case: decrement every ancestor, innermost first, tearing
    /// down scopes whose count reaches zero. Returns teardown failures.
    pub fn exit(&self, chain: &ScopeChain, ctx: &TestCtx) -> Vec<(ScopeId, TestError)> {
        let mut failures = Vec::new();
        for scope in chain.iter_rev() {
            if let Some(err) = self.unbump(scope, ctx) {
                failures.push((scope.id.clone(), err));
            }
        }
        failures
    }

    /// Current fixture state of a scope, if the engine has seen it.
    pub fn state_of(&self, id: &ScopeId) -> Option<FixtureState> {
        self.entries.lock().get(id).map(|e| e.state.clone())
    }
}

/// Run a fixture hook, converting panics into errors.
pub(crate) fn run_hook(hook: &HookFn, ctx: &TestCtx) -> Result<(), TestError> {
    match catch_unwind(AssertUnwindSafe(|| hook(ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(TestError::error(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
