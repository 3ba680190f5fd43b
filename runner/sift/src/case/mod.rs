//! Test cases: the unit of execution.
//!
//! A case pairs a test body with its fixture ancestor chain and optional
//! case-level setup/teardown. Problems discovered at load time (import
//! errors, bad names, generator errors, plugin faults) also become cases,
//! so they flow through the result pipeline like any other outcome.

use std::panic::{catch_unwind, AssertUnwindSafe};

use sift_model::entity::{HookFn, TestFn};
use sift_model::outcome::{Outcome, TestError};
use sift_model::scope::ScopeChain;

use crate::result::ResultProxy;
use crate::suite::context::{panic_message, run_hook, ContextEngine};

#[cfg(test)]
mod tests;

enum CaseBody {
    Test {
        setup: Option<HookFn>,
        test: TestFn,
        teardown: Option<HookFn>,
    },
    /// A load-time problem, replayed as a failing case at run time.
    LoadFailure(TestError),
}

pub struct Case {
    id: String,
    description: Option<String>,
    chain: ScopeChain,
    body: CaseBody,
}

impl Case {
    pub fn test(
        id: impl Into<String>,
        chain: ScopeChain,
        setup: Option<HookFn>,
        test: TestFn,
        teardown: Option<HookFn>,
    ) -> Self {
        Case {
            id: id.into(),
            description: None,
            chain,
            body: CaseBody::Test {
                setup,
                test,
                teardown,
            },
        }
    }

    pub fn load_failure(id: impl Into<String>, err: TestError) -> Self {
        Case {
            id: id.into(),
            description: None,
            chain: ScopeChain::empty(),
            body: CaseBody::LoadFailure(err),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn chain(&self) -> &ScopeChain {
        &self.chain
    }

    pub fn is_load_failure(&self) -> bool {
        matches!(self.body, CaseBody::LoadFailure(_))
    }

    /// Execute the case against the context engine, reporting through the
    /// proxy. Always balances scope entry with exit.
    pub(crate) fn run(&self, engine: &ContextEngine, proxy: &mut ResultProxy<'_>) {
        let (setup, test, teardown) = match &self.body {
            CaseBody::LoadFailure(err) => {
                proxy.start_test(&self.id);
                let captured = proxy.end_capture();
                proxy.outcome(&self.id, err, captured);
                proxy.stop_test(&self.id);
                return;
            }
            CaseBody::Test {
                setup,
                test,
                teardown,
            } => (setup, test, teardown),
        };

        let ctx = proxy.ctx();
        if let Err((scope_id, err)) = engine.enter(&self.chain, &ctx) {
            let err = TestError::error(format!(
                "setup failed for {scope_id}: {}",
                err.message()
            ));
            proxy.start_test(&self.id);
            let captured = proxy.end_capture();
            proxy.outcome(&self.id, &err, captured);
            proxy.stop_test(&self.id);
            self.leave(engine, proxy, &ctx);
            return;
        }

        proxy.start_test(&self.id);
        let mut outcome: Outcome = Ok(());
        let mut teardown_failure = None;

        let setup_ok = match setup {
            Some(hook) => match run_hook(hook, &ctx) {
                Ok(()) => true,
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            },
            None => true,
        };

        // Only a completed setup gets its teardown.
        if setup_ok {
            outcome = run_test(test, &ctx);
            if let Some(hook) = teardown {
                if let Err(err) = run_hook(hook, &ctx) {
                    teardown_failure = Some(err);
                }
            }
        }

        let captured = proxy.end_capture();
        match outcome {
            Ok(()) => match teardown_failure {
                None => proxy.success(&self.id),
                Some(err) => proxy.outcome(&self.id, &err, captured),
            },
            Err(err) => {
                proxy.outcome(&self.id, &err, captured);
                if let Some(td) = teardown_failure {
                    proxy.outcome(&self.id, &td, None);
                }
            }
        }
        proxy.stop_test(&self.id);
        self.leave(engine, proxy, &ctx);
    }

    fn leave(
        &self,
        engine: &ContextEngine,
        proxy: &mut ResultProxy<'_>,
        ctx: &sift_model::capture::TestCtx,
    ) {
        for (scope_id, err) in engine.exit(&self.chain, ctx) {
            proxy.scope_error(scope_id.as_str(), &err);
        }
    }
}

/// Run a test body, converting panics into outcomes. An assertion panic
/// counts as a failure; any other panic is an error.
fn run_test(test: &TestFn, ctx: &sift_model::capture::TestCtx) -> Outcome {
    match catch_unwind(AssertUnwindSafe(|| test(ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            if message.starts_with("assertion") {
                Err(TestError::failure(message))
            } else {
                Err(TestError::error(format!("panicked: {message}")))
            }
        }
    }
}
