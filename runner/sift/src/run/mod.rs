//! Test execution: the serial runner.
//!
//! Walks the suite tree depth-first, holding each suite's fixture scope
//! for the duration of its iteration so module and package teardown waits
//! for every test under it. Checks the stop flag between cases; the
//! current case always completes.

pub mod parallel;
pub mod worker;

pub use parallel::{ParallelRunner, Signals};


use std::sync::Arc;

use sift_model::capture::{CaptureHandle, CaptureStack, TestCtx};
use sift_model::Config;

use crate::plugin::PluginManager;
use crate::result::{ResultProxy, RunResult};
use crate::suite::{ContextEngine, Suite, SuiteItem};

pub struct Runner {
    config: Arc<Config>,
    plugins: Arc<PluginManager>,
    engine: ContextEngine,
    capture: CaptureHandle,
}

impl Runner {
    pub fn new(config: Arc<Config>, plugins: Arc<PluginManager>) -> Self {
        let capture = CaptureStack::new(config.spec.capture);
        Runner {
            config,
            plugins,
            engine: ContextEngine::new(),
            capture,
        }
    }

    /// The capture stack cases run under; also handed to loaders so
    /// generator expansion writes to the same place.
    pub fn capture(&self) -> CaptureHandle {
        self.capture.clone()
    }

    pub fn run(&self, suite: Suite) -> RunResult {
        self.plugins.prepare_test_runner(&self.config);
        self.plugins.begin();
        let mut result = RunResult::new();
        {
            let mut proxy = ResultProxy::new(
                &mut result,
                &self.plugins,
                self.capture.clone(),
                self.config.spec.stop_on_error,
                self.config.spec.verbosity,
            );
            proxy.install_observer();
            self.run_suite(suite, &mut proxy);
        }
        self.plugins.finalize(&result);
        result
    }

    fn run_suite(&self, suite: Suite, proxy: &mut ResultProxy<'_>) {
        // Forcing the suite is what loads the module, so the scope is
        // only known after this point.
        let (scope, items) = suite.into_parts();
        if let Some(scope) = &scope {
            self.engine.hold(scope);
            self.plugins.start_context(&scope.id);
        }

        for item in items {
            if proxy.should_stop() {
                tracing::debug!("stop requested; dropping remaining cases");
                break;
            }
            match item {
                SuiteItem::Case(case) => case.run(&self.engine, proxy),
                SuiteItem::Suite(sub) => self.run_suite(sub, proxy),
            }
        }

        if let Some(scope) = &scope {
            let ctx = TestCtx::new(self.capture.clone());
            if let Some(err) = self.engine.release(scope, &ctx) {
                proxy.scope_error(scope.id.as_str(), &err);
            }
            self.plugins.stop_context(&scope.id);
        }
    }
}
