//! The plugin interface: hook vocabulary and dispatch table.
//!
//! Every hook has a default body, so a plugin implements only what it
//! cares about. Hooks fall into four dispatch disciplines, recorded in
//! [`HOOKS`]:
//!
//! - **first-match**: plugins are consulted in score order; the first
//!   `Some` answer wins and later plugins are not consulted.
//! - **chainable**: each plugin transforms the previous plugin's output.
//! - **generative**: every plugin's output is concatenated.
//! - **observe**: every plugin is notified; return values are ignored.
//!
//! Observation hooks take `&self`; plugins that accumulate state do so
//! through interior mutability.

use std::io::Write;
use std::path::Path;

use sift_model::entity::{ClassDef, FunctionDef, MethodDef, ModuleDef};
use sift_model::error::ConfigError;
use sift_model::outcome::TestError;
use sift_model::scope::ScopeId;
use sift_model::Config;

use crate::case::Case;
use crate::plugin::errorclass::ErrorClass;
use crate::result::{ResultObserver, RunResult};

/// How a hook's answers across plugins are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    FirstMatch,
    Chainable,
    Generative,
    Observe,
}

/// One row of the hook dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct HookSpec {
    pub name: &'static str,
    pub dispatch: Dispatch,
}

const fn hook(name: &'static str, dispatch: Dispatch) -> HookSpec {
    HookSpec { name, dispatch }
}

/// Every hook the multiplexer dispatches, with its discipline.
pub const HOOKS: &[HookSpec] = &[
    // selection
    hook("want_file", Dispatch::FirstMatch),
    hook("want_directory", Dispatch::FirstMatch),
    hook("want_module", Dispatch::FirstMatch),
    hook("want_class", Dispatch::FirstMatch),
    hook("want_function", Dispatch::FirstMatch),
    hook("want_method", Dispatch::FirstMatch),
    // loading
    hook("load_tests_from_dir", Dispatch::Generative),
    hook("load_tests_from_file", Dispatch::Generative),
    hook("load_tests_from_name", Dispatch::Generative),
    hook("load_tests_from_module", Dispatch::Generative),
    hook("load_tests_from_class", Dispatch::Generative),
    hook("make_test", Dispatch::Generative),
    // preparation
    hook("prepare_test_loader", Dispatch::Observe),
    hook("prepare_test_runner", Dispatch::Observe),
    hook("prepare_test_result", Dispatch::FirstMatch),
    hook("set_output_stream", Dispatch::FirstMatch),
    // execution observation
    hook("begin", Dispatch::Observe),
    hook("before_directory", Dispatch::Observe),
    hook("after_directory", Dispatch::Observe),
    hook("before_import", Dispatch::Observe),
    hook("after_import", Dispatch::Observe),
    hook("start_context", Dispatch::Observe),
    hook("stop_context", Dispatch::Observe),
    hook("before_test", Dispatch::Observe),
    hook("start_test", Dispatch::Observe),
    hook("stop_test", Dispatch::Observe),
    hook("after_test", Dispatch::Observe),
    hook("finalize", Dispatch::Observe),
    // outcome
    hook("add_success", Dispatch::Observe),
    hook("add_failure", Dispatch::Observe),
    hook("add_error", Dispatch::Observe),
    hook("handle_failure", Dispatch::FirstMatch),
    hook("handle_error", Dispatch::FirstMatch),
    hook("format_failure", Dispatch::Chainable),
    hook("format_error", Dispatch::Chainable),
    hook("describe_test", Dispatch::FirstMatch),
    hook("test_name", Dispatch::FirstMatch),
    hook("report", Dispatch::Generative),
];

/// Look up a hook's dispatch discipline.
pub fn dispatch_of(name: &str) -> Option<Dispatch> {
    HOOKS.iter().find(|h| h.name == name).map(|h| h.dispatch)
}

/// A command-line switch a plugin wants honored.
#[derive(Debug, Clone, Copy)]
pub struct PluginOption {
    pub long: &'static str,
    pub help: &'static str,
    pub takes_value: bool,
}

/// A harness extension.
///
/// `configure` runs once, before any dispatch; after it the manager only
/// calls hooks through `&self`.
#[allow(unused_variables)]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Disabled plugins are dropped at configure time.
    fn enabled(&self) -> bool {
        true
    }

    /// Dispatch order: higher scores are consulted first.
    fn score(&self) -> i32 {
        100
    }

    fn options(&self) -> Vec<PluginOption> {
        Vec::new()
    }

    fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Error classes this plugin contributes to the registry.
    fn error_classes(&self) -> Vec<ErrorClass> {
        Vec::new()
    }

    // selection (tri-valued: None means no opinion)

    fn want_file(&self, path: &Path) -> Option<bool> {
        None
    }

    fn want_directory(&self, path: &Path) -> Option<bool> {
        None
    }

    fn want_module(&self, module: &ModuleDef) -> Option<bool> {
        None
    }

    fn want_class(&self, class: &ClassDef) -> Option<bool> {
        None
    }

    fn want_function(&self, function: &FunctionDef) -> Option<bool> {
        None
    }

    fn want_method(&self, class: &ClassDef, method: &MethodDef) -> Option<bool> {
        None
    }

    // loading

    fn load_tests_from_dir(&self, dir: &Path) -> Vec<Case> {
        Vec::new()
    }

    fn load_tests_from_file(&self, path: &Path) -> Vec<Case> {
        Vec::new()
    }

    fn load_tests_from_name(&self, name: &str) -> Vec<Case> {
        Vec::new()
    }

    fn load_tests_from_module(&self, module: &ModuleDef) -> Vec<Case> {
        Vec::new()
    }

    fn load_tests_from_class(&self, module: &ModuleDef, class: &ClassDef) -> Vec<Case> {
        Vec::new()
    }

    fn make_test(&self, module: &ModuleDef, function: &FunctionDef) -> Vec<Case> {
        Vec::new()
    }

    // preparation

    fn prepare_test_loader(&self, config: &Config) {}

    fn prepare_test_runner(&self, config: &Config) {}

    /// First plugin returning an observer installs it (at most one per run).
    fn prepare_test_result(&self) -> Option<Box<dyn ResultObserver>> {
        None
    }

    fn set_output_stream(&self) -> Option<Box<dyn Write + Send>> {
        None
    }

    // execution observation

    fn begin(&self) {}

    fn before_directory(&self, dir: &Path) {}

    fn after_directory(&self, dir: &Path) {}

    fn before_import(&self, name: &str) {}

    fn after_import(&self, name: &str) {}

    fn start_context(&self, scope: &ScopeId) {}

    fn stop_context(&self, scope: &ScopeId) {}

    fn before_test(&self, id: &str) {}

    fn start_test(&self, id: &str) {}

    fn stop_test(&self, id: &str) {}

    fn after_test(&self, id: &str) {}

    fn finalize(&self, result: &RunResult) {}

    // outcome

    fn add_success(&self, id: &str) {}

    fn add_failure(&self, id: &str, err: &TestError) {}

    fn add_error(&self, id: &str, err: &TestError) {}

    /// `Some(true)` swallows the failure: it is not recorded.
    fn handle_failure(&self, id: &str, err: &TestError) -> Option<bool> {
        None
    }

    /// `Some(true)` swallows the error: it is not recorded.
    fn handle_error(&self, id: &str, err: &TestError) -> Option<bool> {
        None
    }

    fn format_failure(&self, id: &str, message: String) -> String {
        message
    }

    fn format_error(&self, id: &str, message: String) -> String {
        message
    }

    fn describe_test(&self, id: &str) -> Option<String> {
        None
    }

    /// Override the reported name of a test.
    fn test_name(&self, id: &str) -> Option<String> {
        None
    }

    /// Extra text appended to the final report.
    fn report(&self, result: &RunResult) -> Option<String> {
        None
    }
}
