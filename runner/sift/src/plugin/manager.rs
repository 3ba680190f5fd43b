//! The plugin multiplexer.
//!
//! Holds every active plugin sorted by score (descending, stable) and
//! dispatches each hook under its discipline. A panic inside a plugin
//! never takes the run down: the call is unwound, the fault recorded, and
//! the plugin's answer treated as "no opinion" for that call. Recorded
//! faults are drained by the loader and surface as collection failures.

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use parking_lot::Mutex;
use sift_model::entity::{ClassDef, FunctionDef, MethodDef, ModuleDef};
use sift_model::error::ConfigError;
use sift_model::outcome::TestError;
use sift_model::scope::ScopeId;
use sift_model::Config;

use crate::case::Case;
use crate::plugin::errorclass::ErrorClassRegistry;
use crate::plugin::interface::Plugin;
use crate::result::{ResultObserver, RunResult};

/// A plugin hook that panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFault {
    pub plugin: String,
    pub hook: &'static str,
}

pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    classes: ErrorClassRegistry,
    faults: Mutex<Vec<PluginFault>>,
}

impl PluginManager {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        PluginManager {
            plugins,
            classes: ErrorClassRegistry::default(),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Drop disabled plugins, fix the dispatch order, configure each
    /// plugin, and collect error classes. Must run before any dispatch.
    pub fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        self.plugins.retain(|p| p.enabled());
        // Stable sort: equal scores keep registration order.
        self.plugins.sort_by_key(|p| std::cmp::Reverse(p.score()));
        for plugin in &mut self.plugins {
            plugin.configure(config)?;
        }
        for plugin in &self.plugins {
            for class in plugin.error_classes() {
                self.classes.register(class);
            }
        }
        Ok(())
    }

    pub fn error_classes(&self) -> &ErrorClassRegistry {
        &self.classes
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Drain faults recorded since the last call.
    pub fn take_faults(&self) -> Vec<PluginFault> {
        std::mem::take(&mut *self.faults.lock())
    }

    fn guard<T>(&self, plugin: &dyn Plugin, hook: &'static str, f: impl FnOnce() -> T) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(plugin = plugin.name(), hook, "plugin hook panicked");
                self.faults.lock().push(PluginFault {
                    plugin: plugin.name().to_string(),
                    hook,
                });
                None
            }
        }
    }

    // dispatch disciplines

    fn first_match<T>(
        &self,
        hook: &'static str,
        f: impl Fn(&dyn Plugin) -> Option<T>,
    ) -> Option<T> {
        for plugin in &self.plugins {
            if let Some(Some(value)) = self.guard(plugin.as_ref(), hook, || f(plugin.as_ref())) {
                return Some(value);
            }
        }
        None
    }

    fn chain<T: Clone>(&self, hook: &'static str, init: T, f: impl Fn(&dyn Plugin, T) -> T) -> T {
        let mut value = init;
        for plugin in &self.plugins {
            // A panicking link is skipped; the value so far carries on.
            let attempt = value.clone();
            match catch_unwind(AssertUnwindSafe(|| f(plugin.as_ref(), attempt))) {
                Ok(next) => value = next,
                Err(_) => {
                    tracing::warn!(plugin = plugin.name(), hook, "plugin hook panicked");
                    self.faults.lock().push(PluginFault {
                        plugin: plugin.name().to_string(),
                        hook,
                    });
                }
            }
        }
        value
    }

    fn generative<T>(&self, hook: &'static str, f: impl Fn(&dyn Plugin) -> Vec<T>) -> Vec<T> {
        let mut out = Vec::new();
        for plugin in &self.plugins {
            if let Some(mut items) = self.guard(plugin.as_ref(), hook, || f(plugin.as_ref())) {
                out.append(&mut items);
            }
        }
        out
    }

    fn observe(&self, hook: &'static str, f: impl Fn(&dyn Plugin)) {
        for plugin in &self.plugins {
            self.guard(plugin.as_ref(), hook, || f(plugin.as_ref()));
        }
    }

    // selection

    pub fn want_file(&self, path: &Path) -> Option<bool> {
        self.first_match("want_file", |p| p.want_file(path))
    }

    pub fn want_directory(&self, path: &Path) -> Option<bool> {
        self.first_match("want_directory", |p| p.want_directory(path))
    }

    pub fn want_module(&self, module: &ModuleDef) -> Option<bool> {
        self.first_match("want_module", |p| p.want_module(module))
    }

    pub fn want_class(&self, class: &ClassDef) -> Option<bool> {
        self.first_match("want_class", |p| p.want_class(class))
    }

    pub fn want_function(&self, function: &FunctionDef) -> Option<bool> {
        self.first_match("want_function", |p| p.want_function(function))
    }

    pub fn want_method(&self, class: &ClassDef, method: &MethodDef) -> Option<bool> {
        self.first_match("want_method", |p| p.want_method(class, method))
    }

    // loading

    pub fn load_tests_from_dir(&self, dir: &Path) -> Vec<Case> {
        self.generative("load_tests_from_dir", |p| p.load_tests_from_dir(dir))
    }

    pub fn load_tests_from_file(&self, path: &Path) -> Vec<Case> {
        self.generative("load_tests_from_file", |p| p.load_tests_from_file(path))
    }

    pub fn load_tests_from_name(&self, name: &str) -> Vec<Case> {
        self.generative("load_tests_from_name", |p| p.load_tests_from_name(name))
    }

    pub fn load_tests_from_module(&self, module: &ModuleDef) -> Vec<Case> {
        self.generative("load_tests_from_module", |p| p.load_tests_from_module(module))
    }

    pub fn load_tests_from_class(&self, module: &ModuleDef, class: &ClassDef) -> Vec<Case> {
        self.generative("load_tests_from_class", |p| {
            p.load_tests_from_class(module, class)
        })
    }

    pub fn make_test(&self, module: &ModuleDef, function: &FunctionDef) -> Vec<Case> {
        self.generative("make_test", |p| p.make_test(module, function))
    }

    // preparation

    pub fn prepare_test_loader(&self, config: &Config) {
        self.observe("prepare_test_loader", |p| p.prepare_test_loader(config));
    }

    pub fn prepare_test_runner(&self, config: &Config) {
        self.observe("prepare_test_runner", |p| p.prepare_test_runner(config));
    }

    pub fn prepare_test_result(&self) -> Option<Box<dyn ResultObserver>> {
        self.first_match("prepare_test_result", |p| p.prepare_test_result())
    }

    pub fn set_output_stream(&self) -> Option<Box<dyn Write + Send>> {
        self.first_match("set_output_stream", |p| p.set_output_stream())
    }

    // execution observation

    pub fn begin(&self) {
        self.observe("begin", |p| p.begin());
    }

    pub fn before_directory(&self, dir: &Path) {
        self.observe("before_directory", |p| p.before_directory(dir));
    }

    pub fn after_directory(&self, dir: &Path) {
        self.observe("after_directory", |p| p.after_directory(dir));
    }

    pub fn before_import(&self, name: &str) {
        self.observe("before_import", |p| p.before_import(name));
    }

    pub fn after_import(&self, name: &str) {
        self.observe("after_import", |p| p.after_import(name));
    }

    pub fn start_context(&self, scope: &ScopeId) {
        self.observe("start_context", |p| p.start_context(scope));
    }

    pub fn stop_context(&self, scope: &ScopeId) {
        self.observe("stop_context", |p| p.stop_context(scope));
    }

    pub fn before_test(&self, id: &str) {
        self.observe("before_test", |p| p.before_test(id));
    }

    pub fn start_test(&self, id: &str) {
        self.observe("start_test", |p| p.start_test(id));
    }

    pub fn stop_test(&self, id: &str) {
        self.observe("stop_test", |p| p.stop_test(id));
    }

    pub fn after_test(&self, id: &str) {
        self.observe("after_test", |p| p.after_test(id));
    }

    pub fn finalize(&self, result: &RunResult) {
        self.observe("finalize", |p| p.finalize(result));
    }

    // outcome

    pub fn add_success(&self, id: &str) {
        self.observe("add_success", |p| p.add_success(id));
    }

    pub fn add_failure(&self, id: &str, err: &TestError) {
        self.observe("add_failure", |p| p.add_failure(id, err));
    }

    pub fn add_error(&self, id: &str, err: &TestError) {
        self.observe("add_error", |p| p.add_error(id, err));
    }

    pub fn handle_failure(&self, id: &str, err: &TestError) -> Option<bool> {
        self.first_match("handle_failure", |p| p.handle_failure(id, err))
    }

    pub fn handle_error(&self, id: &str, err: &TestError) -> Option<bool> {
        self.first_match("handle_error", |p| p.handle_error(id, err))
    }

    pub fn format_failure(&self, id: &str, message: String) -> String {
        self.chain("format_failure", message, |p, m| p.format_failure(id, m))
    }

    pub fn format_error(&self, id: &str, message: String) -> String {
        self.chain("format_error", message, |p, m| p.format_error(id, m))
    }

    pub fn describe_test(&self, id: &str) -> Option<String> {
        self.first_match("describe_test", |p| p.describe_test(id))
    }

    pub fn test_name(&self, id: &str) -> Option<String> {
        self.first_match("test_name", |p| p.test_name(id))
    }

    pub fn report(&self, result: &RunResult) -> Vec<String> {
        self.generative("report", |p| p.report(result).into_iter().collect())
    }
}
