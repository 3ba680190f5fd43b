//! The result proxy: everything a running case reports goes through here.
//!
//! The proxy brackets each case with capture frames and plugin start/stop
//! hooks, classifies marked outcomes through the error-class registry,
//! gives plugins their chance to swallow (`handle_*`) or rewrite
//! (`format_*`) an outcome, feeds the installed observer, and honors
//! stop-on-error. Live progress goes to stderr: dots at normal verbosity,
//! one line per test at `-v`.

use sift_model::capture::{CaptureHandle, TestCtx};
use sift_model::outcome::TestError;

use crate::plugin::PluginManager;
use crate::result::{OutcomeRecord, RecordKind, ResultObserver, RunResult};

pub struct ResultProxy<'a> {
    result: &'a mut RunResult,
    plugins: &'a PluginManager,
    capture: CaptureHandle,
    observer: Option<Box<dyn ResultObserver>>,
    stop_on_error: bool,
    verbosity: u8,
}

impl<'a> ResultProxy<'a> {
    pub fn new(
        result: &'a mut RunResult,
        plugins: &'a PluginManager,
        capture: CaptureHandle,
        stop_on_error: bool,
        verbosity: u8,
    ) -> Self {
        ResultProxy {
            result,
            plugins,
            capture,
            observer: None,
            stop_on_error,
            verbosity,
        }
    }

    /// Ask plugins for a result observer (first match wins).
    pub fn install_observer(&mut self) {
        self.observer = self.plugins.prepare_test_result();
    }

    pub fn plugins(&self) -> &PluginManager {
        self.plugins
    }

    /// A fresh context writing into this runner's capture stack.
    pub fn ctx(&self) -> TestCtx {
        TestCtx::new(self.capture.clone())
    }

    /// The reported name of a test, after the `test_name` hook.
    pub fn display_name(&self, id: &str) -> String {
        self.plugins.test_name(id).unwrap_or_else(|| id.to_string())
    }

    pub fn start_test(&mut self, id: &str) {
        self.plugins.before_test(id);
        self.plugins.start_test(id);
        self.result.start_test(id);
        if let Some(observer) = &mut self.observer {
            observer.start_test(id);
        }
        if self.verbosity >= 2 {
            eprint!("{id} ... ");
        }
        self.capture.start();
    }

    /// Close the case's capture frame and return what it caught.
    pub fn end_capture(&mut self) -> Option<String> {
        self.capture.end()
    }

    pub fn stop_test(&mut self, id: &str) {
        if let Some(observer) = &mut self.observer {
            observer.stop_test(id);
        }
        self.plugins.stop_test(id);
        self.plugins.after_test(id);
    }

    fn emit(&self, record: &OutcomeRecord) {
        match self.verbosity {
            0 => {}
            1 => {
                let mark = match &record.kind {
                    RecordKind::Success => ".".to_string(),
                    RecordKind::Failure => "F".to_string(),
                    RecordKind::Error => "E".to_string(),
                    RecordKind::Class(c) => c.label.chars().take(1).collect(),
                };
                eprint!("{mark}");
            }
            _ => {
                let label = match &record.kind {
                    RecordKind::Success => "ok",
                    RecordKind::Failure => "FAIL",
                    RecordKind::Error => "ERROR",
                    RecordKind::Class(c) => &c.label,
                };
                eprintln!("{label}");
            }
        }
    }

    fn file(&mut self, record: OutcomeRecord) {
        self.emit(&record);
        if let Some(observer) = &mut self.observer {
            observer.record(&record);
        }
        self.result.record(record);
    }

    pub fn success(&mut self, id: &str) {
        self.plugins.add_success(id);
        self.file(OutcomeRecord::success(id));
    }

    /// Record a non-success case outcome.
    pub fn outcome(&mut self, id: &str, err: &TestError, captured: Option<String>) {
        // Marked outcomes resolve through the error-class registry; an
        // unregistered mark falls through as a plain error.
        if let Some(tag) = err.class() {
            if let Some(class) = self.plugins.error_classes().lookup(tag) {
                let class = class.clone();
                self.plugins.add_error(id, err);
                let stop = class.is_failure && self.stop_on_error;
                self.file(OutcomeRecord {
                    id: id.to_string(),
                    kind: RecordKind::Class(class),
                    message: Some(err.message().to_string()),
                    captured,
                });
                if stop {
                    self.result.stop();
                }
                return;
            }
        }

        if err.is_failure() {
            if self.plugins.handle_failure(id, err) == Some(true) {
                return;
            }
            let message = self.plugins.format_failure(id, err.message().to_string());
            self.plugins.add_failure(id, err);
            self.file(OutcomeRecord {
                id: id.to_string(),
                kind: RecordKind::Failure,
                message: Some(message),
                captured,
            });
        } else {
            if self.plugins.handle_error(id, err) == Some(true) {
                return;
            }
            let message = self.plugins.format_error(id, err.message().to_string());
            self.plugins.add_error(id, err);
            self.file(OutcomeRecord {
                id: id.to_string(),
                kind: RecordKind::Error,
                message: Some(message),
                captured,
            });
        }

        if self.stop_on_error {
            self.result.stop();
        }
    }

    /// An error attributed to a fixture scope rather than a case.
    pub fn scope_error(&mut self, scope_id: &str, err: &TestError) {
        let id = format!("{scope_id}.teardown");
        self.plugins.add_error(&id, err);
        let message = self.plugins.format_error(&id, err.message().to_string());
        let record = OutcomeRecord {
            id,
            kind: RecordKind::Error,
            message: Some(message),
            captured: None,
        };
        if let Some(observer) = &mut self.observer {
            observer.record(&record);
        }
        self.result.record(record);
        if self.stop_on_error {
            self.result.stop();
        }
    }

    pub fn should_stop(&self) -> bool {
        self.result.should_stop()
    }
}
