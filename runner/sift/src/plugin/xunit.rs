//! Xunit XML report plugin.
//!
//! Collects one record per test outcome and writes a single `<testsuite>`
//! document at finalize time. Marked outcomes (skips, deprecations) are
//! reported as `<skipped>`.

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use sift_model::error::ConfigError;
use sift_model::outcome::TestError;
use sift_model::Config;

use crate::plugin::interface::Plugin;
use crate::result::RunResult;

const DEFAULT_REPORT_FILE: &str = "sift-xunit.xml";

#[derive(Debug, Clone)]
enum XunitOutcome {
    Pass,
    Failure(String),
    Error(String),
    Skipped(String),
}

#[derive(Debug, Clone)]
struct XunitRecord {
    id: String,
    outcome: XunitOutcome,
}

/// `--with-xunit` report writer.
#[derive(Default)]
pub struct XunitPlugin {
    path: Mutex<Option<PathBuf>>,
    records: Mutex<Vec<XunitRecord>>,
}

impl XunitPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, id: &str, outcome: XunitOutcome) {
        self.records.lock().push(XunitRecord {
            id: id.to_string(),
            outcome,
        });
    }

    fn render(&self, result: &RunResult) -> String {
        let records = self.records.lock();
        let skipped = records
            .iter()
            .filter(|r| matches!(r.outcome, XunitOutcome::Skipped(_)))
            .count();

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"sift\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\">\n",
            result.tests_run,
            result.failures.len(),
            result.errors.len(),
            skipped,
        ));
        for record in records.iter() {
            let (class, name) = split_id(&record.id);
            match &record.outcome {
                XunitOutcome::Pass => {
                    xml.push_str(&format!(
                        "  <testcase classname=\"{}\" name=\"{}\"/>\n",
                        escape(class),
                        escape(name),
                    ));
                }
                XunitOutcome::Failure(msg) => {
                    xml.push_str(&format!(
                        "  <testcase classname=\"{}\" name=\"{}\">\n    <failure message=\"{}\"/>\n  </testcase>\n",
                        escape(class),
                        escape(name),
                        escape(msg),
                    ));
                }
                XunitOutcome::Error(msg) => {
                    xml.push_str(&format!(
                        "  <testcase classname=\"{}\" name=\"{}\">\n    <error message=\"{}\"/>\n  </testcase>\n",
                        escape(class),
                        escape(name),
                        escape(msg),
                    ));
                }
                XunitOutcome::Skipped(msg) => {
                    xml.push_str(&format!(
                        "  <testcase classname=\"{}\" name=\"{}\">\n    <skipped message=\"{}\"/>\n  </testcase>\n",
                        escape(class),
                        escape(name),
                        escape(msg),
                    ));
                }
            }
        }
        xml.push_str("</testsuite>\n");
        xml
    }
}

impl Plugin for XunitPlugin {
    fn name(&self) -> &'static str {
        "xunit"
    }

    fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        let path = config
            .spec
            .xunit_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_FILE));
        *self.path.lock() = Some(path);
        Ok(())
    }

    fn add_success(&self, id: &str) {
        self.push(id, XunitOutcome::Pass);
    }

    fn add_failure(&self, id: &str, err: &TestError) {
        self.push(id, XunitOutcome::Failure(err.message().to_string()));
    }

    fn add_error(&self, id: &str, err: &TestError) {
        let outcome = if err.class().is_some() {
            XunitOutcome::Skipped(err.message().to_string())
        } else {
            XunitOutcome::Error(err.message().to_string())
        };
        self.push(id, outcome);
    }

    fn finalize(&self, result: &RunResult) {
        let Some(path) = self.path.lock().clone() else {
            return;
        };
        let xml = self.render(result);
        if let Err(e) = fs::write(&path, xml) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write xunit report");
        }
    }

    fn report(&self, _result: &RunResult) -> Option<String> {
        self.path
            .lock()
            .as_ref()
            .map(|p| format!("XML report written to {}", p.display()))
    }
}

/// Split a dotted test id into (classname, name) the xunit way.
fn split_id(id: &str) -> (&str, &str) {
    match id.rsplit_once('.') {
        Some((class, name)) => (class, name),
        None => ("", id),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
