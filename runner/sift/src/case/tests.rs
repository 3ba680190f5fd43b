use std::sync::Arc;

use pretty_assertions::assert_eq;
use sift_model::capture::CaptureStack;
use sift_model::outcome::TestError;
use sift_model::scope::{Scope, ScopeChain, ScopeId, ScopeKind};
use sift_model::Config;

use super::*;
use crate::plugin::{registry, PluginManager};
use crate::result::{RecordKind, ResultProxy, RunResult};
use crate::suite::ContextEngine;
use crate::testing::{self, TraceLog};

fn manager() -> PluginManager {
    let mut m = PluginManager::new(registry::default_plugins());
    m.configure(&Config::default()).unwrap();
    m
}

fn run_case(case: &Case) -> RunResult {
    let plugins = manager();
    let engine = ContextEngine::new();
    let mut result = RunResult::new();
    {
        let mut proxy =
            ResultProxy::new(&mut result, &plugins, CaptureStack::new(true), false, 0);
        case.run(&engine, &mut proxy);
    }
    result
}

#[test]
fn passing_case_counts_a_success() {
    let case = Case::test("m.test_ok", ScopeChain::empty(), None, testing::pass(), None);
    let result = run_case(&case);
    assert_eq!(result.tests_run, 1);
    assert_eq!(result.successes, 1);
    assert!(result.was_successful());
}

#[test]
fn failing_case_keeps_captured_output() {
    let body: sift_model::TestFn = Arc::new(|ctx| {
        ctx.writeln("some debug");
        Err(TestError::failure("values differ"))
    });
    let case = Case::test("m.test_bad", ScopeChain::empty(), None, body, None);
    let result = run_case(&case);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].captured.as_deref(), Some("some debug\n"));
}

#[test]
fn case_setup_failure_skips_body_and_teardown() {
    let log = TraceLog::new();
    let case = Case::test(
        "m.test_x",
        ScopeChain::empty(),
        Some(log.failing_hook("setup", "no fixture")),
        log.test("body"),
        Some(log.hook("teardown")),
    );
    let result = run_case(&case);
    // Only the setup ran: no body, and no teardown for an incomplete setup.
    assert_eq!(log.snapshot(), vec!["setup"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message.as_deref(), Some("no fixture"));
}

#[test]
fn case_teardown_runs_after_failing_body() {
    let log = TraceLog::new();
    let case = Case::test(
        "m.test_x",
        ScopeChain::empty(),
        Some(log.hook("setup")),
        log.failing_test("body", "nope"),
        Some(log.hook("teardown")),
    );
    let result = run_case(&case);
    assert_eq!(log.snapshot(), vec!["setup", "body", "teardown"]);
    assert_eq!(result.failures.len(), 1);
}

#[test]
fn case_teardown_failure_errors_a_passing_test() {
    let log = TraceLog::new();
    let case = Case::test(
        "m.test_x",
        ScopeChain::empty(),
        None,
        log.test("body"),
        Some(log.failing_hook("teardown", "leaked")),
    );
    let result = run_case(&case);
    assert_eq!(result.successes, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message.as_deref(), Some("leaked"));
}

#[test]
fn panicking_body_is_an_error() {
    let body: sift_model::TestFn = Arc::new(|_| panic!("index out of bounds"));
    let case = Case::test("m.test_p", ScopeChain::empty(), None, body, None);
    let result = run_case(&case);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0]
        .message
        .as_deref()
        .unwrap()
        .contains("index out of bounds"));
}

#[test]
fn assertion_panic_is_a_failure() {
    let body: sift_model::TestFn = Arc::new(|_| {
        assert_eq!(1 + 1, 3);
        Ok(())
    });
    let case = Case::test("m.test_a", ScopeChain::empty(), None, body, None);
    let result = run_case(&case);
    assert_eq!(result.failures.len(), 1);
    assert!(result.errors.is_empty());
}

#[test]
fn load_failure_replays_at_run_time() {
    let case = Case::load_failure("broken_mod", TestError::error("no module `broken_mod`"));
    assert!(case.is_load_failure());
    let result = run_case(&case);
    assert_eq!(result.tests_run, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0].kind, RecordKind::Error));
}

#[test]
fn scope_setup_failure_becomes_a_case_error() {
    let log = TraceLog::new();
    let module = Scope {
        id: ScopeId::new("mod"),
        kind: ScopeKind::Module,
        setup: Some(log.failing_hook("setup:mod", "db down")),
        teardown: None,
    };
    let chain = ScopeChain::empty().child(module);
    let case = Case::test("mod.test_x", chain, None, log.test("body"), None);
    let result = run_case(&case);
    // The body never ran.
    assert_eq!(log.snapshot(), vec!["setup:mod"]);
    assert_eq!(result.errors.len(), 1);
    let msg = result.errors[0].message.as_deref().unwrap();
    assert!(msg.contains("setup failed for mod"), "got: {msg}");
    assert!(msg.contains("db down"));
}

#[test]
fn skip_body_lands_in_the_class_bucket() {
    let case = Case::test(
        "m.test_s",
        ScopeChain::empty(),
        None,
        testing::skip("not on this platform"),
        None,
    );
    let result = run_case(&case);
    assert_eq!(result.class_count("skipped"), 1);
    assert!(result.was_successful());
}
