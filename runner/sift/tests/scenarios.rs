//! End-to-end scenarios through the public surface: register modules,
//! discover, run, and check what the whole pipeline reports.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sift::commands::{parse_args, run_tests, RunOptions};
use sift::import::{MapSource, ModuleSource};
use sift::load::Loader;
use sift::plugin::{registry, PluginManager};
use sift::result::{RecordKind, RunResult};
use sift::run::{ParallelRunner, Runner};
use sift::testing::{self, TraceLog};
use sift_model::entity::{ClassDef, FunctionDef, MethodDef, ModuleDef};
use sift_model::{Config, ConfigSpec, TestError, TestFn};

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, "").unwrap();
}

struct Harness {
    config: Arc<Config>,
    plugins: Arc<PluginManager>,
    source: Arc<MapSource>,
}

impl Harness {
    fn new(spec: ConfigSpec) -> Self {
        let spec = ConfigSpec {
            verbosity: 0,
            ..spec
        };
        let config = Arc::new(Config::from_spec(spec).unwrap());
        let mut manager = PluginManager::new(registry::from_names(&config.spec.plugins));
        manager.configure(&config).unwrap();
        Harness {
            config,
            plugins: Arc::new(manager),
            source: Arc::new(MapSource::new()),
        }
    }

    fn in_dir(dir: &Path) -> Self {
        Self::new(ConfigSpec {
            workdir: dir.to_path_buf(),
            ..ConfigSpec::default()
        })
    }

    fn loader(&self) -> Loader {
        let source: Arc<dyn ModuleSource> = self.source.clone();
        Loader::new(self.config.clone(), self.plugins.clone(), source)
    }

    fn run_dir(&self, dir: &Path) -> RunResult {
        let loader = self.loader();
        let suite = loader.load_from_dir(dir);
        Runner::new(self.config.clone(), self.plugins.clone()).run(suite)
    }

    fn run_names(&self, names: &[String]) -> RunResult {
        let loader = self.loader();
        let suite = loader.load_from_names(names);
        Runner::new(self.config.clone(), self.plugins.clone()).run(suite)
    }
}

#[test]
fn fixtures_bracket_every_level_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let init = dir.path().join("test_pack/__init__.py");
    let module = dir.path().join("test_pack/test_mod.py");
    touch(&init);
    touch(&module);

    let log = TraceLog::new();
    let harness = Harness::in_dir(dir.path());

    let pkg_log = log.clone();
    harness.source.register(init, move |name, file| {
        ModuleDef::new(name, file)
            .package()
            .attr("setup", pkg_log.hook("setup:pack"))
            .attr("teardown", pkg_log.hook("teardown:pack"))
    });
    let mod_log = log.clone();
    harness.source.register(module, move |name, file| {
        ModuleDef::new(name, file)
            .attr("setup_module", mod_log.hook("setup:mod"))
            .attr("teardown_module", mod_log.hook("teardown:mod"))
            .class(
                ClassDef::new("TestC")
                    .attr("setup_class", mod_log.hook("setup:class"))
                    .attr("teardown_class", mod_log.hook("teardown:class"))
                    .attr("setup", mod_log.hook("case-setup"))
                    .attr("teardown", mod_log.hook("case-teardown"))
                    .method(MethodDef::plain("test_m1", 1, mod_log.test("m1")))
                    .method(MethodDef::plain("test_m2", 2, mod_log.test("m2"))),
            )
            .function(FunctionDef::plain("test_solo", 5, mod_log.test("solo")))
    });

    let result = harness.run_dir(dir.path());
    assert_eq!(result.tests_run, 3);
    assert!(result.was_successful());
    assert_eq!(
        log.snapshot(),
        vec![
            "setup:pack",
            "setup:mod",
            "setup:class",
            "case-setup",
            "m1",
            "case-teardown",
            "case-setup",
            "m2",
            "case-teardown",
            "teardown:class",
            "solo",
            "teardown:mod",
            "teardown:pack",
        ]
    );
}

#[test]
fn failed_module_setup_poisons_only_its_module() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_a.py"));
    touch(&dir.path().join("test_b.py"));

    let log = TraceLog::new();
    let harness = Harness::in_dir(dir.path());

    let a_log = log.clone();
    harness
        .source
        .register(dir.path().join("test_a.py"), move |name, file| {
            ModuleDef::new(name, file)
                .attr("setup_module", a_log.failing_hook("setup:test_a", "db is down"))
                .attr("teardown_module", a_log.hook("teardown:test_a"))
                .function(FunctionDef::plain("test_one", 1, a_log.test("a.one")))
                .function(FunctionDef::plain("test_two", 2, a_log.test("a.two")))
        });
    let b_log = log.clone();
    harness
        .source
        .register(dir.path().join("test_b.py"), move |name, file| {
            ModuleDef::new(name, file)
                .function(FunctionDef::plain("test_three", 1, b_log.test("b.three")))
        });

    let result = harness.run_dir(dir.path());
    assert_eq!(result.tests_run, 3);
    assert_eq!(result.successes, 1);
    assert_eq!(result.errors.len(), 2);
    for record in &result.errors {
        assert!(
            record
                .message
                .as_deref()
                .unwrap()
                .contains("setup failed for test_a: db is down"),
            "unexpected message: {:?}",
            record.message
        );
    }
    // Setup ran once, no test body in test_a ran, and a failed setup
    // gets no teardown.
    assert_eq!(log.snapshot(), vec!["setup:test_a", "b.three"]);
}

#[test]
fn generator_cases_get_argument_ids_and_run_separately() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));

    let harness = Harness::in_dir(dir.path());
    harness
        .source
        .register(dir.path().join("test_mod.py"), |name, file| {
            ModuleDef::new(name, file).function(FunctionDef::generator(
                "test_gen",
                1,
                testing::generator(&["(0,)", "(1,)", "(2,)"]),
            ))
        });

    let result = harness.run_dir(dir.path());
    assert_eq!(result.tests_run, 3);
    assert_eq!(result.successes, 3);
    let ids: Vec<&str> = result.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "test_mod.test_gen:(0,)",
            "test_mod.test_gen:(1,)",
            "test_mod.test_gen:(2,)",
        ]
    );
}

#[test]
fn same_module_name_in_two_trees_does_not_bleed() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let file_a = dir_a.path().join("test_mod.py");
    let file_b = dir_b.path().join("test_mod.py");
    touch(&file_a);
    touch(&file_b);

    let log = TraceLog::new();
    let harness = Harness::new(ConfigSpec::default());

    let a_log = log.clone();
    harness.source.register(file_a.clone(), move |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_one", 1, a_log.test("ran:a")))
    });
    let b_log = log.clone();
    harness.source.register(file_b.clone(), move |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_one", 1, b_log.test("ran:b")))
    });

    let result = harness.run_names(&[
        file_a.display().to_string(),
        file_b.display().to_string(),
    ]);
    assert_eq!(result.tests_run, 2);
    assert_eq!(result.successes, 2);
    // Both bodies ran despite sharing the dotted name `test_mod`.
    assert_eq!(log.snapshot(), vec!["ran:a", "ran:b"]);
}

#[test]
fn skips_are_counted_but_stay_green() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));

    let harness = Harness::in_dir(dir.path());
    harness
        .source
        .register(dir.path().join("test_mod.py"), |name, file| {
            ModuleDef::new(name, file)
                .function(FunctionDef::plain("test_ok", 1, testing::pass()))
                .function(FunctionDef::plain(
                    "test_later",
                    2,
                    testing::skip("needs the staging database"),
                ))
        });

    let result = harness.run_dir(dir.path());
    assert_eq!(result.tests_run, 2);
    assert_eq!(result.successes, 1);
    assert_eq!(result.class_count("skipped"), 1);
    assert!(result.was_successful());
    assert_eq!(result.exit_code(), 0);
}

#[test]
fn captured_output_surfaces_only_on_bad_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));

    let harness = Harness::in_dir(dir.path());
    harness
        .source
        .register(dir.path().join("test_mod.py"), |name, file| {
            let noisy_pass: TestFn = Arc::new(|ctx| {
                ctx.writeln("all fine here");
                Ok(())
            });
            let noisy_fail: TestFn = Arc::new(|ctx| {
                ctx.writeln("debugging note");
                Err(TestError::failure("wrong answer"))
            });
            ModuleDef::new(name, file)
                .function(FunctionDef::plain("test_ok", 1, noisy_pass))
                .function(FunctionDef::plain("test_bad", 2, noisy_fail))
        });

    let result = harness.run_dir(dir.path());
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0]
        .captured
        .as_deref()
        .unwrap()
        .contains("debugging note"));
    let success = result
        .records
        .iter()
        .find(|r| r.kind == RecordKind::Success)
        .unwrap();
    assert_eq!(success.captured, None);
}

#[test]
fn include_adds_and_exclude_vetoes() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));

    let harness = Harness::new(ConfigSpec {
        workdir: dir.path().to_path_buf(),
        include: vec!["probe".to_string()],
        exclude: vec!["slow".to_string()],
        ..ConfigSpec::default()
    });
    harness
        .source
        .register(dir.path().join("test_mod.py"), |name, file| {
            ModuleDef::new(name, file)
                .function(FunctionDef::plain("test_fast", 1, testing::pass()))
                .function(FunctionDef::plain("test_slow_io", 2, testing::pass()))
                .function(FunctionDef::plain("probe_check", 3, testing::pass()))
                .function(FunctionDef::plain("helper", 4, testing::pass()))
        });

    let loader = harness.loader();
    let ids: Vec<String> = loader
        .load_from_dir(dir.path())
        .flatten()
        .into_iter()
        .map(|c| c.id().to_string())
        .collect();
    assert_eq!(ids, vec!["test_mod.test_fast", "test_mod.probe_check"]);
}

#[test]
fn hung_parallel_worker_is_timed_out() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));

    let harness = Harness::new(ConfigSpec {
        workdir: dir.path().to_path_buf(),
        processes: 2,
        process_timeout_secs: Some(1),
        ..ConfigSpec::default()
    });
    harness
        .source
        .register(dir.path().join("test_mod.py"), |name, file| {
            let hang: TestFn = Arc::new(|_| {
                std::thread::sleep(std::time::Duration::from_secs(30));
                Ok(())
            });
            ModuleDef::new(name, file).function(FunctionDef::plain("test_hang", 1, hang))
        });

    let loader = harness.loader();
    let suite = loader.load_from_dir(dir.path());
    let source: Arc<dyn ModuleSource> = harness.source.clone();
    let runner = ParallelRunner::new(harness.config.clone(), harness.plugins.clone(), source);
    let result = runner.run(&loader, suite);

    assert!(!result.was_successful());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0]
        .message
        .as_deref()
        .unwrap()
        .contains("TimedOutException"));
}

#[test]
fn run_command_reports_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));

    let source = Arc::new(MapSource::new());
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_ok", 1, testing::pass()))
            .function(FunctionDef::plain("test_bad", 2, testing::fail("nope")))
    });

    let mut spec = ConfigSpec {
        workdir: dir.path().to_path_buf(),
        ..ConfigSpec::default()
    };
    let args = vec!["-q".to_string()];
    let run_options = parse_args(&mut spec, &args).unwrap();
    let dyn_source: Arc<dyn ModuleSource> = source.clone();
    assert_eq!(run_tests(spec.clone(), &run_options, dyn_source.clone()), 1);

    // Restricted to the passing test, the run is green.
    let mut spec_ok = spec;
    spec_ok.test_names = vec!["test_mod:test_ok".to_string()];
    assert_eq!(run_tests(spec_ok, &run_options, dyn_source.clone()), 0);

    // Collect-only never executes, so the failing test cannot fail it.
    let mut spec_collect = ConfigSpec {
        workdir: dir.path().to_path_buf(),
        ..ConfigSpec::default()
    };
    let collect = RunOptions {
        collect_only: true,
    };
    spec_collect.verbosity = 0;
    assert_eq!(run_tests(spec_collect, &collect, dyn_source), 0);
}
