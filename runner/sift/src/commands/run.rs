//! The run command: assemble configuration, load, run, report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sift_model::{Config, ConfigError, ConfigSpec};

use crate::config as options;
use crate::import::ModuleSource;
use crate::load::Loader;
use crate::plugin::{registry, PluginManager};
use crate::result::{OutcomeRecord, RunResult};
use crate::run::{ParallelRunner, Runner};

const SEPARATOR: &str = "----------------------------------------------------------------------";
const DETAIL_BAR: &str = "======================================================================";

#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// List what would run without running it.
    pub collect_only: bool,
}

/// Fold command-line arguments into the spec. Flags with dedicated
/// spellings are handled here; `--key=value` falls through to the shared
/// option table, so anything a config file can say the command line can
/// too. Bare words are test addresses.
pub fn parse_args(spec: &mut ConfigSpec, args: &[String]) -> Result<RunOptions, ConfigError> {
    let mut run_options = RunOptions::default();
    for arg in args {
        match arg.as_str() {
            "-v" | "--verbose" => spec.verbosity = spec.verbosity.saturating_add(1),
            "-q" | "--quiet" => spec.verbosity = 0,
            "-x" | "--stop" => spec.stop_on_error = true,
            "-s" | "--no-capture" => spec.capture = false,
            "--include-exe" => spec.include_exe = true,
            "--no-path-adjustment" => spec.add_paths = false,
            "--collect-only" => run_options.collect_only = true,
            _ => {
                if let Some((key, value)) =
                    arg.strip_prefix("--").and_then(|a| a.split_once('='))
                {
                    options::apply_option(spec, key, value)?;
                } else if let Some(plugin) = arg.strip_prefix("--with-") {
                    options::apply_option(spec, &format!("with-{plugin}"), "1")?;
                } else if arg.starts_with('-') && arg.len() > 1 {
                    return Err(ConfigError::UnknownOption(arg.clone()));
                } else {
                    spec.test_names.push(arg.clone());
                }
            }
        }
    }
    Ok(run_options)
}

/// Run tests with the given spec and module source. Returns the process
/// exit code: 0 for a green run, 1 for failures, 2 for a configuration
/// problem.
pub fn run_tests(
    spec: ConfigSpec,
    run_options: &RunOptions,
    source: Arc<dyn ModuleSource>,
) -> i32 {
    let config = match Config::from_spec(spec) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("sift: {e}");
            return 2;
        }
    };
    let mut manager = PluginManager::new(registry::from_names(&config.spec.plugins));
    if let Err(e) = manager.configure(&config) {
        eprintln!("sift: {e}");
        return 2;
    }
    let plugins = Arc::new(manager);
    let loader = Loader::new(config.clone(), plugins.clone(), source.clone());

    let suite = if config.spec.test_names.is_empty() {
        loader.load_from_dir(&config.spec.workdir)
    } else {
        loader.load_from_names(&config.spec.test_names)
    };

    if run_options.collect_only {
        for case in suite.flatten() {
            println!("{}", case.id());
        }
        return 0;
    }

    let started = Instant::now();
    let result = if config.parallel() {
        ParallelRunner::new(config.clone(), plugins.clone(), source).run(&loader, suite)
    } else {
        Runner::new(config.clone(), plugins.clone()).run(suite)
    };
    print_run_summary(&result, &plugins, started.elapsed());
    result.exit_code()
}

fn print_run_summary(result: &RunResult, plugins: &PluginManager, elapsed: Duration) {
    // Finish the progress line.
    eprintln!();

    for record in &result.failures {
        print_detail("FAIL", record);
    }
    for record in &result.errors {
        print_detail("ERROR", record);
    }
    for tally in &result.class_tallies {
        if !tally.class.is_failure {
            continue;
        }
        for record in &tally.records {
            print_detail(&tally.class.label, record);
        }
    }

    println!("{SEPARATOR}");
    let n = result.tests_run;
    println!(
        "Ran {n} test{} in {elapsed:.3?}",
        if n == 1 { "" } else { "s" }
    );
    println!();
    println!("{}", status_line(result));

    for line in plugins.report(result) {
        println!("{line}");
    }
}

fn status_line(result: &RunResult) -> String {
    let mut parts = Vec::new();
    if result.aborted {
        parts.push("aborted".to_string());
    }
    if !result.failures.is_empty() {
        parts.push(format!("failures={}", result.failures.len()));
    }
    if !result.errors.is_empty() {
        parts.push(format!("errors={}", result.errors.len()));
    }
    for tally in &result.class_tallies {
        if !tally.records.is_empty() {
            parts.push(format!("{}={}", tally.class.label, tally.records.len()));
        }
    }
    let verdict = if result.was_successful() { "OK" } else { "FAILED" };
    if parts.is_empty() {
        verdict.to_string()
    } else {
        format!("{verdict} ({})", parts.join(", "))
    }
}

fn print_detail(label: &str, record: &OutcomeRecord) {
    println!("{DETAIL_BAR}");
    println!("{label}: {}", record.id);
    println!("{SEPARATOR}");
    if let Some(message) = &record.message {
        println!("{message}");
    }
    if let Some(captured) = &record.captured {
        if !captured.is_empty() {
            println!("-------------------- >> begin captured stdout << ---------------------");
            print!("{captured}");
            if !captured.ends_with('\n') {
                println!();
            }
            println!("--------------------- >> end captured stdout << ----------------------");
        }
    }
    println!();
}
