//! Configuration: serializable snapshot and compiled form.
//!
//! [`ConfigSpec`] is the plain-data snapshot produced by the option layers
//! (defaults, config files, environment, argv) and shipped to parallel
//! workers. [`Config`] compiles the patterns once; it is immutable after
//! construction and shared behind `Arc` by every component.

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default pattern a name must match to look like a test.
pub const DEFAULT_TEST_MATCH: &str = r"(?:^|[\x08_\./-])[Tt]est";

/// Basename patterns never descended into or imported.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[r"^\.", r"^_", r"^setup\.py$"];

/// Directory basenames treated as source roots even though they do not
/// look like tests.
pub const DEFAULT_SRC_DIRS: &[&str] = &["lib", "src"];

/// Plain-data configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpec {
    pub test_match: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub ignore_files: Vec<String>,
    pub src_dirs: Vec<String>,
    /// Add discovered package roots to the import search path.
    pub add_paths: bool,
    pub capture: bool,
    pub stop_on_error: bool,
    /// Select executable files too (they are skipped by default on Unix).
    pub include_exe: bool,
    pub verbosity: u8,
    /// Explicit test names from the command line.
    pub test_names: Vec<String>,
    pub workdir: PathBuf,
    /// Plugins enabled beyond the builtins-on-by-default set.
    pub plugins: Vec<String>,
    pub processes: usize,
    pub process_timeout_secs: Option<u64>,
    pub restart_workers: bool,
    pub xunit_file: Option<PathBuf>,
}

impl Default for ConfigSpec {
    fn default() -> Self {
        ConfigSpec {
            test_match: DEFAULT_TEST_MATCH.to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
            ignore_files: DEFAULT_IGNORE_FILES.iter().map(|s| (*s).to_string()).collect(),
            src_dirs: DEFAULT_SRC_DIRS.iter().map(|s| (*s).to_string()).collect(),
            add_paths: true,
            capture: true,
            stop_on_error: false,
            include_exe: false,
            verbosity: 1,
            test_names: Vec::new(),
            workdir: PathBuf::from("."),
            plugins: Vec::new(),
            processes: 1,
            process_timeout_secs: None,
            restart_workers: false,
            xunit_file: None,
        }
    }
}

/// Compiled configuration. Patterns are validated and compiled once.
#[derive(Debug, Clone)]
pub struct Config {
    pub spec: ConfigSpec,
    pub test_match: Regex,
    pub include: Vec<Regex>,
    pub exclude: Vec<Regex>,
    pub ignore_files: Vec<Regex>,
    pub process_timeout: Option<Duration>,
}

impl Config {
    pub fn from_spec(spec: ConfigSpec) -> Result<Self, ConfigError> {
        let test_match = compile("match", &spec.test_match)?;
        let include = compile_all("include", &spec.include)?;
        let exclude = compile_all("exclude", &spec.exclude)?;
        let ignore_files = compile_all("ignore-files", &spec.ignore_files)?;
        let process_timeout = spec.process_timeout_secs.map(Duration::from_secs);
        Ok(Config {
            spec,
            test_match,
            include,
            exclude,
            ignore_files,
            process_timeout,
        })
    }

    pub fn verbosity(&self) -> u8 {
        self.spec.verbosity
    }

    pub fn parallel(&self) -> bool {
        self.spec.processes > 1
    }
}

impl Default for Config {
    fn default() -> Self {
        match Self::from_spec(ConfigSpec::default()) {
            Ok(config) => config,
            // The default patterns are compile-time constants.
            Err(_) => unreachable!("default config patterns are valid"),
        }
    }
}

fn compile(option: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::BadPattern { option, source })
}

fn compile_all(option: &'static str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns.iter().map(|p| compile(option, p)).collect()
}
