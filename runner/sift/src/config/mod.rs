//! Option assembly.
//!
//! Layers, lowest to highest precedence: built-in defaults, the system
//! config file, the user config file, the project config file, `SIFT_*`
//! environment variables, then the command line. Every layer funnels
//! through [`apply_option`], so a key means the same thing no matter
//! where it was written. List-valued options (include, exclude,
//! ignore-files, src-dirs) are additive across layers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sift_model::{ConfigError, ConfigSpec};


pub const CONFIG_BASENAME: &str = "sift.toml";
pub const CONFIG_SECTION: &str = "sift";
pub const ENV_PREFIX: &str = "SIFT_";
/// When set, no config files are read. Used by workers and test runs
/// that need a known-clean configuration.
pub const IGNORE_CONFIG_FILES_VAR: &str = "SIFT_IGNORE_CONFIG_FILES";

/// Build the spec from everything below the command line.
pub fn assemble(workdir: &Path) -> Result<ConfigSpec, ConfigError> {
    let mut spec = ConfigSpec {
        workdir: workdir.to_path_buf(),
        ..ConfigSpec::default()
    };
    if env::var_os(IGNORE_CONFIG_FILES_VAR).is_none() {
        for path in config_files(workdir) {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "reading config file");
                apply_file(&mut spec, &path)?;
            }
        }
    }
    apply_env_pairs(&mut spec, env::vars())?;
    Ok(spec)
}

fn config_files(workdir: &Path) -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc").join(CONFIG_BASENAME)];
    if let Some(home) = env::var_os("HOME") {
        files.push(PathBuf::from(home).join(format!(".{CONFIG_BASENAME}")));
    }
    files.push(workdir.join(CONFIG_BASENAME));
    files
}

/// Merge the `[sift]` table of a TOML file. A file without that section
/// is inert, so a project `sift.toml` can coexist with other tools.
pub fn apply_file(spec: &mut ConfigSpec, path: &Path) -> Result<(), ConfigError> {
    let bad_file = |reason: String| ConfigError::BadFile {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| bad_file(e.to_string()))?;
    let table: toml::Table = text.parse().map_err(|e: toml::de::Error| bad_file(e.to_string()))?;
    let Some(section) = table.get(CONFIG_SECTION).and_then(|v| v.as_table()) else {
        return Ok(());
    };
    for (key, value) in section {
        match value {
            toml::Value::Array(items) => {
                for item in items {
                    apply_option(spec, key, &toml_scalar(item))?;
                }
            }
            other => apply_option(spec, key, &toml_scalar(other))?,
        }
    }
    Ok(())
}

fn toml_scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge `SIFT_*` variables: `SIFT_PROCESS_TIMEOUT=30` is
/// `process-timeout = 30`. Unknown names are warned about and skipped,
/// since the environment is a shared namespace.
pub fn apply_env_pairs(
    spec: &mut ConfigSpec,
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (name, value) in pairs {
        let Some(raw_key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if name == IGNORE_CONFIG_FILES_VAR {
            continue;
        }
        let key = raw_key.to_ascii_lowercase().replace('_', "-");
        match apply_option(spec, &key, &value) {
            Ok(()) => {}
            Err(ConfigError::UnknownOption(_)) => {
                tracing::warn!(var = %name, "unrecognized environment option");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Apply one option by its canonical key. The command line, environment,
/// and config files all end up here.
pub fn apply_option(spec: &mut ConfigSpec, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "match" | "test-match" => spec.test_match = value.to_string(),
        "include" => spec.include.push(value.to_string()),
        "exclude" => spec.exclude.push(value.to_string()),
        "ignore-files" => spec.ignore_files.push(value.to_string()),
        "src-dirs" => spec.src_dirs.push(value.to_string()),
        "add-paths" => spec.add_paths = parse_bool(key, value)?,
        "capture" => spec.capture = parse_bool(key, value)?,
        "stop" => spec.stop_on_error = parse_bool(key, value)?,
        "include-exe" => spec.include_exe = parse_bool(key, value)?,
        "verbosity" => spec.verbosity = parse_num(key, value)?,
        "where" => spec.workdir = PathBuf::from(value),
        "processes" => spec.processes = parse_num(key, value)?,
        "process-timeout" => spec.process_timeout_secs = Some(parse_num(key, value)?),
        "restart-workers" => spec.restart_workers = parse_bool(key, value)?,
        "xunit-file" => spec.xunit_file = Some(PathBuf::from(value)),
        _ => {
            if let Some(plugin) = key.strip_prefix("with-") {
                if parse_bool(key, value)? && !spec.plugins.iter().any(|p| p == plugin) {
                    spec.plugins.push(plugin.to_string());
                }
                return Ok(());
            }
            return Err(ConfigError::UnknownOption(key.to_string()));
        }
    }
    Ok(())
}

fn parse_bool(option: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(bad_value(option, value)),
    }
}

fn parse_num<T: FromStr>(option: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| bad_value(option, value))
}

fn bad_value(option: &str, value: &str) -> ConfigError {
    ConfigError::BadValue {
        option: option.to_string(),
        value: value.to_string(),
    }
}
