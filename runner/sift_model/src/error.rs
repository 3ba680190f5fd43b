//! Error types shared across the harness crates.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to parse a test address (`file_or_module[:callable]`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty test name")]
    Empty,

    #[error("too many colons in test name `{0}`")]
    TooManyColons(String),
}

/// Failure to locate or materialize a module.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("no module `{name}` under {dir}")]
    NotFound { name: String, dir: PathBuf },

    #[error("`{name}` is not a package; cannot resolve `{wanted}` inside it")]
    NotAPackage { name: String, wanted: String },

    #[error("failed to load module `{name}` from {file}: {reason}")]
    LoadFailed {
        name: String,
        file: PathBuf,
        reason: String,
    },
}

/// Invalid configuration: bad pattern, bad option value, unreadable file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pattern for `{option}`: {source}")]
    BadPattern {
        option: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid value `{value}` for option `{option}`")]
    BadValue { option: String, value: String },

    #[error("unknown option `{0}`")]
    UnknownOption(String),

    #[error("failed to read config file {path}: {reason}")]
    BadFile { path: PathBuf, reason: String },

    #[error("plugin `{plugin}` rejected configuration: {reason}")]
    PluginRejected { plugin: String, reason: String },
}
