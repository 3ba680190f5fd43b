//! Builtin plugin registry.
//!
//! Maps names to factories so plugins can be enabled with `--with-<name>`
//! and reconstructed by name inside parallel workers.

use crate::plugin::errorclass::{DeprecatedPlugin, SkipPlugin};
use crate::plugin::interface::Plugin;
use crate::plugin::xunit::XunitPlugin;

pub type PluginFactory = fn() -> Box<dyn Plugin>;

pub struct BuiltinEntry {
    pub name: &'static str,
    pub factory: PluginFactory,
}

pub const BUILTINS: &[BuiltinEntry] = &[
    BuiltinEntry {
        name: "skip",
        factory: || Box::new(SkipPlugin),
    },
    BuiltinEntry {
        name: "deprecated",
        factory: || Box::new(DeprecatedPlugin),
    },
    BuiltinEntry {
        name: "xunit",
        factory: || Box::new(XunitPlugin::new()),
    },
];

pub fn instantiate(name: &str) -> Option<Box<dyn Plugin>> {
    BUILTINS
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| (entry.factory)())
}

/// The plugins every run starts with.
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![Box::new(SkipPlugin), Box::new(DeprecatedPlugin)]
}

/// Defaults plus the named extras. Unknown names are logged and skipped;
/// names already present are not duplicated.
pub fn from_names(names: &[String]) -> Vec<Box<dyn Plugin>> {
    let mut plugins = default_plugins();
    for name in names {
        if plugins.iter().any(|p| p.name() == name) {
            continue;
        }
        match instantiate(name) {
            Some(plugin) => plugins.push(plugin),
            None => tracing::warn!(name = name.as_str(), "unknown plugin requested"),
        }
    }
    plugins
}
