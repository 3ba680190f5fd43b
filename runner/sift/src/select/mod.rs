//! Selection: deciding what looks like a test.
//!
//! Every predicate consults plugins first (first opinion wins) and falls
//! back to the builtin rules: the test-name pattern, include/exclude
//! pattern lists, ignore-file patterns, the Unix executable check, and —
//! when explicit test names were given — the address restriction that
//! keeps discovery inside the named files and modules.

use std::path::{Component, Path};
use std::sync::Arc;

use sift_model::entity::{ClassDef, FunctionDef, MethodDef, ModuleDef};
use sift_model::{Config, TestAddress};

use crate::plugin::PluginManager;


pub struct Selector {
    config: Arc<Config>,
    plugins: Arc<PluginManager>,
    addresses: Vec<TestAddress>,
}

impl Selector {
    pub fn new(config: Arc<Config>, plugins: Arc<PluginManager>) -> Self {
        let addresses = config
            .spec
            .test_names
            .iter()
            .filter_map(|name| TestAddress::parse(name).ok())
            .collect();
        Selector {
            config,
            plugins,
            addresses,
        }
    }

    /// The core name test: excluded names never match; otherwise the test
    /// pattern or any include pattern accepts.
    fn name_matches(&self, name: &str) -> bool {
        if self.config.exclude.iter().any(|r| r.is_match(name)) {
            return false;
        }
        self.config.test_match.is_match(name)
            || self.config.include.iter().any(|r| r.is_match(name))
    }

    fn ignored(&self, basename: &str) -> bool {
        self.config.ignore_files.iter().any(|r| r.is_match(basename))
    }

    pub fn want_file(&self, path: &Path) -> bool {
        if let Some(opinion) = self.plugins.want_file(path) {
            return opinion;
        }
        let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.ignored(basename) {
            return false;
        }
        if !basename.ends_with(".py") {
            return false;
        }
        if is_executable(path) && !self.config.spec.include_exe {
            tracing::debug!(path = %path.display(), "skipping executable file");
            return false;
        }
        if !self.file_within_addresses(path) {
            return false;
        }
        // A file named directly on the command line is always wanted.
        if self.directly_addressed(path) {
            return true;
        }
        let stem = basename.trim_end_matches(".py");
        self.name_matches(stem)
    }

    pub fn want_directory(&self, path: &Path) -> bool {
        if let Some(opinion) = self.plugins.want_directory(path) {
            return opinion;
        }
        let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.ignored(basename) {
            return false;
        }
        if !self.dir_within_addresses(path) {
            return false;
        }
        if self.config.spec.src_dirs.iter().any(|d| d == basename) {
            return true;
        }
        // Packages are descended into so their modules get a look.
        if path.join("__init__.py").is_file() {
            return !self
                .config
                .exclude
                .iter()
                .any(|r| r.is_match(basename));
        }
        self.name_matches(basename)
    }

    pub fn want_module(&self, module: &ModuleDef) -> bool {
        if let Some(opinion) = self.plugins.want_module(module) {
            return opinion;
        }
        if module.is_entry {
            return true;
        }
        if !self.module_within_addresses(&module.name) {
            return false;
        }
        // Packages pass so their contents get a look; modules must match
        // on some dotted segment.
        module.is_package || module.name.split('.').any(|part| self.name_matches(part))
    }

    pub fn want_class(&self, class: &ClassDef) -> bool {
        if let Some(opinion) = self.plugins.want_class(class) {
            return opinion;
        }
        if class.name.starts_with('_') {
            return false;
        }
        class.is_test_base || self.name_matches(&class.name)
    }

    pub fn want_function(&self, function: &FunctionDef) -> bool {
        if let Some(opinion) = self.plugins.want_function(function) {
            return opinion;
        }
        if function.name.starts_with('_') {
            return false;
        }
        self.name_matches(&function.name)
    }

    pub fn want_method(&self, class: &ClassDef, method: &MethodDef) -> bool {
        if let Some(opinion) = self.plugins.want_method(class, method) {
            return opinion;
        }
        if method.name.starts_with('_') {
            return false;
        }
        self.name_matches(&method.name)
    }

    // address restriction

    fn directly_addressed(&self, path: &Path) -> bool {
        self.addresses.iter().any(|a| {
            a.filename
                .as_deref()
                .is_some_and(|f| paths_relate(path, f) && f.components().count() <= path.components().count())
        })
    }

    fn file_within_addresses(&self, path: &Path) -> bool {
        if self.addresses.is_empty() {
            return true;
        }
        self.addresses.iter().any(|a| {
            if let Some(file) = &a.filename {
                return paths_relate(path, file);
            }
            if let Some(module) = &a.module {
                // A file can only hold the named module if its stem is one
                // of the module's dotted segments.
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                return module.split('.').any(|part| part == stem);
            }
            true
        })
    }

    fn dir_within_addresses(&self, path: &Path) -> bool {
        if self.addresses.is_empty() {
            return true;
        }
        self.addresses.iter().any(|a| match &a.filename {
            // The address's file must live under this directory, or the
            // directory under the addressed path.
            Some(file) => paths_relate(path, file),
            None => true,
        })
    }

    fn module_within_addresses(&self, name: &str) -> bool {
        if self.addresses.is_empty() {
            return true;
        }
        self.addresses.iter().any(|a| match &a.module {
            Some(module) => {
                name == module
                    || module.starts_with(&format!("{name}."))
                    || name.starts_with(&format!("{module}."))
            }
            None => true,
        })
    }
}

/// Whether one path is a component-wise prefix of the other, ignoring
/// leading `./`.
fn paths_relate(a: &Path, b: &Path) -> bool {
    let norm = |p: &Path| -> Vec<String> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    };
    let a = norm(a);
    let b = norm(b);
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}
