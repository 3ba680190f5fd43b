//! Importing: the seam between the harness and the embedder.
//!
//! The harness never evaluates source. [`ModuleSource`] is the boundary
//! where an embedder materializes the [`ModuleDef`] for a located file;
//! [`MapSource`] is the in-tree implementation, a registry keyed by file
//! path. The [`Importer`] owns the loaded-module table, locates dotted
//! names segment by segment under a directory, imports package ancestors
//! before their children, and evicts a cached entry when its dotted name
//! resolves to a different file than before.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sift_model::entity::ModuleDef;
use sift_model::error::ImportError;
use sift_model::Config;


/// Source file extension the importer looks for.
pub const SOURCE_EXT: &str = "py";

/// Materializes the module registered for a file.
pub trait ModuleSource: Send + Sync {
    /// Produce the module for `file`, under dotted name `name`.
    fn load(&self, name: &str, file: &Path) -> Result<ModuleDef, ImportError>;
}

type ModuleBuilder = Arc<dyn Fn(&str, &Path) -> ModuleDef + Send + Sync>;

/// In-memory module registry keyed by file path.
#[derive(Default)]
pub struct MapSource {
    builders: Mutex<FxHashMap<PathBuf, ModuleBuilder>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the builder invoked when `file` is imported. The builder
    /// receives the dotted name and file the importer resolved.
    pub fn register<F>(&self, file: impl Into<PathBuf>, build: F)
    where
        F: Fn(&str, &Path) -> ModuleDef + Send + Sync + 'static,
    {
        self.builders.lock().insert(file.into(), Arc::new(build));
    }

    pub fn is_registered(&self, file: &Path) -> bool {
        self.builders.lock().contains_key(file)
    }
}

impl ModuleSource for MapSource {
    fn load(&self, name: &str, file: &Path) -> Result<ModuleDef, ImportError> {
        let builder = self.builders.lock().get(file).cloned();
        match builder {
            Some(build) => Ok(build(name, file)),
            None => Err(ImportError::LoadFailed {
                name: name.to_string(),
                file: file.to_path_buf(),
                reason: "no module registered for file".to_string(),
            }),
        }
    }
}

struct Located {
    file: PathBuf,
    /// Directory to continue descending into, when this is a package.
    package_dir: Option<PathBuf>,
}

/// Locates and caches modules. One per loader; workers each own theirs.
pub struct Importer {
    source: Arc<dyn ModuleSource>,
    config: Arc<Config>,
    loaded: Mutex<FxHashMap<String, Arc<ModuleDef>>>,
    search_paths: Mutex<Vec<PathBuf>>,
}

impl Importer {
    pub fn new(source: Arc<dyn ModuleSource>, config: Arc<Config>) -> Self {
        Importer {
            source,
            config,
            loaded: Mutex::new(FxHashMap::default()),
            search_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn ModuleSource> {
        &self.source
    }

    /// Find `segment` under `dir`: a package directory wins over a plain
    /// module file of the same name.
    fn locate(dir: &Path, segment: &str) -> Option<Located> {
        let package_dir = dir.join(segment);
        let init = package_dir.join(format!("__init__.{SOURCE_EXT}"));
        if init.is_file() {
            return Some(Located {
                file: init,
                package_dir: Some(package_dir),
            });
        }
        let file = dir.join(format!("{segment}.{SOURCE_EXT}"));
        if file.is_file() {
            return Some(Located {
                file,
                package_dir: None,
            });
        }
        None
    }

    /// Import `name` from `dir`, returning the whole package chain,
    /// outermost first; the requested module is last.
    pub fn import_chain(
        &self,
        dir: &Path,
        name: &str,
    ) -> Result<Vec<Arc<ModuleDef>>, ImportError> {
        self.add_path_for(dir);
        let mut chain = Vec::new();
        let mut current_dir = dir.to_path_buf();
        let mut dotted = String::new();
        let mut segments = name.split('.').peekable();

        while let Some(segment) = segments.next() {
            if !dotted.is_empty() {
                dotted.push('.');
            }
            dotted.push_str(segment);

            let located =
                Self::locate(&current_dir, segment).ok_or_else(|| ImportError::NotFound {
                    name: dotted.clone(),
                    dir: current_dir.clone(),
                })?;

            let module = self.load_cached(&dotted, &located.file)?;
            chain.push(module);

            match located.package_dir {
                Some(package_dir) => current_dir = package_dir,
                None if segments.peek().is_some() => {
                    return Err(ImportError::NotAPackage {
                        name: dotted,
                        wanted: name.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(chain)
    }

    /// Import `name` from `dir` and return just the requested module.
    pub fn import_module(&self, dir: &Path, name: &str) -> Result<Arc<ModuleDef>, ImportError> {
        let mut chain = self.import_chain(dir, name)?;
        chain.pop().ok_or_else(|| ImportError::NotFound {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        })
    }

    fn load_cached(&self, dotted: &str, file: &Path) -> Result<Arc<ModuleDef>, ImportError> {
        {
            let loaded = self.loaded.lock();
            if let Some(existing) = loaded.get(dotted) {
                if existing.file == file {
                    return Ok(existing.clone());
                }
                tracing::debug!(
                    name = dotted,
                    old = %existing.file.display(),
                    new = %file.display(),
                    "evicting stale module"
                );
            }
        }
        // Load outside the lock; the source may do real work.
        let module = self.source.load(dotted, file)?;
        let module = Arc::new(module);
        self.loaded
            .lock()
            .insert(dotted.to_string(), module.clone());
        Ok(module)
    }

    /// A previously imported module, by dotted name.
    pub fn loaded(&self, name: &str) -> Option<Arc<ModuleDef>> {
        self.loaded.lock().get(name).cloned()
    }

    /// Record the search root for `dir`. When `dir` is itself inside a
    /// package, the root is the first non-package ancestor.
    pub fn add_path_for(&self, dir: &Path) {
        if !self.config.spec.add_paths {
            return;
        }
        let root = package_root(dir);
        let mut paths = self.search_paths.lock();
        if !paths.iter().any(|p| p == &root) {
            tracing::debug!(path = %root.display(), "adding search path");
            paths.push(root);
        }
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.lock().clone()
    }
}

/// Walk up while the directory is a package; return the first ancestor
/// that is not.
pub fn package_root(dir: &Path) -> PathBuf {
    let mut root = dir.to_path_buf();
    while root.join(format!("__init__.{SOURCE_EXT}")).is_file() {
        match root.parent() {
            Some(parent) => root = parent.to_path_buf(),
            None => break,
        }
    }
    root
}

/// The directory imports of this module's top-level package resolve from.
pub fn base_dir_of(module: &ModuleDef) -> Option<PathBuf> {
    let mut dir = module.file.parent()?.to_path_buf();
    let mut pops = module.name.matches('.').count();
    if module.is_package {
        pops += 1;
    }
    for _ in 0..pops {
        dir = dir.parent()?.to_path_buf();
    }
    Some(dir)
}
