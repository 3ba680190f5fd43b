//! Loading: turning selection into a lazy suite tree.
//!
//! Entry points mirror what can be named: a directory, an address, a list
//! of addresses, or a (base directory, dotted module) pair for workers.
//! Directory and module suites are lazy, so imports and generator
//! expansion happen while the run is already underway. Anything that goes
//! wrong during loading becomes a case that fails when run, never a crash
//! at load time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sift_model::capture::{CaptureStack, TestCtx};
use sift_model::entity::{
    resolve_hook, ClassDef, FnKind, GenFn, HookFn, MethodDef, ModuleDef, CASE_SETUP, CASE_TEARDOWN,
};
use sift_model::outcome::TestError;
use sift_model::scope::{Scope, ScopeChain};
use sift_model::{Config, TestAddress};

use crate::import::{Importer, ModuleSource, SOURCE_EXT};
use crate::plugin::PluginManager;
use crate::select::Selector;
use crate::suite::{Suite, SuiteItem};
use crate::case::Case;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct Loader {
    config: Arc<Config>,
    selector: Arc<Selector>,
    importer: Arc<Importer>,
    plugins: Arc<PluginManager>,
}

impl Loader {
    pub fn new(
        config: Arc<Config>,
        plugins: Arc<PluginManager>,
        source: Arc<dyn ModuleSource>,
    ) -> Self {
        let selector = Arc::new(Selector::new(config.clone(), plugins.clone()));
        let importer = Arc::new(Importer::new(source, config.clone()));
        plugins.prepare_test_loader(&config);
        Loader {
            config,
            selector,
            importer,
            plugins,
        }
    }

    pub fn importer(&self) -> &Arc<Importer> {
        &self.importer
    }

    pub fn selector(&self) -> &Arc<Selector> {
        &self.selector
    }

    /// Discover everything under `dir`.
    pub fn load_from_dir(&self, dir: &Path) -> Suite {
        let loader = self.clone();
        let dir = dir.to_path_buf();
        Suite::lazy(move || (None, loader.dir_items(&dir)))
    }

    /// Load one address (`file_or_module[:callable]`).
    pub fn load_from_name(&self, name: &str) -> Suite {
        let mut context = None;
        self.name_suite(name, &mut context)
    }

    /// Load a list of addresses in order. A callable-only address
    /// (`:test_func`) applies to the module the previous address named.
    pub fn load_from_names(&self, names: &[String]) -> Suite {
        let mut items = Vec::new();
        let mut context: Option<(PathBuf, String)> = None;
        for name in names {
            items.push(SuiteItem::Suite(self.name_suite(name, &mut context)));
            for case in self.plugins.load_tests_from_name(name) {
                items.push(SuiteItem::Case(case));
            }
        }
        items.extend(self.fault_cases());
        Suite::eager(None, items)
    }

    /// Load one module by coordinates. Used by parallel workers, which
    /// receive tasks as `(base_dir, dotted[:callable])`.
    pub fn load_module(&self, base_dir: &Path, dotted: &str, call: Option<&str>) -> Suite {
        self.module_suite(base_dir, dotted.to_string(), call.map(str::to_string), true)
    }

    // directory walking

    fn dir_items(&self, dir: &Path) -> Vec<SuiteItem> {
        self.plugins.before_directory(dir);
        tracing::debug!(dir = %dir.display(), "scanning directory");
        let mut items = Vec::new();

        let mut entries: Vec<fs::DirEntry> = match fs::read_dir(dir) {
            Ok(read) => read.filter_map(Result::ok).collect(),
            Err(e) => {
                items.push(SuiteItem::Case(Case::load_failure(
                    dir.display().to_string(),
                    TestError::error(format!("cannot read directory: {e}")),
                )));
                return items;
            }
        };
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_dir() {
                if !self.selector.want_directory(&path) {
                    continue;
                }
                if path.join(format!("__init__.{SOURCE_EXT}")).is_file() {
                    // Package: one module suite rooted here; descent into
                    // its contents happens when the suite is forced.
                    items.push(SuiteItem::Suite(self.module_suite(
                        dir,
                        basename.to_string(),
                        None,
                        false,
                    )));
                } else {
                    items.push(SuiteItem::Suite(self.load_from_dir(&path)));
                }
            } else if path.is_file() && self.selector.want_file(&path) {
                if let Some(stem) = basename.strip_suffix(&format!(".{SOURCE_EXT}")) {
                    items.push(SuiteItem::Suite(self.module_suite(
                        dir,
                        stem.to_string(),
                        None,
                        false,
                    )));
                }
                for case in self.plugins.load_tests_from_file(&path) {
                    items.push(SuiteItem::Case(case));
                }
            }
        }

        for case in self.plugins.load_tests_from_dir(dir) {
            items.push(SuiteItem::Case(case));
        }
        items.extend(self.fault_cases());
        self.plugins.after_directory(dir);
        items
    }

    // module suites

    fn module_suite(
        &self,
        base_dir: &Path,
        dotted: String,
        call: Option<String>,
        explicit: bool,
    ) -> Suite {
        let loader = self.clone();
        let base_dir = base_dir.to_path_buf();
        Suite::lazy(move || loader.module_parts(&base_dir, &dotted, call.as_deref(), explicit))
    }

    fn module_parts(
        &self,
        base_dir: &Path,
        dotted: &str,
        call: Option<&str>,
        explicit: bool,
    ) -> (Option<Scope>, Vec<SuiteItem>) {
        self.plugins.before_import(dotted);
        let chain_mods = match self.importer.import_chain(base_dir, dotted) {
            Ok(mods) => mods,
            Err(e) => {
                self.plugins.after_import(dotted);
                return (
                    None,
                    vec![SuiteItem::Case(Case::load_failure(
                        dotted,
                        TestError::error(e.to_string()),
                    ))],
                );
            }
        };
        self.plugins.after_import(dotted);

        // The chain is outermost first; the requested module is last.
        let Some(module) = chain_mods.last().cloned() else {
            return (None, Vec::new());
        };
        if !explicit && !self.selector.want_module(&module) {
            return (None, Vec::new());
        }

        let mut chain = ScopeChain::empty();
        for m in &chain_mods {
            chain.push(Scope::for_module(m));
        }
        let scope = chain.innermost().cloned();

        let mut items = self.items_from_module(&module, &chain, call);

        if module.is_package {
            items.extend(self.package_child_items(base_dir, &module, dotted));
        }
        items.extend(self.fault_cases());
        (scope, items)
    }

    /// Submodule and subpackage suites of a package, in name order.
    fn package_child_items(
        &self,
        base_dir: &Path,
        module: &ModuleDef,
        dotted: &str,
    ) -> Vec<SuiteItem> {
        let Some(pkg_dir) = module.file.parent() else {
            return Vec::new();
        };
        let mut items = Vec::new();
        let mut entries: Vec<fs::DirEntry> = match fs::read_dir(pkg_dir) {
            Ok(read) => read.filter_map(Result::ok).collect(),
            Err(_) => return items,
        };
        entries.sort_by_key(fs::DirEntry::file_name);

        let init = format!("__init__.{SOURCE_EXT}");
        for entry in entries {
            let path = entry.path();
            let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_dir() {
                if path.join(&init).is_file() && self.selector.want_directory(&path) {
                    items.push(SuiteItem::Suite(self.module_suite(
                        base_dir,
                        format!("{dotted}.{basename}"),
                        None,
                        false,
                    )));
                }
            } else if basename != init
                && path.is_file()
                && self.selector.want_file(&path)
            {
                if let Some(stem) = basename.strip_suffix(&format!(".{SOURCE_EXT}")) {
                    items.push(SuiteItem::Suite(self.module_suite(
                        base_dir,
                        format!("{dotted}.{stem}"),
                        None,
                        false,
                    )));
                }
            }
        }
        items
    }

    /// Cases and class suites for one module's own contents.
    fn items_from_module(
        &self,
        module: &Arc<ModuleDef>,
        chain: &ScopeChain,
        call: Option<&str>,
    ) -> Vec<SuiteItem> {
        let mut items = Vec::new();

        // A callable of the form `Class` or `Class.method` restricts to
        // that class; a bare name restricts to that function.
        let (wanted_class, wanted_method) = match call {
            Some(c) => match c.split_once('.') {
                Some((class, method)) => (Some(class), Some(method)),
                None => (Some(c), None),
            },
            None => (None, None),
        };

        let mut classes: Vec<&ClassDef> = module.classes.iter().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        for class in classes {
            let named = wanted_class == Some(class.name.as_str());
            if call.is_some() && !named {
                continue;
            }
            if !named && !self.selector.want_class(class) {
                continue;
            }
            items.push(SuiteItem::Suite(self.class_suite(
                module,
                class,
                chain,
                wanted_method.filter(|_| named),
            )));
        }

        let mut functions: Vec<_> = module.functions.iter().collect();
        functions.sort_by_key(|f| f.line);
        for function in functions {
            let named = call == Some(function.name.as_str());
            if call.is_some() && !named {
                continue;
            }
            if !named && !self.selector.want_function(function) {
                continue;
            }
            let id = format!("{}.{}", module.name, function.name);
            match &function.kind {
                FnKind::Plain(body) => items.push(SuiteItem::Case(Case::test(
                    id,
                    chain.clone(),
                    function.setup.clone(),
                    body.clone(),
                    function.teardown.clone(),
                ))),
                FnKind::Generator(generator) => items.push(SuiteItem::Suite(gen_suite(
                    id,
                    chain.clone(),
                    generator.clone(),
                    function.setup.clone(),
                    function.teardown.clone(),
                ))),
            }
            for case in self.plugins.make_test(module, function) {
                items.push(SuiteItem::Case(case));
            }
        }

        if call.is_none() {
            for case in self.plugins.load_tests_from_module(module) {
                items.push(SuiteItem::Case(case));
            }
        }
        items
    }

    fn class_suite(
        &self,
        module: &Arc<ModuleDef>,
        class: &ClassDef,
        chain: &ScopeChain,
        wanted_method: Option<&str>,
    ) -> Suite {
        let class_scope = Scope::for_class(module, class);
        let class_chain = chain.child(class_scope.clone());
        let case_setup = resolve_hook(&class.attrs, CASE_SETUP);
        let case_teardown = resolve_hook(&class.attrs, CASE_TEARDOWN);

        let mut methods: Vec<&MethodDef> = class.methods.iter().collect();
        methods.sort_by_key(|m| m.line);

        let mut items = Vec::new();
        for method in methods {
            let named = wanted_method == Some(method.name.as_str());
            if wanted_method.is_some() && !named {
                continue;
            }
            if !named && !self.selector.want_method(class, method) {
                continue;
            }
            let id = format!("{}.{}.{}", module.name, class.name, method.name);
            match &method.kind {
                FnKind::Plain(body) => items.push(SuiteItem::Case(Case::test(
                    id,
                    class_chain.clone(),
                    case_setup.clone(),
                    body.clone(),
                    case_teardown.clone(),
                ))),
                FnKind::Generator(generator) => items.push(SuiteItem::Suite(gen_suite(
                    id,
                    class_chain.clone(),
                    generator.clone(),
                    case_setup.clone(),
                    case_teardown.clone(),
                ))),
            }
        }
        for case in self.plugins.load_tests_from_class(module, class) {
            items.push(SuiteItem::Case(case));
        }
        Suite::eager(Some(class_scope), items)
    }

    // addresses

    fn name_suite(&self, name: &str, context: &mut Option<(PathBuf, String)>) -> Suite {
        let addr = match TestAddress::parse(name) {
            Ok(addr) => addr,
            Err(e) => {
                return failure_suite(name, TestError::error(e.to_string()));
            }
        };
        let call = addr.call.clone();

        if let Some(file) = &addr.filename {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                self.config.spec.workdir.join(file)
            };
            return self.file_address_suite(name, &path, call, context);
        }

        if let Some(module) = &addr.module {
            let first = module.split('.').next().unwrap_or(module);
            let Some(base) = self.find_module_base(first) else {
                return failure_suite(
                    name,
                    TestError::error(format!("no module `{module}` on the search path")),
                );
            };
            *context = Some((base.clone(), module.clone()));
            return self.module_suite(&base, module.clone(), call, true);
        }

        // Callable-only: needs a module from a previous address.
        match context {
            Some((base, module)) => {
                let (base, module) = (base.clone(), module.clone());
                self.module_suite(&base, module, call, true)
            }
            None => failure_suite(
                name,
                TestError::error("callable-only address with no preceding module".to_string()),
            ),
        }
    }

    fn file_address_suite(
        &self,
        name: &str,
        path: &Path,
        call: Option<String>,
        context: &mut Option<(PathBuf, String)>,
    ) -> Suite {
        if path.is_dir() {
            if path.join(format!("__init__.{SOURCE_EXT}")).is_file() {
                let (base, dotted) = package_coords(path);
                *context = Some((base.clone(), dotted.clone()));
                return self.module_suite(&base, dotted, call, true);
            }
            return self.load_from_dir(path);
        }
        if path.is_file() {
            let (base, dotted) = module_coords(path);
            *context = Some((base.clone(), dotted.clone()));
            return self.module_suite(&base, dotted, call, true);
        }
        failure_suite(
            name,
            TestError::error(format!("no such file or directory: {}", path.display())),
        )
    }

    /// First directory (workdir, then recorded search paths) holding the
    /// top-level segment of a dotted module.
    fn find_module_base(&self, first_segment: &str) -> Option<PathBuf> {
        let mut candidates = vec![self.config.spec.workdir.clone()];
        candidates.extend(self.importer.search_paths());
        candidates.into_iter().find(|dir| {
            dir.join(first_segment)
                .join(format!("__init__.{SOURCE_EXT}"))
                .is_file()
                || dir.join(format!("{first_segment}.{SOURCE_EXT}")).is_file()
        })
    }

    /// Plugin panics recorded during loading become failing cases.
    fn fault_cases(&self) -> Vec<SuiteItem> {
        self.plugins
            .take_faults()
            .into_iter()
            .map(|fault| {
                SuiteItem::Case(Case::load_failure(
                    format!("plugin.{}.{}", fault.plugin, fault.hook),
                    TestError::failure(format!(
                        "plugin `{}` panicked in hook `{}`",
                        fault.plugin, fault.hook
                    )),
                ))
            })
            .collect()
    }
}

/// A generator's parametric cases, expanded only when iterated.
fn gen_suite(
    id_base: String,
    chain: ScopeChain,
    generator: GenFn,
    setup: Option<HookFn>,
    teardown: Option<HookFn>,
) -> Suite {
    Suite::lazy(move || {
        let ctx = TestCtx::new(CaptureStack::new(false));
        match generator(&ctx) {
            Ok(cases) => (
                None,
                cases
                    .into_iter()
                    .map(|gen_case| {
                        SuiteItem::Case(Case::test(
                            format!("{id_base}:{}", gen_case.args),
                            chain.clone(),
                            setup.clone(),
                            gen_case.func,
                            teardown.clone(),
                        ))
                    })
                    .collect(),
            ),
            Err(err) => (
                None,
                vec![SuiteItem::Case(Case::load_failure(
                    id_base.clone(),
                    TestError::failure(format!("generator error: {}", err.message())),
                ))],
            ),
        }
    })
}

fn failure_suite(id: &str, err: TestError) -> Suite {
    Suite::eager(None, vec![SuiteItem::Case(Case::load_failure(id, err))])
}

///// Dotted coordinates of a module file: walk up through package
/// directories accumulating the prefix.
fn module_coords(file: &Path) -> (PathBuf, String) {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    if stem == "__init__" {
        return module_coords_of_init(file);
    }
    let mut segments = vec![stem];
    let mut dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
    while dir.join(format!("__init__.{SOURCE_EXT}")).is_file() {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            segments.push(name.to_string());
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }
    segments.reverse();
    (dir, segments.join("."))
}

/// Dotted coordinates of a package directory.
fn package_coords(dir: &Path) -> (PathBuf, String) {
    let init = dir.join(format!("__init__.{SOURCE_EXT}"));
    module_coords_of_init(&init)
}

fn module_coords_of_init(init: &Path) -> (PathBuf, String) {
    // The package's identity is its directory chain, not `__init__`.
    let Some(pkg_dir) = init.parent() else {
        return (PathBuf::new(), String::new());
    };
    let mut segments = Vec::new();
    let mut dir = pkg_dir.to_path_buf();
    while dir.join(format!("__init__.{SOURCE_EXT}")).is_file() {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            segments.push(name.to_string());
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }
    segments.reverse();
    (dir, segments.join("."))
}
