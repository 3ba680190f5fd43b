//! The reflection model test modules are expressed in.
//!
//! The harness never parses a source language. An embedder (or a test)
//! registers [`ModuleDef`] values describing what a module contains: named
//! fixture hooks, classes with methods, free functions with source lines.
//! Test bodies are plain closures over a [`TestCtx`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::TestCtx;
use crate::outcome::{Outcome, TestError};

/// A test body.
pub type TestFn = Arc<dyn Fn(&TestCtx) -> Outcome + Send + Sync>;

/// A fixture hook (setup or teardown at any level).
pub type HookFn = Arc<dyn Fn(&TestCtx) -> Outcome + Send + Sync>;

/// A generator body: produces the parametrized cases when invoked.
pub type GenFn = Arc<dyn Fn(&TestCtx) -> Result<Vec<GenCase>, TestError> + Send + Sync>;

/// One yield of a generator test: the printable argument tuple and the
/// bound callable.
#[derive(Clone)]
pub struct GenCase {
    pub args: String,
    pub func: TestFn,
}

impl GenCase {
    pub fn new(args: impl Into<String>, func: TestFn) -> Self {
        GenCase {
            args: args.into(),
            func,
        }
    }
}

/// Named module/class attributes that resolve to fixture hooks.
///
/// Ordered map so attribute iteration (and therefore anything derived from
/// it) is deterministic.
pub type AttrMap = BTreeMap<String, HookFn>;

/// Resolve a hook from an attribute map, trying each spelling in order.
pub fn resolve_hook(attrs: &AttrMap, spellings: &[&str]) -> Option<HookFn> {
    spellings
        .iter()
        .find_map(|name| attrs.get(*name).cloned())
}

/// Module-level setup spellings, in resolution order.
pub const MODULE_SETUP: &[&str] = &[
    "setup_module",
    "setUp_module",
    "setupModule",
    "setUpModule",
    "setup",
    "setUp",
    "setupFunc",
];

/// Module-level teardown spellings, in resolution order.
pub const MODULE_TEARDOWN: &[&str] = &[
    "teardown_module",
    "tearDown_module",
    "teardownModule",
    "tearDownModule",
    "teardown",
    "tearDown",
    "teardownFunc",
];

/// Class-level setup spellings, in resolution order.
pub const CLASS_SETUP: &[&str] = &["setup_class", "setUpClass", "setupClass", "setupAll", "setUpAll"];

/// Class-level teardown spellings, in resolution order.
pub const CLASS_TEARDOWN: &[&str] = &[
    "teardown_class",
    "tearDownClass",
    "teardownClass",
    "teardownAll",
    "tearDownAll",
];

/// Per-case (instance-level) setup spellings; also the class fallback.
pub const CASE_SETUP: &[&str] = &["setup", "setUp"];

/// Per-case (instance-level) teardown spellings; also the class fallback.
pub const CASE_TEARDOWN: &[&str] = &["teardown", "tearDown"];

/// What kind of body a function carries.
#[derive(Clone)]
pub enum FnKind {
    Plain(TestFn),
    Generator(GenFn),
}

/// A free function in a module.
#[derive(Clone)]
pub struct FunctionDef {
    pub name: String,
    /// Source line, for declaration-order sorting.
    pub line: u32,
    pub kind: FnKind,
    /// Function-level setup attached by the embedder (decorator-style).
    pub setup: Option<HookFn>,
    pub teardown: Option<HookFn>,
}

impl FunctionDef {
    pub fn plain(name: impl Into<String>, line: u32, body: TestFn) -> Self {
        FunctionDef {
            name: name.into(),
            line,
            kind: FnKind::Plain(body),
            setup: None,
            teardown: None,
        }
    }

    pub fn generator(name: impl Into<String>, line: u32, body: GenFn) -> Self {
        FunctionDef {
            name: name.into(),
            line,
            kind: FnKind::Generator(body),
            setup: None,
            teardown: None,
        }
    }

    pub fn with_setup(mut self, hook: HookFn) -> Self {
        self.setup = Some(hook);
        self
    }

    pub fn with_teardown(mut self, hook: HookFn) -> Self {
        self.teardown = Some(hook);
        self
    }
}

/// A method on a test class.
#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub line: u32,
    pub kind: FnKind,
}

impl MethodDef {
    pub fn plain(name: impl Into<String>, line: u32, body: TestFn) -> Self {
        MethodDef {
            name: name.into(),
            line,
            kind: FnKind::Plain(body),
        }
    }

    pub fn generator(name: impl Into<String>, line: u32, body: GenFn) -> Self {
        MethodDef {
            name: name.into(),
            line,
            kind: FnKind::Generator(body),
        }
    }
}

/// A class in a module.
#[derive(Clone)]
pub struct ClassDef {
    pub name: String,
    /// Whether the class derives from the unit-test base class; such
    /// classes are selected regardless of the name pattern.
    pub is_test_base: bool,
    pub attrs: AttrMap,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        ClassDef {
            name: name.into(),
            is_test_base: false,
            attrs: AttrMap::new(),
            methods: Vec::new(),
        }
    }

    pub fn test_base(name: impl Into<String>) -> Self {
        let mut c = Self::new(name);
        c.is_test_base = true;
        c
    }

    pub fn attr(mut self, name: impl Into<String>, hook: HookFn) -> Self {
        self.attrs.insert(name.into(), hook);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }
}

/// How a module may be distributed across parallel workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParallelMark {
    /// Whole module is one task (the default).
    #[default]
    Pinned,
    /// Module (and its package fixtures) must stay on a single worker.
    Shared,
    /// Each top-level test in the module may run as its own task.
    CanSplit,
}

/// A loaded module: the unit the importer hands back.
#[derive(Clone)]
pub struct ModuleDef {
    /// Dotted name (`pack.sub.mod`).
    pub name: String,
    /// The file this module was materialized from.
    pub file: PathBuf,
    pub is_package: bool,
    /// Entry modules (explicitly named on the command line) bypass the
    /// name-pattern check during selection.
    pub is_entry: bool,
    pub attrs: AttrMap,
    pub classes: Vec<ClassDef>,
    pub functions: Vec<FunctionDef>,
    pub parallel: ParallelMark,
}

impl std::fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("is_package", &self.is_package)
            .field("is_entry", &self.is_entry)
            .field("parallel", &self.parallel)
            .finish_non_exhaustive()
    }
}

impl ModuleDef {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        ModuleDef {
            name: name.into(),
            file: file.into(),
            is_package: false,
            is_entry: false,
            attrs: AttrMap::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            parallel: ParallelMark::default(),
        }
    }

    pub fn package(mut self) -> Self {
        self.is_package = true;
        self
    }

    pub fn entry(mut self) -> Self {
        self.is_entry = true;
        self
    }

    pub fn attr(mut self, name: impl Into<String>, hook: HookFn) -> Self {
        self.attrs.insert(name.into(), hook);
        self
    }

    pub fn class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }

    pub fn function(mut self, function: FunctionDef) -> Self {
        self.functions.push(function);
        self
    }

    pub fn parallel(mut self, mark: ParallelMark) -> Self {
        self.parallel = mark;
        self
    }

    /// Last dotted segment of the module name.
    pub fn tail(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}
