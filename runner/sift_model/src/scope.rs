//! Fixture scopes and ancestor chains.
//!
//! A scope is a package, module, or class that may carry setup/teardown
//! hooks. Each test case is loaded with its full ancestor chain (outermost
//! first), computed once at load time; the context engine keys its state
//! on [`ScopeId`].

use std::fmt;

use smallvec::SmallVec;

use crate::entity::{
    resolve_hook, ClassDef, HookFn, ModuleDef, CLASS_SETUP, CLASS_TEARDOWN, MODULE_SETUP,
    MODULE_TEARDOWN,
};

/// Dotted identity of a scope (`pack.sub.mod` or `pack.mod.TestClass`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        ScopeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Package,
    Module,
    Class,
}

/// A fixture scope with its resolved hooks.
#[derive(Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub setup: Option<HookFn>,
    pub teardown: Option<HookFn>,
}

impl Scope {
    /// The scope of a module (or package, via its `__init__` module).
    pub fn for_module(module: &ModuleDef) -> Self {
        Scope {
            id: ScopeId::new(&module.name),
            kind: if module.is_package {
                ScopeKind::Package
            } else {
                ScopeKind::Module
            },
            setup: resolve_hook(&module.attrs, MODULE_SETUP),
            teardown: resolve_hook(&module.attrs, MODULE_TEARDOWN),
        }
    }

    /// The scope of a class inside `module`.
    pub fn for_class(module: &ModuleDef, class: &ClassDef) -> Self {
        Scope {
            id: ScopeId::new(format!("{}.{}", module.name, class.name)),
            kind: ScopeKind::Class,
            setup: resolve_hook(&class.attrs, CLASS_SETUP),
            teardown: resolve_hook(&class.attrs, CLASS_TEARDOWN),
        }
    }

    pub fn has_fixtures(&self) -> bool {
        self.setup.is_some() || self.teardown.is_some()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Ancestor chain of a case, outermost scope first.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain(SmallVec<[Scope; 4]>);

impl ScopeChain {
    pub fn empty() -> Self {
        ScopeChain(SmallVec::new())
    }

    /// Append an innermost scope.
    pub fn push(&mut self, scope: Scope) {
        self.0.push(scope);
    }

    /// A new chain extending this one by `scope`.
    pub fn child(&self, scope: Scope) -> Self {
        let mut next = self.clone();
        next.push(scope);
        next
    }

    /// Outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter()
    }

    /// Innermost first.
    pub fn iter_rev(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter().rev()
    }

    pub fn innermost(&self) -> Option<&Scope> {
        self.0.last()
    }

    /// Innermost scope of the given kind, if any.
    pub fn innermost_of(&self, kind: ScopeKind) -> Option<&Scope> {
        self.0.iter().rev().find(|s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
