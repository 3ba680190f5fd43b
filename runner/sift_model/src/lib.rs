//! Data model for the sift test harness.
//!
//! Leaf crate shared by every other component:
//!
//! - [`address`]: the user-facing test specifier grammar
//! - [`config`]: the configuration snapshot and compiled form
//! - [`entity`]: the reflection model modules are expressed in
//! - [`scope`]: fixture scopes and ancestor chains
//! - [`capture`]: per-runner output capture
//! - [`outcome`]: the test error taxonomy
//! - [`error`]: shared error types

pub mod address;
pub mod capture;
pub mod config;
pub mod entity;
pub mod error;
pub mod outcome;
pub mod scope;

pub use address::TestAddress;
pub use capture::{CaptureHandle, CaptureStack, TestCtx};
pub use config::{Config, ConfigSpec};
pub use entity::{
    AttrMap, ClassDef, FnKind, FunctionDef, GenCase, GenFn, HookFn, MethodDef, ModuleDef,
    ParallelMark, TestFn,
};
pub use error::{AddressError, ConfigError, ImportError};
pub use outcome::{Outcome, TestError};
pub use scope::{Scope, ScopeChain, ScopeId, ScopeKind};
