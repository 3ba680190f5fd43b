//! The plugin layer: interface, multiplexer, error classes, builtins.

pub mod errorclass;
pub mod interface;
pub mod manager;
pub mod registry;
pub mod xunit;

pub use errorclass::{DeprecatedPlugin, ErrorClass, ErrorClassRegistry, SkipPlugin};
pub use interface::{dispatch_of, Dispatch, HookSpec, Plugin, PluginOption, HOOKS};
pub use manager::{PluginFault, PluginManager};
