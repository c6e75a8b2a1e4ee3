// src/plugin/mod.rs

//! Plugin hooks.
//!
//! Dependent subsystems implement [`Hookable`] and declare their hooks
//! explicitly. The [`PluginManager`] turns class-load hooks into synthetic
//! transformers in the [`TransformerRegistry`](crate::transform::TransformerRegistry)
//! and resource-change hooks into listeners on the
//! [`NotifierHub`](crate::listener::NotifierHub).

pub mod hook;
pub mod manager;

pub use hook::{HookDecl, HookEvent, HookPoint, HookTarget, Hookable};
pub use manager::{HookBackend, HookBinding, PluginManager};
