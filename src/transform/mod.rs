// src/transform/mod.rs

//! Transformer registration and application.
//!
//! - [`transformer`] defines the `Transformer` trait, phases and deferred
//!   side effects.
//! - [`registry`] stores (scope, pattern) registrations and applies every
//!   matching transformer to a unit's bytes.

pub mod registry;
pub mod transformer;

pub use registry::{
    Registration, RegistrationId, TransformFault, TransformOutcome, TransformerRegistry,
};
pub use transformer::{
    from_fn, DeferredHook, FnTransformer, Phase, Phases, TransformError, TransformSite,
    Transformed, Transformer,
};
