// src/engine/mod.rs

//! The reload engine.
//!
//! This module ties together:
//! - the event router (change event -> command + delay)
//! - the reload pipeline (read, transform, redefine, notify)
//! - the `Agent` service object that owns every shared registry and drives
//!   the router from the event source

pub mod pipeline;
pub mod router;
pub mod runtime;

pub use pipeline::{ReloadPipeline, UnitDefiner};
pub use router::{EventRouter, Routed};
pub use runtime::{Agent, AgentBuilder, AgentOptions};
