// src/redefine/mod.rs

//! Redefinition: committing new unit bytes into the live process.
//!
//! - [`host`] is the seam to the process's redefinition facility.
//! - [`batch`] collects definitions and reports per-unit outcomes.
//! - [`executor`] runs the batch-then-singletons commit protocol.
//! - [`memory_host`] is an in-process host used by the binary and tests.

pub mod batch;
pub mod executor;
pub mod host;
pub mod memory_host;

pub use batch::{BatchState, FlushReport, RedefinitionBatch, UnitOutcome, UnitStatus};
pub use executor::RedefinitionExecutor;
pub use host::{HostRejection, RedefinitionHost, RejectionCause, UnitDefinition};
pub use memory_host::InMemoryHost;
