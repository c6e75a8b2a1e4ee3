// src/command/backend.rs

//! Pluggable command executor abstraction.
//!
//! The scheduler hands fired commands to a `CommandExecutor` instead of
//! running them itself. Production uses `engine::ReloadPipeline`; tests can
//! provide an executor that only records what it was given.

use std::future::Future;
use std::pin::Pin;

use crate::command::model::Command;
use crate::errors::Result;

/// Trait abstracting how fired commands are executed.
///
/// Implementations run concurrently for different merge keys, hence `&self`
/// and `Sync`. Returning an error for which
/// [`HotswapError::is_transient`](crate::errors::HotswapError::is_transient)
/// holds makes the scheduler re-schedule the command.
pub trait CommandExecutor: Send + Sync + 'static {
    fn execute(&self, command: Command) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
