// src/command/mod.rs

//! Commands and the debouncing scheduler.
//!
//! - [`model`] defines merge keys, actions and mergeable commands.
//! - [`scheduler`] delays, merges and dispatches commands.
//! - [`backend`] is the seam between the scheduler and whatever executes a
//!   fired command.

pub mod backend;
pub mod model;
pub mod scheduler;

pub use backend::CommandExecutor;
pub use model::{Action, Command, MergeKey, NamedTask, UnitSource};
pub use scheduler::{ScheduleOutcome, Scheduler, SchedulerOptions};
