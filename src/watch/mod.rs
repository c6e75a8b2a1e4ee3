// src/watch/mod.rs

//! Event source: file watching and change detection.
//!
//! This module is responsible for:
//! - Compiling `include` / `exclude` glob patterns per watch root.
//! - Wiring up one cross-platform filesystem watcher (`notify`) per root.
//! - Translating raw notifications into typed [`ChangeEvent`]s.
//! - Remembering digests of committed units so unchanged rewrites can be
//!   skipped.
//!
//! It does **not** decide what a change means for the live process; that is
//! the job of `engine::router`.

pub mod digest;
pub mod event;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use digest::{compute_digest, DigestCache};
pub use event::{changes_from_notify, ChangeEvent, ChangeKind};
pub use patterns::RootProfile;
pub use watcher::{spawn_event_source, EventSource, RootedChange, WatchRoot};
