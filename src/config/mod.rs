// src/config/mod.rs

//! Configuration loading and validation for hotswap.
//!
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` turns a `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{AgentSection, ConfigFile, ControlSection, RawConfigFile, WatchSection};
