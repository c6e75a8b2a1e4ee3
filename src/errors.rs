// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::UnitId;

#[derive(Error, Debug)]
pub enum HotswapError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid hook '{member}' on plugin '{plugin}': {reason}")]
    InvalidHook {
        plugin: String,
        member: String,
        reason: String,
    },

    #[error("hook '{member}' on plugin '{plugin}' uses unsupported hook point '{point}'")]
    UnsupportedHookPoint {
        plugin: String,
        member: String,
        point: String,
    },

    #[error("cannot watch root {path:?}: {reason}")]
    RootUnavailable { path: PathBuf, reason: String },

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("transient I/O failure on {path:?}: {source}")]
    Transient {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transformer '{transformer}' failed for {unit}: {cause}")]
    Transform {
        unit: UnitId,
        transformer: String,
        cause: String,
    },

    #[error("{unit} is structurally incompatible: {cause}")]
    Incompatible { unit: UnitId, cause: String },

    #[error("redefinition batch is {0} and no longer accepts entries")]
    BatchClosed(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HotswapError {
    /// Errors the scheduler answers by re-scheduling the same command.
    pub fn is_transient(&self) -> bool {
        matches!(self, HotswapError::Transient { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HotswapError>;
