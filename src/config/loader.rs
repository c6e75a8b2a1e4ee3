// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for the
/// checked form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Relative watch roots are resolved against the directory holding the
/// config file, so `hotswap --config app/Hotswap.toml` watches
/// `app/target/classes` for `root = "target/classes"`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path(path)?;

    let base = config_root_dir(path);
    for root in raw_config.watch.iter_mut() {
        if root.root.is_relative() {
            root.root = base.join(&root.root);
        }
    }

    ConfigFile::try_from(raw_config)
}

/// Directory relative paths in a config file are resolved against.
///
/// A bare filename like `Hotswap.toml` has an empty parent, in which case the
/// current working directory is used.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Hotswap.toml")
}
