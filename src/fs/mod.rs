// src/fs/mod.rs

//! Filesystem access for reading compiled units.
//!
//! Notifications come from `notify` directly; this trait only covers the
//! reads the pipeline and the startup preload do, so tests can substitute
//! [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

pub trait FileSystem: Send + Sync + Debug {
    /// Read a whole file. The raw `io::Error` is returned so callers can tell
    /// a briefly locked file apart from a missing one.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Full paths of the direct children of `dir`.
    fn read_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir(dir)
            .with_context(|| format!("listing {}", dir.display()))?
            .map(|entry| Ok(entry?.path()))
            .collect()
    }
}

/// Every regular file below `root`, sorted.
pub fn walk_files(fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        for child in fs.read_dir(&dir)? {
            if fs.is_dir(&child) {
                pending.push(child);
            } else if fs.is_file(&child) {
                files.push(child);
            }
        }
    }

    files.sort();
    Ok(files)
}
