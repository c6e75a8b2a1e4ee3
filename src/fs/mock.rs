// src/fs/mock.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::FileSystem;

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    locked: HashSet<PathBuf>,
}

/// In-memory filesystem for tests.
///
/// Directories are implied by the files below them. A path can be locked,
/// which makes `read` fail with `WouldBlock` until it is unlocked, the way a
/// compiler still writing its output looks to a reader.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    tree: Arc<Mutex<Tree>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or overwrite a file.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.tree()
            .files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.tree().files.remove(path.as_ref()).is_some()
    }

    pub fn lock_file(&self, path: impl AsRef<Path>) {
        self.tree().locked.insert(path.as_ref().to_path_buf());
    }

    pub fn unlock(&self, path: impl AsRef<Path>) {
        self.tree().locked.remove(path.as_ref());
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let tree = self.tree();
        if tree.locked.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("{} is locked", path.display()),
            ));
        }
        tree.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }

    fn is_file(&self, path: &Path) -> bool {
        self.tree().files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.tree()
            .files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let tree = self.tree();
        let children: BTreeSet<PathBuf> = tree
            .files
            .keys()
            .filter_map(|file| file.strip_prefix(dir).ok())
            .filter_map(|rest| rest.components().next())
            .map(|first| dir.join(first))
            .collect();

        if children.is_empty() || tree.files.contains_key(dir) {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        Ok(children.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::walk_files;

    #[test]
    fn directories_follow_from_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/a/A.class", b"a".to_vec());
        fs.add_file("/w/a/b/B.class", b"b".to_vec());
        fs.add_file("/w/C.class", b"c".to_vec());

        assert!(fs.is_dir(Path::new("/w/a")));
        assert!(!fs.is_dir(Path::new("/w/C.class")));
        assert_eq!(
            fs.read_dir(Path::new("/w")).unwrap(),
            vec![PathBuf::from("/w/C.class"), PathBuf::from("/w/a")]
        );
        assert_eq!(walk_files(&fs, Path::new("/w")).unwrap().len(), 3);
        assert!(fs.read_dir(Path::new("/nope")).is_err());
    }

    #[test]
    fn locked_files_are_transiently_unreadable() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/A.class", b"a".to_vec());
        fs.lock_file("/w/A.class");
        let err = fs.read(Path::new("/w/A.class")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        fs.unlock("/w/A.class");
        assert_eq!(fs.read(Path::new("/w/A.class")).unwrap(), b"a");
        assert!(fs.remove("/w/A.class"));
        assert_eq!(
            fs.read(Path::new("/w/A.class")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
