// src/watch/event.rs

//! Typed change events produced by the event source.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Create => "CREATE",
            ChangeKind::Modify => "MODIFY",
            ChangeKind::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One physical filesystem change.
///
/// Equality and hashing only consider `path` and `kind`; `is_directory` is
/// derived information.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    path: PathBuf,
    kind: ChangeKind,
    is_directory: bool,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory,
        }
    }

    pub fn file(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self::new(path, kind, false)
    }

    pub fn directory(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self::new(path, kind, true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory
    }
}

impl PartialEq for ChangeEvent {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.kind == other.kind
    }
}

impl Eq for ChangeEvent {}

impl Hash for ChangeEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Translate a raw `notify` event into zero or more `ChangeEvent`s.
///
/// Renames become a DELETE of the old path and a CREATE of the new one.
/// Access and metadata-only events are dropped.
pub fn changes_from_notify(event: &Event) -> Vec<ChangeEvent> {
    let mut out = Vec::new();

    match &event.kind {
        EventKind::Create(kind) => {
            for path in &event.paths {
                let is_dir = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                };
                out.push(ChangeEvent::new(path.clone(), ChangeKind::Create, is_dir));
            }
        }
        EventKind::Remove(kind) => {
            for path in &event.paths {
                let is_dir = match kind {
                    RemoveKind::Folder => true,
                    RemoveKind::File => false,
                    _ => looks_like_directory(path),
                };
                out.push(ChangeEvent::new(path.clone(), ChangeKind::Delete, is_dir));
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => {
                for path in &event.paths {
                    out.push(deleted(path));
                }
            }
            RenameMode::To => {
                for path in &event.paths {
                    out.push(created(path));
                }
            }
            RenameMode::Both if event.paths.len() == 2 => {
                out.push(deleted(&event.paths[0]));
                out.push(created(&event.paths[1]));
            }
            _ => {
                for path in &event.paths {
                    if path.exists() {
                        out.push(created(path));
                    } else {
                        out.push(deleted(path));
                    }
                }
            }
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) | EventKind::Any => {
            for path in &event.paths {
                out.push(ChangeEvent::new(
                    path.clone(),
                    ChangeKind::Modify,
                    path.is_dir(),
                ));
            }
        }
        EventKind::Access(_) | EventKind::Other => {}
    }

    out
}

fn created(path: &Path) -> ChangeEvent {
    ChangeEvent::new(path.to_path_buf(), ChangeKind::Create, path.is_dir())
}

fn deleted(path: &Path) -> ChangeEvent {
    ChangeEvent::new(path.to_path_buf(), ChangeKind::Delete, looks_like_directory(path))
}

/// A deleted path can no longer be stat'ed, so fall back to "has no
/// extension" for paths that are gone.
pub fn looks_like_directory(path: &Path) -> bool {
    if path.is_dir() {
        return true;
    }
    !path.exists() && path.extension().is_none()
}
