// src/command/model.rs

//! Mergeable commands.
//!
//! A [`Command`] is a tagged unit of deferred work with an explicit
//! [`MergeKey`]. Two commands with equal keys are the same logical work; the
//! scheduler keeps only one pending instance per key and folds later
//! arrivals into it with [`Command::merge`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::types::{LoaderScope, UnitId};
use crate::watch::ChangeKind;

/// Identity used to detect duplicate commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeKey {
    /// Work on one unit (reload, creation).
    Unit(UnitId),
    /// Work tied to a filesystem path (removal, resource rescans).
    Path(PathBuf),
    /// Free-form key for injected tasks.
    Named(String),
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeKey::Unit(unit) => write!(f, "unit:{unit}"),
            MergeKey::Path(path) => write!(f, "path:{}", path.display()),
            MergeKey::Named(name) => write!(f, "named:{name}"),
        }
    }
}

/// Where the new bytes of a unit come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSource {
    /// Read the file when the command fires, not when it is scheduled, so the
    /// last write of a burst wins.
    File(PathBuf),
    /// Bytes supplied directly by a driver.
    Bytes(Arc<[u8]>),
}

type TaskFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;

/// Injected work that is not a reload, e.g. "clear cached result".
#[derive(Clone)]
pub struct NamedTask {
    name: String,
    run: Arc<TaskFn>,
}

impl NamedTask {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self) -> anyhow::Result<()> {
        (self.run)()
    }
}

impl fmt::Debug for NamedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One piece of work inside a command.
#[derive(Debug, Clone)]
pub enum Action {
    /// Redefine a loaded unit with new bytes.
    Redefine { unit: UnitId, source: UnitSource },
    /// A unit file appeared that the host has not loaded.
    UnitCreated { unit: UnitId, path: PathBuf },
    /// A unit file or a whole directory of them disappeared.
    UnitRemoved {
        path: PathBuf,
        is_directory: bool,
        scope: Option<LoaderScope>,
    },
    /// A non-unit resource changed.
    ResourceChanged {
        path: PathBuf,
        kind: ChangeKind,
        scope: Option<LoaderScope>,
    },
    Task(NamedTask),
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Action::Redefine { unit, .. } => format!("redefine {unit}"),
            Action::UnitCreated { unit, .. } => format!("created {unit}"),
            Action::UnitRemoved { path, .. } => format!("removed {}", path.display()),
            Action::ResourceChanged { path, kind, .. } => {
                format!("resource {kind} {}", path.display())
            }
            Action::Task(task) => format!("task {}", task.name()),
        }
    }
}

/// A mergeable command: one primary action plus the actions of every
/// equivalent command that arrived while it was pending, in arrival order.
#[derive(Debug, Clone)]
pub struct Command {
    key: MergeKey,
    primary: Action,
    merged: Vec<Action>,
    attempt: u32,
}

impl Command {
    pub fn new(key: MergeKey, action: Action) -> Self {
        Self {
            key,
            primary: action,
            merged: Vec::new(),
            attempt: 0,
        }
    }

    pub fn redefine(unit: UnitId, source: UnitSource) -> Self {
        Self::new(
            MergeKey::Unit(unit.clone()),
            Action::Redefine { unit, source },
        )
    }

    pub fn task<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        Self::new(
            MergeKey::Named(name.clone()),
            Action::Task(NamedTask::new(name, run)),
        )
    }

    pub fn key(&self) -> &MergeKey {
        &self.key
    }

    pub fn primary(&self) -> &Action {
        &self.primary
    }

    pub fn merged(&self) -> &[Action] {
        &self.merged
    }

    /// Primary first, then merged siblings in arrival order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        std::iter::once(&self.primary).chain(self.merged.iter())
    }

    pub fn into_actions(self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(1 + self.merged.len());
        actions.push(self.primary);
        actions.extend(self.merged);
        actions
    }

    /// Number of actions (primary + merged).
    pub fn len(&self) -> usize {
        1 + self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// How many times this command was re-scheduled after a transient
    /// failure.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }

    /// Fold `other` into this command. `other` must carry the same key.
    pub fn merge(mut self, other: Command) -> Command {
        self.absorb(other);
        self
    }

    pub(crate) fn absorb(&mut self, other: Command) {
        debug_assert_eq!(self.key, other.key, "merging commands with different keys");
        self.merged.push(other.primary);
        self.merged.extend(other.merged);
    }
}
