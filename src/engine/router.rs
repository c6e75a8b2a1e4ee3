// src/engine/router.rs

//! Pure routing from change events to scheduled commands.
//!
//! Given a change under a root and the host's view of what is loaded, decide
//! which command (if any) to schedule and with which delay. No I/O happens
//! here, which keeps the routing rules directly testable.

use std::time::Duration;

use tracing::debug;

use crate::command::{Action, Command, MergeKey, UnitSource};
use crate::engine::AgentOptions;
use crate::redefine::RedefinitionHost;
use crate::types::{UnitId, UnloadedPolicy};
use crate::watch::path_utils::{has_extension, unit_name_from_relative};
use crate::watch::{ChangeEvent, ChangeKind, WatchRoot};

/// A command the router wants scheduled.
#[derive(Debug, Clone)]
pub struct Routed {
    pub command: Command,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct EventRouter {
    unit_extension: String,
    debounce: Duration,
    create_delay: Duration,
    unloaded_policy: UnloadedPolicy,
}

impl EventRouter {
    pub fn new(options: &AgentOptions) -> Self {
        Self {
            unit_extension: options.unit_extension.clone(),
            debounce: options.debounce,
            create_delay: options.create_delay,
            unloaded_policy: options.unloaded_policy,
        }
    }

    /// Unit identity for a unit file under `root`, if `event` is one.
    pub fn unit_of(&self, root: &WatchRoot, event: &ChangeEvent) -> Option<UnitId> {
        if event.is_directory() || !has_extension(event.path(), &self.unit_extension) {
            return None;
        }
        let rel = root.relative(event)?;
        let name = unit_name_from_relative(&rel, &self.unit_extension)?;
        Some(UnitId::new(root.scope().cloned(), name))
    }

    pub fn route(
        &self,
        root: &WatchRoot,
        event: &ChangeEvent,
        host: &dyn RedefinitionHost,
    ) -> Option<Routed> {
        let scope = root.scope().cloned();
        let path = event.path().to_path_buf();

        if event.is_directory() {
            // New directories are picked up by the recursive watch.
            if event.kind() != ChangeKind::Delete {
                return None;
            }
            return Some(self.debounced(Command::new(
                MergeKey::Path(path.clone()),
                Action::UnitRemoved {
                    path,
                    is_directory: true,
                    scope,
                },
            )));
        }

        let Some(unit) = self.unit_of(root, event) else {
            return Some(self.debounced(Command::new(
                MergeKey::Path(path.clone()),
                Action::ResourceChanged {
                    path,
                    kind: event.kind(),
                    scope,
                },
            )));
        };

        match event.kind() {
            ChangeKind::Delete => Some(self.debounced(Command::new(
                MergeKey::Path(path.clone()),
                Action::UnitRemoved {
                    path,
                    is_directory: false,
                    scope,
                },
            ))),
            _ if host.is_loaded(&unit) => Some(
                self.debounced(Command::redefine(unit, UnitSource::File(path))),
            ),
            ChangeKind::Create => Some(self.created(unit, path)),
            ChangeKind::Modify => match self.unloaded_policy {
                UnloadedPolicy::Notify => Some(self.created(unit, path)),
                UnloadedPolicy::Ignore => {
                    debug!(unit = %unit, "change to a unit that is not loaded; ignoring");
                    None
                }
            },
        }
    }

    fn debounced(&self, command: Command) -> Routed {
        Routed {
            command,
            delay: self.debounce,
        }
    }

    fn created(&self, unit: UnitId, path: std::path::PathBuf) -> Routed {
        Routed {
            command: Command::new(
                MergeKey::Unit(unit.clone()),
                Action::UnitCreated { unit, path },
            ),
            delay: self.create_delay,
        }
    }
}
