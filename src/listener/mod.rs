// src/listener/mod.rs

//! Resource reload notifiers.
//!
//! Downstream subsystems implement [`ReloadListener`] to re-scan or
//! re-register framework state after a unit changed. The [`NotifierHub`]
//! fans every notification out to all registered listeners; one failing or
//! panicking listener never prevents the others from being notified.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::transform::registry::panic_message;
use crate::types::{LoaderScope, UnitId};
use crate::watch::ChangeKind;

/// Callback contract for subsystems that react to reloads.
pub trait ReloadListener: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// `unit` was committed to the live process.
    fn on_reload_success(&self, unit: &UnitId) -> anyhow::Result<()>;

    /// A unit file appeared for a unit the host has not loaded.
    fn on_unit_created(&self, _unit: &UnitId, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_unit_removed(
        &self,
        _path: &Path,
        _is_directory: bool,
        _scope: Option<&LoaderScope>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// A non-unit file under a watch root changed.
    fn on_resource_changed(
        &self,
        _path: &Path,
        _kind: ChangeKind,
        _scope: Option<&LoaderScope>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

type Entry = (ListenerId, Arc<dyn ReloadListener>);

/// Registered listeners, notified in registration order.
pub struct NotifierHub {
    listeners: ArcSwap<Vec<Entry>>,
    next_id: AtomicU64,
}

impl fmt::Debug for NotifierHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .listeners
            .load()
            .iter()
            .map(|(_, l)| l.name().to_string())
            .collect();
        f.debug_struct("NotifierHub").field("listeners", &names).finish()
    }
}

impl Default for NotifierHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifierHub {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, listener: Arc<dyn ReloadListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(id = %id, listener = %listener.name(), "added reload listener");
        self.listeners.rcu(|current| {
            let mut next: Vec<Entry> = current.as_ref().clone();
            next.push((id, Arc::clone(&listener)));
            next
        });
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let before = self.listeners.load().len();
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|(entry_id, _)| *entry_id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        self.listeners.load().len() < before
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of listeners that handled the notification
    /// without error.
    pub fn notify_reload_success(&self, unit: &UnitId) -> usize {
        self.each("reload success", &unit.to_string(), |l| {
            l.on_reload_success(unit)
        })
    }

    pub fn notify_unit_created(&self, unit: &UnitId, path: &Path) -> usize {
        self.each("unit created", &unit.to_string(), |l| {
            l.on_unit_created(unit, path)
        })
    }

    pub fn notify_unit_removed(
        &self,
        path: &Path,
        is_directory: bool,
        scope: Option<&LoaderScope>,
    ) -> usize {
        self.each("unit removed", &path.display().to_string(), |l| {
            l.on_unit_removed(path, is_directory, scope)
        })
    }

    pub fn notify_resource_changed(
        &self,
        path: &Path,
        kind: ChangeKind,
        scope: Option<&LoaderScope>,
    ) -> usize {
        self.each("resource changed", &path.display().to_string(), |l| {
            l.on_resource_changed(path, kind, scope)
        })
    }

    fn each<F>(&self, what: &str, subject: &str, f: F) -> usize
    where
        F: Fn(&dyn ReloadListener) -> anyhow::Result<()>,
    {
        let listeners = self.listeners.load();
        let mut delivered = 0;
        for (id, listener) in listeners.iter() {
            match catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => warn!(
                    listener = %listener.name(),
                    id = %id,
                    subject = %subject,
                    error = %err,
                    "{what} listener failed"
                ),
                Err(panic) => warn!(
                    listener = %listener.name(),
                    id = %id,
                    subject = %subject,
                    panic = %panic_message(panic.as_ref()),
                    "{what} listener panicked"
                ),
            }
        }
        delivered
    }
}
