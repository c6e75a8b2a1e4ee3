// src/watch/watcher.rs

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WatchSection;
use crate::errors::{HotswapError, Result};
use crate::types::LoaderScope;
use crate::watch::event::{changes_from_notify, ChangeEvent, ChangeKind};
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::RootProfile;

/// A directory (or single archive file) to watch, plus the loader scope its
/// units belong to.
#[derive(Debug, Clone)]
pub struct WatchRoot {
    path: PathBuf,
    scope: Option<LoaderScope>,
    profile: RootProfile,
}

impl WatchRoot {
    pub fn new(path: impl Into<PathBuf>, scope: Option<LoaderScope>, profile: RootProfile) -> Self {
        Self {
            path: path.into(),
            scope,
            profile,
        }
    }

    pub fn from_section(section: &WatchSection) -> Result<Self> {
        let profile = RootProfile::new(&section.include, &section.exclude)?;
        Ok(Self::new(
            section.root.clone(),
            section.scope.as_deref().map(LoaderScope::new),
            profile,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> Option<&LoaderScope> {
        self.scope.as_ref()
    }

    /// Path of `change` relative to this root, if it lies under it.
    pub fn relative(&self, change: &ChangeEvent) -> Option<String> {
        relative_str(&self.path, change.path())
    }

    /// Whether `change` passes this root's include/exclude profile.
    pub fn accepts(&self, change: &ChangeEvent) -> bool {
        if change.path() == self.path {
            // Only an archive root reports changes on itself.
            return !change.is_directory();
        }
        let Some(rel) = self.relative(change) else {
            return false;
        };
        if change.is_directory() {
            !self.profile.is_excluded(&rel)
        } else {
            self.profile.matches(&rel)
        }
    }
}

/// A change observed under a specific root.
#[derive(Debug, Clone)]
pub struct RootedChange {
    pub root: Arc<WatchRoot>,
    pub event: ChangeEvent,
}

enum RootSignal {
    Event(Event),
    Error(notify::Error),
}

struct RootWatch {
    root: Arc<WatchRoot>,
    // Dropping the watcher stops the OS-level watch.
    _watcher: RecommendedWatcher,
    listener: JoinHandle<()>,
}

/// Event source over a set of roots.
///
/// Every root owns its own `notify` watcher and its own listener task, so a
/// failing root closes only its own stream and roots can be cancelled or
/// restarted independently. Events of one root are forwarded in the order
/// the OS reported them.
pub struct EventSource {
    tx: mpsc::Sender<RootedChange>,
    roots: HashMap<PathBuf, RootWatch>,
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("roots", &self.roots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventSource {
    pub fn new(tx: mpsc::Sender<RootedChange>) -> Self {
        Self {
            tx,
            roots: HashMap::new(),
        }
    }

    /// Start watching `root`.
    ///
    /// Fails immediately with [`HotswapError::RootUnavailable`] if the root
    /// is missing or unreadable. Must be called inside a Tokio runtime.
    pub fn watch(&mut self, root: WatchRoot) -> Result<PathBuf> {
        let canonical = check_root(root.path())?;
        let root = Arc::new(WatchRoot {
            path: canonical.clone(),
            ..root
        });

        if let Some(existing) = self.roots.remove(&canonical) {
            existing.listener.abort();
        }

        let watch = start_root(Arc::clone(&root), self.tx.clone())?;
        self.roots.insert(canonical.clone(), watch);
        Ok(canonical)
    }

    /// Stop watching one root. Returns false if it was not watched.
    pub fn cancel(&mut self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        match self.roots.remove(&key) {
            Some(watch) => {
                watch.listener.abort();
                info!(root = ?key, "stopped watching root");
                true
            }
            None => false,
        }
    }

    /// Tear down and re-create the watch on an existing root, e.g. after its
    /// stream was closed by an I/O error.
    pub fn restart(&mut self, path: &Path) -> Result<()> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let root = match self.roots.remove(&key) {
            Some(watch) => {
                watch.listener.abort();
                watch.root
            }
            None => {
                return Err(HotswapError::RootUnavailable {
                    path: path.to_path_buf(),
                    reason: "root is not being watched".to_string(),
                });
            }
        };
        self.watch((*root).clone())?;
        Ok(())
    }

    /// True while the root's listener is still forwarding events.
    pub fn is_active(&self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.roots
            .get(&key)
            .is_some_and(|w| !w.listener.is_finished())
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.keys().cloned().collect()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        for watch in self.roots.values() {
            watch.listener.abort();
        }
    }
}

/// Watch every root in `roots`, forwarding accepted changes to `tx`.
///
/// All roots are checked before any watch is started.
pub fn spawn_event_source(
    roots: Vec<WatchRoot>,
    tx: mpsc::Sender<RootedChange>,
) -> Result<EventSource> {
    for root in roots.iter() {
        check_root(root.path())?;
    }
    let mut source = EventSource::new(tx);
    for root in roots {
        source.watch(root)?;
    }
    Ok(source)
}

fn check_root(path: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(path).map_err(|e| HotswapError::RootUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if meta.is_dir() {
        std::fs::read_dir(path).map_err(|e| HotswapError::RootUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    Ok(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()))
}

fn start_root(root: Arc<WatchRoot>, tx: mpsc::Sender<RootedChange>) -> Result<RootWatch> {
    let (signal_tx, signal_rx) = mpsc::unbounded_channel::<RootSignal>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let signal = match res {
                Ok(event) => RootSignal::Event(event),
                Err(err) => RootSignal::Error(err),
            };
            // The listener is gone once the root is cancelled; nothing to do.
            let _ = signal_tx.send(signal);
        },
        Config::default(),
    )?;

    // Recursive mode makes the backend add watches for new subdirectories
    // before their CREATE reaches us, so nested files are not missed.
    let mode = if root.path().is_dir() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(root.path(), mode)?;

    info!(root = ?root.path(), scope = ?root.scope(), "file watcher started");

    let listener = tokio::spawn(root_listener(Arc::clone(&root), signal_rx, tx));

    Ok(RootWatch {
        root,
        _watcher: watcher,
        listener,
    })
}

async fn root_listener(
    root: Arc<WatchRoot>,
    mut signals: mpsc::UnboundedReceiver<RootSignal>,
    tx: mpsc::Sender<RootedChange>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            RootSignal::Event(event) => {
                for change in changes_from_notify(&event) {
                    if change.kind() == ChangeKind::Delete && change.path() == root.path() {
                        warn!(root = ?root.path(), "watch root was deleted; closing its stream");
                        return;
                    }
                    if !root.accepts(&change) {
                        continue;
                    }
                    debug!(root = ?root.path(), change = %change, "forwarding change");
                    let rooted = RootedChange {
                        root: Arc::clone(&root),
                        event: change,
                    };
                    if tx.send(rooted).await.is_err() {
                        debug!(root = ?root.path(), "change consumer closed; stopping listener");
                        return;
                    }
                }
            }
            RootSignal::Error(err) => {
                warn!(
                    root = ?root.path(),
                    error = %err,
                    "file watch error; closing this root's stream until it is restarted"
                );
                return;
            }
        }
    }
    debug!(root = ?root.path(), "root listener finished");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use notify::event::{CreateKind, EventKind};

    use super::*;

    /// Attach a root whose signals the test sends by hand.
    fn scripted_root(
        source: &mut EventSource,
        path: &Path,
    ) -> (PathBuf, mpsc::UnboundedSender<RootSignal>) {
        let canonical = check_root(path).unwrap();
        let root = Arc::new(WatchRoot::new(&canonical, None, RootProfile::everything()));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let watcher =
            RecommendedWatcher::new(|_: notify::Result<Event>| {}, Config::default()).unwrap();
        let listener = tokio::spawn(root_listener(Arc::clone(&root), signal_rx, source.tx.clone()));
        source.roots.insert(
            canonical.clone(),
            RootWatch {
                root,
                _watcher: watcher,
                listener,
            },
        );
        (canonical, signal_tx)
    }

    #[tokio::test]
    async fn watch_error_closes_only_the_failing_root() {
        let healthy_dir = tempfile::tempdir().unwrap();
        let failing_dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut source = EventSource::new(tx);
        let healthy = source
            .watch(WatchRoot::new(healthy_dir.path(), None, RootProfile::everything()))
            .unwrap();
        let (failing, signals) = scripted_root(&mut source, failing_dir.path());
        assert!(source.is_active(&failing));

        signals
            .send(RootSignal::Error(notify::Error::generic("event queue overflow")))
            .unwrap();
        let late = Event::new(EventKind::Create(CreateKind::File)).add_path(failing.join("A.class"));
        let _ = signals.send(RootSignal::Event(late));

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.is_active(&failing) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(source.is_active(&healthy));
        assert!(rx.try_recv().is_err(), "nothing forwarded after the error");
        assert_eq!(source.roots().len(), 2);

        source.restart(&failing).unwrap();
        assert!(source.is_active(&failing));
    }
}
