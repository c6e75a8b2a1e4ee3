#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hotswap::command::{Command, CommandExecutor, MergeKey};
use hotswap::errors::{HotswapError, Result};
use hotswap::listener::ReloadListener;
use hotswap::plugin::{HookDecl, HookEvent, Hookable};
use hotswap::redefine::{HostRejection, RedefinitionHost, RejectionCause, UnitDefinition};
use hotswap::types::{LoaderScope, UnitId};
use hotswap::watch::ChangeKind;
use tokio::time::Instant;

/// What a `RecordingExecutor` saw.
#[derive(Debug, Clone)]
pub struct ExecutedCommand {
    pub key: MergeKey,
    pub actions: Vec<String>,
    pub attempt: u32,
    pub at: Instant,
}

/// A fake executor that:
/// - records every command it is given, with the time it ran
/// - optionally fails the first N executions with a transient error
/// - optionally takes some time per command
#[derive(Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<ExecutedCommand>>,
    transient_failures: AtomicU32,
    latency: Option<Duration>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_transiently(times: u32) -> Self {
        Self {
            transient_failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.executed.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command: Command) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            self.executed.lock().unwrap().push(ExecutedCommand {
                key: command.key().clone(),
                actions: command.actions().map(|a| a.describe()).collect(),
                attempt: command.attempt(),
                at: Instant::now(),
            });

            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(HotswapError::Transient {
                    path: PathBuf::from(command.key().to_string()),
                    source: io::Error::new(io::ErrorKind::WouldBlock, "file is locked"),
                });
            }
            Ok(())
        })
    }
}

/// Host that accepts everything except units marked incompatible.
///
/// Like a real host, a call containing one incompatible unit is rejected as
/// a whole.
#[derive(Default)]
pub struct FakeHost {
    loaded: Mutex<HashSet<UnitId>>,
    incompatible: Mutex<HashSet<UnitId>>,
    calls: Mutex<Vec<Vec<UnitId>>>,
    committed: Mutex<Vec<UnitId>>,
    defined: Mutex<Vec<UnitId>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loaded<I>(units: I) -> Self
    where
        I: IntoIterator<Item = UnitId>,
    {
        let host = Self::default();
        host.loaded.lock().unwrap().extend(units);
        host
    }

    pub fn load(&self, unit: UnitId) {
        self.loaded.lock().unwrap().insert(unit);
    }

    pub fn mark_incompatible(&self, unit: UnitId) {
        self.incompatible.lock().unwrap().insert(unit);
    }

    /// Units of every `redefine` call, in call order.
    pub fn calls(&self) -> Vec<Vec<UnitId>> {
        self.calls.lock().unwrap().clone()
    }

    /// Units first defined through `define`, in order.
    pub fn defined(&self) -> Vec<UnitId> {
        self.defined.lock().unwrap().clone()
    }

    /// Units actually applied, in commit order.
    pub fn committed(&self) -> Vec<UnitId> {
        self.committed.lock().unwrap().clone()
    }
}

impl RedefinitionHost for FakeHost {
    fn is_loaded(&self, unit: &UnitId) -> bool {
        self.loaded.lock().unwrap().contains(unit)
    }

    fn define(&self, definition: &UnitDefinition) -> std::result::Result<(), HostRejection> {
        let mut loaded = self.loaded.lock().unwrap();
        if !loaded.insert(definition.unit.clone()) {
            return Err(HostRejection::new(
                RejectionCause::AlreadyLoaded,
                Some(definition.unit.clone()),
                "unit is already loaded",
            ));
        }
        self.defined.lock().unwrap().push(definition.unit.clone());
        Ok(())
    }

    fn redefine(&self, definitions: &[UnitDefinition]) -> std::result::Result<(), HostRejection> {
        self.calls
            .lock()
            .unwrap()
            .push(definitions.iter().map(|d| d.unit.clone()).collect());

        let incompatible = self.incompatible.lock().unwrap();
        if let Some(bad) = definitions.iter().find(|d| incompatible.contains(&d.unit)) {
            return Err(HostRejection::incompatible(
                bad.unit.clone(),
                "method signatures changed",
            ));
        }
        let loaded = self.loaded.lock().unwrap();
        if let Some(missing) = definitions.iter().find(|d| !loaded.contains(&d.unit)) {
            return Err(HostRejection::new(
                RejectionCause::NotLoaded,
                Some(missing.unit.clone()),
                "unit is not loaded",
            ));
        }

        self.committed
            .lock()
            .unwrap()
            .extend(definitions.iter().map(|d| d.unit.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Reloaded(UnitId),
    Created(UnitId, PathBuf),
    Removed(PathBuf, bool),
    Resource(PathBuf, ChangeKind),
}

/// Listener that records every notification.
#[derive(Default)]
pub struct RecordingListener {
    name: String,
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reloaded(&self) -> Vec<UnitId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListenerEvent::Reloaded(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }
}

impl ReloadListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_reload_success(&self, unit: &UnitId) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::Reloaded(unit.clone()));
        Ok(())
    }

    fn on_unit_created(&self, unit: &UnitId, path: &Path) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::Created(unit.clone(), path.to_path_buf()));
        Ok(())
    }

    fn on_unit_removed(
        &self,
        path: &Path,
        is_directory: bool,
        _scope: Option<&LoaderScope>,
    ) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::Removed(path.to_path_buf(), is_directory));
        Ok(())
    }

    fn on_resource_changed(
        &self,
        path: &Path,
        kind: ChangeKind,
        _scope: Option<&LoaderScope>,
    ) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(ListenerEvent::Resource(path.to_path_buf(), kind));
        Ok(())
    }
}

/// Plugin with a fixed list of hook declarations that records every call.
pub struct ScriptedPlugin {
    name: String,
    scope: Option<LoaderScope>,
    hooks: Vec<HookDecl>,
    calls: Mutex<Vec<(String, HookEvent)>>,
    failing_member: Option<String>,
}

impl ScriptedPlugin {
    pub fn new(name: &str, hooks: Vec<HookDecl>) -> Self {
        Self {
            name: name.to_string(),
            scope: None,
            hooks,
            calls: Mutex::new(Vec::new()),
            failing_member: None,
        }
    }

    pub fn in_scope(mut self, scope: &str) -> Self {
        self.scope = Some(LoaderScope::new(scope));
        self
    }

    pub fn failing_on(mut self, member: &str) -> Self {
        self.failing_member = Some(member.to_string());
        self
    }

    pub fn into_arc(self) -> Arc<dyn Hookable> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<(String, HookEvent)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Hookable for ScriptedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_scope(&self) -> Option<LoaderScope> {
        self.scope.clone()
    }

    fn hooks(&self) -> Vec<HookDecl> {
        self.hooks.clone()
    }

    fn on_hook(&self, member: &str, event: &HookEvent) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((member.to_string(), event.clone()));
        if self.failing_member.as_deref() == Some(member) {
            anyhow::bail!("hook {member} failed");
        }
        Ok(())
    }
}
