// src/engine/runtime.rs

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{Command, ScheduleOutcome, Scheduler, SchedulerOptions, UnitSource};
use crate::config::AgentSection;
use crate::engine::pipeline::{ReloadPipeline, UnitDefiner};
use crate::engine::router::EventRouter;
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::listener::{ListenerId, NotifierHub, ReloadListener};
use crate::plugin::{HookBinding, Hookable, PluginManager};
use crate::redefine::{RedefinitionExecutor, RedefinitionHost};
use crate::transform::{RegistrationId, Transformer, TransformerRegistry};
use crate::types::{LoaderScope, UnitId, UnloadedPolicy};
use crate::watch::{spawn_event_source, DigestCache, EventSource, RootedChange, WatchRoot};

/// Runtime knobs of an [`Agent`], usually taken from `[agent]`.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub debounce: Duration,
    pub create_delay: Duration,
    pub max_workers: usize,
    pub transient_retries: u32,
    pub skip_unchanged: bool,
    pub unloaded_policy: UnloadedPolicy,
    pub unit_extension: String,
}

impl Default for AgentOptions {
    fn default() -> Self {
        AgentOptions::from(&AgentSection::default())
    }
}

impl From<&AgentSection> for AgentOptions {
    fn from(section: &AgentSection) -> Self {
        Self {
            debounce: section.debounce(),
            create_delay: section.create_delay(),
            max_workers: section.max_workers,
            transient_retries: section.transient_retries,
            skip_unchanged: section.skip_unchanged,
            unloaded_policy: section.unloaded_policy,
            unit_extension: section.unit_extension.clone(),
        }
    }
}

pub struct AgentBuilder {
    host: Arc<dyn RedefinitionHost>,
    fs: Arc<dyn FileSystem>,
    options: AgentOptions,
}

impl AgentBuilder {
    pub fn options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Build the agent. Must be called inside a Tokio runtime.
    pub fn build(self) -> Agent {
        let registry = Arc::new(TransformerRegistry::new());
        let notifiers = Arc::new(NotifierHub::new());
        let plugins = PluginManager::new(Arc::clone(&registry), Some(Arc::clone(&notifiers)));
        let executor = Arc::new(RedefinitionExecutor::new(
            Arc::clone(&self.host),
            Arc::clone(&notifiers),
        ));
        let digests = Arc::new(DigestCache::new());

        let pipeline = ReloadPipeline::new(
            self.fs,
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&notifiers),
            Arc::clone(&digests),
            self.options.skip_unchanged,
        );
        let definer = pipeline.definer().clone();
        let scheduler = Scheduler::new(
            Arc::new(pipeline),
            SchedulerOptions {
                max_workers: self.options.max_workers,
                transient_retries: self.options.transient_retries,
            },
        );

        Agent {
            router: Arc::new(EventRouter::new(&self.options)),
            options: self.options,
            host: self.host,
            registry,
            notifiers,
            plugins,
            executor,
            digests,
            definer,
            scheduler,
            watching: Mutex::new(None),
        }
    }
}

struct Watching {
    _source: EventSource,
    router_task: JoinHandle<()>,
}

/// Process-scoped reload service.
///
/// Owns the transformer registry, plugin hooks, listeners and scheduler.
/// Created at startup and torn down with [`Agent::shutdown`]; several
/// independent agents can live in one process.
pub struct Agent {
    options: AgentOptions,
    host: Arc<dyn RedefinitionHost>,
    registry: Arc<TransformerRegistry>,
    notifiers: Arc<NotifierHub>,
    plugins: PluginManager,
    executor: Arc<RedefinitionExecutor>,
    digests: Arc<DigestCache>,
    definer: UnitDefiner,
    scheduler: Scheduler,
    router: Arc<EventRouter>,
    watching: Mutex<Option<Watching>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("plugins", &self.plugins)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder(host: Arc<dyn RedefinitionHost>) -> AgentBuilder {
        AgentBuilder {
            host,
            fs: Arc::new(RealFileSystem),
            options: AgentOptions::default(),
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn host(&self) -> &Arc<dyn RedefinitionHost> {
        &self.host
    }

    pub fn registry(&self) -> &Arc<TransformerRegistry> {
        &self.registry
    }

    pub fn notifiers(&self) -> &Arc<NotifierHub> {
        &self.notifiers
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn executor(&self) -> &Arc<RedefinitionExecutor> {
        &self.executor
    }

    pub fn digests(&self) -> &Arc<DigestCache> {
        &self.digests
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn register_hook(&self, plugin: Arc<dyn Hookable>) -> Result<Vec<HookBinding>> {
        self.plugins.bind_hooks(plugin)
    }

    pub fn unregister_hook(&self, plugin: &Arc<dyn Hookable>) -> usize {
        self.plugins.unbind(plugin)
    }

    /// Forget everything bound to a loader scope that went away.
    pub fn drop_scope(&self, scope: &LoaderScope) {
        let hooks = self.plugins.unbind_scope(scope);
        let transformers = self.registry.remove_scope(scope);
        info!(scope = %scope, hooks, transformers, "dropped loader scope");
    }

    pub fn register_transformer(
        &self,
        scope: Option<LoaderScope>,
        pattern: &str,
        transformer: Arc<dyn Transformer>,
    ) -> Result<RegistrationId> {
        self.registry.register(scope, pattern, transformer)
    }

    pub fn add_listener(&self, listener: Arc<dyn ReloadListener>) -> ListenerId {
        self.notifiers.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifiers.remove(id)
    }

    /// Feed a command straight into the scheduler, bypassing the watcher.
    pub fn inject(&self, command: Command, delay: Duration) -> ScheduleOutcome {
        debug!(key = %command.key(), delay_ms = delay.as_millis() as u64, "injected command");
        self.scheduler.schedule(command, delay)
    }

    /// Redefine `unit` with `bytes` after the debounce window.
    pub fn reload(&self, unit: UnitId, bytes: impl Into<Vec<u8>>) -> ScheduleOutcome {
        let bytes: Vec<u8> = bytes.into();
        let command = Command::redefine(unit, UnitSource::Bytes(bytes.into()));
        self.inject(command, self.options.debounce)
    }

    /// Define a unit the host has not loaded yet, right now, through the
    /// `Define` phase of the registry. Blocks on the host like a flush.
    pub fn define(&self, unit: &UnitId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.definer.define(unit, bytes.into())
    }

    /// Route one change and schedule the resulting command, if any.
    pub fn handle_change(&self, change: &RootedChange) -> Option<ScheduleOutcome> {
        route_and_schedule(&self.router, &self.scheduler, self.host.as_ref(), change)
    }

    /// Start watching `roots`. Replaces any previous watch.
    ///
    /// Fails fast if a root is missing or unreadable.
    pub fn watch(&self, roots: Vec<WatchRoot>) -> Result<()> {
        let (tx, rx) = mpsc::channel::<RootedChange>(256);
        let source = spawn_event_source(roots, tx)?;

        let router_task = tokio::spawn(router_loop(
            rx,
            Arc::clone(&self.router),
            self.scheduler.clone(),
            Arc::clone(&self.host),
        ));

        let previous = self
            .watching
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Watching {
                _source: source,
                router_task,
            });
        if let Some(previous) = previous {
            previous.router_task.abort();
        }
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watching
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|w| !w.router_task.is_finished())
    }

    /// Stop watching and drop every pending command. In-flight commands are
    /// left to finish.
    pub fn shutdown(&self) {
        if let Some(watching) = self
            .watching
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            watching.router_task.abort();
        }
        let dropped = self.scheduler.shutdown();
        info!(dropped, "agent shut down");
    }
}

fn route_and_schedule(
    router: &EventRouter,
    scheduler: &Scheduler,
    host: &dyn RedefinitionHost,
    change: &RootedChange,
) -> Option<ScheduleOutcome> {
    let routed = router.route(&change.root, &change.event, host)?;
    Some(scheduler.schedule(routed.command, routed.delay))
}

async fn router_loop(
    mut rx: mpsc::Receiver<RootedChange>,
    router: Arc<EventRouter>,
    scheduler: Scheduler,
    host: Arc<dyn RedefinitionHost>,
) {
    while let Some(change) = rx.recv().await {
        debug!(change = %change.event, "routing change");
        route_and_schedule(&router, &scheduler, host.as_ref(), &change);
    }
    debug!("event source closed; router loop finished");
}
