// src/engine/pipeline.rs

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::command::{Action, Command, CommandExecutor, UnitSource};
use crate::errors::{HotswapError, Result};
use crate::fs::FileSystem;
use crate::listener::NotifierHub;
use crate::redefine::{FlushReport, RedefinitionBatch, RedefinitionExecutor, UnitDefinition};
use crate::transform::{Phase, TransformerRegistry};
use crate::types::UnitId;
use crate::watch::DigestCache;

/// First definitions of units: the `Define` phase of the registry, then the
/// host. Deferred hooks of the chain fire once the host accepts the unit.
#[derive(Clone)]
pub struct UnitDefiner {
    registry: Arc<TransformerRegistry>,
    executor: Arc<RedefinitionExecutor>,
    digests: Arc<DigestCache>,
}

impl fmt::Debug for UnitDefiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDefiner").finish_non_exhaustive()
    }
}

impl UnitDefiner {
    pub fn new(
        registry: Arc<TransformerRegistry>,
        executor: Arc<RedefinitionExecutor>,
        digests: Arc<DigestCache>,
    ) -> Self {
        Self {
            registry,
            executor,
            digests,
        }
    }

    /// Blocks on the host like a flush does.
    pub fn define(&self, unit: &UnitId, bytes: Vec<u8>) -> Result<()> {
        let outcome = self.registry.apply(unit, Phase::Define, &bytes);
        if let Some(fault) = &outcome.fault {
            warn!(
                unit = %unit,
                transformer = %fault.transformer,
                "defining with untransformed bytes"
            );
        }
        self.executor
            .define(
                UnitDefinition::new(unit.clone(), outcome.bytes),
                outcome.deferred,
            )
            .map_err(|rejection| rejection.into_error(unit))?;
        self.digests.record(unit, &bytes);
        Ok(())
    }
}

/// Executes fired commands: read, transform, (re)define, notify.
///
/// All redefinitions of a command go into one batch and are flushed
/// together. Units the host has not loaded yet are defined one by one. The
/// remaining actions are delivered to listeners afterwards in arrival order.
pub struct ReloadPipeline {
    fs: Arc<dyn FileSystem>,
    registry: Arc<TransformerRegistry>,
    executor: Arc<RedefinitionExecutor>,
    notifiers: Arc<NotifierHub>,
    digests: Arc<DigestCache>,
    definer: UnitDefiner,
    skip_unchanged: bool,
}

impl fmt::Debug for ReloadPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadPipeline")
            .field("fs", &self.fs)
            .field("skip_unchanged", &self.skip_unchanged)
            .finish_non_exhaustive()
    }
}

impl ReloadPipeline {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        registry: Arc<TransformerRegistry>,
        executor: Arc<RedefinitionExecutor>,
        notifiers: Arc<NotifierHub>,
        digests: Arc<DigestCache>,
        skip_unchanged: bool,
    ) -> Self {
        let definer = UnitDefiner::new(
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&digests),
        );
        Self {
            fs,
            registry,
            executor,
            notifiers,
            digests,
            definer,
            skip_unchanged,
        }
    }

    pub fn definer(&self) -> &UnitDefiner {
        &self.definer
    }

    /// Run one command to completion. Returns the flush report when the
    /// command carried any redefinition.
    pub async fn run(&self, command: Command) -> Result<Option<FlushReport>> {
        let key = command.key().clone();
        let actions = command.into_actions();
        let latest = last_file_action(&actions);

        let mut batch = RedefinitionBatch::new();
        let mut originals: Vec<(UnitId, Vec<u8>)> = Vec::new();
        let mut definitions: Vec<(UnitId, Vec<u8>)> = Vec::new();
        let mut rest: Vec<Action> = Vec::new();

        for (index, action) in actions.into_iter().enumerate() {
            match action {
                Action::Redefine { unit, source } => {
                    let bytes = match source {
                        UnitSource::File(path) => {
                            // Only the last file action of a unit is read: its
                            // path carries the last write of the burst.
                            if latest.get(&unit) != Some(&index) {
                                continue;
                            }
                            match self.read_unit(&path)? {
                                Some(bytes) => bytes,
                                None => continue,
                            }
                        }
                        UnitSource::Bytes(bytes) => bytes.to_vec(),
                    };
                    self.stage(&mut batch, &mut originals, unit, bytes)?;
                }
                Action::UnitCreated { unit, path } => {
                    if latest.get(&unit) != Some(&index) {
                        continue;
                    }
                    let Some(bytes) = self.read_unit(&path)? else {
                        continue;
                    };
                    if self.executor.host().is_loaded(&unit) {
                        self.stage(&mut batch, &mut originals, unit, bytes)?;
                    } else {
                        definitions.push((unit.clone(), bytes));
                        rest.push(Action::UnitCreated { unit, path });
                    }
                }
                other => rest.push(other),
            }
        }

        let report = if batch.is_empty() {
            None
        } else {
            let executor = Arc::clone(&self.executor);
            let report = tokio::task::spawn_blocking(move || executor.flush(&mut batch))
                .await
                .map_err(|e| HotswapError::Other(anyhow::anyhow!("flush task failed: {e}")))?;

            for unit in report.committed() {
                if let Some((_, bytes)) = originals.iter().find(|(u, _)| u == unit) {
                    self.digests.record(unit, bytes);
                }
            }
            info!(
                key = %key,
                committed = report.committed().len(),
                failed = report.failed().len(),
                state = %report.state,
                "reload finished"
            );
            Some(report)
        };

        for (unit, bytes) in definitions {
            let definer = self.definer.clone();
            let defined = tokio::task::spawn_blocking(move || {
                definer.define(&unit, bytes).map_err(|err| (unit, err))
            })
            .await
            .map_err(|e| HotswapError::Other(anyhow::anyhow!("define task failed: {e}")))?;
            if let Err((unit, err)) = defined {
                warn!(unit = %unit, error = %err, "definition of a new unit failed");
            }
        }

        for action in rest {
            self.deliver(action);
        }

        Ok(report)
    }

    fn stage(
        &self,
        batch: &mut RedefinitionBatch,
        originals: &mut Vec<(UnitId, Vec<u8>)>,
        unit: UnitId,
        bytes: Vec<u8>,
    ) -> Result<()> {
        if self.skip_unchanged && self.digests.is_unchanged(&unit, &bytes) {
            debug!(unit = %unit, "bytes unchanged since last commit; skipping");
            return Ok(());
        }

        let outcome = self.registry.apply(&unit, Phase::Redefine, &bytes);
        if let Some(fault) = &outcome.fault {
            warn!(
                unit = %unit,
                transformer = %fault.transformer,
                "redefining with untransformed bytes"
            );
        }
        batch.add_with_hooks(unit.clone(), outcome.bytes, outcome.deferred)?;
        originals.retain(|(u, _)| *u != unit);
        originals.push((unit, bytes));
        Ok(())
    }

    fn read_unit(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match self.fs.read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?path, "unit file vanished before it could be read");
                Ok(None)
            }
            Err(source) => Err(HotswapError::Transient {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn deliver(&self, action: Action) {
        match action {
            Action::Redefine { .. } => {}
            Action::UnitCreated { unit, path } => {
                self.notifiers.notify_unit_created(&unit, &path);
            }
            Action::UnitRemoved {
                path,
                is_directory,
                scope,
            } => {
                self.notifiers
                    .notify_unit_removed(&path, is_directory, scope.as_ref());
            }
            Action::ResourceChanged { path, kind, scope } => {
                self.notifiers
                    .notify_resource_changed(&path, kind, scope.as_ref());
            }
            Action::Task(task) => match task.run() {
                Ok(()) => debug!(task = %task.name(), "task finished"),
                Err(err) => warn!(task = %task.name(), error = %err, "task failed"),
            },
        }
    }
}

/// Index of the last file-backed action per unit.
fn last_file_action(actions: &[Action]) -> HashMap<UnitId, usize> {
    let mut latest = HashMap::new();
    for (index, action) in actions.iter().enumerate() {
        match action {
            Action::Redefine {
                unit,
                source: UnitSource::File(_),
            }
            | Action::UnitCreated { unit, .. } => {
                latest.insert(unit.clone(), index);
            }
            _ => {}
        }
    }
    latest
}

impl CommandExecutor for ReloadPipeline {
    fn execute(&self, command: Command) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.run(command).await?;
            Ok(())
        })
    }
}
