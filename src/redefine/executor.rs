// src/redefine/executor.rs

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::listener::NotifierHub;
use crate::redefine::batch::{
    BatchEntry, BatchState, FlushReport, RedefinitionBatch, UnitOutcome, UnitStatus,
};
use crate::redefine::host::{HostRejection, RedefinitionHost, UnitDefinition};
use crate::transform::registry::panic_message;
use crate::transform::DeferredHook;
use crate::types::UnitId;

/// Commits batches to the host.
///
/// Flushes are serialized process-wide by `flush_lock`: the host facility is
/// not reentrant, and notifier calls of two flushes must never interleave.
pub struct RedefinitionExecutor {
    host: Arc<dyn RedefinitionHost>,
    notifiers: Arc<NotifierHub>,
    flush_lock: Mutex<()>,
}

impl fmt::Debug for RedefinitionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedefinitionExecutor")
            .field("notifiers", &self.notifiers)
            .finish_non_exhaustive()
    }
}

impl RedefinitionExecutor {
    pub fn new(host: Arc<dyn RedefinitionHost>, notifiers: Arc<NotifierHub>) -> Self {
        Self {
            host,
            notifiers,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &Arc<dyn RedefinitionHost> {
        &self.host
    }

    /// Apply `batch` to the host. Blocks until the host call returns.
    ///
    /// - Empty batch: no-op, state stays `Collecting`.
    /// - Whole batch accepted: `Committed`.
    /// - Whole batch rejected: every unit is retried alone; units that still
    ///   fail are reported and not retried again. `PartiallyFailed` if any
    ///   unit failed.
    ///
    /// Deferred hooks and notifiers run for committed units only, in commit
    /// order, while the flush lock is held.
    pub fn flush(&self, batch: &mut RedefinitionBatch) -> FlushReport {
        if batch.state() != BatchState::Collecting {
            warn!(state = %batch.state(), "flush of a batch that is no longer collecting");
            return FlushReport::unchanged(batch.state());
        }
        if batch.is_empty() {
            debug!("flush of an empty batch; nothing to do");
            return FlushReport::unchanged(batch.state());
        }

        let _guard = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());
        batch.set_state(BatchState::Flushing);
        let entries = batch.take_entries();

        let definitions: Vec<_> = entries.iter().map(|e| e.definition.clone()).collect();
        debug!(units = definitions.len(), "flushing redefinition batch");

        let statuses: Vec<UnitStatus> = match self.host.redefine(&definitions) {
            Ok(()) => vec![UnitStatus::Committed; entries.len()],
            Err(rejection) if entries.len() == 1 => vec![UnitStatus::Failed(rejection)],
            Err(rejection) => {
                warn!(
                    units = entries.len(),
                    cause = %rejection,
                    "host rejected batch; retrying units one by one"
                );
                definitions
                    .iter()
                    .map(|def| match self.host.redefine(slice::from_ref(def)) {
                        Ok(()) => UnitStatus::Committed,
                        Err(rejection) => UnitStatus::Failed(rejection),
                    })
                    .collect()
            }
        };

        let mut outcomes = Vec::with_capacity(entries.len());
        let mut any_failed = false;

        for (entry, status) in entries.into_iter().zip(statuses) {
            let unit = entry.definition.unit.clone();
            match &status {
                UnitStatus::Committed => {
                    info!(unit = %unit, "unit redefined");
                    self.after_commit(entry);
                }
                UnitStatus::Failed(rejection) => {
                    any_failed = true;
                    error!(unit = %unit, cause = %rejection, "redefinition failed");
                }
            }
            outcomes.push(UnitOutcome { unit, status });
        }

        let state = if any_failed {
            BatchState::PartiallyFailed
        } else {
            BatchState::Committed
        };
        batch.set_state(state);

        FlushReport { state, outcomes }
    }

    /// First definition of one unit. Shares the flush lock with `flush`;
    /// deferred hooks fire only when the host accepts the definition.
    pub fn define(
        &self,
        definition: UnitDefinition,
        hooks: Vec<DeferredHook>,
    ) -> Result<(), HostRejection> {
        let _guard = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.host.define(&definition)?;
        info!(unit = %definition.unit, "unit defined");
        fire_hooks(&definition.unit, hooks);
        Ok(())
    }

    fn after_commit(&self, entry: BatchEntry) {
        let unit = entry.definition.unit;
        fire_hooks(&unit, entry.hooks);
        self.notifiers.notify_reload_success(&unit);
    }
}

fn fire_hooks(unit: &UnitId, hooks: Vec<DeferredHook>) {
    for hook in hooks {
        let label = hook.label().to_string();
        match catch_unwind(AssertUnwindSafe(|| hook.fire())) {
            Ok(Ok(())) => debug!(unit = %unit, hook = %label, "fired deferred hook"),
            Ok(Err(err)) => warn!(unit = %unit, hook = %label, error = %err, "deferred hook failed"),
            Err(panic) => warn!(
                unit = %unit,
                hook = %label,
                panic = %panic_message(panic.as_ref()),
                "deferred hook panicked"
            ),
        }
    }
}
