// src/command/scheduler.rs

//! Debouncing, merging command scheduler.
//!
//! Semantics:
//! - `schedule(cmd, delay)` with no pending command for `cmd.key()` starts a
//!   timer of `delay`.
//! - If a command with the same key is already pending, `cmd` is merged into
//!   it and the timer is **not** reset: the first deadline holds, which
//!   bounds latency under a sustained burst.
//! - When the timer expires the command is dequeued and handed to the
//!   executor on its own task, so a slow command never delays the timers of
//!   unrelated keys.
//! - `cancel(key)` removes a still-pending command. Once dequeued, a command
//!   runs to completion.
//!
//! The only shared lock is the map of pending commands, held for map
//! bookkeeping only (never across an `.await` or an execution).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::command::backend::CommandExecutor;
use crate::command::model::{Command, MergeKey};

/// What `schedule` did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new pending command was created; it fires at `deadline`.
    Queued { deadline: Instant },
    /// The command was merged into a pending one that fires at `deadline`.
    Merged { deadline: Instant },
    /// The scheduler was shut down.
    Rejected,
}

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Maximum number of commands executing at once.
    pub max_workers: usize,
    /// Re-schedules allowed for a command failing with a transient error.
    pub transient_retries: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            transient_retries: 5,
        }
    }
}

struct Pending {
    command: Command,
    generation: u64,
    deadline: Instant,
    delay: Duration,
    timer: JoinHandle<()>,
}

struct Inner {
    executor: Arc<dyn CommandExecutor>,
    pending: Mutex<HashMap<MergeKey, Pending>>,
    workers: Arc<Semaphore>,
    handle: Handle,
    options: SchedulerOptions,
    next_generation: AtomicU64,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

/// Cheap-to-clone handle to a shared scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_len())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(executor: Arc<dyn CommandExecutor>, options: SchedulerOptions) -> Self {
        Self::with_handle(executor, options, Handle::current())
    }

    pub fn with_handle(
        executor: Arc<dyn CommandExecutor>,
        options: SchedulerOptions,
        handle: Handle,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(options.max_workers.max(1)));
        Self {
            inner: Arc::new(Inner {
                executor,
                pending: Mutex::new(HashMap::new()),
                workers,
                handle,
                options,
                next_generation: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Schedule `command` to run after `delay`, merging it into a pending
    /// command with the same key if there is one. Never blocks.
    pub fn schedule(&self, command: Command, delay: Duration) -> ScheduleOutcome {
        Inner::schedule(&self.inner, command, delay)
    }

    /// Remove a pending command without executing it.
    ///
    /// Returns false if nothing was pending for `key` (including the case
    /// where the command was already dequeued for execution).
    pub fn cancel(&self, key: &MergeKey) -> bool {
        let removed = self.inner.lock_pending().remove(key);
        match removed {
            Some(entry) => {
                entry.timer.abort();
                info!(key = %key, actions = entry.command.len(), "cancelled pending command");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &MergeKey) -> bool {
        self.inner.lock_pending().contains_key(key)
    }

    /// Deadline of the pending command for `key`.
    pub fn deadline_of(&self, key: &MergeKey) -> Option<Instant> {
        self.inner.lock_pending().get(key).map(|p| p.deadline)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_pending().len()
    }

    pub fn pending_keys(&self) -> Vec<MergeKey> {
        self.inner.lock_pending().keys().cloned().collect()
    }

    /// Commands dequeued and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// True when nothing is pending and nothing is executing.
    pub fn is_idle(&self) -> bool {
        self.pending_len() == 0 && self.in_flight() == 0
    }

    /// Reject further commands and drop everything still pending.
    ///
    /// In-flight commands are left to finish. Returns the number of dropped
    /// pending commands.
    pub fn shutdown(&self) -> usize {
        self.inner.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Pending> = self
            .inner
            .lock_pending()
            .drain()
            .map(|(_, p)| p)
            .collect();
        for entry in drained.iter() {
            entry.timer.abort();
        }
        info!(dropped = drained.len(), "scheduler shut down");
        drained.len()
    }
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<MergeKey, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn schedule(this: &Arc<Inner>, command: Command, delay: Duration) -> ScheduleOutcome {
        if this.closed.load(Ordering::SeqCst) {
            warn!(key = %command.key(), "scheduler is shut down; dropping command");
            return ScheduleOutcome::Rejected;
        }

        let key = command.key().clone();
        let mut pending = this.lock_pending();

        if let Some(entry) = pending.get_mut(&key) {
            entry.command.absorb(command);
            debug!(
                key = %key,
                actions = entry.command.len(),
                "merged command into pending instance"
            );
            return ScheduleOutcome::Merged {
                deadline: entry.deadline,
            };
        }

        let generation = this.next_generation.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + delay;
        let timer = this.handle.spawn(fire(
            Arc::downgrade(this),
            key.clone(),
            generation,
            deadline,
        ));

        debug!(key = %key, delay_ms = delay.as_millis() as u64, "queued command");
        pending.insert(
            key,
            Pending {
                command,
                generation,
                deadline,
                delay,
                timer,
            },
        );

        ScheduleOutcome::Queued { deadline }
    }

    /// Run a dequeued command on its own task. The caller has already
    /// counted it in `in_flight`.
    fn dispatch(this: Arc<Inner>, command: Command, delay: Duration) {
        let handle = this.handle.clone();

        handle.spawn(async move {
            let permit = match Arc::clone(&this.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    this.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let key = command.key().clone();
            let retry = command.clone();
            debug!(key = %key, actions = command.len(), "executing command");

            let result = this.executor.execute(command).await;
            drop(permit);

            if let Err(err) = result {
                if err.is_transient() && retry.attempt() < this.options.transient_retries {
                    warn!(
                        key = %key,
                        attempt = retry.attempt() + 1,
                        error = %err,
                        "transient failure; re-scheduling command"
                    );
                    Inner::schedule(&this, retry.next_attempt(), delay);
                } else {
                    error!(key = %key, error = %err, "command failed");
                }
            }

            this.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

async fn fire(inner: Weak<Inner>, key: MergeKey, generation: u64, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };

    let entry = {
        let mut pending = inner.lock_pending();
        match pending.get(&key) {
            Some(p) if p.generation == generation => {
                // Counted before the entry leaves the map so `is_idle` never
                // observes a gap between "pending" and "executing".
                inner.in_flight.fetch_add(1, Ordering::SeqCst);
                pending.remove(&key)
            }
            _ => None,
        }
    };

    if let Some(entry) = entry {
        Inner::dispatch(inner, entry.command, entry.delay);
    }
}
