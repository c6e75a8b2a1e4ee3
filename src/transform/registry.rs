// src/transform/registry.rs

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;
use tracing::{debug, error, info};

use crate::errors::{HotswapError, Result};
use crate::transform::transformer::{DeferredHook, Phase, TransformSite, Transformed, Transformer};
use crate::types::{LoaderScope, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One installed transformer: the loader scope it is restricted to, the
/// name pattern it matches and the transformer itself.
pub struct Registration {
    id: RegistrationId,
    scope: Option<LoaderScope>,
    pattern: Regex,
    transformer: Arc<dyn Transformer>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("pattern", &self.pattern.as_str())
            .field("transformer", &self.transformer.name())
            .finish()
    }
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn scope(&self) -> Option<&LoaderScope> {
        self.scope.as_ref()
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn transformer(&self) -> &Arc<dyn Transformer> {
        &self.transformer
    }

    /// Global registrations apply to every scope; scoped ones only to
    /// owners of the same scope.
    fn applies_to(&self, owner: &UnitId, phase: Phase) -> bool {
        let scope_ok = match &self.scope {
            None => true,
            Some(scope) => owner.scope.as_ref() == Some(scope),
        };
        scope_ok && self.transformer.phases().contains(phase) && self.pattern.is_match(&owner.name)
    }
}

/// A chain member that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFault {
    pub unit: UnitId,
    pub transformer: String,
    pub position: usize,
    pub cause: String,
}

impl From<TransformFault> for HotswapError {
    fn from(fault: TransformFault) -> Self {
        HotswapError::Transform {
            unit: fault.unit,
            transformer: fault.transformer,
            cause: fault.cause,
        }
    }
}

/// Result of running every matching transformer over one unit.
///
/// On a fault, `bytes` holds the original input and `deferred` is empty:
/// a chain either applies completely or not at all.
#[derive(Debug)]
pub struct TransformOutcome {
    pub bytes: Vec<u8>,
    pub rewritten: bool,
    pub applied: usize,
    pub deferred: Vec<DeferredHook>,
    pub fault: Option<TransformFault>,
}

impl TransformOutcome {
    pub fn is_ok(&self) -> bool {
        self.fault.is_none()
    }

    pub fn into_result(self) -> Result<Vec<u8>> {
        match self.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(self.bytes),
        }
    }
}

/// Registry of transformers keyed by (loader scope, name pattern).
///
/// Registrations are append-only snapshots behind an `ArcSwap`: `apply`
/// works on an immutable snapshot and never waits for `register`, and a
/// reader never sees a half-built entry list.
pub struct TransformerRegistry {
    entries: ArcSwap<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("registrations", &self.len())
            .finish()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Install `transformer` for units whose name matches `pattern` in
    /// `scope` (`None` = every scope).
    ///
    /// `pattern` is a regular expression searched in the unit name; anchor it
    /// with `^...$` for a full match. An invalid pattern is rejected here,
    /// not at reload time.
    pub fn register(
        &self,
        scope: Option<LoaderScope>,
        pattern: &str,
        transformer: Arc<dyn Transformer>,
    ) -> Result<RegistrationId> {
        let regex = Regex::new(pattern).map_err(|source| HotswapError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let registration = Arc::new(Registration {
            id,
            scope,
            pattern: regex,
            transformer,
        });

        info!(
            id = %id,
            scope = ?registration.scope,
            pattern = %pattern,
            transformer = %registration.transformer.name(),
            "registered transformer"
        );

        self.entries.rcu(|current| {
            let mut next: Vec<Arc<Registration>> = current.as_ref().clone();
            next.push(Arc::clone(&registration));
            next
        });

        Ok(id)
    }

    /// Remove one registration. Returns false if it was not installed.
    pub fn remove(&self, id: RegistrationId) -> bool {
        let before = self.entries.load().len();
        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = self.entries.load().len() < before;
        if removed {
            debug!(id = %id, "removed transformer registration");
        }
        removed
    }

    /// Remove every registration restricted to `scope`, e.g. when its loader
    /// goes away. Global registrations are untouched.
    pub fn remove_scope(&self, scope: &LoaderScope) -> usize {
        let before = self.entries.load().len();
        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|r| r.scope.as_ref() != Some(scope))
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = before.saturating_sub(self.entries.load().len());
        info!(scope = %scope, removed, "removed scoped transformer registrations");
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registration, in registration order.
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        self.entries.load_full().as_ref().clone()
    }

    /// The chain installed for exactly (`scope`, `pattern`), in order.
    pub fn chain(&self, scope: Option<&LoaderScope>, pattern: &str) -> Vec<Arc<dyn Transformer>> {
        self.entries
            .load()
            .iter()
            .filter(|r| r.scope.as_ref() == scope && r.pattern.as_str() == pattern)
            .map(|r| Arc::clone(&r.transformer))
            .collect()
    }

    /// Registrations that would run for `owner` in `phase`.
    pub fn matching(&self, owner: &UnitId, phase: Phase) -> Vec<Arc<Registration>> {
        self.entries
            .load()
            .iter()
            .filter(|r| r.applies_to(owner, phase))
            .cloned()
            .collect()
    }

    /// Run every matching transformer over `bytes`, in registration order,
    /// feeding each one the previous one's output.
    ///
    /// A transformer that errors or panics aborts the chain: the outcome
    /// carries the original bytes, no deferred hooks and the fault.
    pub fn apply(&self, owner: &UnitId, phase: Phase, bytes: &[u8]) -> TransformOutcome {
        let entries = self.entries.load();
        let mut site = TransformSite::new(owner, phase);
        let mut current: Option<Vec<u8>> = None;
        let mut applied = 0usize;

        for registration in entries.iter().filter(|r| r.applies_to(owner, phase)) {
            site.set_position(applied);
            let input = current.as_deref().unwrap_or(bytes);
            let transformer = &registration.transformer;

            let result = catch_unwind(AssertUnwindSafe(|| transformer.transform(&mut site, input)));

            let cause = match result {
                Ok(Ok(Transformed::Unchanged)) => None,
                Ok(Ok(Transformed::Rewritten(out))) => {
                    current = Some(out);
                    None
                }
                Ok(Err(err)) => Some(err.to_string()),
                Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
            };

            if let Some(cause) = cause {
                error!(
                    unit = %owner,
                    transformer = %transformer.name(),
                    position = applied,
                    cause = %cause,
                    "transformer failed; keeping original bytes"
                );
                return TransformOutcome {
                    bytes: bytes.to_vec(),
                    rewritten: false,
                    applied,
                    deferred: Vec::new(),
                    fault: Some(TransformFault {
                        unit: owner.clone(),
                        transformer: transformer.name().to_string(),
                        position: applied,
                        cause,
                    }),
                };
            }

            applied += 1;
        }

        if applied > 0 {
            debug!(unit = %owner, ?phase, applied, "applied transformer chain");
        }

        let rewritten = current.is_some();
        TransformOutcome {
            bytes: current.unwrap_or_else(|| bytes.to_vec()),
            rewritten,
            applied,
            deferred: site.take_deferred(),
            fault: None,
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
