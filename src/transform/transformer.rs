// src/transform/transformer.rs

use std::fmt;

use thiserror::Error;

use crate::types::UnitId;

/// Whether a unit is being defined for the first time or redefined in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Define,
    Redefine,
}

/// Set of phases a transformer participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    define: bool,
    redefine: bool,
}

impl Phases {
    pub const ALL: Phases = Phases {
        define: true,
        redefine: true,
    };
    pub const DEFINE_ONLY: Phases = Phases {
        define: true,
        redefine: false,
    };
    pub const REDEFINE_ONLY: Phases = Phases {
        define: false,
        redefine: true,
    };

    pub fn contains(&self, phase: Phase) -> bool {
        match phase {
            Phase::Define => self.define,
            Phase::Redefine => self.redefine,
        }
    }
}

impl Default for Phases {
    fn default() -> Self {
        Phases::ALL
    }
}

/// Result of one transformer on one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    /// Nothing to do at this site; the input flows on untouched.
    Unchanged,
    Rewritten(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed unit: {0}")]
    Malformed(String),
    #[error("{0}")]
    Failed(String),
}

impl TransformError {
    pub fn msg(msg: impl fmt::Display) -> Self {
        TransformError::Failed(msg.to_string())
    }
}

type DeferredFn = dyn FnOnce() -> anyhow::Result<()> + Send;

/// Side effect a transformer wants to happen once the unit it looked at has
/// actually been committed to the live process.
pub struct DeferredHook {
    label: String,
    run: Box<DeferredFn>,
}

impl DeferredHook {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fire(self) -> anyhow::Result<()> {
        (self.run)()
    }
}

impl fmt::Debug for DeferredHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHook")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// What a transformer gets to see besides the bytes.
#[derive(Debug)]
pub struct TransformSite<'a> {
    owner: &'a UnitId,
    phase: Phase,
    position: usize,
    deferred: Vec<DeferredHook>,
}

impl<'a> TransformSite<'a> {
    pub fn new(owner: &'a UnitId, phase: Phase) -> Self {
        Self {
            owner,
            phase,
            position: 0,
            deferred: Vec::new(),
        }
    }

    pub fn owner(&self) -> &UnitId {
        self.owner
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Index of the running transformer among those applied to this owner.
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Queue a side effect to run after the unit is committed.
    pub fn defer(&mut self, hook: DeferredHook) {
        self.deferred.push(hook);
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<DeferredHook> {
        std::mem::take(&mut self.deferred)
    }
}

/// A deterministic rewrite of a unit's bytes.
///
/// Implementations must not have side effects on their own: anything that
/// should happen because a unit was (re)defined goes through
/// [`TransformSite::defer`].
pub trait Transformer: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn phases(&self) -> Phases {
        Phases::ALL
    }

    fn transform(
        &self,
        site: &mut TransformSite<'_>,
        bytes: &[u8],
    ) -> Result<Transformed, TransformError>;
}

/// Transformer backed by a closure.
pub struct FnTransformer<F> {
    name: String,
    phases: Phases,
    f: F,
}

impl<F> FnTransformer<F> {
    pub fn with_phases(mut self, phases: Phases) -> Self {
        self.phases = phases;
        self
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&mut TransformSite<'_>, &[u8]) -> Result<Transformed, TransformError>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn phases(&self) -> Phases {
        self.phases
    }

    fn transform(
        &self,
        site: &mut TransformSite<'_>,
        bytes: &[u8],
    ) -> Result<Transformed, TransformError> {
        (self.f)(site, bytes)
    }
}

pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnTransformer<F>
where
    F: Fn(&mut TransformSite<'_>, &[u8]) -> Result<Transformed, TransformError>
        + Send
        + Sync
        + 'static,
{
    FnTransformer {
        name: name.into(),
        phases: Phases::ALL,
        f,
    }
}
