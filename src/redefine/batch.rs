// src/redefine/batch.rs

use std::fmt;

use crate::errors::{HotswapError, Result};
use crate::redefine::host::{HostRejection, UnitDefinition};
use crate::transform::DeferredHook;
use crate::types::UnitId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Collecting,
    Flushing,
    Committed,
    PartiallyFailed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Collecting => "COLLECTING",
            BatchState::Flushing => "FLUSHING",
            BatchState::Committed => "COMMITTED",
            BatchState::PartiallyFailed => "PARTIALLY_FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub(crate) struct BatchEntry {
    pub(crate) definition: UnitDefinition,
    pub(crate) hooks: Vec<DeferredHook>,
}

/// Definitions collected for one atomic flush, in insertion order.
#[derive(Debug)]
pub struct RedefinitionBatch {
    state: BatchState,
    entries: Vec<BatchEntry>,
}

impl Default for RedefinitionBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RedefinitionBatch {
    pub fn new() -> Self {
        Self {
            state: BatchState::Collecting,
            entries: Vec::new(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: BatchState) {
        self.state = state;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, unit: &UnitId) -> bool {
        self.entries.iter().any(|e| e.definition.unit == *unit)
    }

    pub fn units(&self) -> Vec<UnitId> {
        self.entries.iter().map(|e| e.definition.unit.clone()).collect()
    }

    pub fn add(&mut self, unit: UnitId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.add_with_hooks(unit, bytes, Vec::new())
    }

    /// Add `unit`, with side effects to run once it is committed.
    ///
    /// Adding a unit already in the batch replaces its bytes and hooks but
    /// keeps its original position.
    pub fn add_with_hooks(
        &mut self,
        unit: UnitId,
        bytes: impl Into<Vec<u8>>,
        hooks: Vec<DeferredHook>,
    ) -> Result<()> {
        if self.state != BatchState::Collecting {
            return Err(HotswapError::BatchClosed(self.state.to_string()));
        }
        let definition = UnitDefinition::new(unit, bytes);
        match self
            .entries
            .iter_mut()
            .find(|e| e.definition.unit == definition.unit)
        {
            Some(entry) => {
                entry.definition = definition;
                entry.hooks = hooks;
            }
            None => self.entries.push(BatchEntry { definition, hooks }),
        }
        Ok(())
    }

    pub(crate) fn take_entries(&mut self) -> Vec<BatchEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Per-unit result of a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Committed,
    Failed(HostRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: UnitId,
    pub status: UnitStatus,
}

/// Outcome of one flush, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub state: BatchState,
    pub outcomes: Vec<UnitOutcome>,
}

impl FlushReport {
    pub(crate) fn unchanged(state: BatchState) -> Self {
        Self {
            state,
            outcomes: Vec::new(),
        }
    }

    pub fn committed(&self) -> Vec<&UnitId> {
        self.outcomes
            .iter()
            .filter(|o| o.status == UnitStatus::Committed)
            .map(|o| &o.unit)
            .collect()
    }

    pub fn failed(&self) -> Vec<(&UnitId, &HostRejection)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                UnitStatus::Failed(rejection) => Some((&o.unit, rejection)),
                UnitStatus::Committed => None,
            })
            .collect()
    }

    pub fn status_of(&self, unit: &UnitId) -> Option<&UnitStatus> {
        self.outcomes.iter().find(|o| o.unit == *unit).map(|o| &o.status)
    }

    /// Failures as crate errors, each attributed to its unit.
    pub fn errors(&self) -> Vec<HotswapError> {
        self.failed()
            .into_iter()
            .map(|(unit, rejection)| rejection.clone().into_error(unit))
            .collect()
    }
}
