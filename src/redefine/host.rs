// src/redefine/host.rs

use std::fmt;

use crate::errors::HotswapError;
use crate::types::UnitId;

/// New bytes for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    pub unit: UnitId,
    pub bytes: Vec<u8>,
}

impl UnitDefinition {
    pub fn new(unit: UnitId, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            unit,
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCause {
    /// The new definition changes the shape of the unit's members.
    StructuralIncompatibility,
    NotLoaded,
    AlreadyLoaded,
    Malformed,
    Other,
}

impl fmt::Display for RejectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionCause::StructuralIncompatibility => "structural incompatibility",
            RejectionCause::NotLoaded => "not loaded",
            RejectionCause::AlreadyLoaded => "already loaded",
            RejectionCause::Malformed => "malformed definition",
            RejectionCause::Other => "rejected",
        };
        f.write_str(s)
    }
}

/// Why the host refused a redefinition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRejection {
    pub cause: RejectionCause,
    /// The offending unit, when the host can tell.
    pub unit: Option<UnitId>,
    pub message: String,
}

impl HostRejection {
    pub fn new(cause: RejectionCause, unit: Option<UnitId>, message: impl Into<String>) -> Self {
        Self {
            cause,
            unit,
            message: message.into(),
        }
    }

    pub fn incompatible(unit: UnitId, message: impl Into<String>) -> Self {
        Self::new(RejectionCause::StructuralIncompatibility, Some(unit), message)
    }

    pub fn is_incompatibility(&self) -> bool {
        self.cause == RejectionCause::StructuralIncompatibility
    }

    /// Attribute the rejection to `unit` as a crate error.
    pub fn into_error(self, unit: &UnitId) -> HotswapError {
        match self.cause {
            RejectionCause::StructuralIncompatibility => HotswapError::Incompatible {
                unit: unit.clone(),
                cause: self.message,
            },
            cause => HotswapError::Other(anyhow::anyhow!("{unit}: {cause}: {}", self.message)),
        }
    }
}

impl fmt::Display for HostRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} ({unit}): {}", self.cause, self.message),
            None => write!(f, "{}: {}", self.cause, self.message),
        }
    }
}

impl std::error::Error for HostRejection {}

/// The live process's definition and redefinition facility.
///
/// `redefine` is atomic: either every definition in the call is applied, or
/// none is and the whole call is rejected. Neither call is reentrant; callers
/// serialize access (see `RedefinitionExecutor`).
pub trait RedefinitionHost: Send + Sync + 'static {
    fn is_loaded(&self, unit: &UnitId) -> bool;

    /// First definition of a unit the host has not loaded.
    fn define(&self, definition: &UnitDefinition) -> Result<(), HostRejection>;

    fn redefine(&self, definitions: &[UnitDefinition]) -> Result<(), HostRejection>;
}
