// src/plugin/hook.rs

use std::fmt;
use std::path::PathBuf;

use crate::transform::{Phase, Phases};
use crate::types::{LoaderScope, UnitId};
use crate::watch::ChangeKind;

/// Kind of member a hook is declared on. Only methods can be hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTarget {
    Method,
    Field,
}

/// When a hook fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookPoint {
    /// A unit whose name matches `pattern` is (re)defined in one of `phases`.
    ClassLoad { pattern: String, phases: Phases },
    /// A resource whose path matches `pattern` changed.
    ResourceChange { pattern: String },
}

impl HookPoint {
    pub fn pattern(&self) -> &str {
        match self {
            HookPoint::ClassLoad { pattern, .. } | HookPoint::ResourceChange { pattern } => pattern,
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::ClassLoad { pattern, .. } => write!(f, "class-load({pattern})"),
            HookPoint::ResourceChange { pattern } => write!(f, "resource-change({pattern})"),
        }
    }
}

/// A hook declared by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDecl {
    pub member: String,
    pub target: HookTarget,
    pub point: HookPoint,
}

impl HookDecl {
    /// Method hook fired on every (re)definition of a matching unit.
    pub fn on_class_load(member: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            target: HookTarget::Method,
            point: HookPoint::ClassLoad {
                pattern: pattern.into(),
                phases: Phases::ALL,
            },
        }
    }

    /// Method hook fired when a matching resource changes.
    pub fn on_resource_change(member: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            target: HookTarget::Method,
            point: HookPoint::ResourceChange {
                pattern: pattern.into(),
            },
        }
    }

    /// Restrict a class-load hook to some phases. No effect on other points.
    pub fn with_phases(mut self, phases: Phases) -> Self {
        if let HookPoint::ClassLoad { phases: p, .. } = &mut self.point {
            *p = phases;
        }
        self
    }

    pub fn on_field(mut self) -> Self {
        self.target = HookTarget::Field;
        self
    }
}

/// What a hook is told when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    UnitDefined { unit: UnitId, phase: Phase },
    ResourceChanged { path: PathBuf, kind: ChangeKind },
}

/// Capability implemented by subsystems that want to react to reloads.
///
/// Hooks are declared explicitly by [`Hookable::hooks`] and delivered through
/// [`Hookable::on_hook`] with the declaring member's name.
pub trait Hookable: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Loader scope the plugin belongs to. `None` binds its hooks globally.
    fn owner_scope(&self) -> Option<LoaderScope> {
        None
    }

    fn hooks(&self) -> Vec<HookDecl>;

    fn on_hook(&self, member: &str, event: &HookEvent) -> anyhow::Result<()>;
}
