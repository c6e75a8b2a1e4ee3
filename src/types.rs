use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

/// Isolation boundary a unit, transformer or hook belongs to.
///
/// `None` in an `Option<LoaderScope>` position means "global".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderScope(Arc<str>);

impl LoaderScope {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoaderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoaderScope {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity of a compiled unit inside the live process: its dotted name plus
/// the loader scope it was defined in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId {
    pub scope: Option<LoaderScope>,
    pub name: String,
}

impl UnitId {
    pub fn new(scope: Option<LoaderScope>, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    /// Unit defined in the global scope.
    pub fn global(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }

    pub fn scoped(scope: impl AsRef<str>, name: impl Into<String>) -> Self {
        Self::new(Some(LoaderScope::new(scope)), name)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}@{}", self.name, scope),
            None => f.write_str(&self.name),
        }
    }
}

/// What to do with a change to a unit that the host has not loaded yet.
///
/// - `Ignore`: MODIFY events for unloaded units are dropped; nothing is
///   loaded yet so nothing needs reloading.
/// - `Notify`: MODIFY events are routed to listeners as "unit created", the
///   same way a CREATE of an unloaded unit always is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnloadedPolicy {
    Ignore,
    Notify,
}

impl Default for UnloadedPolicy {
    fn default() -> Self {
        UnloadedPolicy::Ignore
    }
}

impl FromStr for UnloadedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(UnloadedPolicy::Ignore),
            "notify" => Ok(UnloadedPolicy::Notify),
            other => Err(format!(
                "invalid unloaded_policy: {other} (expected \"ignore\" or \"notify\")"
            )),
        }
    }
}
