// src/redefine/memory_host.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::redefine::host::{HostRejection, RedefinitionHost, RejectionCause, UnitDefinition};
use crate::types::UnitId;

type ShapeFn = dyn Fn(&[u8]) -> String + Send + Sync;

/// In-process host that keeps the current definition of every loaded unit.
///
/// With a shape function, a redefinition is structurally incompatible when
/// the shape of the new bytes differs from the shape of the loaded ones.
/// Calls are atomic: every definition is validated before any is applied.
pub struct InMemoryHost {
    units: Mutex<HashMap<UnitId, Vec<u8>>>,
    shape: Option<Box<ShapeFn>>,
    calls: AtomicUsize,
}

impl fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHost")
            .field("loaded", &self.len())
            .field("has_shape", &self.shape.is_some())
            .finish()
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self {
            units: Mutex::new(HashMap::new()),
            shape: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_shape<F>(mut self, shape: F) -> Self
    where
        F: Fn(&[u8]) -> String + Send + Sync + 'static,
    {
        self.shape = Some(Box::new(shape));
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UnitId, Vec<u8>>> {
        self.units.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a unit as already loaded, bypassing `define`.
    pub fn load(&self, unit: UnitId, bytes: impl Into<Vec<u8>>) {
        debug!(unit = %unit, "unit loaded");
        self.lock().insert(unit, bytes.into());
    }

    pub fn unload(&self, unit: &UnitId) -> bool {
        self.lock().remove(unit).is_some()
    }

    pub fn bytes_of(&self, unit: &UnitId) -> Option<Vec<u8>> {
        self.lock().get(unit).cloned()
    }

    pub fn loaded(&self) -> Vec<UnitId> {
        let mut units: Vec<UnitId> = self.lock().keys().cloned().collect();
        units.sort();
        units
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `redefine` calls so far, accepted or not.
    pub fn redefine_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn validate_bytes(def: &UnitDefinition) -> Result<(), HostRejection> {
        if def.bytes.is_empty() {
            return Err(HostRejection::new(
                RejectionCause::Malformed,
                Some(def.unit.clone()),
                "empty definition",
            ));
        }
        Ok(())
    }

    fn check(
        &self,
        units: &HashMap<UnitId, Vec<u8>>,
        def: &UnitDefinition,
    ) -> Result<(), HostRejection> {
        let Some(current) = units.get(&def.unit) else {
            return Err(HostRejection::new(
                RejectionCause::NotLoaded,
                Some(def.unit.clone()),
                "unit is not loaded",
            ));
        };
        Self::validate_bytes(def)?;
        if let Some(shape) = &self.shape {
            let old = shape(current);
            let new = shape(&def.bytes);
            if old != new {
                return Err(HostRejection::incompatible(
                    def.unit.clone(),
                    format!("member shape changed from '{old}' to '{new}'"),
                ));
            }
        }
        Ok(())
    }
}

impl RedefinitionHost for InMemoryHost {
    fn is_loaded(&self, unit: &UnitId) -> bool {
        self.lock().contains_key(unit)
    }

    fn define(&self, definition: &UnitDefinition) -> Result<(), HostRejection> {
        Self::validate_bytes(definition)?;
        let mut units = self.lock();
        if units.contains_key(&definition.unit) {
            return Err(HostRejection::new(
                RejectionCause::AlreadyLoaded,
                Some(definition.unit.clone()),
                "unit is already defined",
            ));
        }
        debug!(unit = %definition.unit, "unit defined");
        units.insert(definition.unit.clone(), definition.bytes.clone());
        Ok(())
    }

    fn redefine(&self, definitions: &[UnitDefinition]) -> Result<(), HostRejection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut units = self.lock();
        for def in definitions {
            self.check(&units, def)?;
        }
        for def in definitions {
            units.insert(def.unit.clone(), def.bytes.clone());
        }
        Ok(())
    }
}
