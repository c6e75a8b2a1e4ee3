// src/watch/digest.rs

use std::collections::HashMap;
use std::sync::Mutex;

use blake3::Hasher;
use tracing::debug;

use crate::types::UnitId;

/// Hex-encoded blake3 digest of a unit's bytes.
pub fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize().to_hex().to_string()
}

/// Digests of the last successfully committed bytes per unit.
///
/// IDEs routinely rewrite output files with identical content; comparing
/// digests lets the pipeline skip those redefinitions.
#[derive(Debug, Default)]
pub struct DigestCache {
    digests: Mutex<HashMap<UnitId, String>>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `bytes` hash to the digest recorded for `unit`.
    pub fn is_unchanged(&self, unit: &UnitId, bytes: &[u8]) -> bool {
        let digest = compute_digest(bytes);
        let digests = self.digests.lock().unwrap_or_else(|e| e.into_inner());
        digests.get(unit).is_some_and(|old| *old == digest)
    }

    pub fn record(&self, unit: &UnitId, bytes: &[u8]) {
        let digest = compute_digest(bytes);
        debug!(unit = %unit, digest = %digest, "recorded committed digest");
        let mut digests = self.digests.lock().unwrap_or_else(|e| e.into_inner());
        digests.insert(unit.clone(), digest);
    }

    pub fn forget(&self, unit: &UnitId) {
        let mut digests = self.digests.lock().unwrap_or_else(|e| e.into_inner());
        if digests.remove(unit).is_some() {
            debug!(unit = %unit, "forgot committed digest");
        }
    }

    pub fn len(&self) -> usize {
        self.digests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
