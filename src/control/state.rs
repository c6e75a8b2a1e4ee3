// src/control/state.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// A method the driver asked to trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TracedMethod {
    pub class_name: String,
    pub method_name: String,
    pub method_description: String,
}

/// Methods the driver currently wants traced.
///
/// The dispatcher only writes it. The embedding shares the same table with
/// its instrumenting transformers, which look methods up with
/// [`TraceTable::is_traced`].
#[derive(Debug, Default)]
pub struct TraceTable {
    methods: Mutex<BTreeSet<TracedMethod>>,
}

impl TraceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, method: TracedMethod, trace: bool) {
        let mut methods = self.methods.lock().unwrap_or_else(|e| e.into_inner());
        if trace {
            methods.insert(method);
        } else {
            methods.remove(&method);
        }
    }

    pub fn is_traced(&self, class_name: &str, method_name: &str) -> bool {
        self.methods
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m.class_name == class_name && m.method_name == method_name)
    }

    pub fn traced(&self) -> Vec<TracedMethod> {
        self.methods
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Results of driver-invoked runs, keyed by field.
///
/// The embedding writes them with [`RunResults::record`]; the driver can only
/// clear them.
#[derive(Debug, Default)]
pub struct RunResults {
    results: Mutex<HashMap<String, String>>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, field: impl Into<String>, value: impl Into<String>) {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<String> {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(field)
            .cloned()
    }

    /// Clear one field, or everything when `field` is empty. Returns the
    /// number of cleared results.
    pub fn clear(&self, field: &str) -> usize {
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        if field.is_empty() {
            let n = results.len();
            results.clear();
            n
        } else {
            usize::from(results.remove(field).is_some())
        }
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
