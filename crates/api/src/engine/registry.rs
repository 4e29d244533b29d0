//! Per-run cancellation flags for server-executor runs.
//!
//! Cancellation is a boolean per run, set by the cancel handler and read
//! by the run task at item boundaries. No other shared mutable state
//! exists outside the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use inspect_core::types::DbId;

/// Registry of in-flight server-executor runs.
#[derive(Default)]
pub struct RunRegistry {
    flags: Mutex<HashMap<DbId, Arc<AtomicBool>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run and return its cancellation flag.
    pub fn register(&self, run_id: DbId) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.flags
            .lock()
            .expect("run registry lock poisoned")
            .insert(run_id, Arc::clone(&flag));
        flag
    }

    /// Request cancellation. Returns whether the run was in flight.
    pub fn request_cancel(&self, run_id: DbId) -> bool {
        let flags = self.flags.lock().expect("run registry lock poisoned");
        match flags.get(&run_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Drop a finished run's flag.
    pub fn remove(&self, run_id: DbId) {
        self.flags
            .lock()
            .expect("run registry lock poisoned")
            .remove(&run_id);
    }

    /// Number of in-flight runs (diagnostics).
    pub fn len(&self) -> usize {
        self.flags.lock().expect("run registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flips_the_registered_flag() {
        let registry = RunRegistry::new();
        let flag = registry.register(7);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(registry.request_cancel(7));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_of_unknown_run_reports_not_in_flight() {
        let registry = RunRegistry::new();
        assert!(!registry.request_cancel(42));
    }

    #[test]
    fn remove_clears_the_entry() {
        let registry = RunRegistry::new();
        registry.register(7);
        registry.remove(7);
        assert!(registry.is_empty());
        assert!(!registry.request_cancel(7));
    }
}
