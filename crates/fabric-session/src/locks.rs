//! Per-switch operation locks.
//!
//! Two concurrent operations against the same switch are forbidden:
//! the C-Fabric driver serializes on a single `fabric` key, the FOS
//! drivers on one key per switch. The registry is explicitly owned and
//! passed to the drivers rather than hidden in a global.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Lock key used by the C-Fabric driver.
pub const FABRIC_LOCK: &str = "fabric";

/// Registry of named operation locks.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Returns the lock for `key`, creating it on first use.
    ///
    /// Callers hold the returned `Arc` and `.lock().await` it for the
    /// duration of one top-level driver operation.
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
