//! An in-memory key-value database.
//!
//! This is the state machine which the consensus core replicates: committed
//! `SET`/`DEL` records from the Raft log are applied here. Each node owns its
//! own `Database` instance, and the log guarantees they converge to the same
//! contents.

use std::collections::BTreeMap;
use std::sync::RwLock;

use quorum_raft::KeyValueStore;

/// A thread-safe in-memory key-value store.
///
/// Writes go through the replicated log and arrive here one committed entry
/// at a time, in log order. Reads are served locally.
///
/// A `BTreeMap` is used rather than a `HashMap` so that iteration order is
/// deterministic, which keeps status output and test assertions stable.
#[derive(Debug, Default)]
pub struct Database {
    data: RwLock<BTreeMap<String, String>>,
}

impl Database {
    /// Create an empty database.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().unwrap().get(key).cloned()
    }

    /// Store `value` under `key`, overwriting any existing value.
    pub fn set(&self, key: &str, value: &str) {
        self.data.write().unwrap().insert(key.to_string(), value.to_string());
    }

    /// Remove `key`. Removing an absent key is a no-op.
    pub fn delete(&self, key: &str) {
        self.data.write().unwrap().remove(key);
    }

    /// The number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// A point-in-time copy of the full contents, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.read().unwrap().clone()
    }
}

impl KeyValueStore for Database {
    fn set(&self, key: &str, value: &str) {
        Database::set(self, key, value)
    }

    fn delete(&self, key: &str) {
        Database::delete(self, key)
    }
}
