//! In-memory key-value table.
//!
//! This is the data the cluster replicates. Each replica owns one `KvTable`;
//! causality is tracked at replica granularity by the vector clock, so
//! entries carry no per-key metadata. Nothing here persists across restarts.

use std::collections::BTreeMap;

use serde_json::Value;

/// Longest key accepted by the store, in bytes.
pub const MAX_KEY_BYTES: usize = 50;

/// Outcome of a `put`: whether the key was newly created or overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Created,
    Replaced,
}

/// The key-value table replicated across the cluster.
///
/// BTreeMap keeps iteration deterministic, which makes snapshot transfers and
/// test assertions stable. Synchronization lives in the replica: the table is
/// mutated only under the replica's state lock, together with the clock and
/// the view.
#[derive(Debug, Default)]
pub struct KvTable {
    data: BTreeMap<String, Value>,
}

impl KvTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a mapping. Last admitted write wins; conflicting
    /// concurrent writes are not reconciled through the clock.
    pub fn put(&mut self, key: String, value: Value) -> WriteKind {
        match self.data.insert(key, value) {
            Some(_) => WriteKind::Replaced,
            None => WriteKind::Created,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Removes a key, reporting whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Full copy of the table, used only by state transfer.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.data.clone()
    }

    /// Replaces the whole table with a transferred snapshot.
    pub fn install(&mut self, entries: BTreeMap<String, Value>) {
        self.data = entries;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Key-length validation, applied before any state mutation.
pub fn key_within_limit(key: &str) -> bool {
    key.len() <= MAX_KEY_BYTES
}
