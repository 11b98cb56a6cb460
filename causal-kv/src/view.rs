//! Cluster membership: the static seed and the live view.

use std::collections::BTreeSet;

use crate::clock::SlotIndex;

/// The statically ordered list of replica addresses the cluster was launched
/// with. Slot assignment in the vector clock follows this order and never
/// changes, even as the live view shrinks or grows — the broadcaster depends
/// on that to keep clock slots meaningful across membership changes.
#[derive(Debug, Clone)]
pub struct ViewSeed {
    addrs: Vec<String>,
}

impl ViewSeed {
    pub fn new(addrs: Vec<String>) -> Self {
        Self { addrs }
    }

    /// Clock slot owned by `addr`, if the address appears in the seed.
    pub fn slot_of(&self, addr: &str) -> Option<SlotIndex> {
        self.addrs.iter().position(|a| a == addr)
    }

    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Outcome of an idempotent view mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    Added,
    AlreadyPresent,
    Deleted,
    NotFound,
}

/// The set of replica addresses this replica currently believes are live.
///
/// Self is inserted at construction and stays a member while the process
/// runs. BTreeSet keeps `members()` ordered for stable output.
#[derive(Debug)]
pub struct ViewSet {
    members: BTreeSet<String>,
}

impl ViewSet {
    pub fn new(self_addr: &str) -> Self {
        let mut members = BTreeSet::new();
        members.insert(self_addr.to_string());
        Self { members }
    }

    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.members.contains(addr)
    }

    pub fn add(&mut self, addr: &str) -> ViewChange {
        if self.members.insert(addr.to_string()) {
            ViewChange::Added
        } else {
            ViewChange::AlreadyPresent
        }
    }

    pub fn remove(&mut self, addr: &str) -> ViewChange {
        if self.members.remove(addr) {
            ViewChange::Deleted
        } else {
            ViewChange::NotFound
        }
    }

    /// Every live member except `exclude`, the broadcast fan-out set.
    pub fn others(&self, exclude: &str) -> Vec<String> {
        self.members
            .iter()
            .filter(|a| a.as_str() != exclude)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
