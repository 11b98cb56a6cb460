//! Vector clocks over a fixed set of replica slots.
//!
//! Each replica owns exactly one slot, assigned once from the seed list order
//! at startup. A replica only ever increments its own slot; every other slot
//! moves forward solely through [`VectorClock::merge`]. Both rules together
//! make every slot monotonically non-decreasing for the life of the process.

use serde::{Deserialize, Serialize};

/// Index of a replica's slot in the vector clock, fixed by the seed order.
pub type SlotIndex = usize;

/// Per-replica counter vector used to detect happened-before relationships.
///
/// Serialized as a bare JSON array (`[0, 0, 0]`) so it can travel as the
/// `causal-metadata` field of every wire message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(Vec<u64>);

impl VectorClock {
    /// Creates a zeroed clock with one slot per seed replica.
    pub fn new(slots: usize) -> Self {
        Self(vec![0; slots])
    }

    /// Increments the given slot by one.
    ///
    /// Callers must only pass their own slot; the replica enforces this by
    /// incrementing exclusively through its own `SlotIndex`.
    pub fn increment(&mut self, slot: SlotIndex) {
        if slot >= self.0.len() {
            self.0.resize(slot + 1, 0);
        }
        self.0[slot] += 1;
    }

    /// Sets each slot to the maximum of the two clocks.
    ///
    /// Extends the local clock if `other` carries more slots, so a clock
    /// received from a peer with a longer seed never loses information.
    pub fn merge(&mut self, other: &VectorClock) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (slot, &theirs) in other.0.iter().enumerate() {
            if theirs > self.0[slot] {
                self.0[slot] = theirs;
            }
        }
    }

    /// True iff every local slot is >= the corresponding slot of `other`.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.dominates_ignoring(other, None)
    }

    /// Dominance test that skips one slot.
    ///
    /// The admission gate uses this for forwarded operations: the sender's
    /// own slot is always one ahead of anything the receiver can have seen,
    /// and a replica's own prior writes are trivially satisfied by itself.
    pub fn dominates_ignoring(&self, other: &VectorClock, skip: Option<SlotIndex>) -> bool {
        for (slot, &theirs) in other.0.iter().enumerate() {
            if Some(slot) == skip {
                continue;
            }
            let ours = self.0.get(slot).copied().unwrap_or(0);
            if ours < theirs {
                return false;
            }
        }
        true
    }

    /// Current value of a single slot (0 if the slot does not exist).
    pub fn get(&self, slot: SlotIndex) -> u64 {
        self.0.get(slot).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u64>> for VectorClock {
    fn from(slots: Vec<u64>) -> Self {
        Self(slots)
    }
}
