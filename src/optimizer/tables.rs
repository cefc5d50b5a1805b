//! Per-pass slot tables.
//!
//! Both tables are association lists keyed by [`SlotId`], built during a
//! single forward pass over one method body and discarded with the pass.
//! Method bodies touch a handful of slots, so the entries stay inline.

use smallvec::SmallVec;

use crate::instr::{InstrRef, SlotId};

/// Slots whose current value is a known constant.
#[derive(Debug, Clone, Default)]
pub struct ConstTable {
    entries: SmallVec<[(SlotId, i64); 8]>,
}

impl ConstTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known value of `slot`, if any.
    pub fn get(&self, slot: SlotId) -> Option<i64> {
        self.entries
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, value)| *value)
    }

    /// Record `slot` as holding `value`, overwriting any prior entry.
    pub fn set(&mut self, slot: SlotId, value: i64) {
        for entry in self.entries.iter_mut() {
            if entry.0 == slot {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((slot, value));
    }

    /// Forget `slot`; its value is no longer statically known.
    pub fn remove(&mut self, slot: SlotId) {
        self.entries.retain(|(s, _)| *s != slot);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Slots with a store not yet observed by any load.
#[derive(Debug, Clone, Default)]
pub struct StoreTable {
    entries: SmallVec<[(SlotId, InstrRef); 8]>,
}

impl StoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending store to `slot`, if any.
    pub fn get(&self, slot: SlotId) -> Option<InstrRef> {
        self.entries
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, store)| *store)
    }

    /// Record `store` as the pending store to `slot`.
    pub fn set(&mut self, slot: SlotId, store: InstrRef) {
        for entry in self.entries.iter_mut() {
            if entry.0 == slot {
                entry.1 = store;
                return;
            }
        }
        self.entries.push((slot, store));
    }

    /// Remove and return the pending store to `slot`.
    pub fn take(&mut self, slot: SlotId) -> Option<InstrRef> {
        let at = self.entries.iter().position(|(s, _)| *s == slot)?;
        Some(self.entries.remove(at).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
