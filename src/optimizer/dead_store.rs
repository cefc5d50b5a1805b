//! Dead store and redundant copy elimination.
//!
//! Single forward pass with two rewrites. A store overwritten before any
//! load of its slot is deleted together with the pure producer that fed
//! it. The `store; branch; ...; load; return` copy idiom collapses to a
//! direct return of the value, deleting the skipped-over region with it.
//! Pending stores are dropped at every other branch: past one, linear
//! order no longer proves a store unobserved.

use tracing::trace;

use crate::instr::{InstrKind, InstrRef, MethodBody, SlotId};

use super::tables::StoreTable;
use super::types::{DeadStoreStats, OptimizeResult};

/// Dead store eliminator for method bodies.
pub struct DeadStoreEliminator {
    /// Statistics about removals performed
    stats: DeadStoreStats,
    /// Stores not yet observed by a load, per slot
    stores: StoreTable,
}

impl Default for DeadStoreEliminator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadStoreEliminator {
    pub fn new() -> Self {
        Self {
            stats: DeadStoreStats::new(),
            stores: StoreTable::new(),
        }
    }

    /// Get elimination statistics
    pub fn stats(&self) -> &DeadStoreStats {
        &self.stats
    }

    /// Remove dead stores and redundant copies from `body`, in place.
    pub fn eliminate(&mut self, body: &mut MethodBody) -> OptimizeResult<()> {
        self.stores.clear();
        let mut i = 0;
        while let Some(kind) = body.kind(i) {
            match kind {
                InstrKind::LoadLocal(slot) => {
                    // The pending store, if any, is now observed
                    self.stores.take(slot);
                    i += 1;
                }
                InstrKind::StoreLocal(slot) => {
                    i = self.visit_store(body, i, slot)?;
                }
                InstrKind::Branch(target) => {
                    if self.try_collapse_branch_around(body, i, target)? {
                        // The region up to the load is gone; the return
                        // now sits where the store was
                        i -= 1;
                    } else {
                        self.stores.clear();
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        Ok(())
    }

    /// Handle a `StoreLocal`: delete the previous unobserved store to the
    /// same slot when that is provably safe, then record this one as
    /// pending. Returns the next cursor position.
    fn visit_store(
        &mut self,
        body: &mut MethodBody,
        i: usize,
        slot: SlotId,
    ) -> OptimizeResult<usize> {
        let current = body.at(i);
        let mut removed = false;
        if let Some(prev_store) = self.stores.get(slot) {
            if let Some(pos) = body.index_of(prev_store) {
                if self.pair_removable(body, prev_store, pos) {
                    let freed = body.get(pos - 1).map_or(0, |p| p.encoded_len() as isize)
                        + body.instr(prev_store).encoded_len() as isize;
                    body.remove_range(pos - 1, pos)?;
                    self.stats.dead_stores_removed += 1;
                    self.stats.instrs_removed += 2;
                    self.stats.bytes_saved += freed;
                    removed = true;
                    trace!(target: "ilpeep::dce", slot = slot.0, index = pos, "removed dead store");
                } else {
                    self.stats.skipped_stores += 1;
                }
            }
        }
        self.stores.set(slot, current);
        // A removal happened strictly before this store, shifting it down
        // by two
        Ok(if removed { i - 1 } else { i + 1 })
    }

    /// A dead store may be deleted when the instruction before it is a
    /// pure producer (that producer fed it and goes too) and no branch
    /// lands on the store itself. A branch entering at the store consumes
    /// the *entering* path's stack value, which the deletion would leave
    /// behind.
    fn pair_removable(&self, body: &MethodBody, store: InstrRef, pos: usize) -> bool {
        if pos == 0 {
            return false;
        }
        let pure = body
            .kind(pos - 1)
            .is_some_and(|k| k.is_pure_producer());
        if !pure {
            return false;
        }
        body.iter_refs()
            .all(|r| !matches!(body.instr(r).kind, InstrKind::Branch(t) if t == store))
    }

    /// Recognize `store x; branch L; ...; L: load x; return` and collapse
    /// it to a direct return: the value about to be stored is what the
    /// load would put back. The store, the branch, the skipped region and
    /// the load are all deleted; the store's producer stays and feeds the
    /// return directly.
    fn try_collapse_branch_around(
        &mut self,
        body: &mut MethodBody,
        i: usize,
        target: InstrRef,
    ) -> OptimizeResult<bool> {
        if i == 0 {
            return Ok(false);
        }
        let Some(InstrKind::StoreLocal(slot)) = body.kind(i - 1) else {
            return Ok(false);
        };
        let Some(tpos) = body.index_of(target) else {
            return Ok(false);
        };
        if tpos <= i {
            return Ok(false);
        }
        if body.kind(tpos) != Some(InstrKind::LoadLocal(slot)) {
            return Ok(false);
        }
        if body.kind(tpos + 1) != Some(InstrKind::Return) {
            return Ok(false);
        }
        let lo = i - 1;
        // The skipped region and the load must be unreachable from
        // anywhere else. Their only ordered predecessor is the matched
        // branch, so inbound branches are the one way in. Entry at the
        // store stays equivalent (the value on stack gets returned either
        // way) and is redirected to the return by the removal.
        let enterable = body.iter_refs().enumerate().any(|(p, r)| {
            if (lo..=tpos).contains(&p) {
                return false;
            }
            match body.instr(r).kind {
                InstrKind::Branch(t) => body
                    .index_of(t)
                    .is_some_and(|tp| (i..=tpos).contains(&tp)),
                _ => false,
            }
        });
        if enterable {
            return Ok(false);
        }
        let skipped = tpos - i - 1;
        let freed: isize = (lo..=tpos)
            .filter_map(|k| body.get(k))
            .map(|instr| instr.encoded_len() as isize)
            .sum();
        body.remove_range(lo, tpos)?;
        self.stores.take(slot);
        self.stats.branch_arounds_removed += 1;
        self.stats.unreachable_removed += skipped;
        self.stats.instrs_removed += tpos - lo + 1;
        self.stats.bytes_saved += freed;
        trace!(target: "ilpeep::dce", slot = slot.0, index = lo, skipped, "collapsed branch-around return");
        Ok(true)
    }
}

/// Remove dead stores and redundant copies from one method body.
///
/// One-shot convenience over [`DeadStoreEliminator`]; returns the pass
/// statistics.
pub fn eliminate_dead_stores(body: &mut MethodBody) -> OptimizeResult<DeadStoreStats> {
    let mut dce = DeadStoreEliminator::new();
    dce.eliminate(body)?;
    Ok(dce.stats().clone())
}
