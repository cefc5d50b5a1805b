//! Constant folding and propagation over one method body.
//!
//! Single forward pass. A store fed by a constant records the slot's
//! value, and later loads of that slot resolve through the table. A run
//! of resolvable producers feeding an arithmetic instruction collapses
//! to one constant load; the cursor then re-examines the rewrite site,
//! so chained arithmetic keeps folding without another pass.
//!
//! The table describes the fall-through path only. Branch targets are
//! merge points where another path can enter, so tracked values are
//! dropped there and no producer run extends across one.

use smallvec::SmallVec;
use tracing::trace;

use crate::instr::{BinOp, InstrKind, InstrRef, IntWidth, MethodBody, SlotId};

use super::tables::ConstTable;
use super::types::{FoldStats, OptimizeError, OptimizeResult};

/// Constant folder for method bodies.
pub struct ConstFolder {
    /// Statistics about folds performed
    stats: FoldStats,
    /// Slot values known on the current linear path
    consts: ConstTable,
    /// Branch-target handles of the body being folded
    joins: SmallVec<[InstrRef; 4]>,
}

impl Default for ConstFolder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstFolder {
    pub fn new() -> Self {
        Self {
            stats: FoldStats::new(),
            consts: ConstTable::new(),
            joins: SmallVec::new(),
        }
    }

    /// Get folding statistics
    pub fn stats(&self) -> &FoldStats {
        &self.stats
    }

    /// Fold and propagate constants in `body`, in place.
    ///
    /// Errors abort at the offending instruction and leave the body as it
    /// was at that moment; run on a scratch clone when the original must
    /// survive a failure ([`optimize_method`] does).
    ///
    /// [`optimize_method`]: crate::optimizer::optimize_method
    pub fn fold(&mut self, body: &mut MethodBody) -> OptimizeResult<()> {
        self.consts.clear();
        self.collect_joins(body);
        let mut i = 0;
        while let Some(kind) = body.kind(i) {
            // Another path can enter at a branch target; values recorded
            // on the fall-through path stop holding there.
            let at_join = self.joins.contains(&body.at(i));
            if at_join && !self.consts.is_empty() {
                self.consts.clear();
                trace!(target: "ilpeep::fold", index = i, "join point, tracked constants dropped");
            }
            match kind {
                InstrKind::StoreLocal(slot) => {
                    self.track_assignment(body, i, slot, at_join)?;
                    i += 1;
                }
                _ => {
                    // A successful fold re-examines the same index: the
                    // replacement constant may seed the next run.
                    if self.try_fold_run(body, i) {
                        self.collect_joins(body);
                    } else {
                        i += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Track what a `StoreLocal` does to the slot's known value.
    fn track_assignment(
        &mut self,
        body: &MethodBody,
        i: usize,
        slot: SlotId,
        at_join: bool,
    ) -> OptimizeResult<()> {
        if i == 0 {
            return Err(OptimizeError::OrphanStore { index: 0 });
        }
        if at_join {
            // Each entering path pops its own producer here; the stored
            // value is path-dependent.
            self.consts.remove(slot);
            return Ok(());
        }
        match body.kind(i - 1) {
            Some(InstrKind::LoadConstInt { value, .. }) => {
                self.consts.set(slot, value);
                self.stats.consts_tracked += 1;
                trace!(target: "ilpeep::fold", slot = slot.0, value, "slot holds constant");
            }
            Some(InstrKind::LoadLocal(src)) => match self.consts.get(src) {
                Some(value) => {
                    self.consts.set(slot, value);
                    self.stats.consts_tracked += 1;
                    trace!(target: "ilpeep::fold", slot = slot.0, value, "slot copies constant");
                }
                None => self.consts.remove(slot),
            },
            _ => self.consts.remove(slot),
        }
        Ok(())
    }

    /// Fold the longest resolvable producer run starting at `start` into
    /// the arithmetic that consumes it. Returns whether a rewrite
    /// happened.
    fn try_fold_run(&mut self, body: &mut MethodBody, start: usize) -> bool {
        let mut values: SmallVec<[i64; 4]> = SmallVec::new();
        let mut j = start;
        while let Some(value) = self.resolve_const(body, j) {
            // A run may not span a join: entry there replays the tail
            // with slot state the table never saw.
            if j > start && self.joins.contains(&body.at(j)) {
                break;
            }
            values.push(value);
            j += 1;
        }
        let op = match body.kind(j) {
            Some(InstrKind::Arith(op)) => op,
            _ => return false,
        };
        if values.len() < 2 {
            return false;
        }
        let lhs = values[values.len() - 2];
        let rhs = values[values.len() - 1];
        let Some(folded) = op.eval(lhs, rhs) else {
            // The operation faults at runtime; it must stay in the stream
            return false;
        };
        let lo = j - 2;
        if !self.window_clear(body, lo, j) {
            return false;
        }
        // One-ahead peek: the run collapsed to a single value and the
        // next two instructions continue with the same operator, so both
        // legs fold in one rewrite.
        if values.len() == 2 {
            if let Some(chained) = self.chain_value(body, j, op, folded) {
                if self.window_clear(body, lo, j + 2) {
                    self.commit(body, lo, j + 2, chained);
                    self.stats.chains_folded += 1;
                    self.stats.instrs_removed += 4;
                    trace!(target: "ilpeep::fold", index = lo, value = chained, "folded operator chain");
                    return true;
                }
            }
        }
        self.commit(body, lo, j, folded);
        self.stats.runs_folded += 1;
        self.stats.instrs_removed += 2;
        trace!(target: "ilpeep::fold", index = lo, value = folded, "folded constant run");
        true
    }

    /// Second leg of a same-operator chain: `lhs` is the value the first
    /// fold produced, the instructions at `j + 1` and `j + 2` must be a
    /// resolvable operand and the same operator again.
    fn chain_value(&self, body: &MethodBody, j: usize, op: BinOp, lhs: i64) -> Option<i64> {
        let rhs = self.resolve_const(body, j + 1)?;
        match body.kind(j + 2) {
            Some(InstrKind::Arith(next_op)) if next_op == op => op.eval(lhs, rhs),
            _ => None,
        }
    }

    /// Constant produced by the instruction at `index`, either a literal
    /// or a load of a slot with a known value.
    fn resolve_const(&self, body: &MethodBody, index: usize) -> Option<i64> {
        match body.kind(index)? {
            InstrKind::LoadConstInt { value, .. } => Some(value),
            InstrKind::LoadLocal(slot) => self.consts.get(slot),
            _ => None,
        }
    }

    /// Record every branch-target handle of `body`. Handles stay valid
    /// across rewrites, but a rewrite can redirect branches, so the set
    /// is re-collected after each one.
    fn collect_joins(&mut self, body: &MethodBody) {
        self.joins.clear();
        for instr in body.iter() {
            if let InstrKind::Branch(target) = instr.kind {
                if !self.joins.contains(&target) {
                    self.joins.push(target);
                }
            }
        }
    }

    /// Whether the window `lo..=hi` may be replaced without breaking an
    /// inbound branch. Entry from outside replays the whole window, so it
    /// is allowed only at the first position, and only when the window
    /// re-reads no slots: a table-resolved load inside it would pin the
    /// value of a different path.
    fn window_clear(&self, body: &MethodBody, lo: usize, hi: usize) -> bool {
        let literal_window = (lo..=hi).all(|k| {
            matches!(
                body.kind(k),
                Some(InstrKind::LoadConstInt { .. }) | Some(InstrKind::Arith(_))
            )
        });
        body.iter_refs().enumerate().all(|(i, r)| {
            if (lo..=hi).contains(&i) {
                return true;
            }
            match body.instr(r).kind {
                InstrKind::Branch(target) => match body.index_of(target) {
                    Some(t) => !(lo..=hi).contains(&t) || (t == lo && literal_window),
                    None => false,
                },
                _ => true,
            }
        })
    }

    /// Replace `lo..=hi` with one constant load of `value`, using the
    /// smallest encoding, and account for the size change.
    fn commit(&mut self, body: &mut MethodBody, lo: usize, hi: usize, value: i64) {
        let removed: isize = (lo..=hi)
            .filter_map(|k| body.get(k))
            .map(|instr| instr.encoded_len() as isize)
            .sum();
        let kind = InstrKind::LoadConstInt {
            value,
            width: IntWidth::smallest_for(value),
        };
        let replacement = body.replace_range(lo, hi, kind);
        self.stats.bytes_saved += removed - body.instr(replacement).encoded_len() as isize;
    }
}

/// Fold and propagate constants in one method body.
///
/// One-shot convenience over [`ConstFolder`]; returns the pass
/// statistics.
pub fn fold_constants(body: &mut MethodBody) -> OptimizeResult<FoldStats> {
    let mut folder = ConstFolder::new();
    folder.fold(body)?;
    Ok(folder.stats().clone())
}
