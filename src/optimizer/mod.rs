//! Peephole optimization for method bodies.
//!
//! Two narrowly scoped passes over one decoded [`MethodBody`]:
//!
//! | Pass | Rewrite | Example |
//! |------|---------|---------|
//! | Constant fold/propagate | producer run + arithmetic becomes one constant | `3; 4; add` -> `7` |
//! | Constant fold/propagate | stored constants resolve later loads | `5; store x; load x; 2; mul` -> `5; store x; 10` |
//! | Dead store | store overwritten before any load loses its pair | `1; store x; 2; store x` -> `2; store x` |
//! | Redundant copy | store-branch-load-return becomes a direct return | `store x; br L; L: load x; ret` -> `ret` |
//!
//! Both passes preserve observable behavior for every input and every
//! possible prior execution history; anything not provably safe stays in
//! place. Structural edits go through [`MethodBody`], which keeps links,
//! positions and branch targets consistent as one atomic step per edit.
//!
//! # Example
//!
//! ```
//! use ilpeep::instr::{BinOp, InstrKind, IntWidth, MethodBody};
//! use ilpeep::optimizer::optimize_method;
//!
//! let mut body = MethodBody::new();
//! body.push(InstrKind::LoadConstInt { value: 3, width: IntWidth::W8 });
//! body.push(InstrKind::LoadConstInt { value: 4, width: IntWidth::W8 });
//! body.push(InstrKind::Arith(BinOp::Add));
//! body.push(InstrKind::Return);
//!
//! let stats = optimize_method(&mut body).unwrap();
//! assert_eq!(body.len(), 2);
//! assert_eq!(stats.fold.runs_folded, 1);
//! ```

mod const_fold;
mod dead_store;
mod tables;
mod tests;
mod types;

pub use const_fold::{fold_constants, ConstFolder};
pub use dead_store::{eliminate_dead_stores, DeadStoreEliminator};
pub use tables::{ConstTable, StoreTable};
pub use types::{DeadStoreStats, FoldStats, OptimizeError, OptimizeResult, OptimizeStats};

use rayon::prelude::*;
use tracing::debug;

use crate::instr::MethodBody;

/// Optimize one method body: constant folding, then dead store
/// elimination, each as a single pass.
///
/// The passes run on a scratch copy that replaces `body` only when both
/// succeed, so a contract violation from the decoder leaves the method's
/// original instructions intact. Handles taken from `body` before the
/// call do not carry over to the optimized sequence.
pub fn optimize_method(body: &mut MethodBody) -> OptimizeResult<OptimizeStats> {
    body.validate()?;
    let instrs_before = body.len();
    let bytes_before = body.code_size();

    let mut scratch = body.clone();
    let mut folder = ConstFolder::new();
    folder.fold(&mut scratch)?;
    let mut dce = DeadStoreEliminator::new();
    dce.eliminate(&mut scratch)?;
    *body = scratch;

    debug!(
        target: "ilpeep::optimizer",
        instrs_before,
        instrs_after = body.len(),
        bytes_before,
        bytes_after = body.code_size(),
        "optimized method body"
    );
    Ok(OptimizeStats {
        fold: folder.stats().clone(),
        dead: dce.stats().clone(),
    })
}

/// Optimize a batch of method bodies in parallel.
///
/// Bodies are independent, so the batch fans out across the rayon pool.
/// Results come back in input order; a body whose optimization failed
/// keeps its original instructions, exactly as [`optimize_method`]
/// leaves it.
pub fn optimize_all(bodies: &mut [MethodBody]) -> Vec<OptimizeResult<OptimizeStats>> {
    bodies.par_iter_mut().map(optimize_method).collect()
}
