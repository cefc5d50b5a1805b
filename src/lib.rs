/// ilpeep - Method Body Peephole Optimizer
///
/// This library performs local, provably-safe rewrites over one decoded
/// stack-machine method body at a time: constant propagation and folding
/// of integer arithmetic, then dead store and redundant copy elimination.
/// It receives an already-decoded instruction sequence from the binary
/// container layer and hands the same sequence back, mutated in place and
/// ready for re-encoding.
///
/// # Architecture
///
/// The pipeline runs two single-pass stages over one `MethodBody`:
///
/// 1. **Constant fold/propagate** (`optimizer::ConstFolder`)
///    - Tracks slots assigned provably-constant values, dropping them at
///      branch targets where another path can enter
///    - Resolves later loads of those slots through the table
///    - Collapses runs of constant producers into the arithmetic
///      instruction that consumes them
///    - Re-examines each rewrite site so chained arithmetic keeps folding
///
/// 2. **Dead store elimination** (`optimizer::DeadStoreEliminator`)
///    - Deletes stores overwritten before any load, together with their
///      pure producers
///    - Collapses the store-branch-load-return idiom to a direct return
///
/// Both passes delegate every structural edit to `MethodBody`, which owns
/// the instruction arena and keeps links, positions and branch targets
/// consistent after each edit. Anything not provably safe is left in
/// place; a malformed body aborts with its instructions untouched.
///
/// # Example
///
/// ```rust
/// use ilpeep::instr::{BinOp, InstrKind, IntWidth, MethodBody, SlotId};
/// use ilpeep::optimize_method;
///
/// // 3 + 4, stored and reloaded for the return
/// let mut body = MethodBody::new();
/// body.push(InstrKind::LoadConstInt { value: 3, width: IntWidth::W8 });
/// body.push(InstrKind::LoadConstInt { value: 4, width: IntWidth::W8 });
/// body.push(InstrKind::Arith(BinOp::Add));
/// body.push(InstrKind::StoreLocal(SlotId(0)));
/// body.push(InstrKind::LoadLocal(SlotId(0)));
/// body.push(InstrKind::Return);
///
/// let stats = optimize_method(&mut body).unwrap();
/// assert_eq!(stats.fold.runs_folded, 1);
/// assert_eq!(body.len(), 4);
/// ```
pub mod instr;
pub mod interp;
pub mod optimizer;

pub use instr::{
    BinOp, BodyError, BodyResult, InstrKind, InstrRef, Instruction, IntWidth, MethodBody, SlotId,
};
pub use interp::{run_body, ExecError, ExecResult, ExecTrace, Interp, InterpConfig, OpaqueEvent};
pub use optimizer::{
    eliminate_dead_stores, fold_constants, optimize_all, optimize_method, ConstFolder,
    DeadStoreEliminator, DeadStoreStats, FoldStats, OptimizeError, OptimizeResult, OptimizeStats,
};
