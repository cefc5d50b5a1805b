//! Error and statistics types for the optimization passes.

use crate::instr::BodyError;

/// Result type for optimization passes.
pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// Errors that abort optimization of one method body.
///
/// Every variant is a contract violation by the decoder; the optimizer
/// never turns a well-formed body into an error. The driver reacts by
/// keeping the method's original instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeError {
    /// `StoreLocal` at the very start of a body, with nothing before it
    /// that could have produced the value being stored
    OrphanStore { index: usize },
    /// Structural damage found before or during a rewrite
    Malformed(BodyError),
}

impl std::fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrphanStore { index } => {
                write!(f, "store at position {} has no producing instruction", index)
            }
            Self::Malformed(inner) => write!(f, "malformed method body: {}", inner),
        }
    }
}

impl std::error::Error for OptimizeError {}

impl From<BodyError> for OptimizeError {
    fn from(err: BodyError) -> Self {
        Self::Malformed(err)
    }
}

/// Statistics about constant folding and propagation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldStats {
    /// Constant-valued stores recorded into the slot table
    pub consts_tracked: usize,
    /// Runs of constant producers collapsed through one arithmetic
    pub runs_folded: usize,
    /// Five-instruction same-operator chains collapsed in one step
    pub chains_folded: usize,
    /// Instructions removed, net of inserted replacements
    pub instrs_removed: usize,
    /// Encoded bytes saved; negative when a wide replacement constant
    /// outgrows the loads it replaced
    pub bytes_saved: isize,
}

impl FoldStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of fold rewrites performed
    pub fn total_folds(&self) -> usize {
        self.runs_folded + self.chains_folded
    }
}

/// Statistics about dead store and redundant copy elimination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadStoreStats {
    /// Overwritten stores deleted together with their producers
    pub dead_stores_removed: usize,
    /// Overwritten stores kept because deleting the pair was not provably safe
    pub skipped_stores: usize,
    /// Branch-around-return idioms collapsed to a direct return
    pub branch_arounds_removed: usize,
    /// Unreachable instructions deleted inside collapsed idioms
    pub unreachable_removed: usize,
    /// Instructions removed in total
    pub instrs_removed: usize,
    /// Encoded bytes saved
    pub bytes_saved: isize,
}

impl DeadStoreStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }
}

/// Combined statistics from a full [`optimize_method`] run.
///
/// [`optimize_method`]: crate::optimizer::optimize_method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// Constant fold/propagate pass
    pub fold: FoldStats,
    /// Dead store/redundant copy pass
    pub dead: DeadStoreStats,
}

impl OptimizeStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions removed across both passes
    pub fn instrs_removed(&self) -> usize {
        self.fold.instrs_removed + self.dead.instrs_removed
    }

    /// Encoded bytes saved across both passes
    pub fn bytes_saved(&self) -> isize {
        self.fold.bytes_saved + self.dead.bytes_saved
    }
}
