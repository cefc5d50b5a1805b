//! Instruction-level interpreter for method bodies.
//!
//! Executes the decoded model directly so tests can compare observable
//! behavior before and after optimization: the returned value, the
//! sequence of opaque instructions reached, and nothing else. Arithmetic
//! follows the same width rules the folder uses, so a fold is wrong
//! exactly when this interpreter can tell the difference.

use tracing::trace;

use crate::instr::{InstrKind, MethodBody};

/// Result type for interpreter runs.
pub type ExecResult<T> = Result<T, ExecError>;

/// Runtime faults and harness limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// An instruction popped from an empty stack
    StackUnderflow,
    /// The operand stack outgrew the configured limit
    StackOverflow,
    /// Division by zero or an overflowing division
    DivideFault,
    /// Local slot outside the provided frame
    BadLocal { slot: u16 },
    /// Branch to an instruction that is not in the body
    DanglingBranch,
    /// The step budget ran out before the body returned
    StepLimit,
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::StackOverflow => write!(f, "operand stack overflow"),
            Self::DivideFault => write!(f, "division fault"),
            Self::BadLocal { slot } => write!(f, "local slot {} out of range", slot),
            Self::DanglingBranch => write!(f, "branch to an instruction outside the body"),
            Self::StepLimit => write!(f, "step limit exceeded"),
        }
    }
}

impl std::error::Error for ExecError {}

/// One observation of an opaque instruction during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueEvent {
    /// Raw opcode the decoder could not classify
    pub code: u16,
    /// Operand stack height at the moment it executed
    pub stack_height: usize,
}

/// Observable outcome of executing a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTrace {
    /// Value on top of the stack at the return, when there was one
    pub result: Option<i64>,
    /// Opaque instructions reached, in execution order
    pub events: Vec<OpaqueEvent>,
    /// Instructions executed
    pub steps: usize,
}

/// Execution limits.
#[derive(Debug, Clone)]
pub struct InterpConfig {
    /// Instructions executed before giving up
    pub max_steps: usize,
    /// Operand stack entries allowed
    pub max_stack: usize,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            max_steps: 1 << 16,
            max_stack: 1024,
        }
    }
}

/// Interpreter over the decoded instruction model.
pub struct Interp {
    config: InterpConfig,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Self {
        Self::with_config(InterpConfig::default())
    }

    pub fn with_config(config: InterpConfig) -> Self {
        Self { config }
    }

    /// Execute `body` against a fresh copy of `locals`.
    ///
    /// Execution follows the `next` links, so the trace reflects exactly
    /// the sequence a re-encoded body would run. A body that drops off
    /// its last instruction without a `Return` yields no result value.
    pub fn run(&self, body: &MethodBody, locals: &[i64]) -> ExecResult<ExecTrace> {
        let mut locals = locals.to_vec();
        let mut stack: Vec<i64> = Vec::new();
        let mut events: Vec<OpaqueEvent> = Vec::new();
        let mut steps = 0usize;
        let mut cursor = body.first();

        while let Some(r) = cursor {
            if steps >= self.config.max_steps {
                return Err(ExecError::StepLimit);
            }
            steps += 1;
            let instr = body.instr(r);
            cursor = instr.next();
            trace!(target: "ilpeep::interp", step = steps, op = instr.kind.mnemonic(), "exec");
            match instr.kind {
                InstrKind::LoadLocal(slot) => {
                    let value = *locals
                        .get(slot.0 as usize)
                        .ok_or(ExecError::BadLocal { slot: slot.0 })?;
                    self.push(&mut stack, value)?;
                }
                InstrKind::StoreLocal(slot) => {
                    let value = stack.pop().ok_or(ExecError::StackUnderflow)?;
                    let cell = locals
                        .get_mut(slot.0 as usize)
                        .ok_or(ExecError::BadLocal { slot: slot.0 })?;
                    *cell = value;
                }
                InstrKind::LoadConstInt { value, .. } => {
                    self.push(&mut stack, value)?;
                }
                InstrKind::Arith(op) => {
                    let rhs = stack.pop().ok_or(ExecError::StackUnderflow)?;
                    let lhs = stack.pop().ok_or(ExecError::StackUnderflow)?;
                    let value = op.eval(lhs, rhs).ok_or(ExecError::DivideFault)?;
                    self.push(&mut stack, value)?;
                }
                InstrKind::Branch(target) => {
                    if body.index_of(target).is_none() {
                        return Err(ExecError::DanglingBranch);
                    }
                    cursor = Some(target);
                }
                InstrKind::Return => {
                    return Ok(ExecTrace {
                        result: stack.pop(),
                        events,
                        steps,
                    });
                }
                InstrKind::Opaque(code) => {
                    events.push(OpaqueEvent {
                        code,
                        stack_height: stack.len(),
                    });
                }
            }
        }
        Ok(ExecTrace {
            result: None,
            events,
            steps,
        })
    }

    fn push(&self, stack: &mut Vec<i64>, value: i64) -> ExecResult<()> {
        if stack.len() >= self.config.max_stack {
            return Err(ExecError::StackOverflow);
        }
        stack.push(value);
        Ok(())
    }
}

/// Execute a method body with default limits.
pub fn run_body(body: &MethodBody, locals: &[i64]) -> ExecResult<ExecTrace> {
    Interp::new().run(body, locals)
}
