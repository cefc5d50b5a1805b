//! Instruction payloads and operand types.
//!
//! The decoder hands the optimizer fully shaped variants; nothing here
//! parses raw encodings. Instructions the optimizer does not recognize
//! arrive as [`InstrKind::Opaque`] and act as barriers no rewrite may
//! touch.

use std::fmt;

/// Identifier of one local variable slot within a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u16);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable handle to an instruction inside a [`MethodBody`] arena.
///
/// Handles survive structural edits: the arena is never compacted, so a
/// handle taken before a removal still resolves afterwards (the
/// instruction is merely detached from the order). Branch targets are
/// stored as handles for exactly this reason.
///
/// [`MethodBody`]: crate::instr::MethodBody
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrRef(u32);

impl InstrRef {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Encoded width class of an integer constant immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    /// Signed byte immediate
    W8,
    /// Signed 16-bit immediate (decoder-supplied only, never emitted here)
    W16,
    /// Signed 32-bit immediate
    W32,
    /// Full 64-bit immediate
    W64,
}

impl IntWidth {
    /// Smallest width whose immediate can hold `value`.
    ///
    /// The emitter tiers are byte, 32-bit word, full word; `W16` has no
    /// short constant form in the container encoding, so it is never
    /// chosen here.
    #[inline]
    pub fn smallest_for(value: i64) -> Self {
        if i8::try_from(value).is_ok() {
            Self::W8
        } else if i32::try_from(value).is_ok() {
            Self::W32
        } else {
            Self::W64
        }
    }

    /// Number of immediate bytes carried by this width.
    #[inline]
    pub fn immediate_size(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }
}

/// Binary arithmetic operator popping two stack operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    /// Evaluate the operator on constant operands.
    ///
    /// Width follows the operand values: when both fit in 32 bits the
    /// operation wraps at 32 bits, otherwise at 64. Returns `None` where
    /// the machine faults at runtime (division by zero, `MIN / -1`);
    /// those operations must stay in the instruction stream.
    pub fn eval(self, lhs: i64, rhs: i64) -> Option<i64> {
        match (i32::try_from(lhs), i32::try_from(rhs)) {
            (Ok(a), Ok(b)) => {
                let result = match self {
                    Self::Add => a.wrapping_add(b),
                    Self::Sub => a.wrapping_sub(b),
                    Self::Mul => a.wrapping_mul(b),
                    Self::Div => a.checked_div(b)?,
                    Self::Rem => a.checked_rem(b)?,
                };
                Some(i64::from(result))
            }
            _ => match self {
                Self::Add => Some(lhs.wrapping_add(rhs)),
                Self::Sub => Some(lhs.wrapping_sub(rhs)),
                Self::Mul => Some(lhs.wrapping_mul(rhs)),
                Self::Div => lhs.checked_div(rhs),
                Self::Rem => lhs.checked_rem(rhs),
            },
        }
    }

    /// Get the mnemonic name for this operator.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
        }
    }
}

/// Decoded operation of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrKind {
    /// Push the value of a local slot
    LoadLocal(SlotId),
    /// Pop the top of stack into a local slot
    StoreLocal(SlotId),
    /// Push an integer constant; `width` is the decoded immediate class
    LoadConstInt { value: i64, width: IntWidth },
    /// Pop two operands (right-hand popped first) and push the result
    Arith(BinOp),
    /// Unconditional branch to another instruction of the same body
    Branch(InstrRef),
    /// Return, consuming the top of stack when one is present
    Return,
    /// Unrecognized instruction; the raw opcode is kept for diagnostics
    Opaque(u16),
}

impl InstrKind {
    /// Whether this instruction pushes exactly one value and has no other
    /// effect. Only these may be deleted together with a dead store.
    #[inline]
    pub fn is_pure_producer(&self) -> bool {
        matches!(self, Self::LoadLocal(_) | Self::LoadConstInt { .. })
    }

    /// Get the mnemonic name for this instruction.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::LoadLocal(_) => "load_local",
            Self::StoreLocal(_) => "store_local",
            Self::LoadConstInt { .. } => "load_const",
            Self::Arith(op) => op.mnemonic(),
            Self::Branch(_) => "branch",
            Self::Return => "return",
            Self::Opaque(_) => "opaque",
        }
    }
}

/// One instruction plus its links into the body order.
///
/// `prev`/`next` are derived from the canonical order; [`MethodBody`]
/// recomputes them after every structural edit, so they are read-only
/// from the outside.
///
/// [`MethodBody`]: crate::instr::MethodBody
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    /// Decoded operation
    pub kind: InstrKind,
    /// Byte position in the original encoding. Carried into replacements
    /// so the encoder can seed its re-layout; never interpreted here.
    pub offset: u32,
    pub(crate) prev: Option<InstrRef>,
    pub(crate) next: Option<InstrRef>,
}

impl Instruction {
    pub(crate) fn new(kind: InstrKind, offset: u32) -> Self {
        Self {
            kind,
            offset,
            prev: None,
            next: None,
        }
    }

    /// Linked predecessor in the body order.
    #[inline]
    pub fn prev(&self) -> Option<InstrRef> {
        self.prev
    }

    /// Linked successor in the body order.
    #[inline]
    pub fn next(&self) -> Option<InstrRef> {
        self.next
    }

    /// Byte size the container encoding uses for this instruction.
    ///
    /// Constants -1..=8 encoded `W8` take the dedicated one-byte compact
    /// forms; other immediates cost one opcode byte plus their width.
    /// Local accesses have one-byte forms for slots 0..=3 and two-byte
    /// forms for byte-sized slots.
    pub fn encoded_len(&self) -> usize {
        match self.kind {
            InstrKind::LoadLocal(slot) | InstrKind::StoreLocal(slot) => match slot.0 {
                0..=3 => 1,
                4..=255 => 2,
                _ => 4,
            },
            InstrKind::LoadConstInt { value, width } => {
                if width == IntWidth::W8 && (-1..=8).contains(&value) {
                    1
                } else {
                    1 + width.immediate_size()
                }
            }
            InstrKind::Branch(_) => 5,
            InstrKind::Arith(_) | InstrKind::Return | InstrKind::Opaque(_) => 1,
        }
    }
}
