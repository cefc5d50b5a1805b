//! Method body container: instruction arena plus canonical order.
//!
//! Instructions live in an arena that is never compacted, so an
//! [`InstrRef`] handle stays valid across edits. The execution order is a
//! separate index vector; `prev`/`next` links and the handle-to-position
//! map are recomputed from it after every structural edit, as one step.
//! Removing an instruction redirects any branch that targeted it to the
//! removed region's successor, so live branches never dangle.

use std::fmt;

use itertools::Itertools;

use super::ops::{InstrKind, InstrRef, Instruction};

/// Errors raised by structural edits and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// Branch whose target is not a live member of the order
    DanglingBranch { at: usize },
    /// `prev`/`next` links disagree with the canonical order
    BrokenLink { at: usize },
    /// Branch target assignment aimed at a non-branch instruction
    NotABranch { found: &'static str },
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingBranch { at } => {
                write!(f, "branch at position {} targets a removed instruction", at)
            }
            Self::BrokenLink { at } => {
                write!(f, "links at position {} disagree with the order", at)
            }
            Self::NotABranch { found } => {
                write!(f, "cannot set a branch target on `{}`", found)
            }
        }
    }
}

impl std::error::Error for BodyError {}

/// Result type for method body edits.
pub type BodyResult<T> = Result<T, BodyError>;

/// Mutable instruction sequence for exactly one method body.
///
/// The body exclusively owns its instructions and their links; handles
/// never cross bodies. Cloning a body clones the arena, so the clone's
/// handles resolve against the clone with the same meaning.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Backing store, append-only
    arena: Vec<Instruction>,
    /// Canonical execution order
    order: Vec<InstrRef>,
    /// Arena index -> order position; `None` for detached instructions
    pos: Vec<Option<u32>>,
    /// Byte offset the next plain `push` assigns
    next_offset: u32,
}

impl Default for MethodBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBody {
    /// Create an empty method body.
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            order: Vec::new(),
            pos: Vec::new(),
            next_offset: 0,
        }
    }

    /// Append an instruction, assigning the next sequential byte offset.
    pub fn push(&mut self, kind: InstrKind) -> InstrRef {
        let offset = self.next_offset;
        self.push_at(kind, offset)
    }

    /// Append an instruction carrying an explicit decoded byte offset.
    pub fn push_at(&mut self, kind: InstrKind, offset: u32) -> InstrRef {
        let r = InstrRef::new(self.arena.len());
        let instr = Instruction::new(kind, offset);
        self.next_offset = offset + instr.encoded_len() as u32;
        self.arena.push(instr);
        self.pos.push(Some(self.order.len() as u32));
        self.order.push(r);
        let end = self.order.len() - 1;
        self.relink(end, end);
        r
    }

    /// Append a branch with a placeholder target, to be patched via
    /// [`set_branch_target`] once the target instruction exists.
    ///
    /// [`set_branch_target`]: MethodBody::set_branch_target
    pub fn push_branch(&mut self) -> InstrRef {
        let placeholder = InstrRef::new(self.arena.len());
        self.push(InstrKind::Branch(placeholder))
    }

    /// Point an existing branch at `target`.
    pub fn set_branch_target(&mut self, branch: InstrRef, target: InstrRef) -> BodyResult<()> {
        match &mut self.arena[branch.index()].kind {
            InstrKind::Branch(t) => {
                *t = target;
                Ok(())
            }
            other => Err(BodyError::NotABranch {
                found: other.mnemonic(),
            }),
        }
    }

    /// Number of live instructions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the body holds no live instructions.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handle of the first instruction in order.
    pub fn first(&self) -> Option<InstrRef> {
        self.order.first().copied()
    }

    /// Handle of the last instruction in order.
    pub fn last(&self) -> Option<InstrRef> {
        self.order.last().copied()
    }

    /// Handle at an order position. Panics when out of range.
    pub fn at(&self, index: usize) -> InstrRef {
        self.order[index]
    }

    /// Instruction at an order position.
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.order.get(index).map(|r| &self.arena[r.index()])
    }

    /// Operation at an order position.
    pub fn kind(&self, index: usize) -> Option<InstrKind> {
        self.get(index).map(|instr| instr.kind)
    }

    /// Resolve a handle. Valid for any handle this body issued, detached
    /// instructions included.
    pub fn instr(&self, r: InstrRef) -> &Instruction {
        &self.arena[r.index()]
    }

    /// Current order position of a handle, `None` once detached.
    pub fn index_of(&self, r: InstrRef) -> Option<usize> {
        self.pos.get(r.index()).copied().flatten().map(|p| p as usize)
    }

    /// Iterate instructions in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.order.iter().map(move |r| &self.arena[r.index()])
    }

    /// Iterate handles in canonical order.
    pub fn iter_refs(&self) -> impl Iterator<Item = InstrRef> + '_ {
        self.order.iter().copied()
    }

    /// Iterate handles by following `next` links from the first
    /// instruction. Matches [`iter_refs`] whenever the links are intact.
    ///
    /// [`iter_refs`]: MethodBody::iter_refs
    pub fn iter_linked(&self) -> LinkedRefs<'_> {
        LinkedRefs {
            body: self,
            cursor: self.first(),
        }
    }

    /// Operations in canonical order, for pattern assertions and dumps.
    pub fn kinds(&self) -> Vec<InstrKind> {
        self.iter().map(|instr| instr.kind).collect()
    }

    /// Total encoded size of the live instructions in bytes.
    pub fn code_size(&self) -> usize {
        self.iter().map(|instr| instr.encoded_len()).sum()
    }

    /// Insert an instruction at an order position, shifting the rest up.
    /// The new instruction takes over the byte offset of the instruction
    /// it displaces.
    pub fn insert_at(&mut self, index: usize, kind: InstrKind) -> InstrRef {
        let offset = match self.order.get(index) {
            Some(r) => self.arena[r.index()].offset,
            None => self.next_offset,
        };
        let r = InstrRef::new(self.arena.len());
        self.arena.push(Instruction::new(kind, offset));
        self.pos.push(None);
        self.order.insert(index, r);
        self.renumber(index);
        self.relink(index, index);
        r
    }

    /// Remove the instruction at an order position.
    pub fn remove_at(&mut self, index: usize) -> BodyResult<()> {
        self.remove_range(index, index)
    }

    /// Remove the instructions at positions `start..=end`.
    ///
    /// Surviving branches that targeted a removed instruction are
    /// redirected to the region's successor. When the region reaches the
    /// end of the body no successor exists; such a branch would dangle,
    /// so the edit is refused and the body is left untouched.
    pub fn remove_range(&mut self, start: usize, end: usize) -> BodyResult<()> {
        debug_assert!(start <= end && end < self.order.len());
        let successor = self.order.get(end + 1).copied();
        let mut redirects: Vec<InstrRef> = Vec::new();
        for (i, &r) in self.order.iter().enumerate() {
            if (start..=end).contains(&i) {
                continue;
            }
            if let InstrKind::Branch(target) = self.arena[r.index()].kind {
                if self
                    .index_of(target)
                    .is_some_and(|t| (start..=end).contains(&t))
                {
                    match successor {
                        Some(_) => redirects.push(r),
                        None => return Err(BodyError::DanglingBranch { at: i }),
                    }
                }
            }
        }
        for r in redirects {
            if let (InstrKind::Branch(t), Some(s)) =
                (&mut self.arena[r.index()].kind, successor)
            {
                *t = s;
            }
        }
        self.detach(start, end);
        self.order.drain(start..=end);
        self.renumber(start);
        if !self.order.is_empty() {
            self.relink(start, start);
        }
        Ok(())
    }

    /// Replace the instructions at positions `start..=end` with a single
    /// new instruction, which inherits the first replaced instruction's
    /// byte offset. Branches that targeted anything in the window are
    /// redirected to the replacement.
    pub fn replace_range(&mut self, start: usize, end: usize, kind: InstrKind) -> InstrRef {
        debug_assert!(start <= end && end < self.order.len());
        let offset = self.arena[self.order[start].index()].offset;
        let replacement = InstrRef::new(self.arena.len());
        self.arena.push(Instruction::new(kind, offset));
        self.pos.push(None);
        for i in 0..self.order.len() {
            if (start..=end).contains(&i) {
                continue;
            }
            let r = self.order[i];
            if let InstrKind::Branch(target) = self.arena[r.index()].kind {
                if self
                    .index_of(target)
                    .is_some_and(|t| (start..=end).contains(&t))
                {
                    if let InstrKind::Branch(t) = &mut self.arena[r.index()].kind {
                        *t = replacement;
                    }
                }
            }
        }
        self.detach(start, end);
        self.order.splice(start..=end, std::iter::once(replacement));
        self.renumber(start);
        self.relink(start, start);
        replacement
    }

    /// Recompute `prev`/`next` links for the order positions
    /// `start..=end`, stitching one instruction beyond each side so the
    /// window's boundaries agree with their neighbors. Indices beyond the
    /// current length are clamped.
    pub fn relink(&mut self, start: usize, end: usize) {
        if self.order.is_empty() {
            return;
        }
        let last = self.order.len() - 1;
        let lo = start.saturating_sub(1).min(last);
        let hi = end.saturating_add(1).min(last);
        for i in lo..=hi {
            let r = self.order[i];
            let prev = if i > 0 { Some(self.order[i - 1]) } else { None };
            let next = self.order.get(i + 1).copied();
            let instr = &mut self.arena[r.index()];
            instr.prev = prev;
            instr.next = next;
        }
    }

    /// Check structural integrity: every branch target live, every link
    /// in agreement with the canonical order.
    pub fn validate(&self) -> BodyResult<()> {
        for (i, &r) in self.order.iter().enumerate() {
            let instr = &self.arena[r.index()];
            let want_prev = if i > 0 { Some(self.order[i - 1]) } else { None };
            let want_next = self.order.get(i + 1).copied();
            if instr.prev != want_prev || instr.next != want_next {
                return Err(BodyError::BrokenLink { at: i });
            }
            if let InstrKind::Branch(target) = instr.kind {
                if self.index_of(target).is_none() {
                    return Err(BodyError::DanglingBranch { at: i });
                }
            }
        }
        Ok(())
    }

    fn detach(&mut self, start: usize, end: usize) {
        for i in start..=end {
            let r = self.order[i];
            self.pos[r.index()] = None;
            let instr = &mut self.arena[r.index()];
            instr.prev = None;
            instr.next = None;
        }
    }

    fn renumber(&mut self, from: usize) {
        for i in from..self.order.len() {
            let r = self.order[i];
            self.pos[r.index()] = Some(i as u32);
        }
    }
}

/// Iterator following `next` links, yielding handles.
pub struct LinkedRefs<'a> {
    body: &'a MethodBody,
    cursor: Option<InstrRef>,
}

impl Iterator for LinkedRefs<'_> {
    type Item = InstrRef;

    fn next(&mut self) -> Option<InstrRef> {
        let r = self.cursor?;
        self.cursor = self.body.instr(r).next;
        Some(r)
    }
}

impl fmt::Display for MethodBody {
    /// Disassembly listing, one instruction per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.iter().map(|instr| match instr.kind {
            InstrKind::LoadLocal(slot) => {
                format!("{:04x}: load_local {}", instr.offset, slot)
            }
            InstrKind::StoreLocal(slot) => {
                format!("{:04x}: store_local {}", instr.offset, slot)
            }
            InstrKind::LoadConstInt { value, .. } => {
                format!("{:04x}: load_const {}", instr.offset, value)
            }
            InstrKind::Arith(op) => format!("{:04x}: {}", instr.offset, op.mnemonic()),
            InstrKind::Branch(target) => {
                format!(
                    "{:04x}: branch {:04x}",
                    instr.offset,
                    self.instr(target).offset
                )
            }
            InstrKind::Return => format!("{:04x}: return", instr.offset),
            InstrKind::Opaque(code) => {
                format!("{:04x}: opaque 0x{:04x}", instr.offset, code)
            }
        });
        write!(f, "{}", lines.format("\n"))
    }
}
