//! Decoded instruction model for one method body.
//!
//! A [`MethodBody`] is the unit the optimizer works on: an arena of
//! [`Instruction`]s plus their canonical execution order. The arena is
//! never compacted, so [`InstrRef`] handles (including branch targets)
//! stay stable across every insert and remove; links and positions are
//! recomputed in one step after each edit.
//!
//! # Example
//!
//! ```
//! use ilpeep::instr::{BinOp, InstrKind, IntWidth, MethodBody};
//!
//! let mut body = MethodBody::new();
//! body.push(InstrKind::LoadConstInt { value: 3, width: IntWidth::W8 });
//! body.push(InstrKind::LoadConstInt { value: 4, width: IntWidth::W8 });
//! body.push(InstrKind::Arith(BinOp::Add));
//! body.push(InstrKind::Return);
//!
//! assert_eq!(body.len(), 4);
//! assert!(body.validate().is_ok());
//! ```

pub mod body;
pub mod ops;

pub use body::{BodyError, BodyResult, LinkedRefs, MethodBody};
pub use ops::{BinOp, InstrKind, InstrRef, Instruction, IntWidth, SlotId};
