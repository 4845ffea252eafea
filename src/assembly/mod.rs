//! Instruction model, code unit metadata and the block graph assembler.
//!
//! This module holds everything needed to turn a block graph back into an encoded unit
//! stream: the symbolic [`Instruction`] and [`Operand`] types, the [`InstructionSet`] seam
//! describing opcodes, the per code unit tables in [`CodeUnitMetadata`], and the fixed-point
//! assembler itself.
//!
//! # Key Types
//! - [`Instruction`] / [`Operand`] - Opcode plus symbolic argument
//! - [`InstructionSet`] / [`OpcodeTable`] - Operand kind, control flow and stack effect per opcode
//! - [`CodeUnitMetadata`] - Constant, name, local, free and cell tables plus header fields
//! - [`Bytecode`] - Encoded unit stream with its position table
//! - [`Assembly`] - Result of [`crate::disassembler::FunctionBlock::assemble`]
//!
//! # Main Functions
//! - [`linearize`] - Deterministic block order honoring fallthrough labels
//! - [`encode_positions`] / [`decode_positions`] - Position table codec
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use opscope::assembly::{
//!     CodeUnitMetadata, FlowType, Instruction, OpcodeTable, Operand, OperandKind, StackEffect,
//! };
//! use opscope::disassembler::{BasicBlock, FunctionBlock};
//!
//! let mut isa = OpcodeTable::new(144);
//! isa.define(100, "LOAD_CONST", OperandKind::Const, FlowType::Sequential, StackEffect::Fixed(1))?
//!     .define(83, "RETURN_VALUE", OperandKind::None, FlowType::Return, StackEffect::Fixed(-1))?;
//!
//! let mut metadata = CodeUnitMetadata::new("answer", "<demo>", 1);
//! metadata.ensure_const(42);
//!
//! let mut block = BasicBlock::new(1, Some(1));
//! block.instructions.push(Instruction::named(&isa, "LOAD_CONST", Operand::constant(42))?);
//! block.instructions.push(Instruction::named(&isa, "RETURN_VALUE", Operand::None)?);
//!
//! let mut graph = FunctionBlock::new(metadata, Arc::new(isa), 1);
//! graph.insert(block)?;
//!
//! let assembly = graph.assemble()?;
//! assert_eq!(assembly.bytecode.code, [100, 0, 83, 0]);
//! # Ok::<(), opscope::Error>(())
//! ```

pub(crate) mod bytecode;
mod encoder;
pub(crate) mod instruction;
pub mod layout;
pub(crate) mod metadata;
pub(crate) mod opcodes;
pub mod positions;

pub use bytecode::{prefix_count, Bytecode, MAX_PREFIXES, UNIT_ARG_MAX, UNIT_SIZE};
pub use encoder::Assembly;
pub use instruction::{Instruction, Operand};
pub use layout::linearize;
pub use metadata::{CodeFlags, CodeUnitMetadata, Constant, Table, TableKind};
pub use opcodes::{
    FlowType, InstructionSet, Opcode, OpcodeInfo, OpcodeTable, OperandKind, StackEffect,
};
pub use positions::{decode_positions, encode_positions, PositionEntry};
