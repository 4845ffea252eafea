//! Block graph reconstruction from encoded unit streams.
//!
//! Decoding happens in two stages. The [`decode_stream`] family turns units into flat
//! [`RawInstruction`]s, folding extension prefixes and marking branch targets; the
//! [`build_graph`] scan then groups them into [`BasicBlock`]s with symbolic operands and
//! `(block, index)` labels, owned by a [`FunctionBlock`].
//!
//! # Key Types
//! - [`FunctionBlock`] - Block graph plus metadata of one code unit
//! - [`Block`] - A leaf [`BasicBlock`] or a grouping [`NestedBlock`]
//! - [`BlockTarget`] - Label naming a block and an instruction index inside it
//! - [`RawInstruction`] - One decoded instruction before symbolization
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_stream`] - Decode a unit stream and mark branch targets
//! - [`disassemble`] - Decode [`crate::assembly::Bytecode`] straight into a block graph
//!
//! # Example
//! ```rust
//! use opscope::assembly::{FlowType, OpcodeTable, OperandKind, StackEffect};
//! use opscope::disassembler::decode_stream;
//!
//! let mut isa = OpcodeTable::new(144);
//! isa.define(9, "NOP", OperandKind::None, FlowType::Sequential, StackEffect::Fixed(0))?
//!     .define(113, "JUMP_ABSOLUTE", OperandKind::JumpAbsolute, FlowType::UnconditionalBranch, StackEffect::Fixed(0))?;
//!
//! let stream = decode_stream(&[9, 0, 113, 0], &isa)?;
//! assert!(stream[0].is_jump_target);
//! assert_eq!(stream[1].target, Some(0));
//! # Ok::<(), opscope::Error>(())
//! ```

mod block;
mod builder;
mod decoder;

pub use block::{BasicBlock, Block, BlockId, BlockTarget, FunctionBlock, NestedBlock};
pub use builder::{build_graph, disassemble, disassemble_with};
pub use decoder::{
    attach_positions, decode_bytecode, decode_instruction, decode_stream, RawInstruction,
};
