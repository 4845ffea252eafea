//! # opscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the opscope library. Import this module to get quick access to everything needed
//! to disassemble, rewrite and reassemble a code unit.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all opscope operations
pub use crate::Error;

/// The result type used throughout opscope
pub use crate::Result;

/// Configuration of graph construction and assembly
pub use crate::{AssemblerConfig, DisassemblerConfig};

// ================================================================================================
// Instruction Sets and Instructions
// ================================================================================================

/// Opcode descriptions
pub use crate::assembly::{
    FlowType, InstructionSet, Opcode, OpcodeInfo, OpcodeTable, OperandKind, StackEffect,
};

/// Symbolic instructions
pub use crate::assembly::{Instruction, Operand};

/// Code-unit metadata and its tables
pub use crate::assembly::{CodeFlags, CodeUnitMetadata, Constant, Table, TableKind};

// ================================================================================================
// Encoding and Decoding
// ================================================================================================

/// Encoded streams and assembly results
pub use crate::assembly::{Assembly, Bytecode};

/// Graph construction
pub use crate::disassembler::{decode_stream, disassemble, disassemble_with, RawInstruction};

/// Block graph
pub use crate::disassembler::{BasicBlock, Block, BlockId, BlockTarget, FunctionBlock, NestedBlock};

// ================================================================================================
// Pattern Matching and Rewriting
// ================================================================================================

/// Generic pattern engine
pub use crate::pattern::{MatchResult, Matcher, Pattern, Strategy, Value, Verdict};

/// Instruction patterns and graph search
pub use crate::rewrite::{
    find_pattern, fixed_opcode, Captured, DepthTarget, InstructionPattern, OperandMatch,
    SearchOutcome, StackEffectMatcher,
};
