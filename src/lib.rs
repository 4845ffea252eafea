// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # opscope
//!
//! A toolkit for disassembling, pattern-matching and reassembling the bytecode of
//! stack-based virtual machines.
//!
//! `opscope` turns a linear instruction stream into a graph of basic blocks whose branches
//! point at blocks instead of byte offsets, lets you locate instruction windows with
//! backtracking patterns and rewrite them in place, and turns the graph back into an
//! encoded stream with consistent branch arguments, symbol tables and line positions.
//!
//! ## Features
//!
//! - **🔍 Block graph disassembly** - Decode unit-based streams with extension prefixes and split them at branch targets
//! - **🧩 Backtracking patterns** - Alternation, repetition, lookahead and backreferences over any token type
//! - **🔧 Graph rewriting** - Run patterns over every basic block and edit instructions and symbol tables in place
//! - **⚡ Fixed-point assembly** - Branch arguments and their prefixes settle in a bounded number of passes
//! - **🛡️ Pluggable instruction sets** - Opcode tables describe operand kinds, control flow and stack effects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opscope::prelude::*;
//!
//! fn roundtrip(isa: std::sync::Arc<dyn InstructionSet>, bytecode: &Bytecode, metadata: CodeUnitMetadata)
//!     -> opscope::Result<Vec<u8>>
//! {
//!     let graph = disassemble(bytecode, metadata, isa)?;
//!     let assembly = graph.assemble()?;
//!     Ok(assembly.bytecode.code)
//! }
//! ```
//!
//! ## Architecture
//!
//! `opscope` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`assembly`] - Instruction sets, symbolic instructions, code-unit metadata and the assembler
//! - [`disassembler`] - Stream decoding and block graph construction
//! - [`pattern`] - Generic backtracking pattern engine
//! - [`rewrite`] - Instruction patterns and graph-wide search and replace
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with the crate [`Error`]. Structural
//! problems of a graph ([`Error::is_structural`]) are kept apart from failed symbol or
//! capture lookups ([`Error::is_lookup`]). A pattern that does not match is not an error.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger itself.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use opscope::prelude::*;
///
/// let config = AssemblerConfig::strict();
/// assert!(config.verify_operands);
/// ```
pub mod prelude;

/// Instruction sets, symbolic instructions and the assembler.
///
/// # Key Types
///
/// - [`assembly::InstructionSet`] / [`assembly::OpcodeTable`] - Describe opcodes
/// - [`assembly::Instruction`] / [`assembly::Operand`] - Symbolic instructions
/// - [`assembly::CodeUnitMetadata`] - Symbol tables, constants and header values of a code unit
/// - [`assembly::Bytecode`] - An encoded stream with its position table
/// - [`assembly::Assembly`] - Result of assembling a block graph
pub mod assembly;

/// Configuration of the disassembler and assembler.
pub mod config;

/// Stream decoding and block graph construction.
///
/// # Main Functions
///
/// - [`disassembler::decode_instruction`] - Decode a single instruction
/// - [`disassembler::decode_stream`] - Decode a whole stream
/// - [`disassembler::disassemble`] - Build the block graph of a code unit
pub mod disassembler;

/// Backtracking pattern matching over token sequences.
pub mod pattern;

/// Instruction patterns and rewriting of block graphs.
pub mod rewrite;

/// `opscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `opscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

pub use config::{AssemblerConfig, DisassemblerConfig};
