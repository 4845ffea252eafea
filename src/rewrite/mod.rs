//! Pattern matching on block graphs.
//!
//! This module connects the generic [`crate::pattern`] engine to disassembled code. Patterns
//! run over the instructions of each basic block, with captures of type [`Captured`].
//!
//! # Key Components
//!
//! - [`fixed_opcode`] / [`opcode_in`] - Single-instruction leaves with operand checks
//! - [`StackEffectMatcher`] - Runs of instructions with a given net stack effect
//! - [`find_pattern`] - Walks a [`crate::disassembler::FunctionBlock`] and hands matches to a
//!   rewriting callback
//!
//! # Example
//!
//! Replacing `LOAD_CONST c; POP_TOP` pairs, which have no effect, by nothing:
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//! use opscope::disassembler::FunctionBlock;
//! use opscope::rewrite::{find_pattern, fixed_opcode};
//!
//! fn drop_dead_loads(graph: &mut FunctionBlock) -> opscope::Result<()> {
//!     let load = graph.isa().opcode("LOAD_CONST")?;
//!     let pop = graph.isa().opcode("POP_TOP")?;
//!
//!     let pattern = fixed_opcode(load, None, None) + fixed_opcode(pop, None, None);
//!     find_pattern(graph, pattern, |block, found, _| {
//!         block.instructions.drain(found.range());
//!         Ok(ControlFlow::Continue(()))
//!     })?;
//!     Ok(())
//! }
//! ```

mod predicates;
mod search;
mod stack;

pub use predicates::{fixed_opcode, opcode_in, Captured, InstructionPattern, OperandMatch};
pub use search::{find_pattern, SearchOutcome};
pub use stack::{DepthTarget, StackEffectMatcher};
