//! Encoded form of a code unit.
//!
//! The stream is a sequence of two byte units, `(opcode, argument)`. Arguments that do not
//! fit a byte are split into bytes, most significant first, and every byte but the last is
//! carried by an extension prefix unit in front of the instruction.

use crate::{
    assembly::{
        opcodes::Opcode,
        positions::{decode_positions, PositionEntry},
    },
    Result,
};

/// Size of one unit in bytes.
pub const UNIT_SIZE: usize = 2;

/// Largest argument a single unit can carry.
pub const UNIT_ARG_MAX: u32 = 0xFF;

/// Maximum number of extension prefixes in front of one instruction.
pub const MAX_PREFIXES: usize = 3;

/// An encoded code unit: the unit stream plus its position table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytecode {
    /// The unit stream
    pub code: Vec<u8>,
    /// Position of the first instruction
    pub first_line: u32,
    /// Encoded (byte-delta, position-delta) pairs, see [`crate::assembly::positions`]
    pub positions: Vec<u8>,
}

impl Bytecode {
    /// Creates a new instance from its parts.
    #[must_use]
    pub fn new(code: Vec<u8>, first_line: u32, positions: Vec<u8>) -> Self {
        Bytecode {
            code,
            first_line,
            positions,
        }
    }

    /// Number of units in the stream.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.code.len() / UNIT_SIZE
    }

    /// Decodes the position table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the table is damaged.
    pub fn line_starts(&self) -> Result<Vec<PositionEntry>> {
        decode_positions(self.first_line, &self.positions)
    }
}

/// Number of extension prefixes needed to carry `arg`.
#[must_use]
pub fn prefix_count(arg: u32) -> usize {
    match arg {
        0..=0xFF => 0,
        0x100..=0xFFFF => 1,
        0x1_0000..=0xFF_FFFF => 2,
        _ => 3,
    }
}

/// Appends one instruction with exactly `prefixes` extension units.
///
/// A relative branch may need more prefixes than its final argument, a leading zero prefix
/// is valid.
pub(crate) fn emit_unit(
    out: &mut Vec<u8>,
    extended_arg: Opcode,
    opcode: Opcode,
    arg: u32,
    prefixes: usize,
) {
    for shift in (1..=prefixes).rev() {
        let byte = arg.checked_shr(8 * shift as u32).unwrap_or(0) & UNIT_ARG_MAX;
        out.push(extended_arg);
        out.push(byte as u8);
    }
    out.push(opcode);
    out.push((arg & UNIT_ARG_MAX) as u8);
}
