//! Unit stream decoding.
//!
//! This module turns an encoded unit stream into flat [`RawInstruction`] tuples: extension
//! prefixes are folded into the instruction they precede, branch targets are resolved to
//! absolute unit offsets and marked on the instruction they land on, and the position table
//! is attached to the instructions at which a new position starts.
//!
//! # Example: Decoding a Single Instruction
//!
//! ```rust
//! use opscope::assembly::{FlowType, OpcodeTable, OperandKind, StackEffect};
//! use opscope::disassembler::decode_instruction;
//!
//! let mut isa = OpcodeTable::new(144);
//! isa.define(100, "LOAD_CONST", OperandKind::Const, FlowType::Sequential, StackEffect::Fixed(1))?;
//!
//! // EXTENDED_ARG 1, LOAD_CONST 2 -> LOAD_CONST 258
//! let code = [144, 0x01, 100, 0x02];
//! let raw = decode_instruction(&code, 0, &isa)?;
//! assert_eq!(raw.arg, Some(258));
//! assert_eq!(raw.size, 2);
//! # Ok::<(), opscope::Error>(())
//! ```

use rustc_hash::FxHashMap;

use crate::{
    assembly::{
        bytecode::{Bytecode, MAX_PREFIXES, UNIT_SIZE},
        opcodes::{InstructionSet, Opcode, OperandKind},
        positions::PositionEntry,
    },
    Error::OutOfBounds,
    Result,
};

/// One decoded instruction of a unit stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    /// Unit offset of the instruction, its extension prefixes included
    pub offset: u32,
    /// Number of units, extension prefixes included
    pub size: u32,
    /// The opcode
    pub opcode: Opcode,
    /// The folded argument, `None` for opcodes without operand
    pub arg: Option<u32>,
    /// Absolute unit offset of the branch target
    pub target: Option<u32>,
    /// Source position starting at this instruction
    pub line: Option<u32>,
    /// Some branch of the stream lands here
    pub is_jump_target: bool,
}

impl RawInstruction {
    /// Unit offset of the following instruction.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }
}

/// Decodes the instruction starting at unit `unit`.
///
/// # Arguments
///
/// * `code` - The unit stream
/// * `unit` - Unit offset at which the instruction (or its first prefix) starts
/// * `isa`  - Instruction set describing the opcodes
///
/// Only the folded value is kept. Opcodes without operand drop their argument byte and any
/// prefixes in front of them, and assembly emits the fewest prefixes an argument needs, so
/// redundant prefixes do not survive a round trip. `size` still counts them.
///
/// # Errors
///
/// Returns an error if:
/// - The stream ends inside the instruction
/// - More than three extension prefixes precede an instruction
/// - The opcode is not defined by `isa`
/// - A relative branch target overflows
pub fn decode_instruction(
    code: &[u8],
    unit: usize,
    isa: &dyn InstructionSet,
) -> Result<RawInstruction> {
    let read = |index: usize| -> Result<(u8, u8)> {
        let start = index * UNIT_SIZE;
        match code.get(start..start + UNIT_SIZE) {
            Some(bytes) => Ok((bytes[0], bytes[1])),
            None => Err(OutOfBounds),
        }
    };

    let mut current = unit;
    let mut extended: u32 = 0;
    let mut prefixes = 0;
    let (opcode, low) = loop {
        let (opcode, arg) = read(current)?;
        current += 1;
        if opcode != isa.extended_arg() {
            break (opcode, arg);
        }

        prefixes += 1;
        if prefixes > MAX_PREFIXES {
            return Err(malformed_error!(
                "More than {} extension prefixes at unit {}",
                MAX_PREFIXES,
                unit
            ));
        }
        extended = (extended << 8) | u32::from(arg);
    };

    let offset = u32::try_from(unit).map_err(|_| OutOfBounds)?;
    let size = u32::try_from(current - unit).map_err(|_| OutOfBounds)?;
    let kind = isa.operand_kind(opcode)?;
    let arg = match kind {
        OperandKind::None => None,
        _ => Some((extended << 8) | u32::from(low)),
    };

    let target = match (kind, arg) {
        (OperandKind::JumpAbsolute, Some(arg)) => Some(arg),
        (OperandKind::JumpRelative, Some(arg)) => {
            Some((offset + size).checked_add(arg).ok_or_else(|| {
                malformed_error!("Relative branch at unit {} overflows", offset)
            })?)
        }
        _ => None,
    };

    Ok(RawInstruction {
        offset,
        size,
        opcode,
        arg,
        target,
        line: None,
        is_jump_target: false,
    })
}

/// Decodes a complete unit stream and marks every branch target.
///
/// # Errors
///
/// Returns an error if the stream has an odd length, contains an undecodable instruction, or
/// if a branch lands between instructions or outside of the stream.
pub fn decode_stream(code: &[u8], isa: &dyn InstructionSet) -> Result<Vec<RawInstruction>> {
    if code.len() % UNIT_SIZE != 0 {
        return Err(malformed_error!(
            "Unit stream has a length of {} bytes",
            code.len()
        ));
    }

    let units = code.len() / UNIT_SIZE;
    let mut instructions = Vec::new();
    let mut by_offset = FxHashMap::default();
    let mut unit = 0;

    while unit < units {
        let instruction = decode_instruction(code, unit, isa)?;
        unit += instruction.size as usize;
        by_offset.insert(instruction.offset, instructions.len());
        instructions.push(instruction);
    }

    let targets: Vec<u32> = instructions.iter().filter_map(|ins| ins.target).collect();
    for target in targets {
        let index = by_offset.get(&target).copied().ok_or_else(|| {
            malformed_error!("Branch target unit {} does not start an instruction", target)
        })?;
        instructions[index].is_jump_target = true;
    }

    Ok(instructions)
}

/// Marks the instructions at which a position from `entries` starts.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if an entry points between instructions.
pub fn attach_positions(
    instructions: &mut [RawInstruction],
    entries: &[PositionEntry],
) -> Result<()> {
    let by_offset: FxHashMap<u32, usize> = instructions
        .iter()
        .enumerate()
        .map(|(index, ins)| (ins.offset, index))
        .collect();
    let end = instructions.last().map_or(0, RawInstruction::next_offset);

    for entry in entries {
        let unit = entry.offset / UNIT_SIZE as u32;
        if unit == end && entry.offset % UNIT_SIZE as u32 == 0 {
            continue;
        }

        match by_offset.get(&unit) {
            Some(&index) if entry.offset % UNIT_SIZE as u32 == 0 => {
                instructions[index].line = Some(entry.line);
            }
            _ => {
                return Err(malformed_error!(
                    "Position entry at byte {} does not start an instruction",
                    entry.offset
                ))
            }
        }
    }

    Ok(())
}

/// Decodes `bytecode` including its position table.
///
/// # Errors
///
/// See [`decode_stream`] and [`attach_positions`].
pub fn decode_bytecode(bytecode: &Bytecode, isa: &dyn InstructionSet) -> Result<Vec<RawInstruction>> {
    let mut instructions = decode_stream(&bytecode.code, isa)?;
    attach_positions(&mut instructions, &bytecode.line_starts()?)?;
    Ok(instructions)
}
