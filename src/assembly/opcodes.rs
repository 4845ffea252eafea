//! Instruction set description.
//!
//! The meaning of an opcode (which metadata table its operand indexes, how it moves the
//! value stack, whether it branches) is owned by whoever defines the virtual machine. This
//! module is the seam: the [`InstructionSet`] trait is everything the assembler, the
//! disassembler and the rewrite adapter ask about an opcode, and [`OpcodeTable`] is a
//! data-driven implementation that callers fill in at startup.
//!
//! # Examples
//!
//! ```rust
//! use opscope::assembly::{FlowType, InstructionSet, OpcodeTable, OperandKind, StackEffect};
//!
//! let mut table = OpcodeTable::new(144);
//! table
//!     .define(100, "LOAD_CONST", OperandKind::Const, FlowType::Sequential, StackEffect::Fixed(1))?
//!     .define(83, "RETURN_VALUE", OperandKind::None, FlowType::Return, StackEffect::Fixed(-1))?;
//!
//! assert_eq!(table.opcode("LOAD_CONST")?, 100);
//! assert!(table.is_terminal(83));
//! # Ok::<(), opscope::Error>(())
//! ```

use std::fmt;

use rustc_hash::FxHashMap;
use strum::Display;

use crate::{assembly::metadata::TableKind, Error, Result};

/// A single opcode byte. Its meaning is defined by an [`InstructionSet`].
pub type Opcode = u8;

/// What the argument of an opcode refers to.
///
/// The operand kind decides how a symbolic [`crate::assembly::Operand`] is turned into an
/// encoded argument and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OperandKind {
    /// The opcode takes no argument; the argument byte is encoded as zero
    #[strum(serialize = "none")]
    None,
    /// A raw integer, encoded as is
    #[strum(serialize = "immediate")]
    Immediate,
    /// Index into the symbol name table
    #[strum(serialize = "name")]
    Name,
    /// Index into the local name table
    #[strum(serialize = "local")]
    Local,
    /// Index into the constant pool
    #[strum(serialize = "constant")]
    Const,
    /// Index into the combined cell + free name space
    #[strum(serialize = "free")]
    Free,
    /// Branch, encoded as the distance from the end of the instruction
    #[strum(serialize = "relative jump")]
    JumpRelative,
    /// Branch, encoded as the unit offset of the target
    #[strum(serialize = "absolute jump")]
    JumpAbsolute,
}

impl OperandKind {
    /// Returns `true` for both branch encodings.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(self, OperandKind::JumpRelative | OperandKind::JumpAbsolute)
    }

    /// The metadata table this kind indexes, if any.
    #[must_use]
    pub fn table(self) -> Option<TableKind> {
        match self {
            OperandKind::Name => Some(TableKind::Names),
            OperandKind::Local => Some(TableKind::Locals),
            OperandKind::Const => Some(TableKind::Consts),
            OperandKind::Free => Some(TableKind::Frees),
            _ => None,
        }
    }
}

/// How an opcode affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location, otherwise falls through
    ConditionalBranch,
    /// Always branches to another location
    UnconditionalBranch,
    /// Leaves the code unit
    Return,
}

/// Net effect of an opcode on the value stack.
///
/// Most opcodes move the stack by a fixed amount. Opcodes that consume a variable number of
/// values (calls, tuple builders) scale with their argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Always the same delta
    Fixed(i32),
    /// `base + per_arg * argument`
    Linear {
        /// Delta with an argument of zero
        base: i32,
        /// Added delta per unit of argument
        per_arg: i32,
    },
}

impl StackEffect {
    /// Evaluates the delta for a concrete argument value.
    #[must_use]
    pub fn apply(self, arg: u32) -> i32 {
        match self {
            StackEffect::Fixed(delta) => delta,
            StackEffect::Linear { base, per_arg } => {
                let scaled = i64::from(per_arg) * i64::from(arg) + i64::from(base);
                i32::try_from(scaled).unwrap_or(if scaled < 0 { i32::MIN } else { i32::MAX })
            }
        }
    }
}

/// Everything the crate knows about one opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// The opcode byte
    pub opcode: Opcode,
    /// Human readable name, unique within the instruction set
    pub mnemonic: String,
    /// What the argument refers to
    pub operand: OperandKind,
    /// Control flow behaviour
    pub flow: FlowType,
    /// Stack behaviour
    pub stack: StackEffect,
}

/// Describes the opcodes of a stack virtual machine.
///
/// Implementors only provide [`InstructionSet::info`], [`InstructionSet::lookup`] and
/// [`InstructionSet::extended_arg`]; everything else is derived.
pub trait InstructionSet: fmt::Debug {
    /// Description of `opcode`, `None` if the opcode is not defined.
    fn info(&self, opcode: Opcode) -> Option<&OpcodeInfo>;

    /// Reverse lookup from a mnemonic to its opcode.
    fn lookup(&self, mnemonic: &str) -> Option<Opcode>;

    /// The opcode of the extension prefix unit that carries high argument bits.
    fn extended_arg(&self) -> Opcode;

    /// Like [`InstructionSet::info`], failing for unknown opcodes.
    ///
    /// # Errors
    /// Returns [`Error::UnknownOpcode`] if `opcode` is not defined.
    fn describe(&self, opcode: Opcode) -> Result<&OpcodeInfo> {
        self.info(opcode).ok_or(Error::UnknownOpcode(opcode))
    }

    /// Like [`InstructionSet::lookup`], failing for unknown mnemonics.
    ///
    /// # Errors
    /// Returns [`Error::UnknownMnemonic`] if no opcode carries `mnemonic`.
    fn opcode(&self, mnemonic: &str) -> Result<Opcode> {
        self.lookup(mnemonic)
            .ok_or_else(|| Error::UnknownMnemonic(mnemonic.to_string()))
    }

    /// The operand kind of `opcode`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownOpcode`] if `opcode` is not defined.
    fn operand_kind(&self, opcode: Opcode) -> Result<OperandKind> {
        Ok(self.describe(opcode)?.operand)
    }

    /// Stack delta of `opcode` for argument `arg`; a missing argument counts as zero.
    ///
    /// # Errors
    /// Returns [`Error::UnknownOpcode`] if `opcode` is not defined.
    fn stack_effect(&self, opcode: Opcode, arg: Option<u32>) -> Result<i32> {
        Ok(self.describe(opcode)?.stack.apply(arg.unwrap_or(0)))
    }

    /// `true` if `opcode` carries a branch target. Unknown opcodes never branch.
    fn is_jump(&self, opcode: Opcode) -> bool {
        self.info(opcode).is_some_and(|info| info.operand.is_jump())
    }

    /// `true` if execution never continues after `opcode` (unconditional jump or return).
    fn is_terminal(&self, opcode: Opcode) -> bool {
        self.info(opcode).is_some_and(|info| {
            matches!(info.flow, FlowType::UnconditionalBranch | FlowType::Return)
        })
    }
}

/// Table-driven [`InstructionSet`].
///
/// Opcodes are registered one by one with [`OpcodeTable::define`]. The extension prefix
/// opcode is fixed at construction and can not be redefined as a regular instruction.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeInfo>>,
    mnemonics: FxHashMap<String, Opcode>,
    extended_arg: Opcode,
}

impl OpcodeTable {
    /// Creates an empty table whose extension prefix is `extended_arg`.
    #[must_use]
    pub fn new(extended_arg: Opcode) -> Self {
        OpcodeTable {
            entries: vec![None; usize::from(Opcode::MAX) + 1],
            mnemonics: FxHashMap::default(),
            extended_arg,
        }
    }

    /// Registers an opcode.
    ///
    /// ## Arguments
    /// * 'opcode'   - The opcode byte
    /// * 'mnemonic' - Unique name of the opcode
    /// * 'operand'  - What its argument refers to
    /// * 'flow'     - Control flow behaviour
    /// * 'stack'    - Stack behaviour
    ///
    /// # Errors
    /// Returns [`Error::DuplicateOpcode`] if the opcode, or the mnemonic, is already taken, or
    /// if `opcode` is the extension prefix.
    pub fn define(
        &mut self,
        opcode: Opcode,
        mnemonic: &str,
        operand: OperandKind,
        flow: FlowType,
        stack: StackEffect,
    ) -> Result<&mut Self> {
        let slot = &mut self.entries[usize::from(opcode)];
        if slot.is_some() || opcode == self.extended_arg {
            return Err(Error::DuplicateOpcode(opcode));
        }
        if let Some(existing) = self.mnemonics.get(mnemonic) {
            return Err(Error::DuplicateOpcode(*existing));
        }

        *slot = Some(OpcodeInfo {
            opcode,
            mnemonic: mnemonic.to_string(),
            operand,
            flow,
            stack,
        });
        self.mnemonics.insert(mnemonic.to_string(), opcode);
        Ok(self)
    }

    /// Number of defined opcodes, the extension prefix excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mnemonics.len()
    }

    /// `true` if no opcode has been defined yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mnemonics.is_empty()
    }

    /// Iterates over all defined opcodes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &OpcodeInfo> {
        self.entries.iter().flatten()
    }
}

impl InstructionSet for OpcodeTable {
    fn info(&self, opcode: Opcode) -> Option<&OpcodeInfo> {
        self.entries.get(usize::from(opcode))?.as_ref()
    }

    fn lookup(&self, mnemonic: &str) -> Option<Opcode> {
        self.mnemonics.get(mnemonic).copied()
    }

    fn extended_arg(&self) -> Opcode {
        self.extended_arg
    }
}
