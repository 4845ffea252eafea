//! Instruction and operand model.
//!
//! An [`Instruction`] is an opcode plus an [`Operand`]. Operands are kept symbolic while a
//! code unit is being rewritten: constants and names are stored by value and only turned
//! into table indices by the assembler, branch targets are stored as
//! [`crate::disassembler::BlockTarget`] labels and only turned into offsets once the final
//! layout is known.
//!
//! # Examples
//!
//! ```rust
//! use opscope::assembly::{Instruction, Operand, OpcodeTable, OperandKind, FlowType, StackEffect};
//!
//! let mut isa = OpcodeTable::new(144);
//! isa.define(116, "LOAD_GLOBAL", OperandKind::Name, FlowType::Sequential, StackEffect::Fixed(1))?;
//!
//! let load = Instruction::named(&isa, "LOAD_GLOBAL", Operand::name("print"))?;
//! assert_eq!(load.opcode, 116);
//! assert_eq!(load.stack_effect(&isa)?, 1);
//! # Ok::<(), opscope::Error>(())
//! ```

use std::fmt;

use crate::{
    assembly::{
        metadata::{CodeUnitMetadata, Constant, TableKind},
        opcodes::{InstructionSet, Opcode, OperandKind},
    },
    disassembler::{BlockId, BlockTarget},
    Error, Result,
};

/// The argument of an [`Instruction`].
///
/// Which variant is valid for an opcode is decided by its [`OperandKind`]:
///
/// | Kind | Operand |
/// |---|---|
/// | `None` | `None` |
/// | `Immediate` | `Immediate` |
/// | `Name`, `Local`, `Free` | `Name` |
/// | `Const` | `Const` |
/// | `JumpRelative`, `JumpAbsolute` | `Label` |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// No operand present
    None,
    /// A raw integer argument
    Immediate(u32),
    /// A value of the constant pool
    Const(Constant),
    /// A symbol of the name, local or closure tables
    Name(String),
    /// A branch target inside the same code unit
    Label(BlockTarget),
}

impl Operand {
    /// Shorthand for [`Operand::Name`].
    pub fn name(name: impl Into<String>) -> Self {
        Operand::Name(name.into())
    }

    /// Shorthand for [`Operand::Const`].
    pub fn constant(value: impl Into<Constant>) -> Self {
        Operand::Const(value.into())
    }

    /// Shorthand for [`Operand::Label`].
    #[must_use]
    pub fn label(block: BlockId, offset: usize) -> Self {
        Operand::Label(BlockTarget::new(block, offset))
    }

    /// The label, if this operand is one.
    #[must_use]
    pub fn as_label(&self) -> Option<BlockTarget> {
        match self {
            Operand::Label(target) => Some(*target),
            _ => None,
        }
    }

    /// The raw integer, if this operand is one.
    #[must_use]
    pub fn as_immediate(&self) -> Option<u32> {
        match self {
            Operand::Immediate(value) => Some(*value),
            _ => None,
        }
    }

    /// `true` if this operand variant is the one `kind` expects.
    #[must_use]
    pub fn fits(&self, kind: OperandKind) -> bool {
        match self {
            Operand::None => kind == OperandKind::None,
            Operand::Immediate(_) => kind == OperandKind::Immediate,
            Operand::Const(_) => kind == OperandKind::Const,
            Operand::Name(_) => matches!(
                kind,
                OperandKind::Name | OperandKind::Local | OperandKind::Free
            ),
            Operand::Label(_) => kind.is_jump(),
        }
    }

    /// Resolves a raw argument into a symbolic operand.
    ///
    /// Branches are not handled here, their targets are only known once blocks exist.
    pub(crate) fn resolve(
        kind: OperandKind,
        arg: Option<u32>,
        metadata: &CodeUnitMetadata,
    ) -> Result<Self> {
        let index = arg.unwrap_or(0);
        let missing = |table| Error::SymbolIndex { table, index };

        Ok(match kind {
            OperandKind::None | OperandKind::JumpRelative | OperandKind::JumpAbsolute => {
                Operand::None
            }
            OperandKind::Immediate => Operand::Immediate(index),
            OperandKind::Const => Operand::Const(
                metadata
                    .consts
                    .get(index)
                    .cloned()
                    .ok_or_else(|| missing(TableKind::Consts))?,
            ),
            OperandKind::Name => Operand::Name(
                metadata
                    .names
                    .get(index)
                    .cloned()
                    .ok_or_else(|| missing(TableKind::Names))?,
            ),
            OperandKind::Local => Operand::Name(
                metadata
                    .locals
                    .get(index)
                    .cloned()
                    .ok_or_else(|| missing(TableKind::Locals))?,
            ),
            OperandKind::Free => Operand::Name(
                metadata
                    .free_name(index)
                    .map(str::to_string)
                    .ok_or_else(|| missing(TableKind::Frees))?,
            ),
        })
    }

    /// Turns a non-branch operand into its raw argument.
    ///
    /// With `strict` unset, an `Immediate` is accepted for any symbolic kind and passed through
    /// as a raw table index, and `None` encodes as zero.
    pub(crate) fn encode(
        &self,
        opcode: Opcode,
        kind: OperandKind,
        metadata: &CodeUnitMetadata,
        strict: bool,
    ) -> Result<u32> {
        let mismatch = || Error::OperandMismatch {
            opcode,
            expected: kind,
        };
        let not_found = |table, symbol: String| Error::SymbolNotFound { table, symbol };

        match (kind, self) {
            (OperandKind::None, Operand::None) | (OperandKind::Immediate, Operand::None) => {
                Ok(0)
            }
            (OperandKind::Immediate, Operand::Immediate(value)) => Ok(*value),
            (OperandKind::Const, Operand::Const(value)) => metadata
                .consts
                .index_of(value)
                .ok_or_else(|| not_found(TableKind::Consts, format!("{value:?}"))),
            (OperandKind::Name, Operand::Name(name)) => metadata
                .names
                .index_of(name.as_str())
                .ok_or_else(|| not_found(TableKind::Names, name.clone())),
            (OperandKind::Local, Operand::Name(name)) => metadata
                .locals
                .index_of(name.as_str())
                .ok_or_else(|| not_found(TableKind::Locals, name.clone())),
            (OperandKind::Free, Operand::Name(name)) => metadata
                .free_index(name)
                .ok_or_else(|| not_found(TableKind::Frees, name.clone())),
            (kind, Operand::Immediate(value)) if !strict && !kind.is_jump() => Ok(*value),
            (kind, Operand::None) if !strict && !kind.is_jump() => Ok(0),
            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::Const(value) => write!(f, "{value:?}"),
            Operand::Name(name) => write!(f, "{name}"),
            Operand::Label(target) => write!(f, "{target}"),
        }
    }
}

/// One instruction of a code unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// The opcode
    pub opcode: Opcode,
    /// The symbolic operand
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction from its parts.
    #[must_use]
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Creates an instruction without operand.
    #[must_use]
    pub fn simple(opcode: Opcode) -> Self {
        Instruction::new(opcode, Operand::None)
    }

    /// Creates an instruction from its mnemonic.
    ///
    /// # Errors
    /// Returns [`Error::UnknownMnemonic`] if `isa` does not know `mnemonic`, or
    /// [`Error::OperandMismatch`] if `operand` does not fit the opcode.
    pub fn named(isa: &dyn InstructionSet, mnemonic: &str, operand: Operand) -> Result<Self> {
        let opcode = isa.opcode(mnemonic)?;
        let kind = isa.operand_kind(opcode)?;
        if !operand.fits(kind) {
            return Err(Error::OperandMismatch {
                opcode,
                expected: kind,
            });
        }

        Ok(Instruction::new(opcode, operand))
    }

    /// `true` if this instruction carries a branch target.
    #[must_use]
    pub fn is_jump(&self, isa: &dyn InstructionSet) -> bool {
        isa.is_jump(self.opcode)
    }

    /// `true` if execution never continues after this instruction.
    #[must_use]
    pub fn is_terminal(&self, isa: &dyn InstructionSet) -> bool {
        isa.is_terminal(self.opcode)
    }

    /// Net stack delta. Only immediate operands parameterize the effect; every other operand
    /// counts as an argument of zero.
    ///
    /// # Errors
    /// Returns [`Error::UnknownOpcode`] if `isa` does not define the opcode.
    pub fn stack_effect(&self, isa: &dyn InstructionSet) -> Result<i32> {
        isa.stack_effect(self.opcode, self.operand.as_immediate())
    }

    /// The branch target, if any.
    #[must_use]
    pub fn label(&self) -> Option<BlockTarget> {
        self.operand.as_label()
    }

    /// Mnemonic and operand, for diagnostics.
    #[must_use]
    pub fn render(&self, isa: &dyn InstructionSet) -> String {
        let mnemonic = isa
            .info(self.opcode)
            .map_or_else(|| format!("<{:#04x}>", self.opcode), |info| info.mnemonic.clone());

        match self.operand {
            Operand::None => mnemonic,
            _ => format!("{mnemonic} {}", self.operand),
        }
    }
}
