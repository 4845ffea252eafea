//! Instruction-level pattern leaves.

use crate::{
    assembly::{Instruction, Opcode, Operand},
    pattern::{CaptureValue, Captures, Pattern, Verdict},
};

/// Pattern over the instructions of a basic block.
pub type InstructionPattern = Pattern<Instruction, Captured>;

/// A value captured while matching instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Captured {
    /// A single matched instruction
    Instruction(Instruction),
    /// A run of matched instructions
    Instructions(Vec<Instruction>),
    /// The operand of a matched instruction
    Operand(Operand),
    /// A running stack depth, see [`crate::rewrite::StackEffectMatcher`]
    Depth(i64),
}

impl Captured {
    /// The captured operand. A depth reads as an immediate of the same value and an
    /// instruction as its operand.
    #[must_use]
    pub fn as_operand(&self) -> Option<Operand> {
        match self {
            Captured::Operand(operand) => Some(operand.clone()),
            Captured::Instruction(instruction) => Some(instruction.operand.clone()),
            Captured::Depth(depth) => u32::try_from(*depth).ok().map(Operand::Immediate),
            Captured::Instructions(_) => None,
        }
    }

    /// The captured depth, or the value of a captured immediate.
    #[must_use]
    pub fn as_depth(&self) -> Option<i64> {
        match self {
            Captured::Depth(depth) => Some(*depth),
            Captured::Operand(Operand::Immediate(value)) => Some(i64::from(*value)),
            _ => None,
        }
    }

    /// The captured instructions; a single instruction reads as a run of one.
    #[must_use]
    pub fn as_instructions(&self) -> Option<&[Instruction]> {
        match self {
            Captured::Instruction(instruction) => Some(std::slice::from_ref(instruction)),
            Captured::Instructions(instructions) => Some(instructions),
            _ => None,
        }
    }

    /// `true` if this value, used as a backreference, equals `operand`.
    #[must_use]
    pub fn matches_operand(&self, operand: &Operand) -> bool {
        self.as_operand().is_some_and(|value| value == *operand)
    }
}

impl CaptureValue<Instruction> for Captured {
    fn from_token(token: &Instruction) -> Self {
        Captured::Instruction(token.clone())
    }

    fn from_slice(tokens: &[Instruction]) -> Self {
        Captured::Instructions(tokens.to_vec())
    }

    fn matches(&self, token: &Instruction) -> bool {
        self.as_instructions() == Some(std::slice::from_ref(token))
    }
}

/// Expected operand of [`fixed_opcode`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperandMatch {
    /// A fixed operand
    Literal(Operand),
    /// The value bound to an earlier capture
    Back(String),
}

impl From<Operand> for OperandMatch {
    fn from(operand: Operand) -> Self {
        OperandMatch::Literal(operand)
    }
}

/// One instruction with opcode `opcode`.
///
/// If `operand` is given the operand must equal it; a backreference resolving to a captured
/// [`Captured::Depth`] equals an [`Operand::Immediate`] of the same value. If
/// `capture_operand` is given the operand is bound under that name.
///
/// # Examples
///
/// ```rust
/// use opscope::assembly::Operand;
/// use opscope::rewrite::{fixed_opcode, OperandMatch};
///
/// // LOAD_GLOBAL <anything>, bound as "callee"
/// let load = fixed_opcode(116, None, Some("callee"));
/// // CALL_FUNCTION with the argument count captured earlier as "argc"
/// let call = fixed_opcode(131, Some(OperandMatch::Back("argc".into())), None);
/// let ret = fixed_opcode(83, Some(Operand::None.into()), None);
/// let _pattern = load + call + ret;
/// ```
#[must_use]
pub fn fixed_opcode(
    opcode: Opcode,
    operand: Option<OperandMatch>,
    capture_operand: Option<&str>,
) -> InstructionPattern {
    let capture = capture_operand.map(str::to_string);

    Pattern::function(move |captures: &Captures<Captured>, instruction: &Instruction| {
        if instruction.opcode != opcode {
            return Ok(Verdict::Reject);
        }

        let operand_ok = match &operand {
            None => true,
            Some(OperandMatch::Literal(expected)) => instruction.operand == *expected,
            Some(OperandMatch::Back(name)) => {
                captures.get(name)?.matches_operand(&instruction.operand)
            }
        };
        if !operand_ok {
            return Ok(Verdict::Reject);
        }

        Ok(match &capture {
            Some(name) => Verdict::Bind(vec![(
                name.clone(),
                Captured::Operand(instruction.operand.clone()),
            )]),
            None => Verdict::Accept,
        })
    })
}

/// One instruction whose opcode is any of `opcodes`, bound under `capture` if given.
#[must_use]
pub fn opcode_in(opcodes: &[Opcode], capture: Option<&str>) -> InstructionPattern {
    let opcodes = opcodes.to_vec();
    let pattern = Pattern::function(move |_: &Captures<Captured>, instruction: &Instruction| {
        Ok(Verdict::from(opcodes.contains(&instruction.opcode)))
    });

    match capture {
        Some(name) => pattern.capture(name),
        None => pattern,
    }
}
