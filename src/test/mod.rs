//! Shared helpers for unit tests.
//!
//! The toy instruction set uses the opcode numbers of a well known stack VM so that encoded
//! test streams can be cross-checked against external disassemblers.

use std::sync::Arc;

use crate::{
    assembly::{
        Bytecode, CodeUnitMetadata, FlowType, Instruction, InstructionSet, OpcodeTable, Operand,
        OperandKind, StackEffect,
    },
    disassembler::{BasicBlock, BlockId, BlockTarget, FunctionBlock},
};

pub const EXTENDED_ARG: u8 = 144;

const TOY_OPCODES: &[(u8, &str, OperandKind, FlowType, StackEffect)] = &[
    (1, "POP_TOP", OperandKind::None, FlowType::Sequential, StackEffect::Fixed(-1)),
    (9, "NOP", OperandKind::None, FlowType::Sequential, StackEffect::Fixed(0)),
    (20, "BINARY_MULTIPLY", OperandKind::None, FlowType::Sequential, StackEffect::Fixed(-1)),
    (23, "BINARY_ADD", OperandKind::None, FlowType::Sequential, StackEffect::Fixed(-1)),
    (24, "BINARY_SUBTRACT", OperandKind::None, FlowType::Sequential, StackEffect::Fixed(-1)),
    (83, "RETURN_VALUE", OperandKind::None, FlowType::Return, StackEffect::Fixed(-1)),
    (90, "STORE_NAME", OperandKind::Name, FlowType::Sequential, StackEffect::Fixed(-1)),
    (93, "FOR_ITER", OperandKind::JumpRelative, FlowType::ConditionalBranch, StackEffect::Fixed(1)),
    (97, "STORE_GLOBAL", OperandKind::Name, FlowType::Sequential, StackEffect::Fixed(-1)),
    (100, "LOAD_CONST", OperandKind::Const, FlowType::Sequential, StackEffect::Fixed(1)),
    (101, "LOAD_NAME", OperandKind::Name, FlowType::Sequential, StackEffect::Fixed(1)),
    (102, "BUILD_TUPLE", OperandKind::Immediate, FlowType::Sequential, StackEffect::Linear { base: 1, per_arg: -1 }),
    (107, "COMPARE_OP", OperandKind::Immediate, FlowType::Sequential, StackEffect::Fixed(-1)),
    (110, "JUMP_FORWARD", OperandKind::JumpRelative, FlowType::UnconditionalBranch, StackEffect::Fixed(0)),
    (113, "JUMP_ABSOLUTE", OperandKind::JumpAbsolute, FlowType::UnconditionalBranch, StackEffect::Fixed(0)),
    (114, "POP_JUMP_IF_FALSE", OperandKind::JumpAbsolute, FlowType::ConditionalBranch, StackEffect::Fixed(-1)),
    (115, "POP_JUMP_IF_TRUE", OperandKind::JumpAbsolute, FlowType::ConditionalBranch, StackEffect::Fixed(-1)),
    (116, "LOAD_GLOBAL", OperandKind::Name, FlowType::Sequential, StackEffect::Fixed(1)),
    (124, "LOAD_FAST", OperandKind::Local, FlowType::Sequential, StackEffect::Fixed(1)),
    (125, "STORE_FAST", OperandKind::Local, FlowType::Sequential, StackEffect::Fixed(-1)),
    (131, "CALL_FUNCTION", OperandKind::Immediate, FlowType::Sequential, StackEffect::Linear { base: 0, per_arg: -1 }),
    (135, "LOAD_CLOSURE", OperandKind::Free, FlowType::Sequential, StackEffect::Fixed(1)),
    (136, "LOAD_DEREF", OperandKind::Free, FlowType::Sequential, StackEffect::Fixed(1)),
    (137, "STORE_DEREF", OperandKind::Free, FlowType::Sequential, StackEffect::Fixed(-1)),
];

// Helper function to create the toy instruction set
pub fn toy_isa() -> OpcodeTable {
    let mut isa = OpcodeTable::new(EXTENDED_ARG);
    for &(opcode, mnemonic, operand, flow, stack) in TOY_OPCODES {
        isa.define(opcode, mnemonic, operand, flow, stack)
            .expect("toy opcodes are unique");
    }
    isa
}

// Helper function to create a shared handle to the toy instruction set
pub fn toy_isa_handle() -> Arc<dyn InstructionSet> {
    Arc::new(toy_isa())
}

// Helper function to create a toy instruction from its mnemonic
pub fn ins(mnemonic: &str, operand: Operand) -> Instruction {
    Instruction::named(&toy_isa(), mnemonic, operand).expect("valid toy instruction")
}

/// `return 1 if x else 2`, the else branch on line 2
///
/// ```text
/// 0 LOAD_FAST          0 (x)
/// 1 POP_JUMP_IF_FALSE  4
/// 2 LOAD_CONST         0 (1)
/// 3 RETURN_VALUE
/// 4 LOAD_CONST         1 (2)      line 2
/// 5 RETURN_VALUE
/// ```
pub fn branchy_bytecode() -> Bytecode {
    Bytecode::new(
        vec![124, 0, 114, 4, 100, 0, 83, 0, 100, 1, 83, 0],
        1,
        vec![8, 1],
    )
}

// Helper function to create the metadata matching `branchy_bytecode`
pub fn branchy_metadata() -> CodeUnitMetadata {
    let mut metadata = CodeUnitMetadata::new("branchy", "<test>", 1);
    metadata.argcount = 1;
    metadata.stack_size = 1;
    metadata.ensure_local("x");
    metadata.ensure_const(1);
    metadata.ensure_const(2);
    metadata
}

// Helper function to create a basic block from toy instructions
pub fn basic_block(
    id: BlockId,
    body: &[(&str, Operand)],
    jump: Option<(&str, Operand)>,
    fallthrough: Option<BlockId>,
) -> BasicBlock {
    let mut block = BasicBlock::new(id, None);
    block.instructions = body
        .iter()
        .map(|(mnemonic, operand)| ins(mnemonic, operand.clone()))
        .collect();
    block.jump = jump.map(|(mnemonic, operand)| ins(mnemonic, operand));
    block.fallthrough = fallthrough.map(BlockTarget::start);
    block
}

// Helper function to create a graph over the toy instruction set
pub fn function_block(metadata: CodeUnitMetadata, blocks: Vec<BasicBlock>) -> FunctionBlock {
    let mut graph = FunctionBlock::new(metadata, toy_isa_handle(), 1);
    for block in blocks {
        graph.insert(block).expect("unique block ids");
    }
    graph
}
