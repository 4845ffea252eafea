//! Shared fixtures for the integration tests.
//!
//! The instruction set mirrors a small subset of a well known stack VM, including its unit
//! layout (opcode byte, argument byte) and the `EXTENDED_ARG` prefix opcode 144.

#![allow(dead_code)]

use std::sync::Arc;

use opscope::prelude::*;

pub const EXTENDED_ARG: u8 = 144;

pub const POP_TOP: u8 = 1;
pub const BINARY_MULTIPLY: u8 = 20;
pub const BINARY_ADD: u8 = 23;
pub const BINARY_SUBTRACT: u8 = 24;
pub const RETURN_VALUE: u8 = 83;
pub const LOAD_CONST: u8 = 100;
pub const BUILD_TUPLE: u8 = 102;
pub const BUILD_MAP: u8 = 105;
pub const COMPARE_OP: u8 = 107;
pub const JUMP_FORWARD: u8 = 110;
pub const JUMP_ABSOLUTE: u8 = 113;
pub const POP_JUMP_IF_FALSE: u8 = 114;
pub const LOAD_GLOBAL: u8 = 116;
pub const LOAD_FAST: u8 = 124;
pub const STORE_FAST: u8 = 125;
pub const CALL_FUNCTION: u8 = 131;

/// The fixture instruction set
pub fn isa() -> Arc<dyn InstructionSet> {
    use FlowType::*;
    use OperandKind as K;

    let definitions = [
        (POP_TOP, "POP_TOP", K::None, Sequential, StackEffect::Fixed(-1)),
        (BINARY_MULTIPLY, "BINARY_MULTIPLY", K::None, Sequential, StackEffect::Fixed(-1)),
        (BINARY_ADD, "BINARY_ADD", K::None, Sequential, StackEffect::Fixed(-1)),
        (BINARY_SUBTRACT, "BINARY_SUBTRACT", K::None, Sequential, StackEffect::Fixed(-1)),
        (RETURN_VALUE, "RETURN_VALUE", K::None, Return, StackEffect::Fixed(-1)),
        (LOAD_CONST, "LOAD_CONST", K::Const, Sequential, StackEffect::Fixed(1)),
        (BUILD_TUPLE, "BUILD_TUPLE", K::Immediate, Sequential, StackEffect::Linear { base: 1, per_arg: -1 }),
        (BUILD_MAP, "BUILD_MAP", K::Immediate, Sequential, StackEffect::Linear { base: 1, per_arg: -2 }),
        (COMPARE_OP, "COMPARE_OP", K::Immediate, Sequential, StackEffect::Fixed(-1)),
        (JUMP_FORWARD, "JUMP_FORWARD", K::JumpRelative, UnconditionalBranch, StackEffect::Fixed(0)),
        (JUMP_ABSOLUTE, "JUMP_ABSOLUTE", K::JumpAbsolute, UnconditionalBranch, StackEffect::Fixed(0)),
        (POP_JUMP_IF_FALSE, "POP_JUMP_IF_FALSE", K::JumpAbsolute, ConditionalBranch, StackEffect::Fixed(-1)),
        (LOAD_GLOBAL, "LOAD_GLOBAL", K::Name, Sequential, StackEffect::Fixed(1)),
        (LOAD_FAST, "LOAD_FAST", K::Local, Sequential, StackEffect::Fixed(1)),
        (STORE_FAST, "STORE_FAST", K::Local, Sequential, StackEffect::Fixed(-1)),
        (CALL_FUNCTION, "CALL_FUNCTION", K::Immediate, Sequential, StackEffect::Linear { base: 0, per_arg: -1 }),
    ];

    let mut table = OpcodeTable::new(EXTENDED_ARG);
    for (opcode, mnemonic, operand, flow, stack) in definitions {
        table
            .define(opcode, mnemonic, operand, flow, stack)
            .expect("fixture opcodes are unique");
    }
    Arc::new(table)
}

/// `def factorial(n, r=1)` with the recursive call in tail position
///
/// ```text
///  0 LOAD_FAST          0 (n)        line 2
///  1 LOAD_CONST         0 (1)
///  2 COMPARE_OP         2 (==)
///  3 POP_JUMP_IF_FALSE  6
///  4 LOAD_FAST          1 (r)
///  5 RETURN_VALUE
///  6 LOAD_GLOBAL        0 (factorial) line 3
///  7 LOAD_FAST          0 (n)
///  8 LOAD_CONST         0 (1)
///  9 BINARY_SUBTRACT
/// 10 LOAD_FAST          1 (r)
/// 11 LOAD_FAST          0 (n)
/// 12 BINARY_MULTIPLY
/// 13 CALL_FUNCTION      2
/// 14 RETURN_VALUE
/// ```
pub fn factorial() -> (Bytecode, CodeUnitMetadata) {
    let code = vec![
        LOAD_FAST, 0, LOAD_CONST, 0, COMPARE_OP, 2, POP_JUMP_IF_FALSE, 6,
        LOAD_FAST, 1, RETURN_VALUE, 0,
        LOAD_GLOBAL, 0, LOAD_FAST, 0, LOAD_CONST, 0, BINARY_SUBTRACT, 0,
        LOAD_FAST, 1, LOAD_FAST, 0, BINARY_MULTIPLY, 0, CALL_FUNCTION, 2, RETURN_VALUE, 0,
    ];

    let mut metadata = CodeUnitMetadata::new("factorial", "<fixture>", 2);
    metadata.argcount = 2;
    metadata.stack_size = 4;
    metadata.ensure_const(1);
    metadata.ensure_name("factorial");
    metadata.ensure_local("n");
    metadata.ensure_local("r");

    (Bytecode::new(code, 2, vec![12, 1]), metadata)
}

/// `def odd(n)` returning `even(n - 1)` for non-zero arguments
///
/// ```text
///  0 LOAD_FAST          0 (n)        line 2
///  1 LOAD_CONST         1 (0)
///  2 COMPARE_OP         2 (==)
///  3 POP_JUMP_IF_FALSE  6
///  4 LOAD_CONST         2 (False)
///  5 RETURN_VALUE
///  6 LOAD_GLOBAL        0 (even)     line 3
///  7 LOAD_FAST          0 (n)
///  8 LOAD_CONST         3 (1)
///  9 BINARY_SUBTRACT
/// 10 CALL_FUNCTION      1
/// 11 RETURN_VALUE
/// ```
pub fn odd() -> (Bytecode, CodeUnitMetadata) {
    let code = vec![
        LOAD_FAST, 0, LOAD_CONST, 1, COMPARE_OP, 2, POP_JUMP_IF_FALSE, 6,
        LOAD_CONST, 2, RETURN_VALUE, 0,
        LOAD_GLOBAL, 0, LOAD_FAST, 0, LOAD_CONST, 3, BINARY_SUBTRACT, 0,
        CALL_FUNCTION, 1, RETURN_VALUE, 0,
    ];

    let mut metadata = CodeUnitMetadata::new("odd", "<fixture>", 2);
    metadata.argcount = 1;
    metadata.stack_size = 3;
    metadata.ensure_const(Constant::None);
    metadata.ensure_const(0);
    metadata.ensure_const(false);
    metadata.ensure_const(1);
    metadata.ensure_name("even");
    metadata.ensure_local("n");

    (Bytecode::new(code, 2, vec![12, 1]), metadata)
}

/// `def area(r)` computing `PI * r * r + OFFSET` from two globals
pub fn area() -> (Bytecode, CodeUnitMetadata) {
    let code = vec![
        LOAD_GLOBAL, 0, LOAD_FAST, 0, BINARY_MULTIPLY, 0, LOAD_FAST, 0, BINARY_MULTIPLY, 0,
        LOAD_GLOBAL, 1, BINARY_ADD, 0, RETURN_VALUE, 0,
    ];

    let mut metadata = CodeUnitMetadata::new("area", "<fixture>", 1);
    metadata.argcount = 1;
    metadata.stack_size = 2;
    metadata.ensure_const(Constant::None);
    metadata.ensure_name("PI");
    metadata.ensure_name("OFFSET");
    metadata.ensure_local("r");

    (Bytecode::new(code, 1, Vec::new()), metadata)
}
