//! Integration tests for complete rewrite recipes.
//!
//! Each test disassembles a fixture, rewrites it with `find_pattern`, reassembles it and
//! checks the produced stream, and where useful disassembles the result again.

mod common;

use std::{collections::HashMap, ops::ControlFlow};

use common::*;
use opscope::{prelude::*, rewrite::opcode_in, Result};

/// Turns `return <self>(args...)` into argument stores plus a jump back to the entry.
fn tail_call_to_loop(graph: &mut FunctionBlock) -> Result<SearchOutcome> {
    let name = graph.metadata.name.clone();
    let argc = i64::from(graph.metadata.argcount);
    let entry = graph.entry;

    let pattern = fixed_opcode(LOAD_GLOBAL, Some(Operand::name(name).into()), None)
        + StackEffectMatcher::new(graph.isa_handle(), DepthTarget::values([argc]))
            .capture("argc")
            .into_pattern()
        + fixed_opcode(CALL_FUNCTION, Some(OperandMatch::Back("argc".into())), None)
        + fixed_opcode(RETURN_VALUE, None, None);

    find_pattern(graph, pattern, |block, found, metadata| {
        assert_eq!(found.end, block.instructions.len());
        let argc = found
            .get("argc")
            .and_then(Captured::as_depth)
            .and_then(|depth| usize::try_from(depth).ok())
            .expect("argument count captured");

        // keep the argument computations, drop the callee load, the call and the return
        block.instructions.truncate(found.end - 2);
        block.instructions.remove(found.start);

        // the last argument is on top of the stack
        let parameters: Vec<String> = metadata.locals.iter().take(argc).cloned().collect();
        for parameter in parameters.into_iter().rev() {
            metadata.ensure_local(&parameter);
            block.instructions.push(Instruction::new(STORE_FAST, Operand::name(parameter)));
        }

        block.jump = Some(Instruction::new(JUMP_ABSOLUTE, Operand::label(entry, 0)));
        block.fallthrough = None;
        Ok(ControlFlow::Continue(()))
    })
}

#[test]
fn test_tail_call_becomes_loop() -> Result<()> {
    let (bytecode, metadata) = factorial();
    let mut graph = disassemble(&bytecode, metadata, isa())?;

    let outcome = tail_call_to_loop(&mut graph)?;
    assert_eq!(outcome, SearchOutcome { matches: 1, stopped: false });

    let assembly = graph.assemble_with(&AssemblerConfig::strict())?;
    assert_eq!(
        assembly.bytecode.code,
        [
            LOAD_FAST, 0, LOAD_CONST, 0, COMPARE_OP, 2, POP_JUMP_IF_FALSE, 6,
            LOAD_FAST, 1, RETURN_VALUE, 0,
            LOAD_FAST, 0, LOAD_CONST, 0, BINARY_SUBTRACT, 0, LOAD_FAST, 1, LOAD_FAST, 0,
            BINARY_MULTIPLY, 0, STORE_FAST, 1, STORE_FAST, 0, JUMP_ABSOLUTE, 0,
        ]
    );
    assert_eq!(assembly.bytecode.first_line, 2);
    assert_eq!(assembly.bytecode.positions, [12, 1]);
    assert_eq!(assembly.stack_depth, Some(3));
    // the declared bound is only ever raised
    assert_eq!(assembly.metadata.stack_size, 4);

    // the loop survives another disassembly
    let again = disassemble(&assembly.bytecode, assembly.metadata, isa())?;
    let blocks = again.as_basic_blocks();
    assert_eq!(blocks.len(), 3);
    assert_eq!(
        blocks[2].jump.as_ref().and_then(Instruction::label),
        Some(BlockTarget::start(again.entry))
    );
    Ok(())
}

#[test]
fn test_tail_call_to_other_function_is_left_alone() -> Result<()> {
    let (bytecode, metadata) = odd();
    let mut graph = disassemble(&bytecode, metadata, isa())?;

    let outcome = tail_call_to_loop(&mut graph)?;
    assert_eq!(outcome.matches, 0);
    assert_eq!(graph.assemble()?.bytecode.code, bytecode.code);
    Ok(())
}

#[test]
fn test_tail_call_becomes_thunk() -> Result<()> {
    let (bytecode, metadata) = odd();
    let mut graph = disassemble(&bytecode, metadata, isa())?;

    let thunk = Constant::Object("thunk".into());
    let pattern = fixed_opcode(LOAD_GLOBAL, None, Some("function"))
        + StackEffectMatcher::new(isa(), DepthTarget::predicate(|depth| depth >= 0))
            .capture("argc")
            .into_pattern()
        + fixed_opcode(CALL_FUNCTION, Some(OperandMatch::Back("argc".into())), None)
        + fixed_opcode(RETURN_VALUE, None, None);

    let mut callees = Vec::new();
    let outcome = find_pattern(&mut graph, pattern, |block, found, metadata| {
        callees.push(found.get("function").cloned());
        let argc = found
            .get("argc")
            .and_then(Captured::as_depth)
            .and_then(|depth| u32::try_from(depth).ok())
            .expect("argument count captured");

        metadata.ensure_const(thunk.clone());
        let mut rewritten = vec![Instruction::new(LOAD_CONST, Operand::Const(thunk.clone()))];
        rewritten.extend_from_slice(&block.instructions[found.start..found.end - 2]);
        rewritten.extend([
            Instruction::new(BUILD_TUPLE, Operand::Immediate(argc)),
            Instruction::new(BUILD_MAP, Operand::Immediate(0)),
            Instruction::new(CALL_FUNCTION, Operand::Immediate(3)),
            Instruction::simple(RETURN_VALUE),
        ]);
        block.instructions.splice(found.range(), rewritten);
        Ok(ControlFlow::Continue(()))
    })?;

    assert_eq!(outcome.matches, 1);
    assert_eq!(callees, [Some(Captured::Operand(Operand::name("even")))]);

    let assembly = graph.assemble_with(&AssemblerConfig::strict())?;
    assert_eq!(
        assembly.bytecode.code,
        [
            LOAD_FAST, 0, LOAD_CONST, 1, COMPARE_OP, 2, POP_JUMP_IF_FALSE, 6,
            LOAD_CONST, 2, RETURN_VALUE, 0,
            LOAD_CONST, 4, LOAD_GLOBAL, 0, LOAD_FAST, 0, LOAD_CONST, 3, BINARY_SUBTRACT, 0,
            BUILD_TUPLE, 1, BUILD_MAP, 0, CALL_FUNCTION, 3, RETURN_VALUE, 0,
        ]
    );
    assert_eq!(assembly.metadata.consts.len(), 5);
    assert_eq!(assembly.stack_depth, Some(4));
    assert_eq!(assembly.metadata.stack_size, 4);
    Ok(())
}

#[test]
fn test_globals_become_constants() -> Result<()> {
    let (bytecode, metadata) = area();
    let mut graph = disassemble(&bytecode, metadata, isa())?;

    let globals: HashMap<&str, Constant> = HashMap::from([("PI", Constant::Float(2.5))]);
    let pattern = fixed_opcode(LOAD_GLOBAL, None, Some("name"));

    let outcome = find_pattern(&mut graph, pattern, |block, found, metadata| {
        let Some(Captured::Operand(Operand::Name(name))) = found.get("name") else {
            return Ok(ControlFlow::Continue(()));
        };
        if let Some(value) = globals.get(name.as_str()) {
            metadata.ensure_const(value.clone());
            block.instructions[found.start] = Instruction::new(LOAD_CONST, Operand::Const(value.clone()));
        }
        Ok(ControlFlow::Continue(()))
    })?;

    // OFFSET is visited but has no known value
    assert_eq!(outcome.matches, 2);

    let assembly = graph.assemble()?;
    assert_eq!(
        assembly.bytecode.code,
        [
            LOAD_CONST, 1, LOAD_FAST, 0, BINARY_MULTIPLY, 0, LOAD_FAST, 0, BINARY_MULTIPLY, 0,
            LOAD_GLOBAL, 1, BINARY_ADD, 0, RETURN_VALUE, 0,
        ]
    );
    Ok(())
}

#[test]
fn test_stop_after_first_rewrite() -> Result<()> {
    let (bytecode, metadata) = area();
    let mut graph = disassemble(&bytecode, metadata, isa())?;

    let loads = opcode_in(&[LOAD_GLOBAL, LOAD_FAST], None);
    let mut seen = 0;
    let outcome = find_pattern(&mut graph, loads, |_, _, _| {
        seen += 1;
        Ok(if seen == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        })
    })?;

    assert_eq!(outcome, SearchOutcome { matches: 2, stopped: true });
    Ok(())
}

#[test]
fn test_unresolvable_rewrite_fails_assembly() -> Result<()> {
    let (bytecode, metadata) = area();
    let mut graph = disassemble(&bytecode, metadata, isa())?;

    // a jump to a block that does not exist
    find_pattern(&mut graph, fixed_opcode(RETURN_VALUE, None, None), |block, found, _| {
        block.instructions.truncate(found.start);
        block.jump = Some(Instruction::new(JUMP_ABSOLUTE, Operand::label(99, 0)));
        Ok(ControlFlow::Continue(()))
    })?;

    let err = graph.assemble().expect_err("dangling label");
    assert!(err.is_structural());
    Ok(())
}
