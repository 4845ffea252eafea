//! Block graph assembly.
//!
//! Assembly runs in three steps:
//!
//! 1. The graph is linearized (see [`crate::assembly::layout`]) and flattened into one list
//!    of slots. Every jump label is resolved to the logical index of its target, every other
//!    operand to its raw argument. Position changes are recorded per logical index.
//! 2. Branch arguments depend on unit offsets, and unit offsets depend on how many extension
//!    prefixes each argument needs. Offsets start out as the logical indices and the stream
//!    is re-emitted until the offsets no longer change. Offsets can only grow, so the loop
//!    settles; the pass budget of [`AssemblerConfig::max_layout_passes`] guards against
//!    instruction sets where it does not.
//! 3. The position table is encoded and, if configured, the stack bound is recomputed.
//!
//! # Example
//!
//! ```rust,ignore
//! use opscope::prelude::*;
//!
//! let assembly = graph.assemble_with(&AssemblerConfig::strict())?;
//! println!("{} units in {} passes", assembly.bytecode.unit_count(), assembly.passes);
//! ```

use rustc_hash::FxHashMap;

use crate::{
    assembly::{
        bytecode::{emit_unit, prefix_count, Bytecode, MAX_PREFIXES, UNIT_SIZE},
        instruction::{Instruction, Operand},
        layout::linearize,
        metadata::CodeUnitMetadata,
        opcodes::{InstructionSet, Opcode, OperandKind},
        positions::{encode_positions, PositionEntry},
    },
    config::AssemblerConfig,
    disassembler::{BlockId, FunctionBlock},
    Error, Result,
};

/// Output of [`FunctionBlock::assemble`].
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Unit stream and position table
    pub bytecode: Bytecode,
    /// Metadata of the graph, with the stack bound raised if that was requested
    pub metadata: CodeUnitMetadata,
    /// Maximum stack depth, present if [`AssemblerConfig::update_stack_size`] is set
    pub stack_depth: Option<u32>,
    /// Number of layout passes until the offsets settled
    pub passes: usize,
}

/// One instruction of the flattened graph.
struct Slot<'a> {
    instruction: &'a Instruction,
    opcode: Opcode,
    kind: OperandKind,
    /// Raw argument of non-branch instructions
    arg: u32,
    /// Logical index of the branch target, may be one past the last slot
    target: Option<usize>,
}

impl FunctionBlock {
    /// Assembles the graph with the default [`AssemblerConfig`].
    ///
    /// # Errors
    /// See [`FunctionBlock::assemble_with`].
    pub fn assemble(&self) -> Result<Assembly> {
        self.assemble_with(&AssemblerConfig::default())
    }

    /// Assembles the graph into a unit stream and position table.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The graph violates a structural invariant (see [`crate::assembly::layout::linearize`])
    /// - A label names a missing block or lies past the end of its block
    /// - A label addresses the end of the code
    /// - A jump lacks a label, or a non-branch instruction carries one
    /// - An opcode is unknown, or an operand does not fit or is missing from its table
    /// - A relative branch points backwards
    /// - The layout does not settle within [`AssemblerConfig::max_layout_passes`]
    pub fn assemble_with(&self, config: &AssemblerConfig) -> Result<Assembly> {
        let isa = self.isa();
        let (slots, lines) = self.flatten(config)?;
        let (code, offsets, passes) = layout(&slots, isa, config.max_layout_passes)?;

        let entries: Vec<PositionEntry> = lines
            .iter()
            .map(|&(index, line)| PositionEntry::new(offsets[index] * UNIT_SIZE as u32, line))
            .collect();
        let (first_line, positions) = encode_positions(&entries, self.metadata.first_line);

        let mut metadata = self.metadata.clone();
        let stack_depth = if config.update_stack_size {
            let depth = max_stack_depth(&slots, isa)?;
            metadata.stack_size = metadata.stack_size.max(depth);
            Some(depth)
        } else {
            None
        };

        log::debug!(
            "Assembled '{}': {} instructions, {} units, {} layout passes",
            metadata.name,
            slots.len(),
            code.len() / UNIT_SIZE,
            passes
        );

        Ok(Assembly {
            bytecode: Bytecode::new(code, first_line, positions),
            metadata,
            stack_depth,
            passes,
        })
    }

    /// Linearizes the graph and resolves every operand that does not depend on the layout.
    fn flatten(&self, config: &AssemblerConfig) -> Result<(Vec<Slot<'_>>, Vec<(usize, u32)>)> {
        let isa = self.isa();
        let order = linearize(self)?;

        let mut starts: FxHashMap<BlockId, (usize, usize)> = FxHashMap::default();
        let mut total = 0;
        for block in &order {
            starts.insert(block.id, (total, block.len()));
            total += block.len();
        }

        let mut slots = Vec::with_capacity(total);
        let mut lines = Vec::new();
        let mut current_line = None;

        for block in &order {
            if block.is_empty() {
                continue;
            }
            if let Some(line) = block.line {
                if current_line != Some(line) {
                    current_line = Some(line);
                    lines.push((slots.len(), line));
                }
            }

            let body = block.instructions.iter().map(|ins| (ins, false));
            for (instruction, trailing) in body.chain(block.jump.iter().map(|ins| (ins, true))) {
                let opcode = instruction.opcode;
                let kind = isa.operand_kind(opcode)?;

                if !kind.is_jump() {
                    if trailing {
                        return Err(structural_error!(
                            "Block {} ends in {}, which does not branch",
                            block.id,
                            instruction.render(isa)
                        ));
                    }
                    if let Operand::Label(target) = instruction.operand {
                        return Err(structural_error!(
                            "{} in block {} carries label {} but does not branch",
                            instruction.render(isa),
                            block.id,
                            target
                        ));
                    }

                    slots.push(Slot {
                        instruction,
                        opcode,
                        kind,
                        arg: instruction.operand.encode(
                            opcode,
                            kind,
                            &self.metadata,
                            config.verify_operands,
                        )?,
                        target: None,
                    });
                    continue;
                }

                if !trailing {
                    return Err(structural_error!(
                        "Branch {} inside the body of block {}",
                        instruction.render(isa),
                        block.id
                    ));
                }
                let label = instruction.label().ok_or_else(|| {
                    structural_error!(
                        "Branch {} in block {} has no label",
                        instruction.render(isa),
                        block.id
                    )
                })?;
                let (start, len) = starts
                    .get(&label.block)
                    .copied()
                    .ok_or(Error::DanglingLabel(label))?;
                // the end of a block is only addressable when another block follows it
                if label.offset > len || start + label.offset == total {
                    return Err(Error::DanglingLabel(label));
                }

                slots.push(Slot {
                    instruction,
                    opcode,
                    kind,
                    arg: 0,
                    target: Some(start + label.offset),
                });
            }
        }

        Ok((slots, lines))
    }
}

/// Emits the slots until the unit offsets settle.
///
/// Returns the unit stream, the unit offset of every slot (plus the end offset) and the
/// number of passes.
fn layout(
    slots: &[Slot<'_>],
    isa: &dyn InstructionSet,
    max_passes: usize,
) -> Result<(Vec<u8>, Vec<u32>, usize)> {
    let mut offsets = (0..=slots.len())
        .map(unit_offset)
        .collect::<Result<Vec<u32>>>()?;
    let mut passes = 0;

    loop {
        if passes == max_passes {
            return Err(Error::LayoutDiverged(passes));
        }
        passes += 1;

        let mut code = Vec::with_capacity(slots.len() * UNIT_SIZE);
        let mut placed = Vec::with_capacity(slots.len() + 1);

        for (index, slot) in slots.iter().enumerate() {
            let here = unit_offset(code.len() / UNIT_SIZE)?;
            placed.push(here);

            let (arg, prefixes) = match slot.target {
                None => (slot.arg, prefix_count(slot.arg)),
                Some(target) => {
                    // targets at or before this slot already have their final offset
                    let destination = if target <= index {
                        placed[target]
                    } else {
                        offsets[target]
                    };
                    match slot.kind {
                        OperandKind::JumpRelative => relative_branch(here, destination)?,
                        _ => (destination, prefix_count(destination)),
                    }
                }
            };

            emit_unit(&mut code, isa.extended_arg(), slot.opcode, arg, prefixes);
        }
        placed.push(unit_offset(code.len() / UNIT_SIZE)?);

        if placed == offsets {
            return Ok((code, offsets, passes));
        }
        offsets = placed;
    }
}

/// Argument and prefix count of a relative branch at unit `here`.
///
/// More prefixes shrink the distance, so the smallest count whose argument fits is taken.
fn relative_branch(here: u32, destination: u32) -> Result<(u32, usize)> {
    for prefixes in 0..=MAX_PREFIXES {
        let after = here + prefixes as u32 + 1;
        let Some(delta) = destination.checked_sub(after) else {
            return Err(Error::InvalidBranch(format!(
                "Relative branch at unit {here} targets unit {destination}, which lies behind it"
            )));
        };
        if prefix_count(delta) <= prefixes {
            return Ok((delta, prefixes));
        }
    }

    Err(Error::InvalidBranch(format!(
        "Relative branch at unit {here} to unit {destination} does not fit {MAX_PREFIXES} prefixes"
    )))
}

fn unit_offset(units: usize) -> Result<u32> {
    u32::try_from(units)
        .map_err(|_| Error::InvalidBranch(format!("Unit offset {units} exceeds the address space")))
}

/// Deepest stack over every path through the flattened stream.
///
/// Each slot is entered with the depth of the first path that reaches it.
fn max_stack_depth(slots: &[Slot<'_>], isa: &dyn InstructionSet) -> Result<u32> {
    let mut depths: Vec<Option<i64>> = vec![None; slots.len()];
    let mut pending = Vec::new();
    let mut max: i64 = 0;

    if !slots.is_empty() {
        depths[0] = Some(0);
        pending.push(0);
    }

    while let Some(index) = pending.pop() {
        let slot = &slots[index];
        let depth = depths[index].unwrap_or(0);

        let mut after = depth + i64::from(slot.instruction.stack_effect(isa)?);
        if after < 0 {
            log::warn!(
                "Stack underflow after {} at instruction {}, clamping to zero",
                slot.instruction.render(isa),
                index
            );
            after = 0;
        }
        max = max.max(after);

        let fallthrough = (!isa.is_terminal(slot.opcode)).then_some(index + 1);
        for next in fallthrough.into_iter().chain(slot.target) {
            if next < slots.len() && depths[next].is_none() {
                depths[next] = Some(after);
                pending.push(next);
            }
        }
    }

    Ok(u32::try_from(max).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::{decode_bytecode, disassemble, BasicBlock, BlockTarget},
        test::{branchy_bytecode, branchy_metadata, ins, toy_isa, toy_isa_handle},
    };

    fn graph(metadata: CodeUnitMetadata, blocks: Vec<BasicBlock>) -> Result<FunctionBlock> {
        let mut graph = FunctionBlock::new(metadata, toy_isa_handle(), 1);
        for block in blocks {
            graph.insert(block)?;
        }
        Ok(graph)
    }

    fn block(id: BlockId, body: Vec<Instruction>, jump: Option<Instruction>) -> BasicBlock {
        let mut block = BasicBlock::new(id, None);
        block.instructions = body;
        block.jump = jump;
        block
    }

    #[test]
    fn identity_round_trip() -> Result<()> {
        let bytecode = branchy_bytecode();
        let graph = disassemble(&bytecode, branchy_metadata(), toy_isa_handle())?;
        let assembly = graph.assemble()?;

        assert_eq!(assembly.bytecode, bytecode);
        assert_eq!(assembly.passes, 1);
        assert!(assembly.stack_depth.is_none());
        Ok(())
    }

    #[test]
    fn operand_widening_settles() -> Result<()> {
        let mut meta = CodeUnitMetadata::default();
        for value in 0..302 {
            meta.ensure_const(i64::from(value));
        }

        let mut body = vec![
            ins("LOAD_CONST", Operand::constant(300)),
            ins("LOAD_CONST", Operand::constant(301)),
        ];
        body.extend((0..251).map(|_| ins("NOP", Operand::None)));
        let first = block(1, body, Some(ins("JUMP_ABSOLUTE", Operand::label(2, 0))));
        let second = block(2, vec![ins("RETURN_VALUE", Operand::None)], None);
        let graph = graph(meta, vec![first, second])?;

        // guess 254, then 256 forces a prefix on the jump, which moves the target to 257
        let assembly = graph.assemble()?;
        assert_eq!(assembly.passes, 3);

        let stream = decode_bytecode(&assembly.bytecode, &toy_isa())?;
        let jump = stream.iter().find(|raw| raw.opcode == 113).map(|raw| raw.target);
        let last = stream.last().map(|raw| raw.offset);
        assert_eq!(jump, Some(Some(257)));
        assert_eq!(last, Some(257));

        let budget = AssemblerConfig::default().with_max_layout_passes(1);
        assert!(matches!(
            graph.assemble_with(&budget),
            Err(Error::LayoutDiverged(1))
        ));
        Ok(())
    }

    #[test]
    fn redundant_prefixes_are_dropped() -> Result<()> {
        // EXTENDED_ARG 5; NOP; EXTENDED_ARG 0; RETURN_VALUE
        let bytecode = Bytecode::new(vec![144, 5, 9, 0, 144, 0, 83, 0], 1, Vec::new());
        let graph = disassemble(&bytecode, CodeUnitMetadata::default(), toy_isa_handle())?;
        assert_eq!(graph.instruction_count(), 2);

        let assembly = graph.assemble()?;
        assert_eq!(assembly.bytecode.code, [9, 0, 83, 0]);
        Ok(())
    }

    #[test]
    fn relative_branches() -> Result<()> {
        let first = block(1, vec![], Some(ins("JUMP_FORWARD", Operand::label(3, 0))));
        let second = block(
            2,
            vec![ins("NOP", Operand::None), ins("RETURN_VALUE", Operand::None)],
            None,
        );
        let third = block(3, vec![ins("RETURN_VALUE", Operand::None)], None);
        let graph = graph(CodeUnitMetadata::default(), vec![first, second, third])?;

        let assembly = graph.assemble()?;
        assert_eq!(assembly.bytecode.code, [110, 2, 9, 0, 83, 0, 83, 0]);
        Ok(())
    }

    #[test]
    fn relative_branch_prefix_counts_itself() -> Result<()> {
        let first = block(1, vec![], Some(ins("JUMP_FORWARD", Operand::label(3, 0))));
        let nops = (0..256).map(|_| ins("NOP", Operand::None)).collect();
        let second = block(2, nops, Some(ins("JUMP_ABSOLUTE", Operand::label(3, 0))));
        let third = block(3, vec![ins("RETURN_VALUE", Operand::None)], None);
        let graph = graph(CodeUnitMetadata::default(), vec![first, second, third])?;

        let assembly = graph.assemble()?;
        assert_eq!(&assembly.bytecode.code[..4], [144, 1, 110, 2]);

        let stream = decode_bytecode(&assembly.bytecode, &toy_isa())?;
        let targets: Vec<Option<u32>> = stream
            .iter()
            .map(|raw| raw.target)
            .filter(Option::is_some)
            .collect();
        let end = stream.last().map(|raw| raw.offset);
        assert_eq!(targets, [end, end]);
        Ok(())
    }

    #[test]
    fn backward_relative_branch() -> Result<()> {
        let mut first = block(1, vec![ins("NOP", Operand::None)], None);
        first.fallthrough = Some(BlockTarget::start(2));
        let second = block(2, vec![], Some(ins("JUMP_FORWARD", Operand::label(1, 0))));
        let graph = graph(CodeUnitMetadata::default(), vec![first, second])?;

        assert!(matches!(graph.assemble(), Err(Error::InvalidBranch(_))));
        Ok(())
    }

    #[test]
    fn labels_must_resolve() -> Result<()> {
        let missing = block(1, vec![], Some(ins("JUMP_ABSOLUTE", Operand::label(9, 0))));
        let graph1 = graph(CodeUnitMetadata::default(), vec![missing])?;
        assert!(matches!(graph1.assemble(), Err(Error::DanglingLabel(_))));

        let past = block(1, vec![ins("NOP", Operand::None)], Some(ins("JUMP_ABSOLUTE", Operand::label(1, 3))));
        let graph3 = graph(CodeUnitMetadata::default(), vec![past])?;
        assert!(matches!(graph3.assemble(), Err(Error::DanglingLabel(_))));
        Ok(())
    }

    #[test]
    fn label_at_end_of_code_is_dangling() -> Result<()> {
        // the last block in layout order has no successor to land on
        let looping = block(1, vec![ins("NOP", Operand::None)], Some(ins("JUMP_ABSOLUTE", Operand::label(1, 2))));
        let graph1 = graph(CodeUnitMetadata::default(), vec![looping])?;
        assert!(matches!(graph1.assemble(), Err(Error::DanglingLabel(_))));

        let mut first = block(1, vec![ins("NOP", Operand::None)], None);
        first.fallthrough = Some(BlockTarget::start(2));
        let second = block(
            2,
            vec![ins("NOP", Operand::None)],
            Some(ins("JUMP_ABSOLUTE", Operand::label(2, 2))),
        );
        let graph2 = graph(CodeUnitMetadata::default(), vec![first, second])?;
        assert!(matches!(graph2.assemble(), Err(Error::DanglingLabel(_))));
        Ok(())
    }

    #[test]
    fn label_at_end_of_block_lands_on_its_successor() -> Result<()> {
        let mut first = block(1, vec![ins("NOP", Operand::None)], None);
        first.fallthrough = Some(BlockTarget::start(2));
        let second = block(
            2,
            vec![ins("NOP", Operand::None)],
            Some(ins("JUMP_ABSOLUTE", Operand::label(1, 1))),
        );
        let graph = graph(CodeUnitMetadata::default(), vec![first, second])?;

        let assembly = graph.assemble()?;
        assert_eq!(assembly.bytecode.code, [9, 0, 9, 0, 113, 1]);
        decode_bytecode(&assembly.bytecode, &toy_isa())?;
        Ok(())
    }

    #[test]
    fn misplaced_branches() -> Result<()> {
        let isa = toy_isa();
        let jump_in_body = block(1, vec![ins("JUMP_ABSOLUTE", Operand::label(1, 0))], None);
        let err = graph(CodeUnitMetadata::default(), vec![jump_in_body])?.assemble();
        assert!(matches!(err, Err(ref e) if e.is_structural()));

        let unlabeled = block(1, vec![], Some(Instruction::new(isa.opcode("JUMP_ABSOLUTE")?, Operand::Immediate(0))));
        let err = graph(CodeUnitMetadata::default(), vec![unlabeled])?.assemble();
        assert!(matches!(err, Err(ref e) if e.is_structural()));

        let labeled_nop = block(1, vec![Instruction::new(9, Operand::label(1, 0))], None);
        let err = graph(CodeUnitMetadata::default(), vec![labeled_nop])?.assemble();
        assert!(matches!(err, Err(ref e) if e.is_structural()));

        let not_a_jump = block(1, vec![], Some(ins("RETURN_VALUE", Operand::None)));
        let err = graph(CodeUnitMetadata::default(), vec![not_a_jump])?.assemble();
        assert!(matches!(err, Err(ref e) if e.is_structural()));
        Ok(())
    }

    #[test]
    fn operands_are_checked() -> Result<()> {
        let raw = block(1, vec![Instruction::new(116, Operand::Immediate(0)), ins("RETURN_VALUE", Operand::None)], None);
        let graph1 = graph(CodeUnitMetadata::default(), vec![raw])?;
        assert!(matches!(graph1.assemble(), Err(Error::OperandMismatch { opcode: 116, .. })));
        let lenient = graph1.assemble_with(&AssemblerConfig::lenient())?;
        assert_eq!(lenient.bytecode.code, [116, 0, 83, 0]);

        let absent = block(1, vec![ins("LOAD_GLOBAL", Operand::name("print"))], None);
        let graph2 = graph(CodeUnitMetadata::default(), vec![absent])?;
        assert!(matches!(graph2.assemble(), Err(ref e) if e.is_lookup()));

        let unknown = block(1, vec![Instruction::simple(0xEE)], None);
        let graph3 = graph(CodeUnitMetadata::default(), vec![unknown])?;
        assert!(matches!(graph3.assemble(), Err(Error::UnknownOpcode(0xEE))));
        Ok(())
    }

    #[test]
    fn positions_follow_block_tags() -> Result<()> {
        let mut meta = CodeUnitMetadata::default();
        meta.first_line = 7;
        meta.ensure_const(1);

        let mut first = block(1, vec![ins("LOAD_CONST", Operand::constant(1))], None);
        first.line = Some(10);
        first.fallthrough = Some(BlockTarget::start(2));
        // untagged, inherits 10
        let mut second = block(2, vec![ins("POP_TOP", Operand::None)], None);
        second.fallthrough = Some(BlockTarget::start(3));
        let mut third = block(3, vec![ins("LOAD_CONST", Operand::constant(1)), ins("RETURN_VALUE", Operand::None)], None);
        third.line = Some(8);

        let assembly = graph(meta, vec![first, second, third])?.assemble()?;
        assert_eq!(assembly.bytecode.first_line, 10);
        assert_eq!(assembly.bytecode.positions, [4, 0xFE]);

        let untagged = block(1, vec![ins("RETURN_VALUE", Operand::None)], None);
        let mut meta = CodeUnitMetadata::default();
        meta.first_line = 7;
        let assembly = graph(meta, vec![untagged])?.assemble()?;
        assert_eq!(assembly.bytecode.first_line, 7);
        assert!(assembly.bytecode.positions.is_empty());
        Ok(())
    }

    #[test]
    fn stack_bound_is_raised() -> Result<()> {
        let mut meta = CodeUnitMetadata::default();
        meta.ensure_const(1);
        meta.ensure_const(2);
        meta.stack_size = 1;

        let body = vec![
            ins("LOAD_CONST", Operand::constant(1)),
            ins("LOAD_CONST", Operand::constant(2)),
            ins("BINARY_ADD", Operand::None),
            ins("RETURN_VALUE", Operand::None),
        ];
        let graph = graph(meta, vec![block(1, body, None)])?;

        let assembly = graph.assemble_with(&AssemblerConfig::strict())?;
        assert_eq!(assembly.stack_depth, Some(2));
        assert_eq!(assembly.metadata.stack_size, 2);
        assert_eq!(graph.metadata.stack_size, 1);
        Ok(())
    }

    #[test]
    fn stack_depth_follows_branches() -> Result<()> {
        let bytecode = branchy_bytecode();
        let graph = disassemble(&bytecode, branchy_metadata(), toy_isa_handle())?;
        let assembly = graph.assemble_with(&AssemblerConfig::strict())?;
        assert_eq!(assembly.stack_depth, Some(1));

        let underflow = block(1, vec![ins("POP_TOP", Operand::None), ins("RETURN_VALUE", Operand::None)], None);
        let graph = self::graph(CodeUnitMetadata::default(), vec![underflow])?;
        assert_eq!(graph.assemble_with(&AssemblerConfig::strict())?.stack_depth, Some(0));
        Ok(())
    }

    #[test]
    fn empty_entry_block() -> Result<()> {
        let graph = graph(CodeUnitMetadata::new("empty", "<test>", 3), vec![block(1, vec![], None)])?;
        let assembly = graph.assemble()?;
        assert!(assembly.bytecode.code.is_empty());
        assert_eq!(assembly.bytecode.first_line, 3);
        Ok(())
    }

    #[test]
    fn graph_without_entry_block() {
        let graph = FunctionBlock::new(CodeUnitMetadata::new("empty", "<test>", 3), toy_isa_handle(), 1);
        let result = graph.assemble();
        assert!(matches!(result, Err(ref err) if err.is_structural()));
    }
}
