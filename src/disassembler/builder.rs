//! Block graph reconstruction.
//!
//! A single forward scan over decoded instructions. Blocks are closed
//!
//! * when the source position changes (the next block becomes the fallthrough of the closed
//!   one),
//! * at a marked branch target, unless [`DisassemblerConfig::split_at_branch_targets`] is off,
//! * after a branch instruction, which becomes the trailing jump of its block,
//! * after a terminal instruction, which leaves the block without fallthrough.
//!
//! Branch operands are only resolved after the scan: every instruction offset is mapped to
//! its `(block, index)` label, so a branch into the middle of a block is preserved.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    assembly::{
        bytecode::Bytecode,
        instruction::{Instruction, Operand},
        metadata::CodeUnitMetadata,
        opcodes::InstructionSet,
    },
    config::DisassemblerConfig,
    disassembler::{
        block::{BasicBlock, BlockId, BlockTarget, FunctionBlock},
        decoder::{decode_bytecode, RawInstruction},
    },
    Result,
};

/// A stateful builder, tracks the open block and the block waiting for its fallthrough
struct GraphBuilder<'a> {
    isa: &'a dyn InstructionSet,
    metadata: &'a CodeUnitMetadata,
    config: DisassemblerConfig,

    blocks: Vec<BasicBlock>,
    labels: FxHashMap<u32, BlockTarget>,
    fixups: Vec<(usize, u32)>,

    current: Option<usize>,
    pending: Option<usize>,
    line: Option<u32>,
}

impl<'a> GraphBuilder<'a> {
    fn new(
        isa: &'a dyn InstructionSet,
        metadata: &'a CodeUnitMetadata,
        config: DisassemblerConfig,
    ) -> Self {
        GraphBuilder {
            isa,
            metadata,
            config,
            blocks: Vec::new(),
            labels: FxHashMap::default(),
            fixups: Vec::new(),
            current: None,
            pending: None,
            line: None,
        }
    }

    /// Closes the open block and remembers it as waiting for a fallthrough
    fn close_for_fallthrough(&mut self) -> Result<()> {
        if let Some(current) = self.current.take() {
            if let Some(pending) = self.pending {
                return Err(structural_error!(
                    "Block {} still waits for its fallthrough while block {} closes",
                    self.blocks[pending].id,
                    self.blocks[current].id
                ));
            }
            self.pending = Some(current);
        }
        Ok(())
    }

    /// The open block, opening a new one (and linking the pending fallthrough) if needed
    fn open_block(&mut self) -> usize {
        if let Some(current) = self.current {
            return current;
        }

        let index = self.blocks.len();
        let id = BlockId::try_from(index + 1).unwrap_or(BlockId::MAX);
        self.blocks.push(BasicBlock::new(id, self.line));

        if let Some(pending) = self.pending.take() {
            self.blocks[pending].fallthrough = Some(BlockTarget::start(id));
        }

        log::trace!("opened block {} at line {:?}", id, self.line);
        self.current = Some(index);
        index
    }

    fn process(&mut self, raw: &RawInstruction) -> Result<()> {
        if let Some(line) = raw.line {
            if self.line != Some(line) {
                self.line = Some(line);
                self.close_for_fallthrough()?;
            }
        }

        if raw.is_jump_target && self.config.split_at_branch_targets {
            let occupied = self
                .current
                .is_some_and(|current| !self.blocks[current].is_empty());
            if occupied {
                self.close_for_fallthrough()?;
            }
        }

        let index = self.open_block();
        let block = &mut self.blocks[index];
        self.labels
            .insert(raw.offset, BlockTarget::new(block.id, block.instructions.len()));

        let kind = self.isa.operand_kind(raw.opcode)?;
        if kind.is_jump() {
            let target = raw.target.ok_or_else(|| {
                malformed_error!("Branch at unit {} has no resolved target", raw.offset)
            })?;

            block.jump = Some(Instruction::simple(raw.opcode));
            self.fixups.push((index, target));
            self.current = None;
            self.pending = (!self.isa.is_terminal(raw.opcode)).then_some(index);
            return Ok(());
        }

        let operand = Operand::resolve(kind, raw.arg, self.metadata)?;
        block.instructions.push(Instruction::new(raw.opcode, operand));

        if self.isa.is_terminal(raw.opcode) {
            self.current = None;
            self.pending = None;
        }
        Ok(())
    }

    fn resolve_jumps(&mut self) -> Result<()> {
        for (index, target) in std::mem::take(&mut self.fixups) {
            let label = self.labels.get(&target).copied().ok_or_else(|| {
                malformed_error!("Branch target unit {} does not start an instruction", target)
            })?;

            if let Some(jump) = self.blocks[index].jump.as_mut() {
                jump.operand = Operand::Label(label);
            }
        }
        Ok(())
    }
}

/// Reconstructs the block graph of a decoded instruction stream.
///
/// Blocks are numbered from 1 in stream order; block 1 is the entry and exists even for an
/// empty stream. The metadata is moved into the returned graph.
///
/// # Errors
///
/// Returns an error if a symbolic operand index is out of range for its table, a branch
/// target does not start an instruction, or an opcode is unknown to `isa`.
pub fn build_graph(
    stream: &[RawInstruction],
    metadata: CodeUnitMetadata,
    isa: Arc<dyn InstructionSet>,
    config: &DisassemblerConfig,
) -> Result<FunctionBlock> {
    let blocks = {
        let mut builder = GraphBuilder::new(isa.as_ref(), &metadata, *config);
        for raw in stream {
            builder.process(raw)?;
        }
        builder.resolve_jumps()?;
        // an empty stream still gets its entry block
        if builder.blocks.is_empty() {
            builder.open_block();
        }

        if let Some(pending) = builder.pending {
            log::debug!(
                "block {} falls off the end of the stream",
                builder.blocks[pending].id
            );
        }
        builder.blocks
    };

    log::debug!(
        "reconstructed {} blocks from {} instructions",
        blocks.len(),
        stream.len()
    );

    let mut graph = FunctionBlock::new(metadata, isa, 1);
    for block in blocks {
        graph.insert(block)?;
    }
    Ok(graph)
}

/// Decodes `bytecode` and reconstructs its block graph with the default configuration.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use opscope::assembly::{Bytecode, CodeUnitMetadata, FlowType, OpcodeTable, OperandKind, StackEffect};
/// use opscope::disassembler::disassemble;
///
/// let mut isa = OpcodeTable::new(144);
/// isa.define(100, "LOAD_CONST", OperandKind::Const, FlowType::Sequential, StackEffect::Fixed(1))?
///     .define(83, "RETURN_VALUE", OperandKind::None, FlowType::Return, StackEffect::Fixed(-1))?;
///
/// let mut metadata = CodeUnitMetadata::new("answer", "<demo>", 1);
/// metadata.ensure_const(42);
///
/// let bytecode = Bytecode::new(vec![100, 0, 83, 0], 1, Vec::new());
/// let graph = disassemble(&bytecode, metadata, Arc::new(isa))?;
///
/// assert_eq!(graph.as_basic_blocks().len(), 1);
/// assert_eq!(graph.assemble()?.bytecode, bytecode);
/// # Ok::<(), opscope::Error>(())
/// ```
///
/// # Errors
///
/// See [`decode_bytecode`] and [`build_graph`].
pub fn disassemble(
    bytecode: &Bytecode,
    metadata: CodeUnitMetadata,
    isa: Arc<dyn InstructionSet>,
) -> Result<FunctionBlock> {
    disassemble_with(bytecode, metadata, isa, &DisassemblerConfig::default())
}

/// Like [`disassemble`], with an explicit configuration.
///
/// # Errors
///
/// See [`decode_bytecode`] and [`build_graph`].
pub fn disassemble_with(
    bytecode: &Bytecode,
    metadata: CodeUnitMetadata,
    isa: Arc<dyn InstructionSet>,
    config: &DisassemblerConfig,
) -> Result<FunctionBlock> {
    let stream = decode_bytecode(bytecode, isa.as_ref())?;
    build_graph(&stream, metadata, isa, config)
}
