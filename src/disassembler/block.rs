//! Block graph of a code unit.
//!
//! A [`FunctionBlock`] owns the metadata of one code unit and a map of blocks. Leaf blocks are
//! [`BasicBlock`]s: a straight run of instructions, at most one trailing jump, and an optional
//! fallthrough label naming the block that must be laid out right after it. Blocks can be
//! grouped into [`NestedBlock`] containers; grouping has no effect on the layout, every
//! leaf is placed as if it lived at the top level.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    assembly::{
        metadata::CodeUnitMetadata,
        opcodes::InstructionSet,
        instruction::Instruction,
    },
    Error, Result,
};

/// Identifier of a block, unique across every nesting level of a graph.
pub type BlockId = u32;

/// A position inside the graph: a block and an instruction index within it.
///
/// The offset counts instructions, not encoded units, and the trailing jump of a block is
/// addressed as the instruction after its body. Fallthrough labels always use offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockTarget {
    /// Target block
    pub block: BlockId,
    /// Instruction index inside the target block
    pub offset: usize,
}

impl BlockTarget {
    /// Creates a new label.
    #[must_use]
    pub fn new(block: BlockId, offset: usize) -> Self {
        BlockTarget { block, offset }
    }

    /// Label of the first instruction of `block`.
    #[must_use]
    pub fn start(block: BlockId) -> Self {
        BlockTarget { block, offset: 0 }
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}+{}", self.block, self.offset)
    }
}

/// A straight-line run of instructions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicBlock {
    /// Block id
    pub id: BlockId,
    /// Non-branching instructions in execution order
    pub instructions: Vec<Instruction>,
    /// Trailing branch; its operand is always a label
    pub jump: Option<Instruction>,
    /// Block that directly follows this one in the layout
    pub fallthrough: Option<BlockTarget>,
    /// Source position shared by the instructions of this block
    pub line: Option<u32>,
}

impl BasicBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new(id: BlockId, line: Option<u32>) -> Self {
        BasicBlock {
            id,
            line,
            ..Default::default()
        }
    }

    /// Number of instructions, the trailing jump included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len() + usize::from(self.jump.is_some())
    }

    /// `true` if the block has neither instructions nor a jump.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All instructions including the trailing jump.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().chain(self.jump.iter())
    }

    /// Label of this block's first instruction.
    #[must_use]
    pub fn target(&self) -> BlockTarget {
        BlockTarget::start(self.id)
    }
}

/// A container that groups blocks without affecting the layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NestedBlock {
    /// Container id, shares the id space with leaf blocks
    pub id: BlockId,
    /// Children, keyed by id
    pub blocks: BTreeMap<BlockId, Block>,
}

impl NestedBlock {
    /// Creates an empty container.
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        NestedBlock {
            id,
            blocks: BTreeMap::new(),
        }
    }
}

/// A node of the block graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Leaf holding instructions
    Basic(BasicBlock),
    /// Grouping of further blocks
    Nested(NestedBlock),
}

impl Block {
    /// The id of this block.
    #[must_use]
    pub fn id(&self) -> BlockId {
        match self {
            Block::Basic(block) => block.id,
            Block::Nested(block) => block.id,
        }
    }

    /// Appends every leaf below (or at) this block to `out`, depth first, children in id
    /// order.
    pub fn collect_basic_blocks<'a>(&'a self, out: &mut Vec<&'a BasicBlock>) {
        match self {
            Block::Basic(block) => out.push(block),
            Block::Nested(nested) => {
                for child in nested.blocks.values() {
                    child.collect_basic_blocks(out);
                }
            }
        }
    }

    /// Leaves below (or at) this block.
    #[must_use]
    pub fn as_basic_blocks(&self) -> Vec<&BasicBlock> {
        let mut out = Vec::new();
        self.collect_basic_blocks(&mut out);
        out
    }

    fn find(&self, id: BlockId) -> Option<&BasicBlock> {
        match self {
            Block::Basic(block) => (block.id == id).then_some(block),
            Block::Nested(nested) => nested.blocks.values().find_map(|child| child.find(id)),
        }
    }

    fn find_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        match self {
            Block::Basic(block) => (block.id == id).then_some(block),
            Block::Nested(nested) => nested
                .blocks
                .values_mut()
                .find_map(|child| child.find_mut(id)),
        }
    }

    fn max_id(&self) -> BlockId {
        match self {
            Block::Basic(block) => block.id,
            Block::Nested(nested) => nested
                .blocks
                .values()
                .map(Block::max_id)
                .fold(nested.id, BlockId::max),
        }
    }
}

impl From<BasicBlock> for Block {
    fn from(block: BasicBlock) -> Self {
        Block::Basic(block)
    }
}

impl From<NestedBlock> for Block {
    fn from(block: NestedBlock) -> Self {
        Block::Nested(block)
    }
}

/// The block graph of one code unit.
#[derive(Debug, Clone)]
pub struct FunctionBlock {
    /// Tables and header fields
    pub metadata: CodeUnitMetadata,
    /// Block executed first
    pub entry: BlockId,
    /// Top level blocks, keyed by id
    pub blocks: BTreeMap<BlockId, Block>,
    isa: Arc<dyn InstructionSet>,
}

impl FunctionBlock {
    /// Creates an empty graph. The entry block still has to be inserted.
    #[must_use]
    pub fn new(metadata: CodeUnitMetadata, isa: Arc<dyn InstructionSet>, entry: BlockId) -> Self {
        FunctionBlock {
            metadata,
            entry,
            blocks: BTreeMap::new(),
            isa,
        }
    }

    /// The instruction set the graph is expressed in.
    #[must_use]
    pub fn isa(&self) -> &dyn InstructionSet {
        self.isa.as_ref()
    }

    /// Shared handle to the instruction set.
    #[must_use]
    pub fn isa_handle(&self) -> Arc<dyn InstructionSet> {
        Arc::clone(&self.isa)
    }

    /// Adds a top level block.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateBlock`] if a top level block with the same id exists.
    pub fn insert(&mut self, block: impl Into<Block>) -> Result<()> {
        let block = block.into();
        let id = block.id();
        if self.blocks.contains_key(&id) {
            return Err(Error::DuplicateBlock(id));
        }

        self.blocks.insert(id, block);
        Ok(())
    }

    /// Every leaf block, depth first in id order.
    #[must_use]
    pub fn as_basic_blocks(&self) -> Vec<&BasicBlock> {
        let mut out = Vec::new();
        for block in self.blocks.values() {
            block.collect_basic_blocks(&mut out);
        }
        out
    }

    /// Looks up a leaf block at any nesting level.
    #[must_use]
    pub fn basic_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.values().find_map(|block| block.find(id))
    }

    /// Mutable lookup of a leaf block at any nesting level.
    pub fn basic_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.values_mut().find_map(|block| block.find_mut(id))
    }

    /// An id that is not used by any block yet.
    #[must_use]
    pub fn next_block_id(&self) -> BlockId {
        self.blocks
            .values()
            .map(Block::max_id)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Total number of instructions over all leaves.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.as_basic_blocks().iter().map(|block| block.len()).sum()
    }
}
