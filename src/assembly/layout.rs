//! Block ordering.
//!
//! Fallthrough labels force two blocks to be adjacent; everything else about the order is
//! free. Every leaf starts as a run of its own, and runs are spliced together along
//! fallthrough labels until none is left. The run holding the entry block goes first, the
//! others follow in ascending id order of their first block, which makes the order a pure
//! function of the graph.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{
    disassembler::{BasicBlock, BlockId, BlockTarget, FunctionBlock},
    Error, Result,
};

/// Orders the leaves of `graph` for emission.
///
/// # Errors
///
/// Returns a structural error if
/// - two leaves share an id
/// - a fallthrough label has a non-zero offset
/// - two leaves fall through into the same block
/// - a fallthrough label names a missing block
/// - fallthrough labels form a cycle
/// - the entry block is missing or is itself a fallthrough target
pub fn linearize(graph: &FunctionBlock) -> Result<Vec<&BasicBlock>> {
    let leaves = graph.as_basic_blocks();
    let mut by_id: FxHashMap<BlockId, &BasicBlock> = FxHashMap::default();
    let mut runs: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    // fallthrough target -> first block of the run that ends by falling into it
    let mut splices: BTreeMap<BlockId, BlockId> = BTreeMap::new();

    for leaf in leaves {
        if by_id.insert(leaf.id, leaf).is_some() {
            return Err(Error::DuplicateBlock(leaf.id));
        }
        runs.insert(leaf.id, vec![leaf.id]);

        if let Some(target) = leaf.fallthrough {
            if target.offset != 0 {
                return Err(structural_error!(
                    "Block {} falls through into {}, fallthrough must land on a block start",
                    leaf.id,
                    target
                ));
            }
            if let Some(other) = splices.insert(target.block, leaf.id) {
                return Err(structural_error!(
                    "Blocks {} and {} both fall through into block {}",
                    other,
                    leaf.id,
                    target.block
                ));
            }
        }
    }

    while let Some((target, start)) = splices.pop_first() {
        if target == start {
            return Err(structural_error!(
                "Fallthrough labels form a cycle through block {}",
                target
            ));
        }

        let tail = runs
            .remove(&target)
            .ok_or(Error::DanglingLabel(BlockTarget::start(target)))?;
        let head = runs
            .get_mut(&start)
            .ok_or_else(|| structural_error!("Run starting at block {} vanished", start))?;
        head.extend(tail);

        let last = head.last().and_then(|id| by_id.get(id)).and_then(|block| block.fallthrough);
        if let Some(next) = last {
            if let Some(slot) = splices.get_mut(&next.block) {
                *slot = start;
            }
        }
    }

    let entry_run = runs.remove(&graph.entry).ok_or_else(|| {
        if by_id.contains_key(&graph.entry) {
            structural_error!(
                "Entry block {} is the fallthrough target of another block",
                graph.entry
            )
        } else {
            Error::DanglingLabel(BlockTarget::start(graph.entry))
        }
    })?;

    let order = entry_run
        .into_iter()
        .chain(runs.into_values().flatten())
        .filter_map(|id| by_id.get(&id).copied())
        .collect();
    Ok(order)
}
