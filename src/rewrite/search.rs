//! Locating and rewriting instruction windows inside a block graph.

use std::{collections::BTreeMap, ops::ControlFlow};

use crate::{
    assembly::{CodeUnitMetadata, Instruction},
    disassembler::{BasicBlock, Block, BlockId, FunctionBlock},
    pattern::{MatchResult, Matcher},
    rewrite::predicates::{Captured, InstructionPattern},
    Result,
};

/// Summary of a [`find_pattern`] walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchOutcome {
    /// Number of matches handed to the callback
    pub matches: usize,
    /// `true` if the callback ended the walk early
    pub stopped: bool,
}

/// Runs `pattern` over every basic block of `graph` and hands each match to `callback`.
///
/// Blocks are visited depth-first in id order, nested containers included. Inside a block the
/// longest match is taken at the leftmost position; the callback may then rewrite the block's
/// instructions and the symbol tables of the code unit. Scanning resumes after the rewritten
/// window, i.e. at the match end shifted by the change in instruction count, and always at
/// least one instruction past the match start. Only the block bodies are scanned, trailing
/// jumps are left alone.
///
/// Returning [`ControlFlow::Break`] from the callback ends the whole walk.
///
/// # Errors
/// Propagates errors of the pattern and of the callback; the graph keeps every rewrite made
/// up to that point.
///
/// # Examples
///
/// ```rust,no_run
/// use std::ops::ControlFlow;
/// use opscope::{disassembler::FunctionBlock, rewrite::{find_pattern, fixed_opcode}};
///
/// fn strip_nops(graph: &mut FunctionBlock, nop: u8) -> opscope::Result<usize> {
///     let outcome = find_pattern(graph, fixed_opcode(nop, None, None), |block, found, _| {
///         block.instructions.drain(found.range());
///         Ok(ControlFlow::Continue(()))
///     })?;
///     Ok(outcome.matches)
/// }
/// ```
pub fn find_pattern<F>(
    graph: &mut FunctionBlock,
    pattern: InstructionPattern,
    mut callback: F,
) -> Result<SearchOutcome>
where
    F: FnMut(&mut BasicBlock, &MatchResult<Captured>, &mut CodeUnitMetadata) -> Result<ControlFlow<()>>,
{
    let matcher = Matcher::longest(pattern);
    let mut outcome = SearchOutcome::default();

    let FunctionBlock {
        blocks, metadata, ..
    } = graph;

    let flow = walk(blocks, &matcher, metadata, &mut callback, &mut outcome)?;
    outcome.stopped = flow.is_break();

    log::debug!(
        "find_pattern on {}: {} matches{}",
        metadata.name,
        outcome.matches,
        if outcome.stopped { ", stopped" } else { "" }
    );
    Ok(outcome)
}

fn walk<F>(
    blocks: &mut BTreeMap<BlockId, Block>,
    matcher: &Matcher<Instruction, Captured>,
    metadata: &mut CodeUnitMetadata,
    callback: &mut F,
    outcome: &mut SearchOutcome,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&mut BasicBlock, &MatchResult<Captured>, &mut CodeUnitMetadata) -> Result<ControlFlow<()>>,
{
    for block in blocks.values_mut() {
        let flow = match block {
            Block::Basic(basic) => scan(basic, matcher, metadata, callback, outcome)?,
            Block::Nested(nested) => walk(&mut nested.blocks, matcher, metadata, callback, outcome)?,
        };
        if flow.is_break() {
            return Ok(flow);
        }
    }

    Ok(ControlFlow::Continue(()))
}

fn scan<F>(
    block: &mut BasicBlock,
    matcher: &Matcher<Instruction, Captured>,
    metadata: &mut CodeUnitMetadata,
    callback: &mut F,
    outcome: &mut SearchOutcome,
) -> Result<ControlFlow<()>>
where
    F: FnMut(&mut BasicBlock, &MatchResult<Captured>, &mut CodeUnitMetadata) -> Result<ControlFlow<()>>,
{
    let mut position = 0;
    while position < block.instructions.len() {
        let Some(found) = matcher.search_from(&block.instructions, position)? else {
            break;
        };

        log::trace!("block {}: match at {}..{}", block.id, found.start, found.end);
        outcome.matches += 1;

        let before = block.instructions.len();
        if callback(block, &found, metadata)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
        let after = block.instructions.len();

        let end = if after >= before {
            found.end + (after - before)
        } else {
            found.end.saturating_sub(before - after)
        };
        position = end.max(found.start + 1);
    }

    Ok(ControlFlow::Continue(()))
}
