//! Matching runs of instructions by their net stack effect.
//!
//! A [`StackEffectMatcher`] sums the stack-depth deltas of consecutive instructions and
//! matches every prefix whose total satisfies a [`DepthTarget`]. A prefix summing to `n`
//! pushes exactly the `n` values that a following `CALL_FUNCTION n` or `BUILD_TUPLE n`
//! consumes, which is what rewrite recipes use it for.

use std::{fmt, sync::Arc};

use crate::{
    assembly::{Instruction, InstructionSet},
    pattern::{BoxCursor, Captures, Cursor, CustomPattern, Pattern, ScopeToken},
    rewrite::predicates::{Captured, InstructionPattern},
    Result,
};

/// Which running totals a [`StackEffectMatcher`] accepts.
#[derive(Clone)]
pub enum DepthTarget {
    /// Any of the listed totals
    Values(Vec<i64>),
    /// Totals accepted by the predicate
    Predicate(Arc<dyn Fn(i64) -> bool>),
}

impl DepthTarget {
    /// Accepts any of `values`.
    pub fn values(values: impl IntoIterator<Item = i64>) -> Self {
        DepthTarget::Values(values.into_iter().collect())
    }

    /// Accepts the totals for which `predicate` holds.
    pub fn predicate(predicate: impl Fn(i64) -> bool + 'static) -> Self {
        DepthTarget::Predicate(Arc::new(predicate))
    }

    /// `true` if `depth` is an accepted total.
    #[must_use]
    pub fn accepts(&self, depth: i64) -> bool {
        match self {
            DepthTarget::Values(values) => values.contains(&depth),
            DepthTarget::Predicate(predicate) => predicate(depth),
        }
    }
}

impl fmt::Debug for DepthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthTarget::Values(values) => f.debug_tuple("Values").field(values).finish(),
            DepthTarget::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Matches runs of instructions whose summed stack effect satisfies a target.
///
/// Starting at the match position the matcher adds up [`Instruction::stack_effect`] and emits
/// after every instruction where the running total is accepted, shortest run first. The
/// total can be captured as [`Captured::Depth`].
///
/// # Examples
///
/// ```rust
/// use opscope::rewrite::{fixed_opcode, DepthTarget, OperandMatch, StackEffectMatcher};
/// # use std::sync::Arc;
/// # use opscope::assembly::{FlowType, InstructionSet, OpcodeTable, OperandKind, StackEffect};
/// # let mut table = OpcodeTable::new(144);
/// # table.define(131, "CALL_FUNCTION", OperandKind::Immediate, FlowType::Sequential,
/// #     StackEffect::Linear { base: 0, per_arg: -1 })?;
/// # let isa: Arc<dyn InstructionSet> = Arc::new(table);
///
/// // the arguments of a call, however they are computed
/// let arguments = StackEffectMatcher::new(isa, DepthTarget::predicate(|n| n >= 0))
///     .capture("argc")
///     .into_pattern();
/// let call = arguments + fixed_opcode(131, Some(OperandMatch::Back("argc".into())), None);
/// # let _ = call;
/// # Ok::<(), opscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct StackEffectMatcher {
    isa: Arc<dyn InstructionSet>,
    target: DepthTarget,
    capture: Option<String>,
}

impl StackEffectMatcher {
    /// Creates a matcher evaluating stack effects with `isa`.
    pub fn new(isa: Arc<dyn InstructionSet>, target: DepthTarget) -> Self {
        StackEffectMatcher {
            isa,
            target,
            capture: None,
        }
    }

    /// Binds the running total under `name` at each emission.
    #[must_use]
    pub fn capture(mut self, name: impl Into<String>) -> Self {
        self.capture = Some(name.into());
        self
    }

    /// The accepted totals.
    pub fn target(&self) -> &DepthTarget {
        &self.target
    }

    /// Wraps the matcher into a pattern.
    #[must_use]
    pub fn into_pattern(self) -> InstructionPattern {
        Pattern::custom(self)
    }
}

impl From<StackEffectMatcher> for InstructionPattern {
    fn from(matcher: StackEffectMatcher) -> Self {
        matcher.into_pattern()
    }
}

impl CustomPattern<Instruction, Captured> for StackEffectMatcher {
    fn cursor(&self, start: usize) -> BoxCursor<'_, Instruction, Captured> {
        Box::new(StackEffectCursor {
            matcher: self,
            position: start,
            total: 0,
            scope: None,
        })
    }
}

struct StackEffectCursor<'p> {
    matcher: &'p StackEffectMatcher,
    position: usize,
    total: i64,
    scope: Option<ScopeToken>,
}

impl Cursor<Instruction, Captured> for StackEffectCursor<'_> {
    fn advance(
        &mut self,
        sequence: &[Instruction],
        captures: &mut Captures<Captured>,
    ) -> Result<Option<usize>> {
        if let Some(scope) = self.scope.take() {
            captures.exit(scope)?;
        }

        while let Some(instruction) = sequence.get(self.position) {
            self.total += i64::from(instruction.stack_effect(self.matcher.isa.as_ref())?);
            self.position += 1;

            if self.matcher.target.accepts(self.total) {
                let scope = captures.enter();
                if let Some(name) = &self.matcher.capture {
                    captures.set(name.as_str(), Captured::Depth(self.total));
                }
                self.scope = Some(scope);
                return Ok(Some(self.position));
            }
        }

        Ok(None)
    }
}
