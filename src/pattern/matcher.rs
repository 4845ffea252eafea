//! Match drivers.
//!
//! A [`Matcher`] pairs a pattern with a [`Strategy`] and runs it over whole sequences. Every
//! call works on a fresh capture store, so drivers can be shared freely between searches.

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::{
    pattern::{
        captures::Captures,
        pattern::{CaptureValue, Pattern, Value},
    },
    Result,
};

/// How a match at a fixed start is chosen among the pattern's emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// The first emission
    #[default]
    First,
    /// The emission with the greatest end, the earliest one on ties
    Longest,
}

/// A successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<V> {
    /// Index of the first matched token
    pub start: usize,
    /// Index one past the last matched token
    pub end: usize,
    /// Captures visible at the emission, innermost bindings winning
    pub captures: FxHashMap<String, V>,
}

impl<V> MatchResult<V> {
    /// The matched index range.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of matched tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// `true` for zero-width matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// The value captured under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&V> {
        self.captures.get(name)
    }
}

/// Runs a [`Pattern`] over sequences.
///
/// # Examples
///
/// ```rust
/// use opscope::pattern::{Matcher, Pattern};
///
/// let input: Vec<char> = "abab".chars().collect();
/// let pair = Pattern::literal('a') + Pattern::literal('b');
/// let matcher: Matcher<char> = Matcher::first(pair);
///
/// let found: Vec<_> = matcher
///     .findall(&input, false)
///     .map(|m| m.map(|m| m.range()))
///     .collect::<Result<_, _>>()?;
/// assert_eq!(found, [0..2, 2..4]);
/// # Ok::<(), opscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Matcher<T, V = Value<T>> {
    pattern: Pattern<T, V>,
    strategy: Strategy,
}

impl<T, V> Matcher<T, V>
where
    T: PartialEq,
    V: CaptureValue<T>,
{
    /// Creates a driver with an explicit strategy.
    pub fn new(pattern: Pattern<T, V>, strategy: Strategy) -> Self {
        Matcher { pattern, strategy }
    }

    /// Creates a driver that takes the first emission.
    pub fn first(pattern: Pattern<T, V>) -> Self {
        Self::new(pattern, Strategy::First)
    }

    /// Creates a driver that takes the longest emission.
    pub fn longest(pattern: Pattern<T, V>) -> Self {
        Self::new(pattern, Strategy::Longest)
    }

    /// The driven pattern.
    pub fn pattern(&self) -> &Pattern<T, V> {
        &self.pattern
    }

    /// The selection strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// A match starting at 0 that consumes the whole sequence.
    ///
    /// The first such emission is taken regardless of the strategy.
    ///
    /// # Errors
    /// Propagates lookup failures of the pattern.
    pub fn fullmatch(&self, sequence: &[T]) -> Result<Option<MatchResult<V>>> {
        let mut captures = Captures::new();
        let scope = captures.enter();
        let mut cursor = self.pattern.cursor(0);

        let mut found = None;
        while let Some(end) = cursor.advance(sequence, &mut captures)? {
            if end >= sequence.len() {
                found = Some(MatchResult {
                    start: 0,
                    end,
                    captures: captures.snapshot(),
                });
                break;
            }
        }

        drop(cursor);
        captures.unwind(scope);
        Ok(found)
    }

    /// A match starting at 0.
    ///
    /// # Errors
    /// Propagates lookup failures of the pattern.
    pub fn match_prefix(&self, sequence: &[T]) -> Result<Option<MatchResult<V>>> {
        self.match_at(sequence, 0)
    }

    /// A match starting at `start`.
    ///
    /// # Errors
    /// Propagates lookup failures of the pattern.
    pub fn match_at(&self, sequence: &[T], start: usize) -> Result<Option<MatchResult<V>>> {
        let mut captures = Captures::new();
        let scope = captures.enter();
        let mut cursor = self.pattern.cursor(start);

        let mut best: Option<MatchResult<V>> = None;
        while let Some(end) = cursor.advance(sequence, &mut captures)? {
            if best.as_ref().is_some_and(|best| best.end >= end) {
                continue;
            }

            best = Some(MatchResult {
                start,
                end,
                captures: captures.snapshot(),
            });
            if self.strategy == Strategy::First {
                break;
            }
        }

        drop(cursor);
        captures.unwind(scope);
        Ok(best)
    }

    /// The leftmost match.
    ///
    /// # Errors
    /// Propagates lookup failures of the pattern.
    pub fn search(&self, sequence: &[T]) -> Result<Option<MatchResult<V>>> {
        self.search_from(sequence, 0)
    }

    /// The leftmost match starting at or after `start`.
    ///
    /// # Errors
    /// Propagates lookup failures of the pattern.
    pub fn search_from(&self, sequence: &[T], start: usize) -> Result<Option<MatchResult<V>>> {
        for position in start..sequence.len() {
            if let Some(found) = self.match_at(sequence, position)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Successive matches from left to right.
    ///
    /// Without `overlapping` the scan resumes at the end of each match, but always at least
    /// one token further; with it, the scan resumes one token after each match start.
    pub fn findall<'a>(&'a self, sequence: &'a [T], overlapping: bool) -> FindAll<'a, T, V> {
        FindAll {
            matcher: self,
            sequence,
            position: 0,
            overlapping,
            failed: false,
        }
    }
}

/// Iterator returned by [`Matcher::findall`].
pub struct FindAll<'a, T, V> {
    matcher: &'a Matcher<T, V>,
    sequence: &'a [T],
    position: usize,
    overlapping: bool,
    failed: bool,
}

impl<T, V> Iterator for FindAll<'_, T, V>
where
    T: PartialEq,
    V: CaptureValue<T>,
{
    type Item = Result<MatchResult<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.position < self.sequence.len() {
            match self.matcher.match_at(self.sequence, self.position) {
                Ok(Some(found)) => {
                    self.position = if self.overlapping {
                        self.position + 1
                    } else {
                        found.end.max(self.position + 1)
                    };
                    return Some(Ok(found));
                }
                Ok(None) => self.position += 1,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Verdict;

    type P = Pattern<char>;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn span(found: Option<MatchResult<Value<char>>>) -> Option<(usize, usize)> {
        found.map(|m| (m.start, m.end))
    }

    #[test]
    fn first_versus_longest() -> Result<()> {
        let input = chars("abc");
        // enumerates length 1 before length 3
        let p: P = Pattern::any_len([1, 3]);

        assert_eq!(span(Matcher::first(p.clone()).match_prefix(&input)?), Some((0, 1)));
        assert_eq!(span(Matcher::longest(p).match_prefix(&input)?), Some((0, 3)));

        let reversed: P = Pattern::any_len([3, 1]);
        assert_eq!(span(Matcher::first(reversed.clone()).match_prefix(&input)?), Some((0, 3)));
        assert_eq!(span(Matcher::longest(reversed).match_prefix(&input)?), Some((0, 3)));
        Ok(())
    }

    #[test]
    fn longest_keeps_first_on_ties() -> Result<()> {
        let input = chars("ab");
        let p: P = Pattern::any_len([2]).capture("first") | Pattern::any_len([2]).capture("second");
        let found = Matcher::longest(p).match_prefix(&input)?;
        let found = found.map(|m| m.captures.into_keys().collect::<Vec<_>>());
        assert_eq!(found, Some(vec!["first".to_string()]));
        Ok(())
    }

    #[test]
    fn backreference_fullmatch() -> Result<()> {
        let p: P = Pattern::any_of(['a', 'b']).capture("n") + Pattern::back("n").repeat(..);
        let matcher = Matcher::first(p);

        let found = matcher.fullmatch(&chars("aaa"))?;
        assert_eq!(found.as_ref().map(|m| m.end), Some(3));
        assert_eq!(found.and_then(|m| m.captures.get("n").cloned()), Some(Value::Token('a')));
        assert!(matcher.fullmatch(&chars("aab"))?.is_none());
        assert!(matcher.match_prefix(&chars("aab"))?.is_some());
        Ok(())
    }

    #[test]
    fn match_at_uses_start() -> Result<()> {
        let input = chars("xab");
        let matcher: Matcher<char> = Matcher::first(Pattern::literal('a') + Pattern::literal('b'));
        assert!(matcher.match_prefix(&input)?.is_none());
        assert_eq!(span(matcher.match_at(&input, 1)?), Some((1, 3)));
        Ok(())
    }

    #[test]
    fn search_scans_left_to_right() -> Result<()> {
        let matcher: Matcher<char> = Matcher::first(Pattern::literal('b').repeat(1..));
        let input = chars("aabbab");
        assert_eq!(span(matcher.search(&input)?), Some((2, 3)));
        assert_eq!(span(Matcher::longest(matcher.pattern().clone()).search(&input)?), Some((2, 4)));
        assert_eq!(span(matcher.search_from(&input, 4)?), Some((5, 6)));
        assert!(matcher.search(&chars("aaa"))?.is_none());
        Ok(())
    }

    #[test]
    fn findall_modes() -> Result<()> {
        let input = chars("aaaa");
        let matcher: Matcher<char> = Matcher::longest(Pattern::literal('a').repeat(2..=2));

        let plain: Vec<_> = matcher
            .findall(&input, false)
            .map(|m| m.map(|m| m.range()))
            .collect::<Result<_>>()?;
        assert_eq!(plain, [0..2, 2..4]);

        let overlapping: Vec<_> = matcher
            .findall(&input, true)
            .map(|m| m.map(|m| m.range()))
            .collect::<Result<_>>()?;
        assert_eq!(overlapping, [0..2, 1..3, 2..4]);
        Ok(())
    }

    #[test]
    fn findall_zero_width_progresses() -> Result<()> {
        let input = chars("ab");
        let matcher: Matcher<char> = Matcher::first(Pattern::literal('x').repeat(..));
        let starts: Vec<usize> = matcher
            .findall(&input, false)
            .map(|m| m.map(|m| m.start))
            .collect::<Result<_>>()?;
        assert_eq!(starts, [0, 1]);
        Ok(())
    }

    #[test]
    fn findall_stops_after_error() {
        let p: P = Pattern::function(|captures, _| {
            captures.get("missing")?;
            Ok(Verdict::Accept)
        });
        let matcher = Matcher::first(p);
        let input = chars("abc");
        let results: Vec<_> = matcher.findall(&input, false).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn empty_input() -> Result<()> {
        let matcher: Matcher<char> = Matcher::first(Pattern::eos());
        assert!(matcher.fullmatch(&[])?.is_some());
        assert!(matcher.search(&[])?.is_none());
        assert_eq!(matcher.findall(&[], false).count(), 0);
        Ok(())
    }
}
