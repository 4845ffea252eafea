//! Resumable match enumeration.
//!
//! [`Pattern::cursor`] starts a match at a fixed position and returns a [`Cursor`]. Each call
//! to [`Cursor::advance`] produces the end of the next way the pattern matches, or `None`
//! once every way has been tried.
//!
//! Captures follow a strict protocol:
//!
//! * bindings made for an emission stay in scopes the cursor keeps open until its next
//!   `advance`, so they are visible to whatever is matched after it,
//! * a cursor that reports exhaustion has exited every scope it entered,
//! * a caller that drops a cursor early unwinds to a token taken before starting it.
//!
//! Compound patterns keep their own stacks of child cursors instead of recursing, so the
//! call depth of a match does not grow with the number of repetitions.

use crate::{
    pattern::{
        captures::{Captures, ScopeToken},
        pattern::{CaptureValue, Expected, Pattern, Verdict},
    },
    Result,
};

/// A running match, see the [module documentation](self).
pub trait Cursor<T, V> {
    /// Produces the end of the next match, or `None` when exhausted.
    ///
    /// # Errors
    /// Propagates lookup failures, e.g. a backreference to an unbound capture. The capture
    /// store must then be unwound by the caller.
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>>;
}

/// A boxed cursor borrowing its pattern.
pub type BoxCursor<'p, T, V> = Box<dyn Cursor<T, V> + 'p>;

impl<T, V> Pattern<T, V>
where
    T: PartialEq,
    V: CaptureValue<T>,
{
    /// Starts a match at `start`.
    pub fn cursor(&self, start: usize) -> BoxCursor<'_, T, V> {
        match self {
            Pattern::Direct { .. } | Pattern::AnyOf { .. } | Pattern::Function { .. } => {
                Box::new(TokenCursor {
                    pattern: self,
                    start,
                    state: State::Fresh,
                })
            }
            Pattern::Any { capture, lengths } => Box::new(AnyCursor {
                capture: capture.as_deref(),
                lengths,
                start,
                next: 0,
                scope: None,
            }),
            Pattern::Eos => Box::new(EosCursor { start, done: false }),
            Pattern::Lookahead {
                inner,
                hide_captures,
            } => Box::new(LookaheadCursor {
                inner,
                hide_captures: *hide_captures,
                start,
                state: State::Fresh,
            }),
            Pattern::Alternation(branches) => Box::new(AlternationCursor {
                branches,
                start,
                next: 0,
                current: None,
            }),
            Pattern::Concatenation(parts) => Box::new(ConcatenationCursor {
                parts,
                start,
                frames: Vec::new(),
                results: Vec::new(),
                phase: Phase::Fresh,
            }),
            Pattern::Repeat {
                inner,
                min,
                max,
                step,
            } => Box::new(RepeatCursor {
                inner,
                min: *min,
                max: *max,
                step: (*step).max(1),
                start,
                frames: Vec::new(),
                results: Vec::new(),
                extend: false,
                phase: Phase::Fresh,
            }),
            Pattern::Custom(custom) => custom.cursor(start),
        }
    }

    /// Tests a single-token leaf against `token`, binding its captures in the current scope.
    fn accept(&self, token: &T, captures: &mut Captures<V>) -> Result<bool> {
        match self {
            Pattern::Direct { expected, capture } => {
                let matched = match expected {
                    Expected::Literal(value) => value == token,
                    Expected::Back(name) => captures.get(name)?.matches(token),
                };
                if matched {
                    bind(captures, capture.as_deref(), || V::from_token(token));
                }
                Ok(matched)
            }
            Pattern::AnyOf { options, capture } => {
                let matched = options.contains(token);
                if matched {
                    bind(captures, capture.as_deref(), || V::from_token(token));
                }
                Ok(matched)
            }
            Pattern::Function { predicate, capture } => {
                let bindings = match predicate(captures, token)? {
                    Verdict::Reject => return Ok(false),
                    Verdict::Accept => Vec::new(),
                    Verdict::Bind(bindings) => bindings,
                };
                bind(captures, capture.as_deref(), || V::from_token(token));
                captures.merge(bindings);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn bind<V>(captures: &mut Captures<V>, name: Option<&str>, value: impl FnOnce() -> V) {
    if let Some(name) = name {
        captures.set(name, value());
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Fresh,
    Emitted(ScopeToken),
    Done,
}

/// Direct, AnyOf and Function: at most one emission.
struct TokenCursor<'p, T, V> {
    pattern: &'p Pattern<T, V>,
    start: usize,
    state: State,
}

impl<T: PartialEq, V: CaptureValue<T>> Cursor<T, V> for TokenCursor<'_, T, V> {
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>> {
        match self.state {
            State::Fresh => {
                self.state = State::Done;
                let Some(token) = sequence.get(self.start) else {
                    return Ok(None);
                };

                let scope = captures.enter();
                if self.pattern.accept(token, captures)? {
                    self.state = State::Emitted(scope);
                    Ok(Some(self.start + 1))
                } else {
                    captures.exit(scope)?;
                    Ok(None)
                }
            }
            State::Emitted(scope) => {
                self.state = State::Done;
                captures.exit(scope)?;
                Ok(None)
            }
            State::Done => Ok(None),
        }
    }
}

struct AnyCursor<'p> {
    capture: Option<&'p str>,
    lengths: &'p [usize],
    start: usize,
    next: usize,
    scope: Option<ScopeToken>,
}

impl<T, V: CaptureValue<T>> Cursor<T, V> for AnyCursor<'_> {
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>> {
        if let Some(scope) = self.scope.take() {
            captures.exit(scope)?;
        }

        while let Some(&len) = self.lengths.get(self.next) {
            self.next += 1;
            let end = self.start.saturating_add(len);
            if end > sequence.len() {
                continue;
            }

            let scope = captures.enter();
            bind(captures, self.capture, || V::from_slice(&sequence[self.start..end]));
            self.scope = Some(scope);
            return Ok(Some(end));
        }

        Ok(None)
    }
}

struct EosCursor {
    start: usize,
    done: bool,
}

impl<T, V> Cursor<T, V> for EosCursor {
    fn advance(&mut self, sequence: &[T], _captures: &mut Captures<V>) -> Result<Option<usize>> {
        if self.done || self.start < sequence.len() {
            self.done = true;
            return Ok(None);
        }

        self.done = true;
        Ok(Some(self.start))
    }
}

struct LookaheadCursor<'p, T, V> {
    inner: &'p Pattern<T, V>,
    hide_captures: bool,
    start: usize,
    state: State,
}

impl<T: PartialEq, V: CaptureValue<T>> Cursor<T, V> for LookaheadCursor<'_, T, V> {
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>> {
        match self.state {
            State::Fresh => {
                self.state = State::Done;
                let scope = captures.enter();
                let mut inner = self.inner.cursor(self.start);

                match inner.advance(sequence, captures) {
                    Ok(Some(_)) if self.hide_captures => {
                        captures.unwind(scope);
                        Ok(Some(self.start))
                    }
                    Ok(Some(_)) => {
                        // the inner cursor is dropped, its scopes stay open until the next call
                        self.state = State::Emitted(scope);
                        Ok(Some(self.start))
                    }
                    Ok(None) => {
                        captures.exit(scope)?;
                        Ok(None)
                    }
                    Err(err) => {
                        captures.unwind(scope);
                        Err(err)
                    }
                }
            }
            State::Emitted(scope) => {
                self.state = State::Done;
                captures.unwind(scope);
                Ok(None)
            }
            State::Done => Ok(None),
        }
    }
}

struct AlternationCursor<'p, T, V> {
    branches: &'p [Pattern<T, V>],
    start: usize,
    next: usize,
    current: Option<(BoxCursor<'p, T, V>, ScopeToken)>,
}

impl<'p, T: PartialEq, V: CaptureValue<T>> Cursor<T, V> for AlternationCursor<'p, T, V> {
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>> {
        loop {
            if let Some((cursor, scope)) = &mut self.current {
                if let Some(end) = cursor.advance(sequence, captures)? {
                    return Ok(Some(end));
                }
                captures.exit(*scope)?;
                self.current = None;
            }

            let Some(branch) = self.branches.get(self.next) else {
                return Ok(None);
            };
            self.next += 1;
            let scope = captures.enter();
            self.current = Some((branch.cursor(self.start), scope));
        }
    }
}

/// Frames are pushed left to right. `results[i]` is the current end of `frames[i]`; a frame
/// without result is the one being pulled next.
struct ConcatenationCursor<'p, T, V> {
    parts: &'p [Pattern<T, V>],
    start: usize,
    frames: Vec<(BoxCursor<'p, T, V>, ScopeToken)>,
    results: Vec<usize>,
    phase: Phase,
}

impl<'p, T: PartialEq, V: CaptureValue<T>> Cursor<T, V> for ConcatenationCursor<'p, T, V> {
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>> {
        match self.phase {
            Phase::Done => return Ok(None),
            Phase::Fresh | Phase::Seed => {
                let Some(first) = self.parts.first() else {
                    self.phase = Phase::Done;
                    return Ok(Some(self.start));
                };
                let scope = captures.enter();
                self.frames.push((first.cursor(self.start), scope));
                self.phase = Phase::Running;
            }
            Phase::Running => {}
        }

        loop {
            let pulled = self.results.len();
            if pulled < self.frames.len() {
                let (cursor, _) = &mut self.frames[pulled];
                match cursor.advance(sequence, captures)? {
                    Some(end) => self.results.push(end),
                    None => {
                        if let Some((_, scope)) = self.frames.pop() {
                            captures.exit(scope)?;
                        }
                        if self.results.pop().is_none() {
                            self.phase = Phase::Done;
                            return Ok(None);
                        }
                    }
                }
            } else if let Some(part) = self.parts.get(self.frames.len()) {
                let from = self.results.last().copied().unwrap_or(self.start);
                let scope = captures.enter();
                self.frames.push((part.cursor(from), scope));
            } else {
                // every part has a result; the last frame is re-pulled on the next call
                return Ok(self.results.pop());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Seed,
    Running,
    Done,
}

/// Like the concatenation cursor, with every frame matching the same inner pattern.
struct RepeatCursor<'p, T, V> {
    inner: &'p Pattern<T, V>,
    min: usize,
    max: Option<usize>,
    step: usize,
    start: usize,
    frames: Vec<(BoxCursor<'p, T, V>, ScopeToken)>,
    results: Vec<usize>,
    /// The previous call emitted at `frames.len()` repetitions and owes the next one
    extend: bool,
    phase: Phase,
}

impl<'p, T: PartialEq, V: CaptureValue<T>> RepeatCursor<'p, T, V> {
    fn push_frame(&mut self, captures: &mut Captures<V>) {
        let from = self.results.last().copied().unwrap_or(self.start);
        let scope = captures.enter();
        self.frames.push((self.inner.cursor(from), scope));
    }
}

impl<'p, T: PartialEq, V: CaptureValue<T>> Cursor<T, V> for RepeatCursor<'p, T, V> {
    fn advance(&mut self, sequence: &[T], captures: &mut Captures<V>) -> Result<Option<usize>> {
        loop {
            match self.phase {
                Phase::Done => return Ok(None),
                Phase::Fresh => {
                    if self.max.is_some_and(|max| max < self.min) {
                        self.phase = Phase::Done;
                        return Ok(None);
                    }
                    if self.min == 0 {
                        self.phase = if self.max == Some(0) {
                            Phase::Done
                        } else {
                            Phase::Seed
                        };
                        return Ok(Some(self.start));
                    }
                    self.phase = Phase::Seed;
                }
                Phase::Seed => {
                    self.push_frame(captures);
                    self.phase = Phase::Running;
                }
                Phase::Running => break,
            }
        }

        loop {
            if self.extend {
                self.extend = false;
                if self.max.map_or(true, |max| self.frames.len() < max) {
                    self.push_frame(captures);
                } else {
                    self.results.pop();
                }
                continue;
            }

            let pulled = self.results.len();
            if pulled < self.frames.len() {
                let (cursor, _) = &mut self.frames[pulled];
                match cursor.advance(sequence, captures)? {
                    Some(end) => self.results.push(end),
                    None => {
                        if let Some((_, scope)) = self.frames.pop() {
                            captures.exit(scope)?;
                        }
                        if self.frames.is_empty() {
                            self.phase = Phase::Done;
                            return Ok(None);
                        }
                        self.results.pop();
                    }
                }
            } else if self.frames.len() < self.min {
                self.push_frame(captures);
            } else {
                let count = self.frames.len();
                self.extend = true;
                if (count - self.min) % self.step == 0 {
                    return Ok(self.results.last().copied());
                }
            }
        }
    }
}
