//! Pattern definitions and composition operators.
//!
//! A [`Pattern`] describes a set of token sequences. Leaf variants consume a single token (or
//! a slice, for [`Pattern::Any`]) and may bind it under a capture name; compound variants
//! compose other patterns. Patterns are plain data: matching state lives in the cursors
//! created by [`Pattern::cursor`], so one pattern can drive any number of matches.
//!
//! # Composition
//!
//! * `a + b` is a [`Pattern::Concatenation`]; nested concatenations are flattened.
//! * `a | b` is a [`Pattern::Alternation`]; nested alternations are flattened.
//! * `a.repeat(2..=4)` and `a.repeat_step(0.., 2)` build a [`Pattern::Repeat`].
//!
//! ```rust
//! use opscope::pattern::{Matcher, Pattern};
//!
//! let greeting: Pattern<char> = Pattern::literal('h') + Pattern::any_of(['a', 'e']).capture("vowel")
//!     + Pattern::literal('y').repeat(1..);
//!
//! let found = Matcher::longest(greeting).search(&"oh heyyy".chars().collect::<Vec<_>>())?;
//! assert_eq!(found.map(|m| (m.start, m.end)), Some((3, 8)));
//! # Ok::<(), opscope::Error>(())
//! ```

use std::{
    fmt,
    ops::{Add, BitOr, Bound, RangeBounds},
    sync::Arc,
};

use crate::{
    pattern::{captures::Captures, cursor::BoxCursor},
    Result,
};

/// A value that can be bound by a capture.
pub trait CaptureValue<T>: Clone {
    /// Value bound for a single token.
    fn from_token(token: &T) -> Self;

    /// Value bound for a slice of tokens.
    fn from_slice(tokens: &[T]) -> Self;

    /// `true` if this value, used as a backreference, matches `token`.
    fn matches(&self, token: &T) -> bool;
}

/// Default capture value: the captured token or slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value<T> {
    /// A single token
    Token(T),
    /// A run of tokens
    Slice(Vec<T>),
}

impl<T: Clone + PartialEq> CaptureValue<T> for Value<T> {
    fn from_token(token: &T) -> Self {
        Value::Token(token.clone())
    }

    fn from_slice(tokens: &[T]) -> Self {
        Value::Slice(tokens.to_vec())
    }

    fn matches(&self, token: &T) -> bool {
        match self {
            Value::Token(value) => value == token,
            Value::Slice(values) => values.len() == 1 && values[0] == *token,
        }
    }
}

/// What a [`Pattern::Direct`] compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected<T> {
    /// A fixed token
    Literal(T),
    /// The value bound to an earlier capture
    Back(String),
}

/// Outcome of a [`Pattern::Function`] predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<V> {
    /// The token does not match
    Reject,
    /// The token matches
    Accept,
    /// The token matches and the pairs are bound in the candidate's scope
    Bind(Vec<(String, V)>),
}

impl<V> From<bool> for Verdict<V> {
    fn from(accept: bool) -> Self {
        if accept {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

/// Predicate of a [`Pattern::Function`].
pub type Predicate<T, V> = Arc<dyn Fn(&Captures<V>, &T) -> Result<Verdict<V>>>;

/// A pattern variant implemented outside of this module.
///
/// Implementations return a cursor that follows the emission contract of
/// [`crate::pattern::Cursor`].
pub trait CustomPattern<T, V>: fmt::Debug {
    /// Starts a match at `start`.
    fn cursor(&self, start: usize) -> BoxCursor<'_, T, V>;
}

/// A backtracking pattern over tokens of type `T`, binding captures of type `V`.
pub enum Pattern<T, V = Value<T>> {
    /// One token equal to the expectation
    Direct {
        /// Literal or backreference
        expected: Expected<T>,
        /// Capture name for the token
        capture: Option<String>,
    },
    /// One token contained in `options`
    AnyOf {
        /// Accepted tokens
        options: Vec<T>,
        /// Capture name for the token
        capture: Option<String>,
    },
    /// One token accepted by a predicate
    Function {
        /// Decides about the token, may bind further captures
        predicate: Predicate<T, V>,
        /// Capture name for the token
        capture: Option<String>,
    },
    /// A run of arbitrary tokens, one emission per admissible length in the given order
    Any {
        /// Capture name for the slice
        capture: Option<String>,
        /// Candidate lengths
        lengths: Vec<usize>,
    },
    /// The end of the sequence
    Eos,
    /// Zero-width check that `inner` matches here
    Lookahead {
        /// Checked pattern
        inner: Box<Pattern<T, V>>,
        /// Drop the captures of `inner` instead of propagating them
        hide_captures: bool,
    },
    /// The branches in order
    Alternation(Vec<Pattern<T, V>>),
    /// The parts in sequence
    Concatenation(Vec<Pattern<T, V>>),
    /// `inner` repeated; counts in `min..=max` with `(count - min) % step == 0` are emitted
    Repeat {
        /// Repeated pattern, must consume at least one token if `max` is unbounded
        inner: Box<Pattern<T, V>>,
        /// Minimum count
        min: usize,
        /// Maximum count, `None` for unbounded
        max: Option<usize>,
        /// Count stride, at least 1
        step: usize,
    },
    /// Extension point
    Custom(Arc<dyn CustomPattern<T, V>>),
}

impl<T, V> Pattern<T, V> {
    /// One token equal to `value`.
    pub fn literal(value: T) -> Self {
        Pattern::Direct {
            expected: Expected::Literal(value),
            capture: None,
        }
    }

    /// One token equal to the value bound to `name`.
    pub fn back(name: impl Into<String>) -> Self {
        Pattern::Direct {
            expected: Expected::Back(name.into()),
            capture: None,
        }
    }

    /// One token out of `options`.
    pub fn any_of(options: impl IntoIterator<Item = T>) -> Self {
        Pattern::AnyOf {
            options: options.into_iter().collect(),
            capture: None,
        }
    }

    /// One token accepted by `predicate`.
    pub fn function<F>(predicate: F) -> Self
    where
        F: Fn(&Captures<V>, &T) -> Result<Verdict<V>> + 'static,
    {
        Pattern::Function {
            predicate: Arc::new(predicate),
            capture: None,
        }
    }

    /// Exactly one arbitrary token.
    #[must_use]
    pub fn any() -> Self {
        Pattern::Any {
            capture: None,
            lengths: vec![1],
        }
    }

    /// A run of arbitrary tokens, tried at each of `lengths` in order.
    pub fn any_len(lengths: impl IntoIterator<Item = usize>) -> Self {
        Pattern::Any {
            capture: None,
            lengths: lengths.into_iter().collect(),
        }
    }

    /// The end of the sequence.
    #[must_use]
    pub fn eos() -> Self {
        Pattern::Eos
    }

    /// Zero-width check for `inner`; its captures stay visible unless `hide_captures` is set.
    #[must_use]
    pub fn lookahead(inner: Self, hide_captures: bool) -> Self {
        Pattern::Lookahead {
            inner: Box::new(inner),
            hide_captures,
        }
    }

    /// Wraps a custom implementation.
    pub fn custom(pattern: impl CustomPattern<T, V> + 'static) -> Self {
        Pattern::Custom(Arc::new(pattern))
    }

    /// Sets the capture name of a leaf pattern.
    ///
    /// Only [`Pattern::Direct`], [`Pattern::AnyOf`], [`Pattern::Function`] and [`Pattern::Any`]
    /// carry a capture slot; other variants are returned unchanged.
    #[must_use]
    pub fn capture(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Pattern::Direct { capture, .. }
            | Pattern::AnyOf { capture, .. }
            | Pattern::Function { capture, .. }
            | Pattern::Any { capture, .. } => *capture = Some(name.into()),
            _ => {}
        }
        self
    }

    /// Repeats this pattern for every count in `counts`.
    ///
    /// ```rust
    /// use opscope::pattern::Pattern;
    ///
    /// let p: Pattern<u8> = Pattern::literal(b'a').repeat(2..=4);
    /// assert!(matches!(p, Pattern::Repeat { min: 2, max: Some(4), step: 1, .. }));
    /// ```
    #[must_use]
    pub fn repeat(self, counts: impl RangeBounds<usize>) -> Self {
        self.repeat_step(counts, 1)
    }

    /// Repeats this pattern for every `step`-th count in `counts`, counting from its minimum.
    ///
    /// A `step` of zero is treated as one.
    #[must_use]
    pub fn repeat_step(self, counts: impl RangeBounds<usize>, step: usize) -> Self {
        let mut min = match counts.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let max = match counts.end_bound() {
            Bound::Included(&n) => Some(n),
            Bound::Excluded(&0) => {
                // empty range, nothing may match
                min = min.max(1);
                Some(0)
            }
            Bound::Excluded(&n) => Some(n - 1),
            Bound::Unbounded => None,
        };

        Pattern::Repeat {
            inner: Box::new(self),
            min,
            max,
            step: step.max(1),
        }
    }

    /// Zero or one occurrence.
    #[must_use]
    pub fn optional(self) -> Self {
        self.repeat(0..=1)
    }
}

impl<T, V> Add for Pattern<T, V> {
    type Output = Pattern<T, V>;

    fn add(self, rhs: Self) -> Self::Output {
        let mut parts = match self {
            Pattern::Concatenation(parts) => parts,
            other => vec![other],
        };
        match rhs {
            Pattern::Concatenation(rest) => parts.extend(rest),
            other => parts.push(other),
        }
        Pattern::Concatenation(parts)
    }
}

impl<T, V> BitOr for Pattern<T, V> {
    type Output = Pattern<T, V>;

    fn bitor(self, rhs: Self) -> Self::Output {
        let mut branches = match self {
            Pattern::Alternation(branches) => branches,
            other => vec![other],
        };
        match rhs {
            Pattern::Alternation(rest) => branches.extend(rest),
            other => branches.push(other),
        }
        Pattern::Alternation(branches)
    }
}

impl<T: Clone, V> Clone for Pattern<T, V> {
    fn clone(&self) -> Self {
        match self {
            Pattern::Direct { expected, capture } => Pattern::Direct {
                expected: expected.clone(),
                capture: capture.clone(),
            },
            Pattern::AnyOf { options, capture } => Pattern::AnyOf {
                options: options.clone(),
                capture: capture.clone(),
            },
            Pattern::Function { predicate, capture } => Pattern::Function {
                predicate: Arc::clone(predicate),
                capture: capture.clone(),
            },
            Pattern::Any { capture, lengths } => Pattern::Any {
                capture: capture.clone(),
                lengths: lengths.clone(),
            },
            Pattern::Eos => Pattern::Eos,
            Pattern::Lookahead {
                inner,
                hide_captures,
            } => Pattern::Lookahead {
                inner: inner.clone(),
                hide_captures: *hide_captures,
            },
            Pattern::Alternation(branches) => Pattern::Alternation(branches.clone()),
            Pattern::Concatenation(parts) => Pattern::Concatenation(parts.clone()),
            Pattern::Repeat {
                inner,
                min,
                max,
                step,
            } => Pattern::Repeat {
                inner: inner.clone(),
                min: *min,
                max: *max,
                step: *step,
            },
            Pattern::Custom(custom) => Pattern::Custom(Arc::clone(custom)),
        }
    }
}

impl<T: fmt::Debug, V> fmt::Debug for Pattern<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Direct { expected, capture } => f
                .debug_struct("Direct")
                .field("expected", expected)
                .field("capture", capture)
                .finish(),
            Pattern::AnyOf { options, capture } => f
                .debug_struct("AnyOf")
                .field("options", options)
                .field("capture", capture)
                .finish(),
            Pattern::Function { capture, .. } => f
                .debug_struct("Function")
                .field("capture", capture)
                .finish_non_exhaustive(),
            Pattern::Any { capture, lengths } => f
                .debug_struct("Any")
                .field("capture", capture)
                .field("lengths", lengths)
                .finish(),
            Pattern::Eos => f.write_str("Eos"),
            Pattern::Lookahead {
                inner,
                hide_captures,
            } => f
                .debug_struct("Lookahead")
                .field("inner", inner)
                .field("hide_captures", hide_captures)
                .finish(),
            Pattern::Alternation(branches) => f.debug_tuple("Alternation").field(branches).finish(),
            Pattern::Concatenation(parts) => f.debug_tuple("Concatenation").field(parts).finish(),
            Pattern::Repeat {
                inner,
                min,
                max,
                step,
            } => f
                .debug_struct("Repeat")
                .field("inner", inner)
                .field("min", min)
                .field("max", max)
                .field("step", step)
                .finish(),
            Pattern::Custom(custom) => f.debug_tuple("Custom").field(custom).finish(),
        }
    }
}
