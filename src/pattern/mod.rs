//! Backtracking pattern matching over token sequences.
//!
//! Patterns are composed from a handful of variants (see [`Pattern`]) and executed by
//! [`Matcher`] drivers. Matching explores every way a pattern can match without recursion:
//! compound patterns keep explicit stacks of child [`Cursor`]s, and named captures live in a
//! scoped [`Captures`] store so that abandoned alternatives leave no bindings behind.
//!
//! # Key Types
//! - [`Pattern`] - Declarative pattern over tokens of any `PartialEq` type
//! - [`Matcher`] - First-match and longest-match drivers
//! - [`MatchResult`] - Matched range plus captures
//! - [`Captures`] - Scoped capture store used while matching
//! - [`CaptureValue`] - What a capture binds, [`Value`] by default
//!
//! # Example
//! ```rust
//! use opscope::pattern::{Matcher, Pattern, Value};
//!
//! // a token, then the same token again at least once
//! let twice: Pattern<u8> = Pattern::any().capture("t") + Pattern::back("t").repeat(1..);
//! let matcher = Matcher::longest(twice);
//!
//! let found = matcher.search(b"abccc")?.expect("match");
//! assert_eq!(found.range(), 2..5);
//! assert_eq!(found.get("t"), Some(&Value::Slice(vec![b'c'])));
//! # Ok::<(), opscope::Error>(())
//! ```

mod captures;
mod cursor;
mod matcher;
#[allow(clippy::module_inception)]
mod pattern;

pub use captures::{Captures, ScopeToken};
pub use cursor::{BoxCursor, Cursor};
pub use matcher::{FindAll, MatchResult, Matcher, Strategy};
pub use pattern::{CaptureValue, CustomPattern, Expected, Pattern, Predicate, Value, Verdict};
