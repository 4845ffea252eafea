//! Scoped capture storage.
//!
//! Captures live in a stack of scopes. Every candidate match is bracketed by
//! [`Captures::enter`] and [`Captures::exit`], so bindings made while exploring an abandoned
//! candidate disappear together with its scope. Lookups search from the innermost scope
//! outwards. The base scope is created with the store and can not be exited.

use rustc_hash::FxHashMap;

use crate::{Error, Result};

/// Handle returned by [`Captures::enter`], identifying one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeToken {
    depth: usize,
    id: u64,
}

#[derive(Debug, Clone)]
struct Scope<V> {
    id: u64,
    bindings: FxHashMap<String, V>,
}

impl<V> Scope<V> {
    fn new(id: u64) -> Self {
        Scope {
            id,
            bindings: FxHashMap::default(),
        }
    }
}

/// A stack of capture scopes.
///
/// # Examples
///
/// ```rust
/// use opscope::pattern::Captures;
///
/// let mut captures = Captures::new();
/// captures.set("x", 1);
///
/// let token = captures.enter();
/// captures.set("x", 2);
/// assert_eq!(captures.get("x")?, &2);
///
/// captures.exit(token)?;
/// assert_eq!(captures.get("x")?, &1);
/// # Ok::<(), opscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Captures<V> {
    scopes: Vec<Scope<V>>,
    next_id: u64,
}

impl<V> Default for Captures<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Captures<V> {
    /// Creates a store holding only the base scope.
    #[must_use]
    pub fn new() -> Self {
        Captures {
            scopes: vec![Scope::new(0)],
            next_id: 1,
        }
    }

    /// Opens a new innermost scope.
    pub fn enter(&mut self) -> ScopeToken {
        let id = self.next_id;
        self.next_id += 1;
        self.scopes.push(Scope::new(id));

        ScopeToken {
            depth: self.scopes.len() - 1,
            id,
        }
    }

    /// Closes the innermost scope, dropping its bindings.
    ///
    /// # Errors
    /// Returns [`Error::ScopeMismatch`] if `token` does not belong to the innermost scope.
    pub fn exit(&mut self, token: ScopeToken) -> Result<()> {
        match self.scopes.last() {
            Some(scope)
                if token.depth > 0 && token.depth == self.scopes.len() - 1 && scope.id == token.id =>
            {
                self.scopes.pop();
                Ok(())
            }
            _ => Err(Error::ScopeMismatch),
        }
    }

    /// Closes the scope of `token` and every scope opened after it.
    ///
    /// Used when a match is abandoned half-way. Unknown or already closed tokens are ignored.
    pub fn unwind(&mut self, token: ScopeToken) {
        let owned = token.depth > 0
            && self
                .scopes
                .get(token.depth)
                .is_some_and(|scope| scope.id == token.id);
        if owned {
            self.scopes.truncate(token.depth);
        }
    }

    /// Binds `name` in the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: V) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.into(), value);
        }
    }

    /// Binds every pair of `bindings` in the innermost scope.
    pub fn merge(&mut self, bindings: impl IntoIterator<Item = (String, V)>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.extend(bindings);
        }
    }

    /// The innermost binding of `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&V> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    /// Like [`Captures::find`], failing for unbound names.
    ///
    /// # Errors
    /// Returns [`Error::UnboundCapture`] if no scope binds `name`.
    pub fn get(&self, name: &str) -> Result<&V> {
        self.find(name)
            .ok_or_else(|| Error::UnboundCapture(name.to_string()))
    }

    /// `true` if some scope binds `name`.
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Number of open scopes above the base scope.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }
}

impl<V: Clone> Captures<V> {
    /// Every visible binding, the innermost one winning for shadowed names.
    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, V> {
        let mut flat = FxHashMap::default();
        for scope in &self.scopes {
            for (name, value) in &scope.bindings {
                flat.insert(name.clone(), value.clone());
            }
        }
        flat
    }
}
