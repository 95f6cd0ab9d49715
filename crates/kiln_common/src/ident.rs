//! Interned identifiers for module names, name hints, and inner symbols.

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};

/// An interned name: a module symbol, a port name, an operation name hint,
/// or an inner symbol.
///
/// Identifiers are `u32` indices into an [`Interner`], giving O(1) equality
/// and copying. Ordering follows interning order, which makes maps keyed by
/// `Ident` deterministic for a given construction sequence.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Ident(u32);

impl Ident {
    /// Creates an `Ident` from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index of this identifier.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `Ident` wraps a `u32`, which always fits in `usize` on the 32- and
// 64-bit targets we support; `try_from_usize` rejects anything wider.
unsafe impl lasso::Key for Ident {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(Ident)
    }
}

/// Thread-safe string interner backed by [`lasso::ThreadedRodeo`].
///
/// Shared by reference between canonicalization workers, so new names minted
/// on any thread resolve everywhere.
pub struct Interner {
    rodeo: ThreadedRodeo<Ident>,
}

impl Interner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a string, returning its [`Ident`].
    pub fn get_or_intern(&self, s: &str) -> Ident {
        self.rodeo.get_or_intern(s)
    }

    /// Looks up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Ident> {
        self.rodeo.get(s)
    }

    /// Resolves an [`Ident`] back to its string value.
    ///
    /// # Panics
    ///
    /// Panics if the `Ident` was not created by this interner.
    pub fn resolve(&self, ident: Ident) -> &str {
        self.rodeo.resolve(&ident)
    }

    /// Interns `prefix` + `_` + `name`, the naming scheme used when a callee
    /// body is copied into its caller.
    pub fn prefixed(&self, prefix: Ident, name: Ident) -> Ident {
        let joined = format!("{}_{}", self.resolve(prefix), self.resolve(name));
        self.get_or_intern(&joined)
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}
