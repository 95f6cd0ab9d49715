//! Local rewriting of modules to a canonical form.
//!
//! Rules are pattern-matched per operation by a worklist engine until no rule
//! applies. They fold constants, apply algebraic identities, simplify
//! multiplexers and compose bit extractions, specialize dynamic shifts and
//! indexes with constant amounts, and tighten registers and connects. Every
//! replacement keeps the exact result type of the operation it replaces.
//! The rules need known widths and are meant to run after width inference.

#![warn(missing_docs)]

mod engine;
pub mod error;
mod rewriter;
mod rules;
#[cfg(test)]
mod testing;

pub use engine::{canonicalize, canonicalize_circuit, CanonStats};
pub use error::{CanonError, E_REWRITE_NON_TERMINATION};
