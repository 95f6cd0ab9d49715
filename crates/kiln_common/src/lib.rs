//! Shared foundational types used across the kiln middle-end.
//!
//! This crate provides interned identifiers, content hashing and structural
//! fingerprinting, arbitrary-width two-state integers, source locations, and
//! the internal error type used to flag compiler defects.

#![warn(missing_docs)]

pub mod apint;
pub mod hash;
pub mod ident;
pub mod loc;
pub mod result;

pub use apint::ApInt;
pub use hash::{ContentHash, Fingerprinter};
pub use ident::{Ident, Interner};
pub use loc::Loc;
pub use result::{InternalError, KilnResult};
