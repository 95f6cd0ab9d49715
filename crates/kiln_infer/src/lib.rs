//! Width inference for integer types left unsized by the front end.
//!
//! Every value whose type carries an unknown width gets exactly one rule:
//! a fixed width for unsized literals, the result-type formula of its
//! defining expression, or the maximum over everything that flows into it
//! (connects, register reset values, and the ports linked through each
//! instance). The rules are solved together over the whole circuit because
//! port widths couple modules.
//!
//! Inference must run before canonicalization, whose width-dependent rules
//! only fire on known widths.

#![warn(missing_docs)]

mod constraints;
pub mod error;
mod solve;

pub use error::WidthInferenceError;
pub use solve::{infer_widths, InferStats};
