//! Global optimization of a circuit across its module hierarchy.
//!
//! A [`Pipeline`] checks the circuit's structure, infers missing widths,
//! canonicalizes every module, then runs the enabled global passes in a fixed
//! order:
//!
//! 1. [`ConstProp`]: interprocedural constant propagation and dead code removal
//! 2. [`LivenessDce`]: deletion of everything that cannot reach a public port
//! 3. [`UnusedPorts`]: bottom-up removal of unobserved ports
//! 4. [`Dedup`]: merging of structurally identical modules
//! 5. [`Inline`]: inlining and flattening
//!
//! Each pass sees a freshly built [`InstanceGraph`](kiln_ir::InstanceGraph)
//! and returns its counters as a [`PassStats`]. Canonicalization runs once
//! more if any pass changed the circuit.

#![warn(missing_docs)]

pub mod error;
pub mod pass;
pub mod passes;
pub mod pipeline;

pub use error::{PipelineError, PipelineResult, W_DEDUP_PUBLIC, W_INLINE_EXTERNAL, W_MODULE_SKIPPED};
pub use pass::{Pass, PassContext, PassStats};
pub use passes::{ConstProp, Dedup, Inline, LivenessDce, UnusedPorts};
pub use pipeline::{Pipeline, PipelineStats};
