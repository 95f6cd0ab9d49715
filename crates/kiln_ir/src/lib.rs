//! Typed SSA intermediate representation for hardware designs.
//!
//! A [`Circuit`] owns a set of [`Module`]s, one of them the top. Each module
//! holds ports, operations, and SSA values with use-lists. Values are defined
//! exactly once, either by a port or by an operation result, and every use is
//! mirrored as a back-reference on the value. Modules reference each other by
//! symbol through instance operations; [`InstanceGraph`] turns those references
//! into a DAG.
//!
//! Besides the data model this crate provides a [`ModuleBuilder`], the
//! [`fold`] constant evaluator shared by all optimizations, a combinational
//! [`eval`]uator, and the structural [`verify`] checks.

#![warn(missing_docs)]

pub mod arena;
pub mod builder;
pub mod circuit;
pub mod error;
pub mod eval;
pub mod fold;
pub mod ids;
pub mod instance_graph;
pub mod module;
pub mod op;
pub mod types;
pub mod verify;

pub use arena::{Arena, ArenaId};
pub use builder::ModuleBuilder;
pub use circuit::{Circuit, InnerRef};
pub use error::StructuralError;
pub use eval::{evaluate, EvalError, Signal};
pub use ids::{ModuleId, OpId, ValueId};
pub use instance_graph::{InstanceGraph, InstanceSite};
pub use module::{Direction, InlineMode, Module, Port, Use, ValueData, ValueDef, Visibility};
pub use op::{
    Access, Annotation, BinaryOp, CastKind, CompareOp, ConnectKind, InstanceInfo, Op, OpKind,
    RegKind, ShiftAmount, ShiftDir,
};
pub use types::{expr_result_type, IntType, Type, Width};
pub use verify::{verify_circuit, verify_module};
