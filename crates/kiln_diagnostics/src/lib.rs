//! Diagnostics reported by the middle-end.
//!
//! Passes report problems with the input design as structured [`Diagnostic`]s
//! (severity, code, IR location, labels naming implicated values, notes)
//! into a thread-safe [`DiagnosticSink`]. [`render`] formats them as text for
//! whatever reporting layer sits above the middle-end.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::{Diagnostic, Label, Severity};
pub use renderer::render;
pub use sink::DiagnosticSink;
