//! Structured diagnostic messages.

use crate::code::DiagnosticCode;
use kiln_common::Loc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity level of a diagnostic, ordered from least to most severe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Severity {
    /// Extra context attached to another report.
    Note,
    /// A module or entity was skipped; the pass continued.
    Warning,
    /// The pipeline cannot continue.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A secondary annotation naming an implicated IR entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Where the entity came from, if known.
    pub loc: Loc,
    /// What the entity is and why it is implicated.
    pub message: String,
}

/// A diagnostic reported against the design.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level.
    pub severity: Severity,
    /// The unique code identifying the kind of problem.
    pub code: DiagnosticCode,
    /// The main message.
    pub message: String,
    /// The primary location.
    pub loc: Loc,
    /// Implicated entities, e.g. every value on a width cycle.
    pub labels: Vec<Label>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>, loc: Loc) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            loc,
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Creates an error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>, loc: Loc) -> Self {
        Self::new(Severity::Error, code, message, loc)
    }

    /// Creates a warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, loc: Loc) -> Self {
        Self::new(Severity::Warning, code, message, loc)
    }

    /// Adds a label naming an implicated entity.
    pub fn with_label(mut self, loc: Loc, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            loc,
            message: message.into(),
        });
        self
    }

    /// Adds a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Category;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn builder_methods() {
        let code = DiagnosticCode::new(Category::Error, 311);
        let diag = Diagnostic::error(code, "width cycle", Loc::Unknown)
            .with_label(Loc::Unknown, "value `r`")
            .with_label(Loc::Unknown, "value `next`")
            .with_note("widths only grow along this cycle");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.labels.len(), 2);
        assert_eq!(diag.notes.len(), 1);
    }

    #[test]
    fn warning_constructor() {
        let code = DiagnosticCode::new(Category::Warning, 330);
        let diag = Diagnostic::warning(code, "skipped", Loc::Unknown);
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(format!("{}", diag.severity), "warning");
    }
}
