//! Errors raised by the rewrite engine.

use kiln_common::InternalError;
use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode};

/// `E320`: rewriting did not reach a fixed point within the lineage cap.
pub const E_REWRITE_NON_TERMINATION: DiagnosticCode = DiagnosticCode::new(Category::Error, 320);

/// A defect in the rewrite engine or its rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonError {
    /// A chain of rewrites starting from one operation exceeded the cap.
    #[error(
        "internal compiler error: rewriting `{op}` in module `{module}` with `{rule}` exceeded {cap} generations"
    )]
    RewriteNonTermination {
        /// Module being canonicalized.
        module: String,
        /// Mnemonic of the operation at the cap.
        op: String,
        /// The rule that fired last.
        rule: &'static str,
        /// The configured cap.
        cap: u32,
    },

    /// IR bookkeeping was violated by a rule.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CanonError {
    /// Converts the error into a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(E_REWRITE_NON_TERMINATION, self.to_string(), Default::default());
        match self {
            CanonError::RewriteNonTermination { rule, .. } => {
                diag.with_note(format!("rule `{rule}` keeps re-matching its own output"))
            }
            CanonError::Internal(_) => diag,
        }
    }
}
