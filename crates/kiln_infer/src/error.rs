//! Width inference failures.

use kiln_diagnostics::{Category, DiagnosticCode};

/// `E310`: widths on a dependency cycle never settle or never get a base case.
pub const E_WIDTH_CYCLE: DiagnosticCode = DiagnosticCode::new(Category::Error, 310);
/// `E311`: a width has no constraint that could determine it.
pub const E_WIDTH_UNRESOLVED: DiagnosticCode = DiagnosticCode::new(Category::Error, 311);
/// `E312`: an inferred width exceeds the representable range.
pub const E_WIDTH_OVERFLOW: DiagnosticCode = DiagnosticCode::new(Category::Error, 312);

/// Why width inference could not assign every unknown width.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidthInferenceError {
    /// Values whose widths depend on each other without converging.
    #[error("circular width dependency: {}", .values.join(" -> "))]
    Cycle {
        /// The values on the cycle, first repeated at the end.
        values: Vec<String>,
    },

    /// Values with no width source at all.
    #[error("uninferred width for {}", .values.join(", "))]
    Unresolved {
        /// The undetermined values.
        values: Vec<String>,
    },

    /// A width rule produced a width beyond `u32`.
    #[error("inferred width of `{value}` overflows")]
    Overflow {
        /// The offending value.
        value: String,
    },
}

impl WidthInferenceError {
    /// The diagnostic code for this error.
    pub fn code(&self) -> DiagnosticCode {
        match self {
            WidthInferenceError::Cycle { .. } => E_WIDTH_CYCLE,
            WidthInferenceError::Unresolved { .. } => E_WIDTH_UNRESOLVED,
            WidthInferenceError::Overflow { .. } => E_WIDTH_OVERFLOW,
        }
    }
}
