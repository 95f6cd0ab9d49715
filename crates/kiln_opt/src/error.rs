//! Pipeline errors and the warning codes of the global passes.

use kiln_canon::CanonError;
use kiln_common::InternalError;
use kiln_config::ConfigError;
use kiln_diagnostics::{Category, DiagnosticCode};
use kiln_infer::WidthInferenceError;
use kiln_ir::StructuralError;

/// `W330`: a malformed module was left out of a pass.
pub const W_MODULE_SKIPPED: DiagnosticCode = DiagnosticCode::new(Category::Warning, 330);
/// `W331`: two identical modules could not be merged because both are public.
pub const W_DEDUP_PUBLIC: DiagnosticCode = DiagnosticCode::new(Category::Warning, 331);
/// `W332`: a module marked for inlining has no body to inline.
pub const W_INLINE_EXTERNAL: DiagnosticCode = DiagnosticCode::new(Category::Warning, 332);

/// Any fatal failure of the optimization pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The circuit violates a structural invariant.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// Some integer width could not be inferred.
    #[error(transparent)]
    WidthInference(#[from] WidthInferenceError),

    /// The rewrite engine failed to terminate or corrupted the IR.
    #[error(transparent)]
    Canon(#[from] CanonError),

    /// A pass broke an IR invariant.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Result alias for pass and pipeline entry points.
pub type PipelineResult<T> = Result<T, PipelineError>;
