//! Structural errors: malformed or ill-typed circuits that abort the pipeline.

use kiln_common::Loc;
use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode};

/// `E300`: module hierarchy contains an instantiation cycle.
pub const E_INSTANCE_CYCLE: DiagnosticCode = DiagnosticCode::new(Category::Error, 300);
/// `E301`: instance of a module that does not exist.
pub const E_UNDEFINED_MODULE: DiagnosticCode = DiagnosticCode::new(Category::Error, 301);
/// `E302`: instance results disagree with the callee's ports.
pub const E_INSTANCE_MISMATCH: DiagnosticCode = DiagnosticCode::new(Category::Error, 302);
/// `E303`: connect between incompatible types.
pub const E_ILL_TYPED_CONNECT: DiagnosticCode = DiagnosticCode::new(Category::Error, 303);
/// `E304`: connect into something that cannot be driven.
pub const E_INVALID_DESTINATION: DiagnosticCode = DiagnosticCode::new(Category::Error, 304);
/// `E305`: operation with ill-typed operands or result.
pub const E_ILL_TYPED_OP: DiagnosticCode = DiagnosticCode::new(Category::Error, 305);
/// `E306`: broken SSA bookkeeping or impossible module shape.
pub const E_MALFORMED: DiagnosticCode = DiagnosticCode::new(Category::Error, 306);

/// A fatal structural problem in the input circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    /// The instance graph is not a DAG.
    #[error("instance cycle: {}", .modules.join(" -> "))]
    InstanceCycle {
        /// Modules on the cycle, in instantiation order.
        modules: Vec<String>,
    },

    /// An instance names a module missing from the circuit.
    #[error("module `{module}` instantiates undefined module `{callee}`")]
    UndefinedModule {
        /// The instantiating module.
        module: String,
        /// The missing callee.
        callee: String,
        /// Location of the instance.
        loc: Loc,
    },

    /// Instance results do not line up with the callee's ports.
    #[error("instance of `{callee}` in `{module}` does not match its ports: {detail}")]
    InstanceMismatch {
        /// The instantiating module.
        module: String,
        /// The callee.
        callee: String,
        /// What differs.
        detail: String,
        /// Location of the instance.
        loc: Loc,
    },

    /// A connect between incompatible types.
    #[error("ill-typed connect in `{module}`: {detail}")]
    IllTypedConnect {
        /// The enclosing module.
        module: String,
        /// What differs.
        detail: String,
        /// Location of the connect.
        loc: Loc,
    },

    /// A connect whose destination cannot be driven.
    #[error("invalid connect destination in `{module}`: {detail}")]
    InvalidDestination {
        /// The enclosing module.
        module: String,
        /// Why the destination is rejected.
        detail: String,
        /// Location of the connect.
        loc: Loc,
    },

    /// An operation whose operands or result are ill-typed.
    #[error("ill-typed `{op}` in `{module}`: {detail}")]
    IllTypedOp {
        /// The enclosing module.
        module: String,
        /// Operation mnemonic.
        op: String,
        /// What is wrong.
        detail: String,
        /// Location of the operation.
        loc: Loc,
    },

    /// Broken SSA bookkeeping or impossible module shape.
    #[error("malformed module `{module}`: {detail}")]
    Malformed {
        /// The module.
        module: String,
        /// What is wrong.
        detail: String,
    },
}

impl StructuralError {
    /// The diagnostic code for this error.
    pub fn code(&self) -> DiagnosticCode {
        match self {
            StructuralError::InstanceCycle { .. } => E_INSTANCE_CYCLE,
            StructuralError::UndefinedModule { .. } => E_UNDEFINED_MODULE,
            StructuralError::InstanceMismatch { .. } => E_INSTANCE_MISMATCH,
            StructuralError::IllTypedConnect { .. } => E_ILL_TYPED_CONNECT,
            StructuralError::InvalidDestination { .. } => E_INVALID_DESTINATION,
            StructuralError::IllTypedOp { .. } => E_ILL_TYPED_OP,
            StructuralError::Malformed { .. } => E_MALFORMED,
        }
    }

    /// Location of the offending entity, if one is attached.
    pub fn loc(&self) -> Loc {
        match self {
            StructuralError::UndefinedModule { loc, .. }
            | StructuralError::InstanceMismatch { loc, .. }
            | StructuralError::IllTypedConnect { loc, .. }
            | StructuralError::InvalidDestination { loc, .. }
            | StructuralError::IllTypedOp { loc, .. } => *loc,
            StructuralError::InstanceCycle { .. } | StructuralError::Malformed { .. } => {
                Loc::Unknown
            }
        }
    }

    /// Converts the error into a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.code(), self.to_string(), self.loc());
        match self {
            StructuralError::InstanceCycle { modules } => modules
                .iter()
                .fold(diag, |d, m| d.with_note(format!("`{m}` is on the cycle"))),
            _ => diag,
        }
    }
}
