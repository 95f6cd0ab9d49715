//! Source locations carried through the IR for diagnostics.

use crate::ident::{Ident, Interner};
use serde::{Deserialize, Serialize};

/// Where an IR entity came from in the original design source.
///
/// The middle-end never reads source text; locations are attached by the
/// upstream parser and only surface in diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Loc {
    /// No location is known (entities created by rewrites).
    #[default]
    Unknown,
    /// A `file:line:col` location.
    FileLineCol {
        /// The interned file path.
        file: Ident,
        /// 1-based line.
        line: u32,
        /// 1-based column.
        col: u32,
    },
}

impl Loc {
    /// Returns `true` for [`Loc::Unknown`].
    pub fn is_unknown(self) -> bool {
        matches!(self, Loc::Unknown)
    }

    /// Formats the location as `file:line:col`, or `<unknown>`.
    pub fn display(self, interner: &Interner) -> String {
        match self {
            Loc::Unknown => "<unknown>".to_string(),
            Loc::FileLineCol { file, line, col } => {
                format!("{}:{line}:{col}", interner.resolve(file))
            }
        }
    }
}
