//! Plain-text rendering of diagnostics.

use crate::diagnostic::Diagnostic;
use kiln_common::Interner;

/// Renders a diagnostic in a rustc-like text format:
///
/// ```text
/// error[E311]: circular width dependency with no base case
///   --> Top.fir:4:3
///    = value `r` (Top.fir:4:3)
///    = value `_T` (<unknown>)
///    = note: ...
/// ```
pub fn render(diag: &Diagnostic, interner: &Interner) -> String {
    let mut out = format!("{}[{}]: {}\n", diag.severity, diag.code, diag.message);
    if !diag.loc.is_unknown() {
        out.push_str(&format!("  --> {}\n", diag.loc.display(interner)));
    }
    for label in &diag.labels {
        out.push_str(&format!(
            "   = {} ({})\n",
            label.message,
            label.loc.display(interner)
        ));
    }
    for note in &diag.notes {
        out.push_str(&format!("   = note: {note}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Category, DiagnosticCode};
    use kiln_common::Loc;

    #[test]
    fn renders_header_location_labels_notes() {
        let interner = Interner::new();
        let loc = Loc::FileLineCol {
            file: interner.get_or_intern("Top.fir"),
            line: 4,
            col: 3,
        };
        let diag = Diagnostic::error(
            DiagnosticCode::new(Category::Error, 311),
            "circular width dependency",
            loc,
        )
        .with_label(loc, "value `r`")
        .with_note("no base case");
        let text = render(&diag, &interner);
        assert_eq!(
            text,
            "error[E311]: circular width dependency\n  --> Top.fir:4:3\n   = value `r` (Top.fir:4:3)\n   = note: no base case\n"
        );
    }

    #[test]
    fn unknown_location_is_omitted() {
        let interner = Interner::new();
        let diag = Diagnostic::warning(
            DiagnosticCode::new(Category::Warning, 330),
            "skipped",
            Loc::Unknown,
        );
        assert_eq!(render(&diag, &interner), "warning[W330]: skipped\n");
    }
}
