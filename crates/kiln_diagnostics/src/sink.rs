//! Thread-safe diagnostic accumulator.

use crate::code::DiagnosticCode;
use crate::diagnostic::{Diagnostic, Severity};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Accumulates diagnostics from every pass, including parallel
/// canonicalization workers.
///
/// The error count is tracked atomically so `has_errors` never locks.
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    error_count: AtomicUsize,
}

impl DiagnosticSink {
    /// Creates a new empty diagnostic sink.
    pub fn new() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            error_count: AtomicUsize::new(0),
        }
    }

    /// Emits a diagnostic into the sink.
    pub fn emit(&self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        // A poisoned lock only means another emitter panicked mid-push; the
        // vector itself is still usable.
        let mut diagnostics = self
            .diagnostics
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        diagnostics.push(diag);
    }

    /// Returns `true` if any error-severity diagnostics have been emitted.
    pub fn has_errors(&self) -> bool {
        self.error_count.load(Ordering::Relaxed) > 0
    }

    /// Returns the number of error-severity diagnostics emitted so far.
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Returns `true` if a diagnostic with `code` has been emitted.
    pub fn contains_code(&self, code: DiagnosticCode) -> bool {
        self.diagnostics().iter().any(|d| d.code == code)
    }

    /// Takes all accumulated diagnostics, leaving the sink empty.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self
            .diagnostics
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        std::mem::take(&mut *diagnostics)
    }

    /// Returns a snapshot of all accumulated diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Category;
    use kiln_common::Loc;

    const E1: DiagnosticCode = DiagnosticCode::new(Category::Error, 300);
    const W1: DiagnosticCode = DiagnosticCode::new(Category::Warning, 330);

    #[test]
    fn empty_sink() {
        let sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        assert!(sink.take_all().is_empty());
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let sink = DiagnosticSink::new();
        sink.emit(Diagnostic::warning(W1, "skipped module", Loc::Unknown));
        assert!(!sink.has_errors());
        assert!(sink.contains_code(W1));
        assert!(!sink.contains_code(E1));
    }

    #[test]
    fn take_all_drains_but_keeps_count() {
        let sink = DiagnosticSink::new();
        sink.emit(Diagnostic::error(E1, "cycle", Loc::Unknown));
        sink.emit(Diagnostic::warning(W1, "skip", Loc::Unknown));
        assert_eq!(sink.take_all().len(), 2);
        assert!(sink.take_all().is_empty());
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn concurrent_emitters() {
        use std::sync::Arc;
        use std::thread;

        let sink = Arc::new(DiagnosticSink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..50 {
                        sink.emit(Diagnostic::error(E1, "x", Loc::Unknown));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.error_count(), 400);
        assert_eq!(sink.diagnostics().len(), 400);
    }
}
