//! The global pass interface and per-pass statistics.

use crate::error::PipelineResult;
use kiln_common::Interner;
use kiln_diagnostics::DiagnosticSink;
use kiln_ir::{Circuit, InstanceGraph};
use std::collections::BTreeMap;
use std::fmt;

/// Shared services available to every pass.
pub struct PassContext<'a> {
    /// Names of modules, ports and operations.
    pub interner: &'a Interner,
    /// Destination for warnings about skipped modules.
    pub sink: &'a DiagnosticSink,
}

/// A whole-circuit transformation.
///
/// The instance graph handed to [`Pass::run`] reflects the circuit as the
/// pass receives it. A pass that adds, removes or rewires instances must not
/// expect the graph to track its own edits; the pipeline rebuilds it before
/// the next pass.
pub trait Pass: Send + Sync {
    /// Stable name used in logs and statistics.
    fn name(&self) -> &'static str;

    /// Transforms the circuit and reports what changed.
    fn run(
        &self,
        circuit: &mut Circuit,
        graph: &InstanceGraph,
        cx: &PassContext<'_>,
    ) -> PipelineResult<PassStats>;
}

/// Named counters reported by one pass run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    /// The pass that produced the counters.
    pub pass: &'static str,
    /// Counter values by name.
    pub counters: BTreeMap<&'static str, u64>,
}

impl PassStats {
    /// Creates an empty record for `pass`.
    pub fn new(pass: &'static str) -> Self {
        Self {
            pass,
            counters: BTreeMap::new(),
        }
    }

    /// Adds `by` to the counter `name`.
    pub fn bump(&mut self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_default() += by;
    }

    /// Current value of `name`, zero if never bumped.
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Returns `true` if any counter is non-zero.
    pub fn changed(&self) -> bool {
        self.counters.values().any(|&v| v > 0)
    }
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.pass)?;
        if self.counters.is_empty() {
            return write!(f, " no changes");
        }
        for (name, value) in &self.counters {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_display() {
        let mut stats = PassStats::new("dedup");
        assert!(!stats.changed());
        assert_eq!(stats.to_string(), "dedup: no changes");
        stats.bump("modules-merged", 2);
        stats.bump("instances-rewired", 3);
        stats.bump("modules-merged", 1);
        assert_eq!(stats.get("modules-merged"), 3);
        assert_eq!(stats.get("missing"), 0);
        assert!(stats.changed());
        assert_eq!(
            stats.to_string(),
            "dedup: instances-rewired=3 modules-merged=3"
        );
    }
}
