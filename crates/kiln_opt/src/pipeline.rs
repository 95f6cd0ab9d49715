//! The end-to-end optimization pipeline.

use crate::error::PipelineResult;
use crate::pass::{Pass, PassContext, PassStats};
use crate::passes::{ConstProp, Dedup, Inline, LivenessDce, UnusedPorts};
use kiln_canon::{canonicalize_circuit, CanonStats};
use kiln_common::Interner;
use kiln_config::{load_config, PipelineConfig};
use kiln_diagnostics::DiagnosticSink;
use kiln_infer::{infer_widths, InferStats};
use kiln_ir::{verify_circuit, Circuit, InstanceGraph, StructuralError};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Everything the pipeline changed, phase by phase.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Width inference summary.
    pub inferred: InferStats,
    /// Rewrites and erasures of both canonicalization runs.
    pub canonicalize: CanonStats,
    /// One record per global pass, in run order.
    pub passes: Vec<PassStats>,
}

impl PipelineStats {
    /// Returns the record of the pass named `name`, if it ran.
    pub fn pass(&self, name: &str) -> Option<&PassStats> {
        self.passes.iter().find(|p| p.pass == name)
    }
}

/// Runs width inference, canonicalization and the enabled global passes.
pub struct Pipeline {
    config: PipelineConfig,
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// Creates a pipeline running the passes enabled in `config`.
    pub fn new(config: PipelineConfig) -> Self {
        let toggles = &config.passes;
        let mut passes: Vec<Box<dyn Pass>> = Vec::new();
        if toggles.const_prop {
            passes.push(Box::new(ConstProp));
        }
        if toggles.liveness_dce {
            passes.push(Box::new(LivenessDce));
        }
        if toggles.unused_ports {
            passes.push(Box::new(UnusedPorts));
        }
        if toggles.dedup {
            passes.push(Box::new(Dedup));
        }
        if toggles.inline {
            passes.push(Box::new(Inline));
        }
        Self { config, passes }
    }

    /// Creates a pipeline from the `kiln.toml` in `project_dir`.
    pub fn from_dir(project_dir: &Path) -> PipelineResult<Self> {
        Ok(Self::new(load_config(project_dir)?))
    }

    /// The configuration the pipeline was built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the global passes in run order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Optimizes `circuit` in place.
    ///
    /// Structural errors, width inference failures and rewrite
    /// non-termination abort the run after a diagnostic has been emitted to
    /// `sink`. Passes report per-module problems to `sink` and carry on.
    #[instrument(skip_all)]
    pub fn run(
        &self,
        circuit: &mut Circuit,
        interner: &Interner,
        sink: &DiagnosticSink,
    ) -> PipelineResult<PipelineStats> {
        info!(
            modules = circuit.len(),
            ops = circuit.num_ops(),
            passes = self.passes.len(),
            "running pipeline"
        );
        instance_graph(circuit, interner, sink)?;
        reported(sink, verify_circuit(circuit, interner))?;

        let inferred = infer_widths(circuit, interner, sink)?;
        let mut canonicalize = self.canonicalize(circuit, interner, sink)?;

        let cx = PassContext { interner, sink };
        let mut passes = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            let graph = instance_graph(circuit, interner, sink)?;
            debug!(pass = pass.name(), "running pass");
            let stats = pass.run(circuit, &graph, &cx)?;
            info!(ops = circuit.num_ops(), "{stats}");
            passes.push(stats);
        }

        if passes.iter().any(PassStats::changed) {
            canonicalize.merge(&self.canonicalize(circuit, interner, sink)?);
        }
        reported(sink, verify_circuit(circuit, interner))?;

        info!(
            modules = circuit.len(),
            ops = circuit.num_ops(),
            "pipeline complete"
        );
        Ok(PipelineStats {
            inferred,
            canonicalize,
            passes,
        })
    }

    fn canonicalize(
        &self,
        circuit: &mut Circuit,
        interner: &Interner,
        sink: &DiagnosticSink,
    ) -> PipelineResult<CanonStats> {
        canonicalize_circuit(circuit, interner, &self.config.canonicalize).map_err(|err| {
            sink.emit(err.to_diagnostic());
            err.into()
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

fn instance_graph(
    circuit: &Circuit,
    interner: &Interner,
    sink: &DiagnosticSink,
) -> PipelineResult<InstanceGraph> {
    reported(sink, InstanceGraph::build(circuit, interner))
}

/// Emits a structural error as a diagnostic before handing it on.
fn reported<T>(sink: &DiagnosticSink, result: Result<T, StructuralError>) -> PipelineResult<T> {
    result.map_err(|err| {
        sink.emit(err.to_diagnostic());
        err.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::PassToggles;

    #[test]
    fn passes_follow_the_toggles_in_order() {
        assert_eq!(
            Pipeline::default().pass_names(),
            vec!["const-prop", "liveness-dce", "unused-ports", "dedup", "inline"]
        );
        let config = PipelineConfig {
            passes: PassToggles {
                liveness_dce: false,
                dedup: false,
                ..PassToggles::default()
            },
            ..PipelineConfig::default()
        };
        assert_eq!(
            Pipeline::new(config).pass_names(),
            vec!["const-prop", "unused-ports", "inline"]
        );
    }
}
