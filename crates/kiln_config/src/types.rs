//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;

/// Default per-operation rewrite cap.
pub const DEFAULT_MAX_REWRITES_PER_OP: u32 = 64;

/// The top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Rewrite engine settings.
    #[serde(default)]
    pub canonicalize: CanonicalizeConfig,
    /// Which global passes run.
    #[serde(default)]
    pub passes: PassToggles,
}

/// Settings for the local rewrite engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanonicalizeConfig {
    /// Hard cap on the rewrite lineage of any single operation. Exceeding it
    /// is reported as a compiler defect.
    #[serde(default = "default_cap")]
    pub max_rewrites_per_op: u32,
    /// Canonicalize sibling modules on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Fold operations whose operands are all constants.
    #[serde(default = "default_true")]
    pub fold_constants: bool,
}

impl Default for CanonicalizeConfig {
    fn default() -> Self {
        Self {
            max_rewrites_per_op: DEFAULT_MAX_REWRITES_PER_OP,
            parallel: true,
            fold_constants: true,
        }
    }
}

/// Enables or disables each global pass. The pass order itself is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassToggles {
    /// Interprocedural constant propagation and DCE.
    #[serde(default = "default_true")]
    pub const_prop: bool,
    /// Liveness-based dead code elimination across the hierarchy.
    #[serde(default = "default_true")]
    pub liveness_dce: bool,
    /// Bottom-up removal of unused ports.
    #[serde(default = "default_true")]
    pub unused_ports: bool,
    /// Structural module deduplication.
    #[serde(default = "default_true")]
    pub dedup: bool,
    /// Inlining and flattening of flagged modules.
    #[serde(default = "default_true")]
    pub inline: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self {
            const_prop: true,
            liveness_dce: true,
            unused_ports: true,
            dedup: true,
            inline: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cap() -> u32 {
    DEFAULT_MAX_REWRITES_PER_OP
}
