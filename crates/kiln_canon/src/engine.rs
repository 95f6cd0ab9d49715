//! The worklist driver.
//!
//! Every operation starts on the worklist. A popped operation that is
//! trivially dead is erased; otherwise the rules registered for its kind are
//! tried in order and the first match is applied. Operations created by a
//! rewrite inherit the root's generation plus one, and a generation past the
//! configured cap aborts with [`CanonError::RewriteNonTermination`].

use crate::error::CanonError;
use crate::rewriter::Rewriter;
use crate::rules::rules_for;
use kiln_common::Interner;
use kiln_config::CanonicalizeConfig;
use kiln_ir::{Circuit, Module, OpId, ValueId};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, instrument};

/// Counters from one canonicalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonStats {
    /// Rules applied.
    pub rewrites: usize,
    /// Trivially dead operations erased.
    pub erased: usize,
    /// Applications per rule name.
    pub by_rule: BTreeMap<&'static str, usize>,
}

impl CanonStats {
    /// Returns `true` if anything was rewritten or erased.
    pub fn changed(&self) -> bool {
        self.rewrites > 0 || self.erased > 0
    }

    /// Adds the counters of `other` into `self`.
    pub fn merge(&mut self, other: &CanonStats) {
        self.rewrites += other.rewrites;
        self.erased += other.erased;
        for (rule, count) in &other.by_rule {
            *self.by_rule.entry(rule).or_default() += count;
        }
    }

    fn record(&mut self, rule: &'static str) {
        self.rewrites += 1;
        *self.by_rule.entry(rule).or_default() += 1;
    }
}

struct Worklist {
    queue: VecDeque<OpId>,
    queued: HashSet<OpId>,
}

impl Worklist {
    fn new(ops: Vec<OpId>) -> Self {
        let queued = ops.iter().copied().collect();
        Self {
            queue: ops.into(),
            queued,
        }
    }

    fn push(&mut self, op: OpId) {
        if self.queued.insert(op) {
            self.queue.push_back(op);
        }
    }

    fn pop(&mut self) -> Option<OpId> {
        let op = self.queue.pop_front()?;
        self.queued.remove(&op);
        Some(op)
    }

    fn push_definers(&mut self, module: &Module, values: &[ValueId]) {
        for &value in values {
            if module.try_value(value).is_none() {
                continue;
            }
            if let Some(op) = module.defining_op(value) {
                self.push(op);
            }
        }
    }
}

/// Rewrites `module` to a fixed point of the local rules.
///
/// External modules have no body and are left alone.
pub fn canonicalize(
    module: &mut Module,
    interner: &Interner,
    config: &CanonicalizeConfig,
) -> Result<CanonStats, CanonError> {
    let mut stats = CanonStats::default();
    if module.external {
        return Ok(stats);
    }
    let mut worklist = Worklist::new(module.op_ids());
    let mut generations: HashMap<OpId, u32> = HashMap::new();

    while let Some(op) = worklist.pop() {
        if !module.contains_op(op) {
            continue;
        }
        if module.is_trivially_dead(op) {
            let operands = module.op(op).operands.clone();
            module.erase_op(op)?;
            stats.erased += 1;
            worklist.push_definers(module, &operands);
            continue;
        }

        let data = module.op(op);
        let (pinned, mnemonic) = (data.is_pinned(), data.kind.mnemonic());
        for rule in rules_for(&data.kind) {
            if rule.replaces && pinned {
                continue;
            }
            let mut rw = Rewriter::new(module, op, config.fold_constants);
            if !(rule.apply)(&mut rw, op)? {
                continue;
            }
            let created = std::mem::take(&mut rw.created);
            let touched = std::mem::take(&mut rw.touched);
            let released = std::mem::take(&mut rw.released);

            let generation = generations.remove(&op).unwrap_or(0) + 1;
            if generation > config.max_rewrites_per_op {
                return Err(CanonError::RewriteNonTermination {
                    module: interner.resolve(module.name).to_string(),
                    op: mnemonic.to_string(),
                    rule: rule.name,
                    cap: config.max_rewrites_per_op,
                });
            }
            stats.record(rule.name);
            for new in created {
                generations.insert(new, generation);
                worklist.push(new);
            }
            for user in touched {
                worklist.push(user);
            }
            if module.contains_op(op) {
                generations.insert(op, generation);
                worklist.push(op);
            }
            worklist.push_definers(module, &released);
            break;
        }
    }
    debug!(
        module = interner.resolve(module.name),
        rewrites = stats.rewrites,
        erased = stats.erased,
        "canonicalized"
    );
    Ok(stats)
}

/// Canonicalizes every module of the circuit, in parallel when configured.
///
/// Modules are rewritten independently; the first error aborts the run.
#[instrument(skip_all)]
pub fn canonicalize_circuit(
    circuit: &mut Circuit,
    interner: &Interner,
    config: &CanonicalizeConfig,
) -> Result<CanonStats, CanonError> {
    let modules: Vec<&mut Module> = circuit.modules_mut().filter(|m| !m.external).collect();
    let results: Vec<Result<CanonStats, CanonError>> = if config.parallel {
        modules
            .into_par_iter()
            .map(|module| canonicalize(module, interner, config))
            .collect()
    } else {
        modules
            .into_iter()
            .map(|module| canonicalize(module, interner, config))
            .collect()
    };
    let mut total = CanonStats::default();
    for result in results {
        total.merge(&result?);
    }
    info!(
        rewrites = total.rewrites,
        erased = total.erased,
        "canonicalization complete"
    );
    Ok(total)
}
