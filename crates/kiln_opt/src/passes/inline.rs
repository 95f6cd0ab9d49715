//! Inlining and flattening of the module hierarchy.
//!
//! Instances of modules marked [`InlineMode::Inline`] are replaced by a copy
//! of the callee body. A module marked [`InlineMode::Flatten`] absorbs every
//! instance beneath it until only external modules remain. Each callee port
//! becomes a wire in the caller; every copied name and symbol is prefixed with
//! the instance name. Private modules no longer reachable from the top are
//! deleted afterwards.

use crate::error::{PipelineResult, W_INLINE_EXTERNAL};
use crate::pass::{Pass, PassContext, PassStats};
use kiln_common::{InternalError, Interner, KilnResult};
use kiln_diagnostics::Diagnostic;
use kiln_ir::{Circuit, InlineMode, InstanceGraph, Module, ModuleId, OpId, OpKind, ValueId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Inlines `Inline` modules into their callers and flattens `Flatten` modules.
#[derive(Debug, Default)]
pub struct Inline;

/// Copies `callee` into `caller` in place of the instance `site`.
fn inline_site(
    caller: &mut Module,
    site: OpId,
    callee: &Module,
    interner: &Interner,
) -> KilnResult<()> {
    let prefix = match caller.op(site).name {
        Some(name) => name,
        // Unnamed sites are told apart by their op index.
        None => interner.get_or_intern(&format!(
            "{}_{}",
            interner.resolve(callee.name),
            site.as_raw()
        )),
    };
    let results = caller.op(site).results.clone();
    if results.len() != callee.ports.len() {
        return Err(InternalError::new("instance does not match its callee's ports"));
    }

    let mut mapped: HashMap<ValueId, ValueId> = HashMap::new();
    for (port, &result) in callee.ports.iter().zip(&results) {
        let ty = caller.value_type(result).clone();
        let wire = caller.add_op(OpKind::Wire, Vec::new(), vec![ty]);
        let data = caller.op_mut(wire);
        data.name = Some(interner.prefixed(prefix, port.name));
        data.sym = port.sym.map(|sym| interner.prefixed(prefix, sym));
        data.annotations = port.annotations.clone();
        data.loc = port.loc;
        let value = caller.result(wire)?;
        caller.replace_all_uses(result, value);
        mapped.insert(port.value, value);
    }

    // Operands defined later in the callee are bound to placeholder wires
    // until their definition has been copied.
    let mut placeholders: HashMap<ValueId, OpId> = HashMap::new();
    for (_, op) in callee.ops() {
        let mut operands = Vec::with_capacity(op.operands.len());
        for &operand in &op.operands {
            let value = match mapped.get(&operand) {
                Some(&value) => value,
                None => match placeholders.get(&operand) {
                    Some(&wire) => caller.result(wire)?,
                    None => {
                        let ty = callee.value_type(operand).clone();
                        let wire = caller.add_op(OpKind::Wire, Vec::new(), vec![ty]);
                        placeholders.insert(operand, wire);
                        caller.result(wire)?
                    }
                },
            };
            operands.push(value);
        }
        let types = op
            .results
            .iter()
            .map(|&r| callee.value_type(r).clone())
            .collect();
        let copy = caller.add_op(op.kind.clone(), operands, types);
        let data = caller.op_mut(copy);
        data.name = op.name.map(|name| interner.prefixed(prefix, name));
        data.sym = op.sym.map(|sym| interner.prefixed(prefix, sym));
        data.annotations = op.annotations.clone();
        data.loc = op.loc;
        let fresh = data.results.clone();
        mapped.extend(op.results.iter().copied().zip(fresh));
    }

    for (original, wire) in placeholders {
        let placeholder = caller.result(wire)?;
        let value = *mapped
            .get(&original)
            .ok_or_else(|| InternalError::new("inlined body reads a value it never defines"))?;
        caller.replace_all_uses(placeholder, value);
        caller.erase_op(wire)?;
    }
    caller.erase_op(site)
}

impl Pass for Inline {
    fn name(&self) -> &'static str {
        "inline"
    }

    #[instrument(skip_all, name = "inline")]
    fn run(
        &self,
        circuit: &mut Circuit,
        graph: &InstanceGraph,
        cx: &PassContext<'_>,
    ) -> PipelineResult<PassStats> {
        let mut stats = PassStats::new(self.name());
        let mut warned: HashSet<ModuleId> = HashSet::new();

        for id in graph.bottom_up() {
            let Some(module) = circuit.try_module(id) else {
                continue;
            };
            if module.external {
                continue;
            }
            let flatten = module.inline == InlineMode::Flatten;
            loop {
                let mut work = Vec::new();
                for (op, info) in circuit.module(id).instances() {
                    let callee_id = circuit.lookup(info.module).ok_or_else(|| {
                        InternalError::new(format!(
                            "instance of unknown module `{}`",
                            cx.interner.resolve(info.module)
                        ))
                    })?;
                    let callee = circuit.module(callee_id);
                    if !flatten && callee.inline != InlineMode::Inline {
                        continue;
                    }
                    if circuit.module(id).op(op).is_pinned() {
                        continue;
                    }
                    if callee.external {
                        if callee.inline == InlineMode::Inline && warned.insert(callee_id) {
                            cx.sink.emit(Diagnostic::warning(
                                W_INLINE_EXTERNAL,
                                format!(
                                    "external module `{}` is marked for inlining",
                                    cx.interner.resolve(callee.name)
                                ),
                                callee.loc,
                            ));
                        }
                        continue;
                    }
                    work.push((op, callee_id));
                }
                if work.is_empty() {
                    break;
                }
                for (op, callee_id) in work {
                    let callee = circuit.module(callee_id).clone();
                    inline_site(circuit.module_mut(id), op, &callee, cx.interner)?;
                    stats.bump("instances-inlined", 1);
                }
                if !flatten {
                    break;
                }
            }
        }

        if stats.changed() {
            let reachable = InstanceGraph::build(circuit, cx.interner)?.reachable_from_top();
            for id in circuit.module_ids() {
                if reachable.contains(&id) || circuit.module(id).is_public() {
                    continue;
                }
                if let Some(removed) = circuit.remove_module(id) {
                    debug!(module = cx.interner.resolve(removed.name), "erased unreachable module");
                    stats.bump("modules-erased", 1);
                }
            }
        }
        Ok(stats)
    }
}
