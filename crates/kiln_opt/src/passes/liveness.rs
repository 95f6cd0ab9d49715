//! Liveness-based dead code elimination across the hierarchy.
//!
//! Liveness starts at every port of public and external modules and at every
//! pinned port, operation and result, then flows backwards: a live value makes
//! its definition and its drivers live, a live operation makes its operands live,
//! a live instance output makes the callee's output port live, and a live
//! input port makes the matching operand of every instance site live. A
//! module holding anything live keeps all of its instances. Whatever stays
//! dead is erased, then dead ports of private modules, then private modules
//! no longer instantiated anywhere.

use crate::error::PipelineResult;
use crate::pass::{Pass, PassContext, PassStats};
use kiln_common::{InternalError, KilnResult};
use kiln_ir::{
    Circuit, Direction, InstanceGraph, Module, ModuleId, OpId, OpKind, ValueDef, ValueId,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Removes logic, ports and modules that cannot affect a public port.
#[derive(Debug, Default)]
pub struct LivenessDce;

enum Item {
    Value(ModuleId, ValueId),
    Op(ModuleId, OpId),
}

struct Marker<'a> {
    circuit: &'a Circuit,
    graph: &'a InstanceGraph,
    values: HashSet<(ModuleId, ValueId)>,
    ops: HashSet<(ModuleId, OpId)>,
    modules: HashSet<ModuleId>,
    work: Vec<Item>,
}

impl Marker<'_> {
    fn value(&mut self, id: ModuleId, value: ValueId) {
        if self.values.insert((id, value)) {
            self.work.push(Item::Value(id, value));
        }
    }

    fn op(&mut self, id: ModuleId, op: OpId) {
        if self.ops.insert((id, op)) {
            self.work.push(Item::Op(id, op));
        }
    }

    fn module(&mut self, id: ModuleId) {
        let graph = self.graph;
        if self.modules.insert(id) {
            for site in graph.sites(id) {
                self.op(site.caller, site.op);
            }
        }
    }

    fn drivers(&mut self, id: ModuleId, value: ValueId) {
        let circuit = self.circuit;
        for driver in circuit.module(id).drivers(value) {
            self.op(id, driver);
        }
    }

    fn seed(&mut self) {
        let circuit = self.circuit;
        for (id, module) in circuit.modules() {
            let exposed = module.is_public() || module.external;
            for port in &module.ports {
                if exposed || port.is_pinned() {
                    self.value(id, port.value);
                }
            }
            for (op, data) in module.ops() {
                if data.is_pinned() {
                    self.op(id, op);
                    for &result in &data.results {
                        self.value(id, result);
                    }
                }
            }
        }
    }

    fn run(&mut self) {
        while let Some(item) = self.work.pop() {
            match item {
                Item::Value(id, value) => self.visit_value(id, value),
                Item::Op(id, op) => {
                    self.module(id);
                    let operands = self.circuit.module(id).op(op).operands.clone();
                    for operand in operands {
                        self.value(id, operand);
                    }
                }
            }
        }
    }

    fn visit_value(&mut self, id: ModuleId, value: ValueId) {
        let (circuit, graph) = (self.circuit, self.graph);
        let module = circuit.module(id);
        self.module(id);
        match module.value(value).def {
            ValueDef::Port(index) => match module.ports[index as usize].direction {
                Direction::Output => self.drivers(id, value),
                Direction::Input => {
                    for site in graph.sites(id) {
                        let result = circuit
                            .try_module(site.caller)
                            .and_then(|caller| caller.try_op(site.op))
                            .and_then(|op| op.results.get(index as usize).copied());
                        if let Some(result) = result {
                            self.value(site.caller, result);
                        }
                    }
                }
            },
            ValueDef::Result { op, index } => {
                self.op(id, op);
                match &module.op(op).kind {
                    OpKind::Wire | OpKind::Register(_) => self.drivers(id, value),
                    OpKind::Instance(info) => {
                        let Some(callee_id) = circuit.lookup(info.module) else {
                            return;
                        };
                        let Some(port) = circuit.module(callee_id).ports.get(index as usize) else {
                            return;
                        };
                        if port.direction == Direction::Input {
                            self.drivers(id, value);
                        }
                        self.value(callee_id, port.value);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Erases every op of `module` outside `live`, connects first.
fn erase_dead_ops(module: &mut Module, live: &HashSet<OpId>) -> KilnResult<usize> {
    let (connects, mut dead): (Vec<OpId>, Vec<OpId>) = module
        .op_ids()
        .into_iter()
        .filter(|op| !live.contains(op))
        .partition(|&op| matches!(module.op(op).kind, OpKind::Connect(_)));
    let mut erased = 0;
    for op in connects {
        module.erase_op(op)?;
        erased += 1;
    }
    while !dead.is_empty() {
        let before = dead.len();
        let mut remaining = Vec::with_capacity(before);
        for op in dead {
            if module.op(op).results.iter().any(|r| module.has_uses(*r)) {
                remaining.push(op);
            } else {
                module.erase_op(op)?;
                erased += 1;
            }
        }
        if remaining.len() == before {
            return Err(InternalError::new("dead operations are still used by live ones"));
        }
        dead = remaining;
    }
    Ok(erased)
}

/// Names of modules still instantiated somewhere.
fn instantiated(circuit: &Circuit) -> HashSet<kiln_common::Ident> {
    circuit
        .modules()
        .flat_map(|(_, m)| m.instances().map(|(_, info)| info.module).collect::<Vec<_>>())
        .collect()
}

impl Pass for LivenessDce {
    fn name(&self) -> &'static str {
        "liveness-dce"
    }

    #[instrument(skip_all, name = "liveness_dce")]
    fn run(
        &self,
        circuit: &mut Circuit,
        graph: &InstanceGraph,
        _cx: &PassContext<'_>,
    ) -> PipelineResult<PassStats> {
        let mut stats = PassStats::new(self.name());
        let mut marker = Marker {
            circuit: &*circuit,
            graph,
            values: HashSet::new(),
            ops: HashSet::new(),
            modules: HashSet::new(),
            work: Vec::new(),
        };
        marker.seed();
        marker.run();
        debug!(values = marker.values.len(), ops = marker.ops.len(), "liveness settled");

        let mut live_ops: HashMap<ModuleId, HashSet<OpId>> = HashMap::new();
        for (id, op) in marker.ops {
            live_ops.entry(id).or_default().insert(op);
        }
        let live_values = marker.values;

        let mut dead_ports: Vec<(ModuleId, Vec<usize>)> = Vec::new();
        for (id, module) in circuit.modules() {
            if module.is_public() || module.external {
                continue;
            }
            let dead: Vec<usize> = module
                .ports
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.is_pinned() && !live_values.contains(&(id, p.value)))
                .map(|(i, _)| i)
                .collect();
            if !dead.is_empty() {
                dead_ports.push((id, dead));
            }
        }

        for id in circuit.module_ids() {
            let module = circuit.module_mut(id);
            if module.external {
                continue;
            }
            let live = live_ops.remove(&id).unwrap_or_default();
            let erased = erase_dead_ops(module, &live)?;
            stats.bump("ops-erased", erased as u64);
        }

        for (id, dead) in dead_ports {
            let width = circuit.module(id).ports.len();
            let keep: Vec<usize> = (0..width).filter(|i| !dead.contains(i)).collect();
            for site in graph.sites(id) {
                let Some(caller) = circuit.try_module(site.caller) else {
                    continue;
                };
                if caller.try_op(site.op).is_some() {
                    circuit.module_mut(site.caller).rebuild_instance(site.op, &keep)?;
                }
            }
            circuit.module_mut(id).erase_ports(&dead)?;
            stats.bump("ports-erased", dead.len() as u64);
        }

        loop {
            let used = instantiated(circuit);
            let orphans: Vec<ModuleId> = circuit
                .modules()
                .filter(|(_, m)| !m.is_public() && !used.contains(&m.name))
                .map(|(id, _)| id)
                .collect();
            if orphans.is_empty() {
                break;
            }
            for id in orphans {
                circuit.remove_module(id);
                stats.bump("modules-erased", 1);
            }
        }
        Ok(stats)
    }
}
