//! Bottom-up removal of ports nobody observes.
//!
//! An output port is unused when no instance site reads it; an input port is
//! unused when the module body never reads it. Modules are visited callees
//! first, so the logic a caller only kept to drive a removed port is already
//! gone when the caller's own ports are examined.

use crate::error::PipelineResult;
use crate::pass::{Pass, PassContext, PassStats};
use kiln_ir::{Circuit, Direction, InstanceGraph, InstanceSite, Module, ValueId};
use tracing::{debug, instrument};

/// Removes unpinned ports of private modules that no site or body uses.
#[derive(Debug, Default)]
pub struct UnusedPorts;

fn site_result(circuit: &Circuit, site: InstanceSite, index: usize) -> Option<(&Module, ValueId)> {
    let caller = circuit.try_module(site.caller)?;
    let result = *caller.try_op(site.op)?.results.get(index)?;
    Some((caller, result))
}

fn unused_ports(circuit: &Circuit, module: &Module, sites: &[InstanceSite]) -> Vec<usize> {
    module
        .ports
        .iter()
        .enumerate()
        .filter(|(_, port)| !port.is_pinned())
        .filter(|&(index, port)| {
            let at_sites = |pred: fn(&Module, ValueId) -> bool| {
                sites.iter().all(|&site| {
                    site_result(circuit, site, index).is_some_and(|(caller, r)| pred(caller, r))
                })
            };
            match port.direction {
                Direction::Output => {
                    module.only_written(port.value) && at_sites(|caller, r| !caller.has_uses(r))
                }
                Direction::Input => {
                    !module.has_uses(port.value) && at_sites(|caller, r| caller.only_written(r))
                }
            }
        })
        .map(|(index, _)| index)
        .collect()
}

impl Pass for UnusedPorts {
    fn name(&self) -> &'static str {
        "unused-ports"
    }

    #[instrument(skip_all, name = "unused_ports")]
    fn run(
        &self,
        circuit: &mut Circuit,
        graph: &InstanceGraph,
        _cx: &PassContext<'_>,
    ) -> PipelineResult<PassStats> {
        let mut stats = PassStats::new(self.name());
        for id in graph.bottom_up() {
            let Some(module) = circuit.try_module(id) else {
                continue;
            };
            if module.is_public() || module.external {
                continue;
            }
            let mut sites: Vec<InstanceSite> = graph
                .sites(id)
                .into_iter()
                .filter(|s| {
                    circuit
                        .try_module(s.caller)
                        .is_some_and(|caller| caller.try_op(s.op).is_some())
                })
                .collect();
            if sites.is_empty() {
                continue;
            }
            // Removing one port can leave another input without readers.
            loop {
                let module = circuit.module(id);
                let dropped = unused_ports(circuit, module, &sites);
                if dropped.is_empty() {
                    break;
                }
                let keep: Vec<usize> = (0..module.ports.len())
                    .filter(|i| !dropped.contains(i))
                    .collect();

                for site in &mut sites {
                    let caller = circuit.module_mut(site.caller);
                    site.op = caller.rebuild_instance(site.op, &keep)?;
                    caller.erase_trivially_dead()?;
                    stats.bump("sites-updated", 1);
                }
                let module = circuit.module_mut(id);
                for &index in &dropped {
                    let port = module.ports[index].value;
                    for driver in module.drivers(port) {
                        module.erase_op(driver)?;
                    }
                }
                module.erase_ports(&dropped)?;
                let erased = module.erase_trivially_dead()?;
                debug!(ports = dropped.len(), erased, "removed unused ports");
                stats.bump("ports-removed", dropped.len() as u64);
                stats.bump("ops-erased", erased as u64);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::Interner;
    use kiln_diagnostics::DiagnosticSink;
    use kiln_ir::{verify_circuit, ModuleBuilder, Type};

    fn run(circuit: &mut Circuit, interner: &Interner) -> PassStats {
        let graph = InstanceGraph::build(circuit, interner).unwrap();
        let sink = DiagnosticSink::new();
        let cx = PassContext {
            interner,
            sink: &sink,
        };
        let stats = UnusedPorts.run(circuit, &graph, &cx).unwrap();
        verify_circuit(circuit, interner).unwrap();
        stats
    }

    fn port_names<'a>(module: &Module, interner: &'a Interner) -> Vec<&'a str> {
        module.ports.iter().map(|p| interner.resolve(p.name)).collect()
    }

    /// `o1 = a`, `o2 = a ^ b`.
    fn leaf(interner: &Interner) -> Module {
        let mut b = ModuleBuilder::new(interner, "Leaf");
        let a = b.input("a", Type::uint(4));
        let bb = b.input("b", Type::uint(4));
        let o1 = b.output("o1", Type::uint(4));
        let o2 = b.output("o2", Type::uint(4));
        b.connect(o1, a);
        let x = b.xor(a, bb);
        b.connect(o2, x);
        b.finish().unwrap()
    }

    fn top(interner: &Interner, leaf: &Module) -> Module {
        let mut b = ModuleBuilder::new(interner, "Top");
        let i = b.input("i", Type::uint(4));
        let j = b.input("j", Type::uint(4));
        let o = b.output("o", Type::uint(4));
        let u = b.instance("u", leaf);
        b.connect(u[0], i);
        let twice = b.and(j, i);
        b.connect(u[1], twice);
        b.connect(o, u[2]);
        b.finish().unwrap()
    }

    #[test]
    fn unread_output_and_then_unread_input_are_removed() {
        let interner = Interner::new();
        let leaf = leaf(&interner);
        let mut circuit = Circuit::new(top(&interner, &leaf));
        let leaf_id = circuit.add_module(leaf);

        let stats = run(&mut circuit, &interner);
        // `o2` is never read, so `b` only fed dead logic.
        assert_eq!(port_names(circuit.module(leaf_id), &interner), ["a", "o1"]);
        assert_eq!(stats.get("ports-removed"), 2);
        assert_eq!(stats.get("sites-updated"), 2);
        assert_eq!(circuit.module(leaf_id).num_ops(), 1);

        let top = circuit.module(circuit.top());
        assert!(!top.ops().any(|(_, op)| op.kind.is_expression()));
        let (_, info) = top.instances().next().unwrap();
        assert_eq!(info.port_names.len(), 2);
    }

    #[test]
    fn public_and_pinned_ports_stay() {
        let interner = Interner::new();
        let mut leaf = leaf(&interner);
        leaf.ports[3].annotations.push(kiln_ir::Annotation::DontTouch);
        let mut circuit = Circuit::new(top(&interner, &leaf));
        let leaf_id = circuit.add_module(leaf);

        let stats = run(&mut circuit, &interner);
        assert!(!stats.changed());
        assert_eq!(circuit.module(leaf_id).ports.len(), 4);
    }

    #[test]
    fn uninstantiated_modules_are_not_touched() {
        let interner = Interner::new();
        let mut circuit = Circuit::new(ModuleBuilder::new(&interner, "Top").finish().unwrap());
        let leaf_id = circuit.add_module(leaf(&interner));

        let stats = run(&mut circuit, &interner);
        assert!(!stats.changed());
        assert_eq!(circuit.module(leaf_id).ports.len(), 4);
    }
}
