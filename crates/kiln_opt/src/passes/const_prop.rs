//! Interprocedural constant propagation.
//!
//! Every integer value of every module starts optimistically unknown and is
//! raised through a three-level lattice (unknown, one constant, overdefined)
//! until a fixed point. Facts cross module boundaries in both directions: the
//! input port of a private module joins whatever its instance sites drive, and
//! an instance output reads the callee's output port. Public inputs, external
//! modules, invalid values and anything pinned are overdefined. Values that
//! settle on a constant have their reads replaced by a literal, after which
//! unused logic is swept.

use super::sweep_dead;
use crate::error::PipelineResult;
use crate::pass::{Pass, PassContext, PassStats};
use kiln_common::{ApInt, InternalError};
use kiln_ir::fold::fold_expr;
use kiln_ir::{
    Circuit, Direction, InstanceGraph, ModuleId, OpKind, RegKind, Type, ValueDef, ValueId,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Constant propagation and dead code elimination across the hierarchy.
#[derive(Debug, Default)]
pub struct ConstProp;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Lattice {
    Unknown,
    Constant(ApInt),
    Overdefined,
}

impl Lattice {
    fn join(&self, other: &Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Unknown, x) | (x, Lattice::Unknown) => x.clone(),
            (Lattice::Constant(a), Lattice::Constant(b)) if a == b => self.clone(),
            _ => Lattice::Overdefined,
        }
    }

    /// Re-reads a fact about a value of type `from` at `width`.
    fn fit(&self, from: &Type, width: u32) -> Lattice {
        match self {
            Lattice::Constant(c) => Lattice::Constant(c.resize(width, from.is_signed())),
            other => other.clone(),
        }
    }
}

type Key = (ModuleId, ValueId);

struct Solver<'a> {
    circuit: &'a Circuit,
    graph: &'a InstanceGraph,
    state: HashMap<Key, Lattice>,
}

impl<'a> Solver<'a> {
    fn get(&self, module: ModuleId, value: ValueId) -> Lattice {
        self.state
            .get(&(module, value))
            .cloned()
            .unwrap_or(Lattice::Unknown)
    }

    /// The value of `src` as seen through a connect into a `width`-bit value.
    fn incoming(&self, id: ModuleId, src: ValueId, width: u32) -> Lattice {
        let ty = self.circuit.module(id).value_type(src);
        self.get(id, src).fit(ty, width)
    }

    fn drivers(&self, id: ModuleId, value: ValueId, width: u32) -> Lattice {
        let module = self.circuit.module(id);
        module
            .drivers(value)
            .into_iter()
            .map(|c| self.incoming(id, module.op(c).operands[1], width))
            .fold(Lattice::Unknown, |acc, l| acc.join(&l))
    }

    fn compute(&self, id: ModuleId, value: ValueId) -> Lattice {
        let module = self.circuit.module(id);
        let data = module.value(value);
        let Some(width) = data.ty.as_int().and_then(|t| t.width.known()) else {
            return Lattice::Overdefined;
        };
        match data.def {
            ValueDef::Port(index) => {
                let port = &module.ports[index as usize];
                if module.external || port.is_pinned() {
                    return Lattice::Overdefined;
                }
                match port.direction {
                    Direction::Input if module.is_public() => Lattice::Overdefined,
                    Direction::Input => self
                        .graph
                        .sites(id)
                        .into_iter()
                        .filter_map(|site| {
                            let caller = self.circuit.try_module(site.caller)?;
                            let result = *caller.try_op(site.op)?.results.get(index as usize)?;
                            Some(self.get(site.caller, result))
                        })
                        .fold(Lattice::Unknown, |acc, l| acc.join(&l)),
                    Direction::Output => self.drivers(id, value, width),
                }
            }
            ValueDef::Result { op, index } => {
                let op = module.op(op);
                if op.is_pinned() {
                    return Lattice::Overdefined;
                }
                let operand = |i: usize| self.get(id, op.operands[i]);
                match &op.kind {
                    OpKind::Constant(c) => Lattice::Constant(c.resize(width, data.ty.is_signed())),
                    OpKind::SpecialConstant(b) => {
                        Lattice::Constant(ApInt::from_u64(u64::from(*b), width))
                    }
                    OpKind::AggregateConstant(_) | OpKind::Invalid => Lattice::Overdefined,
                    OpKind::Wire => self.drivers(id, value, width),
                    OpKind::Register(kind) => {
                        let written = self.drivers(id, value, width);
                        match kind {
                            RegKind::Plain => written,
                            RegKind::Resettable { .. } => {
                                written.join(&self.incoming(id, op.operands[2], width))
                            }
                        }
                    }
                    OpKind::Instance(info) => {
                        let Some(callee_id) = self.circuit.lookup(info.module) else {
                            return Lattice::Overdefined;
                        };
                        let callee = self.circuit.module(callee_id);
                        let Some(port) = callee.ports.get(index as usize) else {
                            return Lattice::Overdefined;
                        };
                        match port.direction {
                            Direction::Input => self.drivers(id, value, width),
                            Direction::Output if callee.external => Lattice::Overdefined,
                            Direction::Output => self.get(callee_id, port.value),
                        }
                    }
                    OpKind::Node => operand(0),
                    OpKind::Mux => {
                        let branch = |i: usize| operand(i).fit(module.value_type(op.operands[i]), width);
                        match operand(0) {
                            Lattice::Unknown => Lattice::Unknown,
                            Lattice::Constant(sel) => branch(if sel.bit(0) { 1 } else { 2 }),
                            Lattice::Overdefined => branch(1).join(&branch(2)),
                        }
                    }
                    kind if kind.is_expression() => self.fold(id, kind, &op.operands, &data.ty),
                    _ => Lattice::Overdefined,
                }
            }
        }
    }

    fn fold(&self, id: ModuleId, kind: &OpKind, operands: &[ValueId], ty: &Type) -> Lattice {
        let module = self.circuit.module(id);
        let mut literals = Vec::with_capacity(operands.len());
        let mut unknown = false;
        for &operand in operands {
            match self.get(id, operand) {
                Lattice::Overdefined => return Lattice::Overdefined,
                Lattice::Unknown => unknown = true,
                Lattice::Constant(c) => literals.push(c),
            }
        }
        if unknown {
            return Lattice::Unknown;
        }
        let typed: Vec<(&ApInt, &Type)> = literals
            .iter()
            .zip(operands)
            .map(|(c, v)| (c, module.value_type(*v)))
            .collect();
        fold_expr(kind, &typed, ty).map_or(Lattice::Overdefined, Lattice::Constant)
    }

    /// Sweeps every value until no fact changes.
    fn solve(&mut self, modules: &[ModuleId]) -> PipelineResult<usize> {
        let keys: Vec<Key> = modules
            .iter()
            .flat_map(|&id| {
                self.circuit
                    .module(id)
                    .values()
                    .map(move |(value, _)| (id, value))
            })
            .collect();
        let limit = 2 * keys.len() + 2;
        for round in 1..=limit {
            let mut changed = false;
            for &(id, value) in &keys {
                let old = self.get(id, value);
                let new = old.join(&self.compute(id, value));
                if new != old {
                    self.state.insert((id, value), new);
                    changed = true;
                }
            }
            if !changed {
                return Ok(round);
            }
        }
        Err(InternalError::new("constant propagation did not reach a fixed point").into())
    }
}

impl Pass for ConstProp {
    fn name(&self) -> &'static str {
        "const-prop"
    }

    #[instrument(skip_all, name = "const_prop")]
    fn run(
        &self,
        circuit: &mut Circuit,
        graph: &InstanceGraph,
        _cx: &PassContext<'_>,
    ) -> PipelineResult<PassStats> {
        let mut stats = PassStats::new(self.name());
        let mut modules: Vec<ModuleId> = graph.top_down().to_vec();
        let seen: HashSet<ModuleId> = modules.iter().copied().collect();
        modules.extend(circuit.module_ids().into_iter().filter(|id| !seen.contains(id)));
        modules.retain(|&id| !circuit.module(id).external);

        let mut solver = Solver {
            circuit: &*circuit,
            graph,
            state: HashMap::new(),
        };
        let rounds = solver.solve(&modules)?;
        debug!(rounds, "constant lattice settled");
        let constants: Vec<(Key, ApInt)> = solver
            .state
            .into_iter()
            .filter_map(|(key, l)| match l {
                Lattice::Constant(c) => Some((key, c)),
                _ => None,
            })
            .collect();

        let mut by_module: HashMap<ModuleId, Vec<(ValueId, ApInt)>> = HashMap::new();
        for ((id, value), c) in constants {
            by_module.entry(id).or_default().push((value, c));
        }
        for id in modules {
            let module = circuit.module_mut(id);
            let mut facts = by_module.remove(&id).unwrap_or_default();
            facts.sort_by_key(|(value, _)| *value);
            for (value, c) in facts {
                if matches!(module.defining_kind(value), Some(OpKind::Constant(_))) {
                    continue;
                }
                let writes: HashSet<_> = module.drivers(value).into_iter().collect();
                let reads = module
                    .uses(value)
                    .iter()
                    .any(|u| !(u.operand == 0 && writes.contains(&u.op)));
                if !reads {
                    continue;
                }
                let ty = module.value_type(value).clone();
                let loc = module.value_loc(value);
                let literal = module.add_op(OpKind::Constant(c), Vec::new(), vec![ty]);
                module.op_mut(literal).loc = loc;
                let literal = module.result(literal)?;
                module.replace_uses_where(value, literal, |u| {
                    !(u.operand == 0 && writes.contains(&u.op))
                });
                stats.bump("values-folded", 1);
            }
            let erased = sweep_dead(module)?;
            stats.bump("ops-erased", erased as u64);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::Interner;
    use kiln_diagnostics::DiagnosticSink;
    use kiln_ir::{verify_circuit, BinaryOp, Module, ModuleBuilder};

    fn run(circuit: &mut Circuit, interner: &Interner) -> PassStats {
        let graph = InstanceGraph::build(circuit, interner).unwrap();
        let sink = DiagnosticSink::new();
        let cx = PassContext {
            interner,
            sink: &sink,
        };
        let stats = ConstProp.run(circuit, &graph, &cx).unwrap();
        verify_circuit(circuit, interner).unwrap();
        stats
    }

    /// `o = k ^ 3`.
    fn leaf(interner: &Interner) -> Module {
        let mut b = ModuleBuilder::new(interner, "Leaf");
        let k = b.input("k", Type::uint(4));
        let o = b.output("o", Type::uint(4));
        let three = b.uint(3, 4);
        let x = b.xor(k, three);
        b.connect(o, x);
        b.finish().unwrap()
    }

    /// Two instances of `leaf`, their `k` tied to `first` and `second`.
    fn top(interner: &Interner, leaf: &Module, first: u64, second: u64) -> (Circuit, ValueId) {
        let mut b = ModuleBuilder::new(interner, "Top");
        let out = b.output("out", Type::uint(4));
        let u0 = b.instance("u0", leaf);
        let u1 = b.instance("u1", leaf);
        let a = b.uint(first, 4);
        let c = b.uint(second, 4);
        b.connect(u0[0], a);
        b.connect(u1[0], c);
        let both = b.and(u0[1], u1[1]);
        b.connect(out, both);
        (Circuit::new(b.finish().unwrap()), out)
    }

    fn driven_constant(module: &Module, value: ValueId) -> Option<u64> {
        let driver = *module.drivers(value).last()?;
        match module.defining_kind(module.op(driver).operands[1])? {
            OpKind::Constant(c) => c.to_u64(),
            _ => None,
        }
    }

    fn has_xor(module: &Module) -> bool {
        module
            .ops()
            .any(|(_, op)| op.kind == OpKind::Binary(BinaryOp::Xor))
    }

    #[test]
    fn agreeing_sites_propagate_into_the_callee_and_back() {
        let interner = Interner::new();
        let leaf = leaf(&interner);
        let (mut circuit, out) = top(&interner, &leaf, 5, 5);
        let leaf_id = circuit.add_module(leaf);

        let stats = run(&mut circuit, &interner);
        assert!(stats.get("values-folded") > 0);
        assert!(!has_xor(circuit.module(leaf_id)));
        let leaf = circuit.module(leaf_id);
        assert_eq!(driven_constant(leaf, leaf.ports[1].value), Some(6));
        assert_eq!(driven_constant(circuit.module(circuit.top()), out), Some(6));
    }

    #[test]
    fn disagreeing_sites_leave_the_callee_alone() {
        let interner = Interner::new();
        let leaf = leaf(&interner);
        let (mut circuit, out) = top(&interner, &leaf, 5, 6);
        let leaf_id = circuit.add_module(leaf);

        run(&mut circuit, &interner);
        assert!(has_xor(circuit.module(leaf_id)));
        assert_eq!(driven_constant(circuit.module(circuit.top()), out), None);
    }

    #[test]
    fn public_inputs_are_never_assumed() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let k = b.input("k", Type::uint(4));
        let o = b.output("o", Type::uint(4));
        let three = b.uint(3, 4);
        let x = b.xor(k, three);
        b.connect(o, x);
        let mut circuit = Circuit::new(b.finish().unwrap());

        let stats = run(&mut circuit, &interner);
        assert_eq!(stats.get("values-folded"), 0);
        assert!(has_xor(circuit.module(circuit.top())));
    }

    #[test]
    fn register_holding_one_constant_is_replaced() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let clk = b.input("clk", Type::Clock);
        let o = b.output("o", Type::uint(4));
        let r = b.reg("r", Type::uint(4), clk);
        let nine = b.uint(9, 4);
        b.connect(r, nine);
        b.connect(o, r);
        let mut circuit = Circuit::new(b.finish().unwrap());

        run(&mut circuit, &interner);
        let top = circuit.module(circuit.top());
        assert!(!top.ops().any(|(_, op)| matches!(op.kind, OpKind::Register(_))));
        assert_eq!(driven_constant(top, o), Some(9));
    }

    #[test]
    fn pinned_values_are_overdefined() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let o = b.output("o", Type::uint(4));
        let w = b.wire("w", Type::uint(4));
        b.dont_touch(w);
        let nine = b.uint(9, 4);
        b.connect(w, nine);
        b.connect(o, w);
        let mut circuit = Circuit::new(b.finish().unwrap());

        run(&mut circuit, &interner);
        let top = circuit.module(circuit.top());
        assert_eq!(driven_constant(top, o), None);
        assert!(top.ops().any(|(_, op)| op.kind == OpKind::Wire));
    }
}
