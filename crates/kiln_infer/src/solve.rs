//! Monotone fixed-point solution of the width constraints.
//!
//! Every unknown width starts at zero and unresolved. Each sweep applies all
//! rules in order; widths only grow and a value becomes resolved once its rule
//! reads at least one resolved input (all inputs, for strict expression
//! rules). Acyclic dependencies settle within one sweep per variable, so a
//! width still growing after that many sweeps lies on a cycle that feeds
//! itself. Values never resolved had no base case.

use crate::constraints::{collect, leaf_width, with_leaf_width, Constraints, Rule, Slot};
use crate::error::WidthInferenceError;
use kiln_common::Interner;
use kiln_diagnostics::{Diagnostic, DiagnosticSink};
use kiln_ir::{expr_result_type, Circuit, OpKind, Type, Width};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Summary of a successful inference run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InferStats {
    /// Number of values whose width was filled in.
    pub resolved: usize,
    /// Sweeps until the fixed point.
    pub rounds: usize,
}

/// Fills in every unknown integer width of the circuit.
///
/// On failure the circuit is left untouched, a diagnostic naming the
/// implicated values is emitted to `sink`, and the error is returned.
#[instrument(skip_all)]
pub fn infer_widths(
    circuit: &mut Circuit,
    interner: &Interner,
    sink: &DiagnosticSink,
) -> Result<InferStats, WidthInferenceError> {
    let constraints = collect(circuit);
    let count = constraints.vars.len();
    if count == 0 {
        return Ok(InferStats::default());
    }
    debug!(values = count, "solving width constraints");
    let mut solver = Solver {
        circuit,
        interner,
        constraints,
        widths: vec![0; count],
        resolved: vec![false; count],
    };
    let result = solver.solve();
    let (widths, constraints) = (solver.widths, solver.constraints);
    let rounds = match result {
        Ok(rounds) => rounds,
        Err((err, implicated)) => {
            report(circuit, interner, sink, &err, &constraints, &implicated);
            return Err(err);
        }
    };

    for (var, &(module, value)) in constraints.vars.iter().enumerate() {
        let module = circuit.module_mut(module);
        let ty = with_leaf_width(module.value_type(value), widths[var]);
        module.set_value_type(value, ty);
    }
    debug!(values = count, rounds, "width inference converged");
    Ok(InferStats {
        resolved: count,
        rounds,
    })
}

fn report(
    circuit: &Circuit,
    interner: &Interner,
    sink: &DiagnosticSink,
    err: &WidthInferenceError,
    constraints: &Constraints,
    implicated: &[usize],
) {
    let loc_of = |var: usize| {
        let (module, value) = constraints.vars[var];
        circuit.module(module).value_loc(value)
    };
    let primary = implicated.first().map(|v| loc_of(*v)).unwrap_or_default();
    let diag = implicated.iter().fold(
        Diagnostic::error(err.code(), err.to_string(), primary),
        |diag, &var| {
            let (module, value) = constraints.vars[var];
            let name = circuit.module(module).describe_value(value, interner);
            diag.with_label(loc_of(var), format!("width of `{name}` is not determined"))
        },
    );
    sink.emit(diag);
}

type Failure = (WidthInferenceError, Vec<usize>);

struct Solver<'a> {
    circuit: &'a Circuit,
    interner: &'a Interner,
    constraints: Constraints,
    widths: Vec<u32>,
    resolved: Vec<bool>,
}

impl Solver<'_> {
    fn solve(&mut self) -> Result<usize, Failure> {
        let limit = self.constraints.vars.len() + 1;
        let mut rounds = 0;
        loop {
            rounds += 1;
            let changed = self.sweep()?;
            if changed.is_empty() {
                break;
            }
            if rounds > limit {
                let on_cycle = self.find_cycle(&changed);
                let implicated = if on_cycle.is_empty() { changed } else { on_cycle };
                return Err((self.cycle_error(&implicated), implicated));
            }
        }

        let unresolved: Vec<usize> = (0..self.resolved.len())
            .filter(|v| !self.resolved[*v])
            .collect();
        if unresolved.is_empty() {
            return Ok(rounds);
        }
        let on_cycle = self.find_cycle(&unresolved);
        if on_cycle.is_empty() {
            let roots: Vec<usize> = unresolved
                .iter()
                .copied()
                .filter(|&v| {
                    self.constraints
                        .deps(self.circuit, v)
                        .iter()
                        .all(|d| self.resolved[*d])
                })
                .collect();
            let roots = if roots.is_empty() { unresolved } else { roots };
            let values = roots.iter().map(|v| self.describe(*v)).collect();
            return Err((WidthInferenceError::Unresolved { values }, roots));
        }
        Err((self.cycle_error(&on_cycle), on_cycle))
    }

    fn cycle_error(&self, vars: &[usize]) -> WidthInferenceError {
        let mut values: Vec<String> = vars.iter().map(|v| self.describe(*v)).collect();
        if let Some(first) = values.first().cloned() {
            values.push(first);
        }
        WidthInferenceError::Cycle { values }
    }

    /// Finds a dependency cycle among `candidates`, ordered along its edges.
    fn find_cycle(&self, candidates: &[usize]) -> Vec<usize> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: HashMap<usize, NodeIndex> =
            candidates.iter().map(|&v| (v, graph.add_node(v))).collect();
        for &var in candidates {
            for dep in self.constraints.deps(self.circuit, var) {
                if let Some(&from) = nodes.get(&dep) {
                    graph.add_edge(from, nodes[&var], ());
                }
            }
        }
        let cyclic = tarjan_scc(&graph).into_iter().find(|scc| {
            scc.len() > 1 || graph.contains_edge(scc[0], scc[0])
        });
        let Some(scc) = cyclic else {
            return Vec::new();
        };
        let mut path = vec![scc[0]];
        while let Some(next) = graph
            .neighbors(*path.last().unwrap_or(&scc[0]))
            .find(|n| scc.contains(n) && !path.contains(n))
        {
            path.push(next);
        }
        path.into_iter().map(|n| graph[n]).collect()
    }

    fn slot(&self, slot: Slot) -> (u32, bool) {
        match self.constraints.index.get(&slot) {
            Some(&var) => (self.widths[var], self.resolved[var]),
            None => {
                let ty = self.circuit.module(slot.0).value_type(slot.1);
                let width = match leaf_width(ty) {
                    Some(Width::Known(w)) => w,
                    _ => ty.bit_width().unwrap_or(1),
                };
                (width, true)
            }
        }
    }

    fn slot_type(&self, slot: Slot) -> Type {
        let ty = self.circuit.module(slot.0).value_type(slot.1);
        match self.constraints.index.get(&slot) {
            Some(&var) => with_leaf_width(ty, self.widths[var]),
            None => ty.clone(),
        }
    }

    /// Applies the rule of `var` to the current assignment.
    fn eval(&self, var: usize) -> Result<(u32, bool), Failure> {
        match &self.constraints.rules[var] {
            Rule::Fixed(width) => Ok((*width, true)),
            Rule::Max(sources) => Ok(sources.iter().fold((0, false), |(w, r), s| {
                let (sw, sr) = self.slot(*s);
                (w.max(sw), r || sr)
            })),
            Rule::Expr { module, op } => {
                let data = self.circuit.module(*module).op(*op);
                let slots: Vec<Slot> = data.operands.iter().map(|v| (*module, *v)).collect();
                let mut types: Vec<Type> = slots.iter().map(|s| self.slot_type(*s)).collect();
                if data.kind == OpKind::Mux {
                    types[0] = Type::uint(1);
                }
                let refs: Vec<&Type> = types.iter().collect();
                let width = expr_result_type(&data.kind, &refs)
                    .ok()
                    .and_then(|ty| leaf_width(&ty))
                    .and_then(Width::known)
                    .ok_or_else(|| {
                        let value = self.describe(var);
                        (WidthInferenceError::Overflow { value }, vec![var])
                    })?;
                let resolved = match data.kind {
                    OpKind::Mux => self.slot(slots[1]).1 || self.slot(slots[2]).1,
                    _ => slots.iter().all(|s| self.slot(*s).1),
                };
                Ok((width, resolved))
            }
        }
    }

    /// One Gauss-Seidel sweep; returns the variables that changed.
    fn sweep(&mut self) -> Result<Vec<usize>, Failure> {
        let mut changed = Vec::new();
        for var in 0..self.constraints.vars.len() {
            let (width, resolved) = self.eval(var)?;
            let mut moved = false;
            if width > self.widths[var] {
                self.widths[var] = width;
                moved = true;
            }
            if resolved && !self.resolved[var] {
                self.resolved[var] = true;
                moved = true;
            }
            if moved {
                changed.push(var);
            }
        }
        Ok(changed)
    }

    fn describe(&self, var: usize) -> String {
        let (module, value) = self.constraints.vars[var];
        self.circuit
            .module(module)
            .describe_value(value, self.interner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{E_WIDTH_CYCLE, E_WIDTH_UNRESOLVED};
    use kiln_ir::ModuleBuilder;

    fn run(circuit: &mut Circuit, interner: &Interner) -> (Result<InferStats, WidthInferenceError>, DiagnosticSink) {
        let sink = DiagnosticSink::new();
        let result = infer_widths(circuit, interner, &sink);
        (result, sink)
    }

    #[test]
    fn single_producer_formulas() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let a = b.input("a", Type::uint(4));
        let c = b.input("c", Type::uint(6));
        let sel = b.input("sel", Type::uint(1));
        let amt = b.input("amt", Type::uint(2));
        let sum = b.add(a, c);
        let cat = b.cat(a, c);
        let mux = b.mux(sel, a, c);
        let shl = b.dshl(a, amt);
        let shr = b.shr(a, 7);
        let wires: Vec<_> = [sum, cat, mux, shl, shr]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let w = b.wire(&format!("w{i}"), Type::uint_unknown());
                b.connect(w, *v);
                w
            })
            .collect();
        let mut circuit = Circuit::new(b.finish().unwrap());
        let (result, sink) = run(&mut circuit, &interner);
        assert!(result.is_ok());
        assert!(!sink.has_errors());

        let top = circuit.module(circuit.top());
        let widths: Vec<_> = wires.iter().map(|w| top.value_type(*w).bit_width()).collect();
        assert_eq!(widths, vec![Some(7), Some(10), Some(6), Some(7), Some(1)]);
    }

    #[test]
    fn unsized_literals_and_expressions_over_them() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let five = b.uint_unsized(5);
        let neg = b.sint_unsized(-3);
        let four = b.sint_unsized(4);
        let sum = b.add(neg, four);
        let out = b.output("out", Type::sint_unknown());
        b.connect(out, sum);
        let mut circuit = Circuit::new(b.finish().unwrap());
        assert!(run(&mut circuit, &interner).0.is_ok());

        let top = circuit.module(circuit.top());
        assert_eq!(top.value_type(five), &Type::uint(3));
        assert_eq!(top.value_type(neg), &Type::sint(3));
        assert_eq!(top.value_type(four), &Type::sint(4));
        assert_eq!(top.value_type(sum), &Type::sint(5));
        assert_eq!(top.value_type(out), &Type::sint(5));
    }

    #[test]
    fn self_reference_without_base_case_is_a_cycle() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let clk = b.input("clk", Type::Clock);
        let r = b.reg("r", Type::uint_unknown(), clk);
        let one = b.uint(1, 1);
        let next = b.add(r, one);
        b.connect(r, next);
        let mut circuit = Circuit::new(b.finish().unwrap());

        let (result, sink) = run(&mut circuit, &interner);
        match result {
            Err(WidthInferenceError::Cycle { values }) => {
                assert!(values.contains(&"Top.r".to_string()));
                assert_eq!(values.first(), values.last());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(sink.contains_code(E_WIDTH_CYCLE));
        let diags = sink.take_all();
        assert!(diags[0].labels.len() >= 2);
        let top = circuit.module(circuit.top());
        assert_eq!(top.value_type(r), &Type::uint_unknown());
    }

    #[test]
    fn growing_cycle_with_base_case_is_a_cycle() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let clk = b.input("clk", Type::Clock);
        let en = b.input("en", Type::uint(1));
        let init = b.input("init", Type::uint(3));
        let r = b.reg("r", Type::uint_unknown(), clk);
        let one = b.uint(1, 1);
        let inc = b.add(r, one);
        let next = b.mux(en, inc, init);
        b.connect(r, next);
        let mut circuit = Circuit::new(b.finish().unwrap());
        assert!(matches!(
            run(&mut circuit, &interner).0,
            Err(WidthInferenceError::Cycle { .. })
        ));
    }

    #[test]
    fn holding_register_converges() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let clk = b.input("clk", Type::Clock);
        let en = b.input("en", Type::uint(1));
        let d = b.input("d", Type::uint(4));
        let r = b.reg("r", Type::uint_unknown(), clk);
        let next = b.mux(en, d, r);
        b.connect(r, next);
        let mut circuit = Circuit::new(b.finish().unwrap());
        assert!(run(&mut circuit, &interner).0.is_ok());
        let top = circuit.module(circuit.top());
        assert_eq!(top.value_type(r), &Type::uint(4));
        assert_eq!(top.value_type(next), &Type::uint(4));
    }

    #[test]
    fn undriven_wire_is_unresolved() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let out = b.output("out", Type::uint(8));
        let w = b.wire("floating", Type::uint_unknown());
        let p = b.pad(w, 8);
        b.connect(out, p);
        let mut circuit = Circuit::new(b.finish().unwrap());
        let (result, sink) = run(&mut circuit, &interner);
        assert_eq!(
            result,
            Err(WidthInferenceError::Unresolved {
                values: vec!["Top.floating".to_string()]
            })
        );
        assert!(sink.contains_code(E_WIDTH_UNRESOLVED));
    }

    #[test]
    fn widths_flow_through_instance_ports() {
        let interner = Interner::new();
        let mut leaf = ModuleBuilder::new(&interner, "Leaf");
        let i = leaf.input("i", Type::uint_unknown());
        let o = leaf.output("o", Type::uint_unknown());
        leaf.connect(o, i);
        let leaf = leaf.finish().unwrap();

        let mut top = ModuleBuilder::new(&interner, "Top");
        let a = top.input("a", Type::uint(5));
        let out = top.output("out", Type::uint_unknown());
        let ports = top.instance("u", &leaf);
        top.connect(ports[0], a);
        top.connect(out, ports[1]);
        let mut circuit = Circuit::new(top.finish().unwrap());
        let leaf_id = circuit.add_module(leaf);

        let (result, _) = run(&mut circuit, &interner);
        assert_eq!(result.map(|s| s.resolved), Ok(5));
        assert_eq!(circuit.module(leaf_id).value_type(i), &Type::uint(5));
        assert_eq!(circuit.module(leaf_id).value_type(o), &Type::uint(5));
        assert_eq!(circuit.module(circuit.top()).value_type(out), &Type::uint(5));
    }

    #[test]
    fn nothing_to_infer() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "Top");
        let a = b.input("a", Type::uint(2));
        let o = b.output("o", Type::uint(2));
        b.connect(o, a);
        let mut circuit = Circuit::new(b.finish().unwrap());
        assert_eq!(run(&mut circuit, &interner).0, Ok(InferStats::default()));
    }
}
