//! The module instantiation hierarchy as a DAG.
//!
//! Nodes are modules and each edge collects every instance site of one
//! caller/callee pair, so an edge's weight length is the multiplicity.

use crate::circuit::Circuit;
use crate::error::StructuralError;
use crate::ids::{ModuleId, OpId};
use kiln_common::Interner;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// One instance operation of a module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct InstanceSite {
    /// The instantiating module.
    pub caller: ModuleId,
    /// The instance operation inside `caller`.
    pub op: OpId,
}

/// Instantiation relationships between the modules of a circuit.
#[derive(Debug, Clone)]
pub struct InstanceGraph {
    graph: DiGraph<ModuleId, Vec<OpId>>,
    nodes: HashMap<ModuleId, NodeIndex>,
    top: ModuleId,
    order: Vec<ModuleId>,
}

impl InstanceGraph {
    /// Builds the graph, failing on undefined callees and instance cycles.
    pub fn build(circuit: &Circuit, interner: &Interner) -> Result<Self, StructuralError> {
        let mut graph: DiGraph<ModuleId, Vec<OpId>> = DiGraph::new();
        let mut nodes = HashMap::new();
        for (id, _) in circuit.modules() {
            nodes.insert(id, graph.add_node(id));
        }
        for (id, module) in circuit.modules() {
            for (op, info) in module.instances() {
                let callee = circuit.lookup(info.module).ok_or_else(|| {
                    StructuralError::UndefinedModule {
                        module: interner.resolve(module.name).to_string(),
                        callee: interner.resolve(info.module).to_string(),
                        loc: module.op(op).loc,
                    }
                })?;
                let (from, to) = (nodes[&id], nodes[&callee]);
                match graph.find_edge(from, to) {
                    Some(edge) => graph[edge].push(op),
                    None => {
                        graph.add_edge(from, to, vec![op]);
                    }
                }
            }
        }
        let order = match toposort(&graph, None) {
            Ok(sorted) => sorted.into_iter().map(|n| graph[n]).collect(),
            Err(cycle) => {
                let path = cycle_path(&graph, cycle.node_id());
                return Err(StructuralError::InstanceCycle {
                    modules: path
                        .into_iter()
                        .map(|n| interner.resolve(circuit.module(graph[n]).name).to_string())
                        .collect(),
                });
            }
        };
        Ok(Self {
            graph,
            nodes,
            top: circuit.top(),
            order,
        })
    }

    /// Modules with callers before callees.
    pub fn top_down(&self) -> &[ModuleId] {
        &self.order
    }

    /// Modules with callees before callers.
    pub fn bottom_up(&self) -> Vec<ModuleId> {
        self.order.iter().rev().copied().collect()
    }

    /// The top module.
    pub fn top(&self) -> ModuleId {
        self.top
    }

    /// Every instance of `callee`, grouped by caller in graph order.
    pub fn sites(&self, callee: ModuleId) -> Vec<InstanceSite> {
        let Some(&node) = self.nodes.get(&callee) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, Direction::Incoming)
            .flat_map(|edge| {
                let caller = self.graph[edge.source()];
                edge.weight().iter().map(move |&op| InstanceSite { caller, op })
            })
            .collect()
    }

    /// Distinct modules instantiated by `caller`.
    pub fn callees(&self, caller: ModuleId) -> Vec<ModuleId> {
        let Some(&node) = self.nodes.get(&caller) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect()
    }

    /// Number of instances of `callee` inside `caller`.
    pub fn multiplicity(&self, caller: ModuleId, callee: ModuleId) -> usize {
        match (self.nodes.get(&caller), self.nodes.get(&callee)) {
            (Some(&from), Some(&to)) => self
                .graph
                .find_edge(from, to)
                .map_or(0, |edge| self.graph[edge].len()),
            _ => 0,
        }
    }

    /// Total number of instances of `module` across the circuit.
    pub fn use_count(&self, module: ModuleId) -> usize {
        self.sites(module).len()
    }

    /// Modules reachable from the top through instances, the top included.
    pub fn reachable_from_top(&self) -> HashSet<ModuleId> {
        let mut reachable = HashSet::new();
        let Some(&start) = self.nodes.get(&self.top) else {
            return reachable;
        };
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            reachable.insert(self.graph[node]);
        }
        reachable
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no modules.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// A closed path through `start`'s strongly connected component, ending where it began.
fn cycle_path(graph: &DiGraph<ModuleId, Vec<OpId>>, start: NodeIndex) -> Vec<NodeIndex> {
    let component: HashSet<NodeIndex> = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.contains(&start))
        .unwrap_or_else(|| vec![start])
        .into_iter()
        .collect();
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if next == start {
                let mut path = vec![start, node];
                let mut cur = node;
                while let Some(&p) = parent.get(&cur) {
                    path.push(p);
                    cur = p;
                }
                if cur != start {
                    path.push(start);
                }
                path.reverse();
                path.dedup();
                if path.len() == 1 {
                    path.push(start);
                }
                return path;
            }
            if component.contains(&next) && next != start && !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    vec![start, start]
}
