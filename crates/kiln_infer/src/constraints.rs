//! Constraint extraction: one width rule per unknown-width value.

use kiln_ir::{Circuit, Direction, ModuleId, OpId, OpKind, RegKind, Type, ValueDef, ValueId, Width};
use std::collections::HashMap;

/// A value anywhere in the circuit.
pub(crate) type Slot = (ModuleId, ValueId);

/// How the width of one unknown value is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rule {
    /// A width known up front, e.g. an unsized literal's minimal width.
    Fixed(u32),
    /// The result-type rule of an expression, applied to operand widths.
    Expr { module: ModuleId, op: OpId },
    /// The widest of the listed values; connect destinations and port links.
    Max(Vec<Slot>),
}

/// The constraint system for a circuit.
#[derive(Debug, Default)]
pub(crate) struct Constraints {
    pub vars: Vec<Slot>,
    pub index: HashMap<Slot, usize>,
    pub rules: Vec<Rule>,
}

impl Constraints {
    /// Variable indices the rule of `var` reads.
    pub fn deps(&self, circuit: &Circuit, var: usize) -> Vec<usize> {
        let slots: Vec<Slot> = match &self.rules[var] {
            Rule::Fixed(_) => Vec::new(),
            Rule::Max(sources) => sources.clone(),
            Rule::Expr { module, op } => circuit
                .module(*module)
                .op(*op)
                .operands
                .iter()
                .map(|v| (*module, *v))
                .collect(),
        };
        slots.iter().filter_map(|s| self.index.get(s).copied()).collect()
    }
}

/// The integer width inside a type: the type itself or a vector's element.
pub(crate) fn leaf_width(ty: &Type) -> Option<Width> {
    match ty {
        Type::Int(int) => Some(int.width),
        Type::Vector { element, .. } => leaf_width(element),
        Type::Clock | Type::Reset | Type::AsyncReset => None,
    }
}

/// Replaces the integer width inside a type.
pub(crate) fn with_leaf_width(ty: &Type, width: u32) -> Type {
    match ty {
        Type::Int(_) => ty.with_width(width),
        Type::Vector { element, len } => Type::vector(with_leaf_width(element, width), *len),
        other => other.clone(),
    }
}

/// Collects one rule per value whose type contains an unknown width.
pub(crate) fn collect(circuit: &Circuit) -> Constraints {
    let mut sites: HashMap<ModuleId, Vec<(ModuleId, OpId)>> = HashMap::new();
    for (caller, module) in circuit.modules() {
        for (op, info) in module.instances() {
            if let Some(callee) = circuit.lookup(info.module) {
                sites.entry(callee).or_default().push((caller, op));
            }
        }
    }

    let mut constraints = Constraints::default();
    for (id, module) in circuit.modules() {
        for (value, data) in module.values() {
            if leaf_width(&data.ty) != Some(Width::Unknown) {
                continue;
            }
            let drivers = || -> Vec<Slot> {
                module
                    .drivers(value)
                    .into_iter()
                    .map(|c| (id, module.op(c).operands[1]))
                    .collect()
            };
            let rule = match data.def {
                ValueDef::Port(index) => {
                    let mut sources: Vec<Slot> = sites
                        .get(&id)
                        .into_iter()
                        .flatten()
                        .filter_map(|&(caller, op)| {
                            let results = &circuit.module(caller).op(op).results;
                            results.get(index as usize).map(|r| (caller, *r))
                        })
                        .collect();
                    if module.ports[index as usize].direction == Direction::Output {
                        sources.extend(drivers());
                    }
                    Rule::Max(sources)
                }
                ValueDef::Result { op, index } => {
                    let def = module.op(op);
                    match &def.kind {
                        OpKind::Constant(c) => Rule::Fixed(c.width()),
                        OpKind::AggregateConstant(elems) => {
                            Rule::Fixed(elems.iter().map(|e| e.width()).max().unwrap_or(1))
                        }
                        OpKind::Invalid => Rule::Max(
                            module
                                .uses(value)
                                .iter()
                                .filter(|u| {
                                    u.operand == 1
                                        && matches!(module.op(u.op).kind, OpKind::Connect(_))
                                })
                                .map(|u| (id, module.op(u.op).operands[0]))
                                .collect(),
                        ),
                        OpKind::Wire | OpKind::Register(RegKind::Plain) => Rule::Max(drivers()),
                        OpKind::Register(RegKind::Resettable { .. }) => {
                            let mut sources = drivers();
                            sources.push((id, def.operands[2]));
                            Rule::Max(sources)
                        }
                        OpKind::Instance(info) => {
                            let mut sources = Vec::new();
                            if let Some(callee) = circuit.lookup(info.module) {
                                if let Some(port) = circuit.module(callee).ports.get(index as usize) {
                                    sources.push((callee, port.value));
                                    if port.direction == Direction::Input {
                                        sources.extend(drivers());
                                    }
                                }
                            }
                            Rule::Max(sources)
                        }
                        OpKind::Bits { hi, lo } => Rule::Fixed(hi.saturating_sub(*lo) + 1),
                        kind if kind.is_expression() => Rule::Expr { module: id, op },
                        _ => Rule::Fixed(1),
                    }
                }
            };
            constraints.index.insert((id, value), constraints.vars.len());
            constraints.vars.push((id, value));
            constraints.rules.push(rule);
        }
    }
    constraints
}
