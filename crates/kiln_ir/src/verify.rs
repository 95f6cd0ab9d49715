//! Structural verification of circuits and modules.

use crate::circuit::Circuit;
use crate::error::StructuralError;
use crate::ids::{ModuleId, OpId, ValueId};
use crate::module::{Direction, Module, ValueDef};
use crate::op::{ConnectKind, Op, OpKind, RegKind};
use crate::types::{expr_result_type, IntType, Type, Width};
use kiln_common::Interner;

/// Returns `true` if the types are equal up to widths still left to inference.
pub fn types_compatible(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Int(x), Type::Int(y)) => {
            x.signed == y.signed
                && match (x.width, y.width) {
                    (Width::Known(p), Width::Known(q)) => p == q,
                    _ => true,
                }
        }
        (
            Type::Vector {
                element: ea,
                len: la,
            },
            Type::Vector {
                element: eb,
                len: lb,
            },
        ) => la == lb && types_compatible(ea, eb),
        _ => a == b,
    }
}

/// Returns `true` if a loose connect may drive `dest` from `src`.
pub fn connectable(dest: &Type, src: &Type) -> bool {
    match (dest, src) {
        (
            Type::Int(IntType {
                signed: ds,
                width: dw,
            }),
            Type::Int(IntType {
                signed: ss,
                width: sw,
            }),
        ) => {
            ds == ss
                && match (dw, sw) {
                    (Width::Known(d), Width::Known(s)) => d >= s,
                    _ => true,
                }
        }
        (
            Type::Vector {
                element: de,
                len: dl,
            },
            Type::Vector {
                element: se,
                len: sl,
            },
        ) => dl == sl && connectable(de, se),
        _ => dest == src,
    }
}

/// Verifies every module of the circuit, returning the first error found.
pub fn verify_circuit(circuit: &Circuit, interner: &Interner) -> Result<(), StructuralError> {
    for id in circuit.module_ids() {
        if let Some(err) = verify_module(circuit, id, interner).into_iter().next() {
            return Err(err);
        }
    }
    Ok(())
}

/// Verifies a single module in the context of its circuit.
pub fn verify_module(circuit: &Circuit, id: ModuleId, interner: &Interner) -> Vec<StructuralError> {
    let module = circuit.module(id);
    let mut checker = Checker {
        circuit,
        module,
        interner,
        name: interner.resolve(module.name).to_string(),
        errors: Vec::new(),
    };
    checker.check_ports();
    if module.external && module.num_ops() > 0 {
        checker.malformed("external module has a body".to_string());
    }
    for (op_id, op) in module.ops() {
        checker.check_ssa(op_id, op);
        checker.check_op(op);
    }
    checker.errors
}

struct Checker<'a> {
    circuit: &'a Circuit,
    module: &'a Module,
    interner: &'a Interner,
    name: String,
    errors: Vec<StructuralError>,
}

impl<'a> Checker<'a> {
    fn malformed(&mut self, detail: String) {
        self.errors.push(StructuralError::Malformed {
            module: self.name.clone(),
            detail,
        });
    }

    fn ill_typed(&mut self, op: &Op, detail: String) {
        self.errors.push(StructuralError::IllTypedOp {
            module: self.name.clone(),
            op: op.kind.mnemonic().to_string(),
            detail,
            loc: op.loc,
        });
    }

    fn ty(&self, value: ValueId) -> &'a Type {
        self.module.value_type(value)
    }

    fn check_ports(&mut self) {
        for (index, port) in self.module.ports.iter().enumerate() {
            match self.module.try_value(port.value) {
                Some(data) if data.def == ValueDef::Port(index as u32) => {}
                _ => self.malformed(format!(
                    "port `{}` has a stale value",
                    self.interner.resolve(port.name)
                )),
            }
        }
    }

    fn check_ssa(&mut self, id: OpId, op: &Op) {
        for (index, &operand) in op.operands.iter().enumerate() {
            let Some(data) = self.module.try_value(operand) else {
                self.malformed(format!("{} uses an erased value", op.kind.mnemonic()));
                continue;
            };
            let registered = data
                .uses
                .iter()
                .any(|u| u.op == id && u.operand as usize == index);
            if !registered {
                self.malformed(format!(
                    "{} operand {index} is missing from its use-list",
                    op.kind.mnemonic()
                ));
            }
        }
        for (index, &result) in op.results.iter().enumerate() {
            let defined_here = self.module.try_value(result).is_some_and(|d| {
                d.def
                    == ValueDef::Result {
                        op: id,
                        index: index as u32,
                    }
            });
            if !defined_here {
                self.malformed(format!("{} result {index} has a stale definition", op.kind.mnemonic()));
            }
        }
    }

    fn check_op(&mut self, op: &Op) {
        match &op.kind {
            OpKind::Connect(kind) => self.check_connect(op, *kind),
            OpKind::Instance(_) => self.check_instance(op),
            OpKind::Register(kind) => self.check_register(op, *kind),
            OpKind::Constant(c) => {
                if let [result] = op.results[..] {
                    match self.ty(result) {
                        Type::Int(int) => {
                            if int.width.known().is_some_and(|w| w != c.width()) {
                                self.ill_typed(op, format!("literal {c} does not fit {}", self.ty(result)));
                            }
                        }
                        other => self.ill_typed(op, format!("integer literal of type {other}")),
                    }
                }
            }
            OpKind::AggregateConstant(elems) => {
                if let [result] = op.results[..] {
                    let ok = matches!(self.ty(result), Type::Vector { len, .. } if *len as usize == elems.len());
                    if !ok {
                        self.ill_typed(op, format!("{} elements for {}", elems.len(), self.ty(result)));
                    }
                }
            }
            kind if kind.is_expression() => {
                let types: Vec<&Type> = op.operands.iter().map(|v| self.ty(*v)).collect();
                match expr_result_type(kind, &types) {
                    Ok(expected) => {
                        if let [result] = op.results[..] {
                            if !types_compatible(&expected, self.ty(result)) {
                                let detail = format!("result is {}, expected {expected}", self.ty(result));
                                self.ill_typed(op, detail);
                            }
                        }
                    }
                    Err(detail) => self.ill_typed(op, detail),
                }
            }
            _ => {}
        }
        let expected_results = match &op.kind {
            OpKind::Connect(_) => Some(0),
            OpKind::Instance(_) => None,
            _ => Some(1),
        };
        if expected_results.is_some_and(|n| n != op.results.len()) {
            self.malformed(format!("{} has {} results", op.kind.mnemonic(), op.results.len()));
        }
    }

    fn check_register(&mut self, op: &Op, kind: RegKind) {
        let arity = match kind {
            RegKind::Plain => 1,
            RegKind::Resettable { .. } => 3,
        };
        if op.operands.len() != arity || op.results.len() != 1 {
            self.malformed(format!("{} has {} operands", op.kind.mnemonic(), op.operands.len()));
            return;
        }
        if *self.ty(op.operands[0]) != Type::Clock {
            self.ill_typed(op, format!("clock operand is {}", self.ty(op.operands[0])));
        }
        if let RegKind::Resettable { is_async } = kind {
            let reset_ok = match self.ty(op.operands[1]) {
                Type::AsyncReset => is_async,
                Type::Reset => !is_async,
                other => other.is_bool_like(),
            };
            if !reset_ok {
                self.ill_typed(op, format!("reset operand is {}", self.ty(op.operands[1])));
            }
            if !connectable(self.ty(op.results[0]), self.ty(op.operands[2])) {
                let detail = format!(
                    "reset value {} does not fit register {}",
                    self.ty(op.operands[2]),
                    self.ty(op.results[0])
                );
                self.ill_typed(op, detail);
            }
        }
    }

    fn check_connect(&mut self, op: &Op, kind: ConnectKind) {
        let [dest, src] = op.operands[..] else {
            self.malformed(format!("connect has {} operands", op.operands.len()));
            return;
        };
        if let Some(detail) = self.destination_problem(dest) {
            self.errors.push(StructuralError::InvalidDestination {
                module: self.name.clone(),
                detail,
                loc: op.loc,
            });
        }
        let (dt, st) = (self.ty(dest), self.ty(src));
        let ok = match kind {
            ConnectKind::Strict => types_compatible(dt, st),
            ConnectKind::Loose => connectable(dt, st),
        };
        if !ok {
            let detail = format!("{dt} <- {st}");
            self.errors.push(StructuralError::IllTypedConnect {
                module: self.name.clone(),
                detail,
                loc: op.loc,
            });
        }
    }

    fn destination_problem(&self, dest: ValueId) -> Option<String> {
        match self.module.value(dest).def {
            ValueDef::Port(index) => {
                let port = &self.module.ports[index as usize];
                (port.direction == Direction::Input).then(|| {
                    format!("input port `{}` is driven from inside", self.interner.resolve(port.name))
                })
            }
            ValueDef::Result { op, index } => {
                let def = self.module.op(op);
                match &def.kind {
                    OpKind::Wire | OpKind::Register(_) => None,
                    OpKind::Instance(info) => {
                        let callee = self.circuit.lookup(info.module)?;
                        let port = self.circuit.module(callee).ports.get(index as usize)?;
                        (port.direction == Direction::Output).then(|| {
                            format!(
                                "output `{}` of instance is driven from outside",
                                self.interner.resolve(port.name)
                            )
                        })
                    }
                    other => Some(format!("{} result is not a connect destination", other.mnemonic())),
                }
            }
        }
    }

    fn check_instance(&mut self, op: &Op) {
        let Some(info) = op.instance() else { return };
        let callee_name = self.interner.resolve(info.module).to_string();
        let Some(callee) = self.circuit.lookup(info.module) else {
            self.errors.push(StructuralError::UndefinedModule {
                module: self.name.clone(),
                callee: callee_name,
                loc: op.loc,
            });
            return;
        };
        let callee = self.circuit.module(callee);
        let mismatch = if !op.operands.is_empty() {
            Some("instances take no operands".to_string())
        } else if op.results.len() != callee.ports.len() || info.port_names.len() != callee.ports.len() {
            Some(format!(
                "{} results for {} ports",
                op.results.len(),
                callee.ports.len()
            ))
        } else {
            callee
                .ports
                .iter()
                .zip(&info.port_names)
                .zip(&op.results)
                .find_map(|((port, name), result)| {
                    if port.name != *name {
                        Some(format!(
                            "port `{}` recorded as `{}`",
                            self.interner.resolve(port.name),
                            self.interner.resolve(*name)
                        ))
                    } else if !types_compatible(callee.value_type(port.value), self.ty(*result)) {
                        Some(format!(
                            "port `{}` is {}, instance has {}",
                            self.interner.resolve(port.name),
                            callee.value_type(port.value),
                            self.ty(*result)
                        ))
                    } else {
                        None
                    }
                })
        };
        if let Some(detail) = mismatch {
            self.errors.push(StructuralError::InstanceMismatch {
                module: self.name.clone(),
                callee: callee_name,
                detail,
                loc: op.loc,
            });
        }
    }
}
