//! Combinational evaluation of a single module.
//!
//! Interprets a module without registers or instances for concrete input
//! port values. Invalid values read as zero. Used to check that rewrites
//! preserve behaviour.

use crate::fold::fold_expr;
use crate::ids::ValueId;
use crate::module::{Direction, Module, ValueDef};
use crate::op::{Access, OpKind};
use crate::types::Type;
use kiln_common::ApInt;
use std::collections::{HashMap, HashSet};

/// A concrete value on a port or wire.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Signal {
    /// An integer or other ground value.
    Int(ApInt),
    /// A vector, one integer per element.
    Vector(Vec<ApInt>),
}

impl From<ApInt> for Signal {
    fn from(value: ApInt) -> Self {
        Signal::Int(value)
    }
}

impl Signal {
    /// Returns the integer if this is a ground signal.
    pub fn as_int(&self) -> Option<&ApInt> {
        match self {
            Signal::Int(v) => Some(v),
            Signal::Vector(_) => None,
        }
    }
}

/// Why evaluation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The caller passed the wrong number of inputs.
    #[error("expected {expected} input values, found {found}")]
    InputCount {
        /// Number of input ports.
        expected: usize,
        /// Number of values passed.
        found: usize,
    },
    /// The module contains something with state or hierarchy.
    #[error("cannot evaluate `{0}` combinationally")]
    Unsupported(String),
    /// A value depends on itself without a register in between.
    #[error("combinational loop through value {0:?}")]
    Loop(ValueId),
    /// A wire or output is never connected.
    #[error("value {0:?} is never driven")]
    Undriven(ValueId),
    /// A type or width needed for evaluation is missing.
    #[error("cannot evaluate value {0:?}: {1}")]
    Type(ValueId, String),
}

/// Evaluates `module` for `inputs` given in input-port order, returning the
/// output-port values in output-port order.
pub fn evaluate(module: &Module, inputs: &[Signal]) -> Result<Vec<Signal>, EvalError> {
    let input_ports: Vec<usize> = (0..module.ports.len())
        .filter(|i| module.ports[*i].direction == Direction::Input)
        .collect();
    if input_ports.len() != inputs.len() {
        return Err(EvalError::InputCount {
            expected: input_ports.len(),
            found: inputs.len(),
        });
    }
    let mut eval = Evaluator {
        module,
        memo: HashMap::new(),
        active: HashSet::new(),
    };
    for (&port, input) in input_ports.iter().zip(inputs) {
        eval.memo.insert(module.ports[port].value, input.clone());
    }
    module
        .ports
        .iter()
        .filter(|p| p.direction == Direction::Output)
        .map(|p| eval.value(p.value))
        .collect()
}

struct Evaluator<'a> {
    module: &'a Module,
    memo: HashMap<ValueId, Signal>,
    active: HashSet<ValueId>,
}

fn zero_of(ty: &Type) -> Option<Signal> {
    match ty {
        Type::Vector { element, len } => {
            let w = element.bit_width()?;
            Some(Signal::Vector(vec![ApInt::zero(w); *len as usize]))
        }
        other => Some(Signal::Int(ApInt::zero(other.bit_width()?))),
    }
}

fn fit(signal: Signal, from: &Type, to: &Type) -> Option<Signal> {
    match (signal, from, to) {
        (Signal::Int(v), _, _) => Some(Signal::Int(v.resize(to.bit_width()?, from.is_signed()))),
        (
            Signal::Vector(elems),
            Type::Vector { element: fe, .. },
            Type::Vector { element: te, .. },
        ) => {
            let w = te.bit_width()?;
            Some(Signal::Vector(
                elems.iter().map(|e| e.resize(w, fe.is_signed())).collect(),
            ))
        }
        _ => None,
    }
}

impl Evaluator<'_> {
    fn value(&mut self, value: ValueId) -> Result<Signal, EvalError> {
        if let Some(signal) = self.memo.get(&value) {
            return Ok(signal.clone());
        }
        if !self.active.insert(value) {
            return Err(EvalError::Loop(value));
        }
        let signal = self.compute(value)?;
        self.active.remove(&value);
        self.memo.insert(value, signal.clone());
        Ok(signal)
    }

    fn int(&mut self, value: ValueId) -> Result<ApInt, EvalError> {
        match self.value(value)? {
            Signal::Int(v) => Ok(v),
            Signal::Vector(_) => Err(EvalError::Type(value, "expected a ground value".into())),
        }
    }

    fn driven(&mut self, value: ValueId) -> Result<Signal, EvalError> {
        let module = self.module;
        let driver = module
            .drivers(value)
            .into_iter()
            .max()
            .ok_or(EvalError::Undriven(value))?;
        let src = module.op(driver).operands[1];
        let signal = self.value(src)?;
        fit(signal, module.value_type(src), module.value_type(value))
            .ok_or_else(|| EvalError::Type(value, "unknown width".into()))
    }

    fn compute(&mut self, value: ValueId) -> Result<Signal, EvalError> {
        let module = self.module;
        let data = module.value(value);
        let op = match data.def {
            ValueDef::Port(_) => return self.driven(value),
            ValueDef::Result { op, .. } => module.op(op),
        };
        let ty = &data.ty;
        let missing_width = || EvalError::Type(value, "unknown width".into());
        match &op.kind {
            OpKind::Constant(c) => {
                let w = ty.bit_width().ok_or_else(missing_width)?;
                Ok(Signal::Int(c.resize(w, ty.is_signed())))
            }
            OpKind::SpecialConstant(b) => Ok(Signal::Int(ApInt::from_u64(u64::from(*b), 1))),
            OpKind::AggregateConstant(elems) => Ok(Signal::Vector(elems.clone())),
            OpKind::Invalid => zero_of(ty).ok_or_else(missing_width),
            OpKind::Wire => self.driven(value),
            OpKind::Node => self.value(op.operands[0]),
            OpKind::Access(access) => {
                let Signal::Vector(elems) = self.value(op.operands[0])? else {
                    return Err(EvalError::Type(value, "indexed access into ground value".into()));
                };
                let index = match access {
                    Access::Static(i) => Some(u64::from(*i)),
                    Access::Dynamic => self.int(op.operands[1])?.to_u64(),
                };
                match index.and_then(|i| elems.get(i as usize)) {
                    Some(elem) => Ok(Signal::Int(elem.clone())),
                    None => zero_of(ty).ok_or_else(missing_width),
                }
            }
            OpKind::Mux if !ty.is_ground() => {
                let sel = self.int(op.operands[0])?;
                self.value(op.operands[if sel.bit(0) { 1 } else { 2 }])
            }
            kind if kind.is_expression() => {
                let mut literals = Vec::with_capacity(op.operands.len());
                for &operand in &op.operands {
                    literals.push(self.int(operand)?);
                }
                let typed: Vec<(&ApInt, &Type)> = literals
                    .iter()
                    .zip(&op.operands)
                    .map(|(lit, v)| (lit, module.value_type(*v)))
                    .collect();
                fold_expr(kind, &typed, ty)
                    .map(Signal::Int)
                    .ok_or_else(|| EvalError::Type(value, format!("cannot fold {}", kind.mnemonic())))
            }
            other => Err(EvalError::Unsupported(other.mnemonic().to_string())),
        }
    }
}
