//! Constant evaluation of expression operations over [`ApInt`].
//!
//! Operands are extended to the result width by their own signedness before
//! the operator applies, matching the hardware semantics of each operation.
//! Shared by the rewrite engine, interprocedural constant propagation, and
//! the combinational evaluator.

use crate::ids::ValueId;
use crate::module::Module;
use crate::op::{BinaryOp, CompareOp, OpKind, ShiftAmount, ShiftDir};
use crate::types::Type;
use kiln_common::ApInt;
use std::cmp::Ordering;

/// Returns the literal if `value` is defined by an integer constant.
pub fn constant_of(module: &Module, value: ValueId) -> Option<&ApInt> {
    match module.defining_kind(value)? {
        OpKind::Constant(c) => Some(c),
        _ => None,
    }
}

/// Returns `true` if `value` is defined by any constant-like operation.
pub fn is_constant_like(module: &Module, value: ValueId) -> bool {
    module
        .defining_kind(value)
        .is_some_and(OpKind::is_constant)
}

fn extend(value: &ApInt, ty: &Type, width: u32) -> ApInt {
    value.resize(width, ty.is_signed())
}

fn compare(op: CompareOp, lhs: &ApInt, rhs: &ApInt, signed: bool) -> bool {
    let ord = if signed { lhs.scmp(rhs) } else { lhs.ucmp(rhs) };
    match op {
        CompareOp::Leq => ord != Ordering::Greater,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Geq => ord != Ordering::Less,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Neq => ord != Ordering::Equal,
    }
}

fn shift_amount(amount: &ApInt) -> u32 {
    amount
        .to_u64()
        .map_or(u32::MAX, |a| a.min(u64::from(u32::MAX)) as u32)
}

/// Evaluates an expression whose integer operands are all known.
///
/// `operands` pairs each literal with its operand type. Returns `None` when
/// the kind is not foldable here or a width is unknown.
pub fn fold_expr(kind: &OpKind, operands: &[(&ApInt, &Type)], result: &Type) -> Option<ApInt> {
    let width = result.bit_width()?;
    if operands.len() != kind.expr_arity()? {
        return None;
    }
    for (value, ty) in operands {
        if ty.bit_width()? != value.width() {
            return None;
        }
    }
    let ext = |i: usize| extend(operands[i].0, operands[i].1, width);
    let folded = match kind {
        OpKind::Binary(op) => {
            let (a, b) = (ext(0), ext(1));
            match op {
                BinaryOp::Add => a.add(&b),
                BinaryOp::Sub => a.sub(&b),
                BinaryOp::And => a.and(&b),
                BinaryOp::Or => a.or(&b),
                BinaryOp::Xor => a.xor(&b),
            }
        }
        OpKind::Compare(op) => {
            let bit = compare(*op, operands[0].0, operands[1].0, operands[0].1.is_signed());
            ApInt::from_u64(u64::from(bit), 1)
        }
        OpKind::Neg => ext(0).neg(),
        OpKind::Mux => {
            if operands[0].0.bit(0) {
                ext(1)
            } else {
                ext(2)
            }
        }
        OpKind::Bits { hi, lo } => {
            if *hi >= operands[0].0.width() || hi < lo {
                return None;
            }
            operands[0].0.extract(*hi, *lo)
        }
        OpKind::Concat => ApInt::concat(operands[0].0, operands[1].0),
        OpKind::Shift { dir, amount } => {
            let (input, ty) = operands[0];
            let n = match amount {
                ShiftAmount::Static(n) => *n,
                ShiftAmount::Dynamic => shift_amount(operands[1].0),
            };
            match dir {
                ShiftDir::Left => input.resize(width, false).shl(n),
                ShiftDir::Right if ty.is_signed() => input.ashr(n).resize(width, true),
                ShiftDir::Right => input.lshr(n).resize(width, false),
            }
        }
        OpKind::Pad(_) | OpKind::Cast(_) | OpKind::Node => ext(0),
        _ => return None,
    };
    Some(folded)
}
