//! Binary and comparison rules: constant sinking, algebraic identities and
//! operand width alignment.
//!
//! Identity replacements are padded to the original result width and cast
//! back to the original result signedness, so users always observe the same
//! type.

use super::built;
use crate::rewriter::Rewriter;
use kiln_common::{ApInt, KilnResult};
use kiln_ir::{BinaryOp, OpId, OpKind, ShiftAmount, ShiftDir, Type, ValueId};

/// Moves a lone constant-like operand of a commutative operation or a
/// comparison to the right-hand side.
pub(crate) fn sink_constant(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    let kind = match &data.kind {
        OpKind::Binary(b) if b.is_commutative() => OpKind::Binary(*b),
        OpKind::Compare(c) => OpKind::Compare(c.swapped()),
        _ => return Ok(false),
    };
    let (lhs, rhs) = (data.operands[0], data.operands[1]);
    if !rw.is_constant_like(lhs) || rw.is_constant_like(rhs) {
        return Ok(false);
    }
    rw.rebuild(op, kind, vec![rhs, lhs])?;
    Ok(true)
}

fn binary_parts(rw: &Rewriter<'_>, op: OpId) -> Option<(BinaryOp, ValueId, ValueId, ValueId, Type)> {
    let data = rw.op(op);
    let OpKind::Binary(kind) = data.kind else {
        return None;
    };
    let result = data.result()?;
    let ty = rw.ty(result).clone();
    ty.bit_width()?;
    Some((kind, data.operands[0], data.operands[1], result, ty))
}

fn is_zero(rw: &Rewriter<'_>, value: ValueId) -> bool {
    rw.constant(value).is_some_and(ApInt::is_zero)
}

/// Whether `value` is a literal whose extension to `width` is all ones.
fn is_all_ones(rw: &Rewriter<'_>, value: ValueId, width: u32) -> bool {
    let signed = rw.ty(value).is_signed();
    rw.constant(value)
        .is_some_and(|c| c.resize(width, signed).is_all_ones())
}

fn known(rw: &Rewriter<'_>, value: ValueId) -> bool {
    rw.ty(value).as_int().is_some() && rw.width(value).is_some()
}

/// Replaces `op` with `value` extended to the result type `ty`.
fn replace_extended(
    rw: &mut Rewriter<'_>,
    op: OpId,
    value: ValueId,
    ty: &Type,
    rule: &str,
) -> KilnResult<bool> {
    let width = ty.bit_width().unwrap_or_default();
    let padded = built(rw.pad_to(value, width), rule)?;
    let value = if ty.is_signed() {
        padded
    } else {
        built(rw.as_uint(padded), rule)?
    };
    rw.replace(op, value)?;
    Ok(true)
}

fn replace_constant(rw: &mut Rewriter<'_>, op: OpId, ty: Type, value: ApInt) -> KilnResult<bool> {
    let constant = rw.build_constant(ty, value);
    rw.replace(op, constant)?;
    Ok(true)
}

/// `x + 0`, `x + x`, `x - 0`, `0 - x` and `x - x`.
pub(crate) fn arith_identity(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some((kind, lhs, rhs, _, ty)) = binary_parts(rw, op) else {
        return Ok(false);
    };
    let width = ty.bit_width().unwrap_or_default();
    match kind {
        BinaryOp::Add if lhs == rhs && known(rw, lhs) => {
            let shifted = rw.build(
                OpKind::Shift {
                    dir: ShiftDir::Left,
                    amount: ShiftAmount::Static(1),
                },
                vec![lhs],
            );
            let shifted = built(shifted, "arith-identity")?;
            replace_extended(rw, op, shifted, &ty, "arith-identity")
        }
        BinaryOp::Add | BinaryOp::Sub if is_zero(rw, rhs) && known(rw, lhs) => {
            replace_extended(rw, op, lhs, &ty, "arith-identity")
        }
        BinaryOp::Sub if lhs == rhs && known(rw, lhs) => {
            replace_constant(rw, op, ty, ApInt::zero(width))
        }
        BinaryOp::Sub if is_zero(rw, lhs) && known(rw, rhs) && !rw.is_constant_like(rhs) => {
            let negated = built(rw.build(OpKind::Neg, vec![rhs]), "arith-identity")?;
            replace_extended(rw, op, negated, &ty, "arith-identity")
        }
        _ => Ok(false),
    }
}

/// `x & 0`, `x & -1`, `x & x`, `x | 0`, `x | -1`, `x | x`, `x ^ 0` and
/// `x ^ x`.
pub(crate) fn bitwise_identity(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some((kind, lhs, rhs, _, ty)) = binary_parts(rw, op) else {
        return Ok(false);
    };
    let width = ty.bit_width().unwrap_or_default();
    if !known(rw, lhs) || !known(rw, rhs) {
        return Ok(false);
    }
    let same = lhs == rhs;
    match kind {
        BinaryOp::And if is_zero(rw, rhs) => replace_constant(rw, op, ty, ApInt::zero(width)),
        BinaryOp::And if same || is_all_ones(rw, rhs, width) => {
            replace_extended(rw, op, lhs, &ty, "bitwise-identity")
        }
        BinaryOp::Or if is_all_ones(rw, rhs, width) => {
            replace_constant(rw, op, ty, ApInt::all_ones(width))
        }
        BinaryOp::Or | BinaryOp::Xor if is_zero(rw, rhs) => {
            replace_extended(rw, op, lhs, &ty, "bitwise-identity")
        }
        BinaryOp::Or if same => replace_extended(rw, op, lhs, &ty, "bitwise-identity"),
        BinaryOp::Xor if same => replace_constant(rw, op, ty, ApInt::zero(width)),
        _ => Ok(false),
    }
}

/// Pads both operands of a bitwise operation to the result width when their
/// known widths differ.
pub(crate) fn extend_operands(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some((kind, lhs, rhs, _, ty)) = binary_parts(rw, op) else {
        return Ok(false);
    };
    if matches!(kind, BinaryOp::Add | BinaryOp::Sub) {
        return Ok(false);
    }
    let (Some(wl), Some(wr)) = (rw.width(lhs), rw.width(rhs)) else {
        return Ok(false);
    };
    if wl == wr {
        return Ok(false);
    }
    let width = ty.bit_width().unwrap_or_default();
    let lhs = built(rw.pad_to(lhs, width), "extend-operands")?;
    let rhs = built(rw.pad_to(rhs, width), "extend-operands")?;
    rw.rebuild(op, OpKind::Binary(kind), vec![lhs, rhs])?;
    Ok(true)
}
