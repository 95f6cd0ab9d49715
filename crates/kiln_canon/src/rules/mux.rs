//! Multiplexer simplification.
//!
//! Replacements that may be narrower than the original mux are padded back
//! to its result width.

use super::built;
use crate::rewriter::Rewriter;
use kiln_common::KilnResult;
use kiln_ir::{BinaryOp, OpId, OpKind, Type, ValueId};

struct MuxParts {
    sel: ValueId,
    high: ValueId,
    low: ValueId,
    ty: Type,
}

fn mux_parts(rw: &Rewriter<'_>, op: OpId) -> Option<MuxParts> {
    let data = rw.op(op);
    if data.kind != OpKind::Mux {
        return None;
    }
    let result = data.result()?;
    Some(MuxParts {
        sel: data.operands[0],
        high: data.operands[1],
        low: data.operands[2],
        ty: rw.ty(result).clone(),
    })
}

/// The operands of `value` if it is defined by a mux with exactly one use.
fn inner_mux(rw: &Rewriter<'_>, value: ValueId) -> Option<(ValueId, ValueId, ValueId)> {
    let (op, kind) = rw.def(value)?;
    if *kind != OpKind::Mux || rw.module().uses(value).len() != 1 || rw.op(op).is_pinned() {
        return None;
    }
    let operands = &rw.op(op).operands;
    Some((operands[0], operands[1], operands[2]))
}

/// Replaces `op` with `value`, padding integers up to `ty`.
fn replace_padded(rw: &mut Rewriter<'_>, op: OpId, value: ValueId, ty: &Type, rule: &str) -> KilnResult<bool> {
    if rw.ty(value) == ty {
        rw.replace(op, value)?;
        return Ok(true);
    }
    let (Some(from), Some(width)) = (rw.ty(value).as_int(), ty.bit_width()) else {
        return Ok(false);
    };
    if from.signed != ty.is_signed() || rw.width(value).map_or(true, |w| w > width) {
        return Ok(false);
    }
    let padded = built(rw.pad_to(value, width), rule)?;
    rw.replace(op, padded)?;
    Ok(true)
}

/// A literal select chooses its branch.
pub(crate) fn constant_select(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some(mux) = mux_parts(rw, op) else {
        return Ok(false);
    };
    let Some(sel) = rw.constant(mux.sel) else {
        return Ok(false);
    };
    let branch = if sel.bit(0) { mux.high } else { mux.low };
    replace_padded(rw, op, branch, &mux.ty, "mux-constant-select")
}

/// `mux(c, x, x)` is `x`.
pub(crate) fn same_branches(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some(mux) = mux_parts(rw, op) else {
        return Ok(false);
    };
    if mux.high != mux.low {
        return Ok(false);
    }
    replace_padded(rw, op, mux.high, &mux.ty, "mux-same-branches")
}

/// `mux(c, mux(c, x, y), z)` is `mux(c, x, z)`, and symmetrically for the
/// low branch.
pub(crate) fn nested_same_select(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some(mux) = mux_parts(rw, op) else {
        return Ok(false);
    };
    if !mux.ty.has_known_width() {
        return Ok(false);
    }
    let (high, low) = match (inner_mux(rw, mux.high), inner_mux(rw, mux.low)) {
        (Some((sel, x, _)), _) if sel == mux.sel => (x, mux.low),
        (_, Some((sel, _, z))) if sel == mux.sel => (mux.high, z),
        _ => return Ok(false),
    };
    let Some(simplified) = rw.build(OpKind::Mux, vec![mux.sel, high, low]) else {
        return Ok(false);
    };
    replace_padded(rw, op, simplified, &mux.ty, "mux-nested-same-select")
}

fn is_single_bit(rw: &Rewriter<'_>, value: ValueId) -> bool {
    *rw.ty(value) == Type::uint(1)
}

/// `mux(a, x, mux(b, x, y))` is `mux(a | b, x, y)`;
/// `mux(a, mux(b, x, y), y)` is `mux(a & b, x, y)`.
pub(crate) fn shared_branch(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some(mux) = mux_parts(rw, op) else {
        return Ok(false);
    };
    if !mux.ty.has_known_width() || !is_single_bit(rw, mux.sel) {
        return Ok(false);
    }
    let (combine, inner_sel, x, y) = match (inner_mux(rw, mux.high), inner_mux(rw, mux.low)) {
        (_, Some((sel, x, y))) if x == mux.high => (BinaryOp::Or, sel, x, y),
        (Some((sel, x, y)), _) if y == mux.low => (BinaryOp::And, sel, x, y),
        _ => return Ok(false),
    };
    if !is_single_bit(rw, inner_sel) || *rw.ty(x) != mux.ty || *rw.ty(y) != mux.ty {
        return Ok(false);
    }
    let sel = built(
        rw.build(OpKind::Binary(combine), vec![mux.sel, inner_sel]),
        "mux-shared-branch",
    )?;
    let merged = built(rw.build(OpKind::Mux, vec![sel, x, y]), "mux-shared-branch")?;
    rw.replace(op, merged)?;
    Ok(true)
}

fn concat_operands(rw: &Rewriter<'_>, value: ValueId) -> Option<(ValueId, ValueId)> {
    let (op, kind) = rw.def(value)?;
    if *kind != OpKind::Concat || rw.module().uses(value).len() != 1 {
        return None;
    }
    let operands = &rw.op(op).operands;
    Some((operands[0], operands[1]))
}

/// `mux(c, cat(a, x), cat(b, x))` is `cat(mux(c, a, b), x)`, and likewise
/// for a shared high part.
pub(crate) fn factor_concat(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let Some(mux) = mux_parts(rw, op) else {
        return Ok(false);
    };
    if !mux.ty.has_known_width() || rw.ty(mux.high) != rw.ty(mux.low) {
        return Ok(false);
    }
    let (Some((a_hi, a_lo)), Some((b_hi, b_lo))) =
        (concat_operands(rw, mux.high), concat_operands(rw, mux.low))
    else {
        return Ok(false);
    };
    let shared_low = a_lo == b_lo && rw.ty(a_hi) == rw.ty(b_hi);
    let shared_high = a_hi == b_hi && rw.ty(a_lo) == rw.ty(b_lo);
    let (high, low) = if shared_low {
        let selected = built(rw.build(OpKind::Mux, vec![mux.sel, a_hi, b_hi]), "mux-factor-concat")?;
        (selected, a_lo)
    } else if shared_high {
        let selected = built(rw.build(OpKind::Mux, vec![mux.sel, a_lo, b_lo]), "mux-factor-concat")?;
        (a_hi, selected)
    } else {
        return Ok(false);
    };
    let factored = built(rw.build(OpKind::Concat, vec![high, low]), "mux-factor-concat")?;
    rw.replace(op, factored)?;
    Ok(true)
}
