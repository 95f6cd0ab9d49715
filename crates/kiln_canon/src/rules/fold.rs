//! Constant folding and removal of no-op extensions.

use crate::rewriter::Rewriter;
use kiln_common::{ApInt, KilnResult};
use kiln_ir::fold::fold_expr;
use kiln_ir::{OpId, OpKind, Type};

/// Folds an expression whose operands are all integer literals.
pub(crate) fn fold_constant_operands(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    if !rw.fold_constants() {
        return Ok(false);
    }
    let data = rw.op(op);
    if matches!(data.kind, OpKind::Node) || !data.kind.is_expression() {
        return Ok(false);
    }
    let Some(result) = data.result() else {
        return Ok(false);
    };
    let mut literals: Vec<(ApInt, Type)> = Vec::with_capacity(data.operands.len());
    for operand in &data.operands {
        let Some(value) = rw.constant(*operand) else {
            return Ok(false);
        };
        literals.push((value.clone(), rw.ty(*operand).clone()));
    }
    let ty = rw.ty(result).clone();
    let refs: Vec<(&ApInt, &Type)> = literals.iter().map(|(v, t)| (v, t)).collect();
    let Some(folded) = fold_expr(&data.kind, &refs, &ty) else {
        return Ok(false);
    };
    let constant = rw.build_constant(ty, folded);
    rw.replace(op, constant)?;
    Ok(true)
}

/// `pad`/`asUInt`/`asSInt` that leave the type unchanged, and `bits` that
/// select every bit of an unsigned value.
pub(crate) fn trivial_extension(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    let (Some(result), Some(&input)) = (data.result(), data.operands.first()) else {
        return Ok(false);
    };
    let input_ty = rw.ty(input);
    let same = match data.kind {
        OpKind::Pad(_) => input_ty.has_known_width() && input_ty == rw.ty(result),
        OpKind::Cast(_) => input_ty == rw.ty(result),
        OpKind::Bits { hi, lo } => {
            lo == 0
                && input_ty.as_int().is_some_and(|t| !t.signed)
                && input_ty.bit_width() == Some(hi + 1)
        }
        _ => false,
    };
    if !same {
        return Ok(false);
    }
    rw.replace(op, input)?;
    Ok(true)
}
