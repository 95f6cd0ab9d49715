use crate::rewriter::Rewriter;
use kiln_common::KilnResult;
use kiln_ir::{Access, OpId, OpKind, Type};

/// Dynamic access by a literal index becomes a static access, or an invalid
/// value when the index is out of bounds.
pub(crate) fn constant_index(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    if data.kind != OpKind::Access(Access::Dynamic) {
        return Ok(false);
    }
    let (vector, index) = (data.operands[0], data.operands[1]);
    let Some(result) = data.result() else {
        return Ok(false);
    };
    let Type::Vector { len, .. } = *rw.ty(vector) else {
        return Ok(false);
    };
    let Some(literal) = rw.constant(index) else {
        return Ok(false);
    };
    let replacement = match literal.to_u64() {
        Some(i) if i < u64::from(len) => {
            match rw.build(OpKind::Access(Access::Static(i as u32)), vec![vector]) {
                Some(value) => value,
                None => return Ok(false),
            }
        }
        _ => {
            let ty = rw.ty(result).clone();
            rw.build_invalid(ty)
        }
    };
    rw.replace(op, replacement)?;
    Ok(true)
}

/// Static access into an aggregate literal reads the element directly.
pub(crate) fn aggregate_element(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    if !rw.fold_constants() {
        return Ok(false);
    }
    let data = rw.op(op);
    let OpKind::Access(Access::Static(index)) = data.kind else {
        return Ok(false);
    };
    let Some(result) = data.result() else {
        return Ok(false);
    };
    let Some((_, OpKind::AggregateConstant(elements))) = rw.def(data.operands[0]) else {
        return Ok(false);
    };
    let Some(element) = elements.get(index as usize).cloned() else {
        return Ok(false);
    };
    let ty = rw.ty(result).clone();
    if ty.as_int().is_none() || ty.bit_width() != Some(element.width()) {
        return Ok(false);
    }
    let constant = rw.build_constant(ty, element);
    rw.replace(op, constant)?;
    Ok(true)
}
