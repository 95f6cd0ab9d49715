use super::built;
use crate::rewriter::Rewriter;
use kiln_common::KilnResult;
use kiln_ir::{OpId, OpKind, ShiftAmount, ShiftDir};

const MAX_STATIC_SHIFT: u32 = i32::MAX as u32;

/// Dynamic shift by a literal amount becomes a static shift padded back to
/// the dynamic result width.
pub(crate) fn dynamic_to_static(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    let OpKind::Shift {
        dir,
        amount: ShiftAmount::Dynamic,
    } = data.kind
    else {
        return Ok(false);
    };
    let (input, amount) = (data.operands[0], data.operands[1]);
    let Some(result) = data.result() else {
        return Ok(false);
    };
    let (Some(width), Some(input_width)) = (rw.width(result), rw.width(input)) else {
        return Ok(false);
    };
    let Some(literal) = rw.constant(amount) else {
        return Ok(false);
    };
    let n = literal
        .to_u64()
        .map_or(MAX_STATIC_SHIFT, |v| v.min(u64::from(MAX_STATIC_SHIFT)) as u32);
    if dir == ShiftDir::Left && input_width.checked_add(n).map_or(true, |w| w > width) {
        return Ok(false);
    }
    let shifted = rw.build(
        OpKind::Shift {
            dir,
            amount: ShiftAmount::Static(n),
        },
        vec![input],
    );
    let shifted = built(shifted, "dynamic-shift-by-constant")?;
    let padded = built(rw.pad_to(shifted, width), "dynamic-shift-by-constant")?;
    rw.replace(op, padded)?;
    Ok(true)
}
