use crate::rewriter::Rewriter;
use kiln_common::KilnResult;
use kiln_ir::{OpId, OpKind};

/// `bits(bits(x, h1, l1), h2, l2)` selects `bits(x, h2 + l1, l2 + l1)`.
pub(crate) fn compose_bits(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    let OpKind::Bits { hi, lo } = data.kind else {
        return Ok(false);
    };
    let Some((inner, &OpKind::Bits { lo: inner_lo, .. })) = rw.def(data.operands[0]) else {
        return Ok(false);
    };
    let source = rw.op(inner).operands[0];
    if rw.width(source).is_none() {
        return Ok(false);
    }
    let Some(composed) = rw.build(
        OpKind::Bits {
            hi: hi + inner_lo,
            lo: lo + inner_lo,
        },
        vec![source],
    ) else {
        return Ok(false);
    };
    rw.replace(op, composed)?;
    Ok(true)
}
