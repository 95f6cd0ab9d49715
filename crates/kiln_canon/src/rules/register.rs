use super::built;
use crate::rewriter::Rewriter;
use kiln_common::KilnResult;
use kiln_ir::{OpId, OpKind, RegKind};

/// A register whose reset is a literal.
///
/// A reset tied low never fires, leaving a plain register. A reset tied high
/// holds the register at its reset value, so it becomes a node of that value
/// and its drivers are dropped.
pub(crate) fn constant_reset(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    let OpKind::Register(RegKind::Resettable { .. }) = data.kind else {
        return Ok(false);
    };
    let (clock, reset, init) = (data.operands[0], data.operands[1], data.operands[2]);
    let Some(reg) = data.result() else {
        return Ok(false);
    };
    let pinned = data.is_pinned();
    let asserted = match rw.def(reset) {
        Some((_, OpKind::Constant(value))) => !value.is_zero(),
        Some((_, OpKind::SpecialConstant(value))) => *value,
        _ => return Ok(false),
    };
    if !asserted {
        rw.rebuild(op, OpKind::Register(RegKind::Plain), vec![clock])?;
        return Ok(true);
    }
    if pinned || init == reg || rw.ty(init) != rw.ty(reg) {
        return Ok(false);
    }
    for driver in rw.module().drivers(reg) {
        rw.erase(driver)?;
    }
    let held = built(rw.build(OpKind::Node, vec![init]), "constant-reset")?;
    rw.replace(op, held)?;
    Ok(true)
}
