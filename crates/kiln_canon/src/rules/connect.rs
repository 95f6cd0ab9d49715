use super::built;
use crate::rewriter::Rewriter;
use kiln_common::KilnResult;
use kiln_ir::{ConnectKind, OpId, OpKind};

/// A loose connect between equal types, or into a wider integer after
/// padding the source, becomes strict.
pub(crate) fn tighten_connect(rw: &mut Rewriter<'_>, op: OpId) -> KilnResult<bool> {
    let data = rw.op(op);
    if data.kind != OpKind::Connect(ConnectKind::Loose) {
        return Ok(false);
    }
    let (dest, src) = (data.operands[0], data.operands[1]);
    let (dest_ty, src_ty) = (rw.ty(dest), rw.ty(src));
    let src = if dest_ty == src_ty {
        if !dest_ty.has_known_width() {
            return Ok(false);
        }
        src
    } else {
        let (Some(d), Some(s)) = (dest_ty.as_int(), src_ty.as_int()) else {
            return Ok(false);
        };
        let (Some(dw), Some(sw)) = (d.width.known(), s.width.known()) else {
            return Ok(false);
        };
        if d.signed != s.signed || dw < sw {
            return Ok(false);
        }
        built(rw.pad_to(src, dw), "strict-connect")?
    };
    rw.rebuild(op, OpKind::Connect(ConnectKind::Strict), vec![dest, src])?;
    Ok(true)
}
