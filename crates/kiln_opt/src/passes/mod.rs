//! The global passes, in pipeline order.

mod const_prop;
mod dedup;
mod inline;
mod liveness;
mod unused_ports;

pub use const_prop::ConstProp;
pub use dedup::Dedup;
pub use inline::Inline;
pub use liveness::LivenessDce;
pub use unused_ports::UnusedPorts;

use kiln_common::KilnResult;
use kiln_ir::{Module, OpId};

/// Erases unpinned wires and registers that are only ever written, their
/// drivers, and every trivially dead operation, until nothing changes.
pub(crate) fn sweep_dead(module: &mut Module) -> KilnResult<usize> {
    let mut erased = 0;
    loop {
        let written_only: Vec<OpId> = module
            .ops()
            .filter(|(_, op)| op.kind.is_declaration() && !op.is_pinned())
            .filter(|(_, op)| op.result().is_some_and(|r| module.only_written(r)))
            .map(|(id, _)| id)
            .collect();
        for &op in &written_only {
            let result = module.result(op)?;
            for driver in module.drivers(result) {
                module.erase_op(driver)?;
                erased += 1;
            }
            module.erase_op(op)?;
            erased += 1;
        }
        let trivially_dead = module.erase_trivially_dead()?;
        erased += trivially_dead;
        if written_only.is_empty() && trivially_dead == 0 {
            return Ok(erased);
        }
    }
}
