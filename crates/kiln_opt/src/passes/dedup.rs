//! Structural deduplication of modules.
//!
//! Each module is reduced to a name-insensitive byte stream: its inline mode,
//! port directions and types, then every operation in creation order with its kind, operand
//! numbering and result types. Names, symbols and annotations are left out.
//! Equal XXH3 fingerprints are confirmed byte for byte before two modules are
//! merged. Modules are visited callees first, so once two children merge
//! their parents see the same callee name and can merge in turn.

use crate::error::{PipelineResult, W_DEDUP_PUBLIC, W_MODULE_SKIPPED};
use crate::pass::{Pass, PassContext, PassStats};
use kiln_common::{ApInt, ContentHash, Fingerprinter, Ident, InternalError};
use kiln_diagnostics::Diagnostic;
use kiln_ir::{
    verify_module, Access, Annotation, BinaryOp, CastKind, Circuit, CompareOp, ConnectKind,
    Direction, InlineMode, InnerRef, InstanceGraph, InstanceInfo, Module, ModuleId, OpId, OpKind,
    RegKind, ShiftAmount, ShiftDir, Type, ValueId, Width,
};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Merges modules that differ only in names and annotations.
#[derive(Debug, Default)]
pub struct Dedup;

/// Canonical byte encoding of a module's structure.
fn fingerprint(module: &Module) -> (ContentHash, Vec<u8>) {
    let mut fp = Fingerprinter::new();
    let mut numbering: HashMap<ValueId, u32> = HashMap::new();
    for port in &module.ports {
        numbering.insert(port.value, numbering.len() as u32);
    }
    for (_, op) in module.ops() {
        for &result in &op.results {
            numbering.insert(result, numbering.len() as u32);
        }
    }

    fp.tag(match module.inline {
        InlineMode::None => 0,
        InlineMode::Inline => 1,
        InlineMode::Flatten => 2,
    });
    fp.u32(module.ports.len() as u32);
    for port in &module.ports {
        fp.bool(port.direction == Direction::Input);
        hash_type(&mut fp, module.value_type(port.value));
    }
    fp.u32(module.num_ops() as u32);
    for (_, op) in module.ops() {
        hash_kind(&mut fp, &op.kind);
        fp.u32(op.operands.len() as u32);
        for operand in &op.operands {
            fp.u32(numbering.get(operand).copied().unwrap_or(u32::MAX));
        }
        fp.u32(op.results.len() as u32);
        for &result in &op.results {
            hash_type(&mut fp, module.value_type(result));
        }
    }
    fp.finish()
}

fn hash_type(fp: &mut Fingerprinter, ty: &Type) {
    match ty {
        Type::Int(int) => {
            fp.tag(0);
            fp.bool(int.signed);
            match int.width {
                Width::Known(w) => {
                    fp.tag(1);
                    fp.u32(w);
                }
                Width::Unknown => fp.tag(0),
            }
        }
        Type::Clock => fp.tag(1),
        Type::Reset => fp.tag(2),
        Type::AsyncReset => fp.tag(3),
        Type::Vector { element, len } => {
            fp.tag(4);
            fp.u32(*len);
            hash_type(fp, element);
        }
    }
}

fn hash_apint(fp: &mut Fingerprinter, value: &ApInt) {
    let width = value.width();
    fp.u32(width);
    for chunk in 0..width.div_ceil(64) {
        let mut word = 0u64;
        for bit in 0..64 {
            let index = chunk * 64 + bit;
            if index < width && value.bit(index) {
                word |= 1 << bit;
            }
        }
        fp.u64(word);
    }
}

fn hash_kind(fp: &mut Fingerprinter, kind: &OpKind) {
    match kind {
        OpKind::Constant(value) => {
            fp.tag(0);
            hash_apint(fp, value);
        }
        OpKind::SpecialConstant(value) => {
            fp.tag(1);
            fp.bool(*value);
        }
        OpKind::AggregateConstant(elements) => {
            fp.tag(2);
            fp.u32(elements.len() as u32);
            for element in elements {
                hash_apint(fp, element);
            }
        }
        OpKind::Invalid => fp.tag(3),
        OpKind::Binary(op) => {
            fp.tag(4);
            fp.tag(match op {
                BinaryOp::Add => 0,
                BinaryOp::Sub => 1,
                BinaryOp::And => 2,
                BinaryOp::Or => 3,
                BinaryOp::Xor => 4,
            });
        }
        OpKind::Compare(op) => {
            fp.tag(5);
            fp.tag(match op {
                CompareOp::Leq => 0,
                CompareOp::Lt => 1,
                CompareOp::Geq => 2,
                CompareOp::Gt => 3,
                CompareOp::Eq => 4,
                CompareOp::Neq => 5,
            });
        }
        OpKind::Neg => fp.tag(6),
        OpKind::Mux => fp.tag(7),
        OpKind::Bits { hi, lo } => {
            fp.tag(8);
            fp.u32(*hi);
            fp.u32(*lo);
        }
        OpKind::Concat => fp.tag(9),
        OpKind::Shift { dir, amount } => {
            fp.tag(10);
            fp.bool(*dir == ShiftDir::Left);
            match amount {
                ShiftAmount::Static(n) => {
                    fp.tag(0);
                    fp.u32(*n);
                }
                ShiftAmount::Dynamic => fp.tag(1),
            }
        }
        OpKind::Pad(n) => {
            fp.tag(11);
            fp.u32(*n);
        }
        OpKind::Cast(cast) => {
            fp.tag(12);
            fp.bool(*cast == CastKind::AsSInt);
        }
        OpKind::Access(access) => {
            fp.tag(13);
            match access {
                Access::Static(index) => {
                    fp.tag(0);
                    fp.u32(*index);
                }
                Access::Dynamic => fp.tag(1),
            }
        }
        OpKind::Wire => fp.tag(14),
        OpKind::Register(reg) => {
            fp.tag(15);
            match reg {
                RegKind::Plain => fp.tag(0),
                RegKind::Resettable { is_async } => {
                    fp.tag(1);
                    fp.bool(*is_async);
                }
            }
        }
        OpKind::Connect(connect) => {
            fp.tag(16);
            fp.bool(*connect == ConnectKind::Strict);
        }
        OpKind::Node => fp.tag(17),
        OpKind::Instance(info) => {
            fp.tag(18);
            fp.u32(info.module.as_raw());
        }
    }
}

fn union_annotations(into: &mut Vec<Annotation>, from: &[Annotation]) {
    for annotation in from {
        if !into.contains(annotation) {
            into.push(*annotation);
        }
    }
}

/// Folds `duplicate` into `survivor` and points every instance at the survivor.
///
/// Inner symbols of the duplicate are recorded as renames onto the matching
/// survivor entity. Returns the number of instance sites rewired.
fn merge(circuit: &mut Circuit, survivor: ModuleId, duplicate: ModuleId) -> PipelineResult<u64> {
    let dup = circuit
        .remove_module(duplicate)
        .ok_or_else(|| InternalError::new("merging away a module that cannot be removed"))?;

    let target = circuit.module_mut(survivor);
    let mut moved: Vec<(InnerRef, InnerRef)> = Vec::new();
    union_annotations(&mut target.annotations, &dup.annotations);
    for (port, other) in target.ports.iter_mut().zip(&dup.ports) {
        union_annotations(&mut port.annotations, &other.annotations);
        if let Some(sym) = other.sym {
            let kept = *port.sym.get_or_insert(sym);
            moved.push((InnerRef::new(dup.name, sym), InnerRef::new(target.name, kept)));
        }
    }
    let pairs: Vec<(OpId, OpId)> = target
        .op_ids()
        .into_iter()
        .zip(dup.op_ids())
        .collect();
    for (op, other) in pairs {
        let other = dup.op(other);
        let survivor_name = target.name;
        let op = target.op_mut(op);
        union_annotations(&mut op.annotations, &other.annotations);
        if let Some(sym) = other.sym {
            let kept = *op.sym.get_or_insert(sym);
            moved.push((InnerRef::new(dup.name, sym), InnerRef::new(survivor_name, kept)));
        }
    }

    // Name equivalence table from the duplicate's port names to the survivor's.
    let renames: HashMap<Ident, Ident> = dup
        .ports
        .iter()
        .zip(&target.ports)
        .map(|(from, to)| (from.name, to.name))
        .collect();
    let survivor_name = target.name;
    for (from, to) in moved {
        circuit.record_rename(from, to);
    }

    let mut rewired = 0;
    for caller in circuit.modules_mut() {
        let sites: Vec<(OpId, Vec<Ident>)> = caller
            .instances()
            .filter(|(_, info)| info.module == dup.name)
            .map(|(op, info)| (op, info.port_names.clone()))
            .collect();
        for (op, port_names) in sites {
            let port_names = port_names
                .into_iter()
                .map(|name| renames.get(&name).copied().unwrap_or(name))
                .collect();
            let types = caller
                .op(op)
                .results
                .iter()
                .map(|&r| caller.value_type(r).clone())
                .collect();
            caller.rebuild_op(
                op,
                OpKind::Instance(InstanceInfo {
                    module: survivor_name,
                    port_names,
                }),
                Vec::new(),
                types,
            )?;
            rewired += 1;
        }
    }
    Ok(rewired)
}

/// Emits a warning and returns `true` if the module fails verification.
fn skip_malformed(circuit: &Circuit, id: ModuleId, cx: &PassContext<'_>) -> bool {
    let interner = cx.interner;
    let Some(problem) = verify_module(circuit, id, interner).into_iter().next() else {
        return false;
    };
    let module = circuit.module(id);
    cx.sink.emit(
        Diagnostic::warning(
            W_MODULE_SKIPPED,
            format!(
                "dedup skipped malformed module `{}`",
                interner.resolve(module.name)
            ),
            module.loc,
        )
        .with_note(problem.to_string()),
    );
    true
}

impl Pass for Dedup {
    fn name(&self) -> &'static str {
        "dedup"
    }

    #[instrument(skip_all, name = "dedup")]
    fn run(
        &self,
        circuit: &mut Circuit,
        graph: &InstanceGraph,
        cx: &PassContext<'_>,
    ) -> PipelineResult<PassStats> {
        let mut stats = PassStats::new(self.name());
        let mut buckets: HashMap<ContentHash, Vec<(ModuleId, Vec<u8>)>> = HashMap::new();

        for id in graph.bottom_up() {
            let Some(module) = circuit.try_module(id) else {
                continue;
            };
            if module.external || module.has_annotation(Annotation::NoDedup) {
                continue;
            }
            if skip_malformed(circuit, id, cx) {
                continue;
            }
            let (hash, bytes) = fingerprint(module);
            let bucket = buckets.entry(hash).or_default();
            let Some(slot) = bucket.iter().position(|(_, b)| *b == bytes) else {
                bucket.push((id, bytes));
                continue;
            };

            let existing = bucket[slot].0;
            let (survivor, duplicate) = match (
                circuit.module(existing).is_public(),
                circuit.module(id).is_public(),
            ) {
                (true, true) => {
                    let (a, b) = (circuit.module(existing), circuit.module(id));
                    cx.sink.emit(
                        Diagnostic::warning(
                            W_DEDUP_PUBLIC,
                            format!(
                                "`{}` and `{}` are identical but both public",
                                cx.interner.resolve(a.name),
                                cx.interner.resolve(b.name)
                            ),
                            b.loc,
                        )
                        .with_label(a.loc, "identical to this module"),
                    );
                    continue;
                }
                (false, true) => (id, existing),
                _ => (existing, id),
            };
            bucket[slot].0 = survivor;
            debug!(
                survivor = cx.interner.resolve(circuit.module(survivor).name),
                duplicate = cx.interner.resolve(circuit.module(duplicate).name),
                "merging duplicate module"
            );
            let rewired = merge(circuit, survivor, duplicate)?;
            stats.bump("modules-merged", 1);
            stats.bump("instances-rewired", rewired);
        }
        Ok(stats)
    }
}
