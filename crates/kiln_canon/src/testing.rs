//! Shared helpers for rule and engine tests.

use crate::{canonicalize, CanonStats};
use kiln_common::{ApInt, Interner};
use kiln_config::CanonicalizeConfig;
use kiln_ir::{evaluate, Circuit, Direction, Module, OpKind, Signal};

pub(crate) fn sequential() -> CanonicalizeConfig {
    CanonicalizeConfig {
        parallel: false,
        ..CanonicalizeConfig::default()
    }
}

pub(crate) fn count(module: &Module, pred: impl Fn(&OpKind) -> bool) -> usize {
    module.ops().filter(|(_, op)| pred(&op.kind)).count()
}

/// Canonicalizes a copy, checks it still verifies, and returns it.
pub(crate) fn canon(module: &Module, interner: &Interner) -> (Module, CanonStats) {
    let mut after = module.clone();
    let stats = canonicalize(&mut after, interner, &sequential()).unwrap();
    let circuit = Circuit::new(after.clone());
    kiln_ir::verify_circuit(&circuit, interner).unwrap();
    (after, stats)
}

/// Evaluates both modules on every input combination and compares outputs.
pub(crate) fn assert_equivalent(before: &Module, after: &Module) {
    let widths: Vec<u32> = before
        .ports
        .iter()
        .filter(|p| p.direction == Direction::Input)
        .map(|p| before.value_type(p.value).bit_width().unwrap())
        .collect();
    let total: u32 = widths.iter().sum();
    assert!(total <= 12, "too many input bits to enumerate");
    for bits in 0..(1u64 << total) {
        let mut offset = 0;
        let inputs: Vec<Signal> = widths
            .iter()
            .map(|&w| {
                let value = (bits >> offset) & ((1u64 << w) - 1);
                offset += w;
                Signal::Int(ApInt::from_u64(value, w))
            })
            .collect();
        assert_eq!(
            evaluate(before, &inputs).unwrap(),
            evaluate(after, &inputs).unwrap(),
            "outputs differ for inputs {bits:#x}"
        );
    }
}

/// Canonicalizes and checks exhaustive equivalence with the original.
pub(crate) fn canon_equivalent(module: &Module, interner: &Interner) -> (Module, CanonStats) {
    let (after, stats) = canon(module, interner);
    assert_equivalent(module, &after);
    (after, stats)
}
