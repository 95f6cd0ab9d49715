//! The rule registry.
//!
//! Each operation kind maps to an ordered table of rules; the engine applies
//! the first one that matches. Every rule either strictly shrinks the
//! operation graph, moves an operation toward a fixed canonical form that
//! the same rule cannot match again, or replaces the root with operations of
//! a kind its rule table never revisits.

mod access;
mod binary;
mod bits;
mod connect;
mod fold;
mod mux;
mod register;
mod shift;

use crate::rewriter::Rewriter;
use kiln_common::{InternalError, KilnResult};
use kiln_ir::{Access, BinaryOp, OpId, OpKind, ShiftAmount, ValueId};

/// Signature shared by all rules: returns `true` if the rule rewrote `op`.
pub(crate) type Apply = fn(&mut Rewriter<'_>, OpId) -> KilnResult<bool>;

/// A named rewrite rule.
pub(crate) struct Rule {
    /// Stable name used in statistics and errors.
    pub name: &'static str,
    /// The matcher and replacement builder.
    pub apply: Apply,
    /// The rule removes the root, so it must not fire on pinned operations.
    pub replaces: bool,
}

const fn rule(name: &'static str, apply: Apply) -> Rule {
    Rule {
        name,
        apply,
        replaces: true,
    }
}

const fn rebuilding(name: &'static str, apply: Apply) -> Rule {
    Rule {
        name,
        apply,
        replaces: false,
    }
}

const FOLD: Rule = rule("fold-constants", fold::fold_constant_operands);
const SINK: Rule = rebuilding("sink-constant", binary::sink_constant);

static ADD_SUB: [Rule; 3] = [FOLD, SINK, rule("arith-identity", binary::arith_identity)];
static BITWISE: [Rule; 4] = [
    FOLD,
    SINK,
    rule("bitwise-identity", binary::bitwise_identity),
    rebuilding("extend-operands", binary::extend_operands),
];
static COMPARE: [Rule; 2] = [FOLD, SINK];
static FOLD_ONLY: [Rule; 1] = [FOLD];
static EXTENSION: [Rule; 2] = [FOLD, rule("trivial-extension", fold::trivial_extension)];
static BITS: [Rule; 3] = [
    FOLD,
    rule("trivial-extension", fold::trivial_extension),
    rule("compose-bits", bits::compose_bits),
];
static DYNAMIC_SHIFT: [Rule; 2] = [FOLD, rule("dynamic-shift-by-constant", shift::dynamic_to_static)];
static MUX: [Rule; 6] = [
    FOLD,
    rule("mux-constant-select", mux::constant_select),
    rule("mux-same-branches", mux::same_branches),
    rule("mux-nested-same-select", mux::nested_same_select),
    rule("mux-shared-branch", mux::shared_branch),
    rule("mux-factor-concat", mux::factor_concat),
];
static DYNAMIC_ACCESS: [Rule; 1] = [rule("constant-index", access::constant_index)];
static STATIC_ACCESS: [Rule; 1] = [rule("aggregate-element", access::aggregate_element)];
static REGISTER: [Rule; 1] = [rebuilding("constant-reset", register::constant_reset)];
static CONNECT: [Rule; 1] = [rebuilding("strict-connect", connect::tighten_connect)];
static NONE: [Rule; 0] = [];

/// The rules tried, in order, for an operation of this kind.
pub(crate) fn rules_for(kind: &OpKind) -> &'static [Rule] {
    match kind {
        OpKind::Binary(BinaryOp::Add | BinaryOp::Sub) => &ADD_SUB,
        OpKind::Binary(BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) => &BITWISE,
        OpKind::Compare(_) => &COMPARE,
        OpKind::Neg | OpKind::Concat => &FOLD_ONLY,
        OpKind::Shift {
            amount: ShiftAmount::Static(_),
            ..
        } => &FOLD_ONLY,
        OpKind::Shift {
            amount: ShiftAmount::Dynamic,
            ..
        } => &DYNAMIC_SHIFT,
        OpKind::Pad(_) | OpKind::Cast(_) => &EXTENSION,
        OpKind::Bits { .. } => &BITS,
        OpKind::Mux => &MUX,
        OpKind::Access(Access::Dynamic) => &DYNAMIC_ACCESS,
        OpKind::Access(Access::Static(_)) => &STATIC_ACCESS,
        OpKind::Register(_) => &REGISTER,
        OpKind::Connect(_) => &CONNECT,
        OpKind::Constant(_)
        | OpKind::SpecialConstant(_)
        | OpKind::AggregateConstant(_)
        | OpKind::Invalid
        | OpKind::Wire
        | OpKind::Node
        | OpKind::Instance(_) => &NONE,
    }
}

/// Unwraps a replacement value whose construction was already checked.
pub(crate) fn built(value: Option<ValueId>, rule: &str) -> KilnResult<ValueId> {
    value.ok_or_else(|| InternalError::new(format!("rule `{rule}` built an ill-typed replacement")))
}

#[cfg(test)]
mod tests {
    use crate::testing::{canon, canon_equivalent, count};
    use kiln_common::{ApInt, Interner};
    use kiln_ir::{
        evaluate, Access, BinaryOp, CastKind, CompareOp, ConnectKind, Module, ModuleBuilder,
        OpKind, RegKind, Signal, Type, ValueId,
    };

    /// The value connected into `dest`, seen through any nodes.
    fn driven_value(module: &Module, dest: ValueId) -> ValueId {
        let connect = *module.drivers(dest).last().unwrap();
        let mut value = module.op(connect).operands[1];
        while let Some(OpKind::Node) = module.defining_kind(value) {
            value = module.op(module.defining_op(value).unwrap()).operands[0];
        }
        value
    }

    #[test]
    fn add_zero_pads_to_result_width() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::uint(8));
        let out = b.output("out", Type::uint(9));
        let zero = b.uint(0, 4);
        let sum = b.add(x, zero);
        b.connect(out, sum);
        let m = b.finish().unwrap();

        let (after, stats) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Binary(_))), 0);
        assert_eq!(count(&after, |k| *k == OpKind::Pad(9)), 1);
        assert_eq!(stats.by_rule["arith-identity"], 1);
    }

    #[test]
    fn add_self_becomes_shift() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(4));
        let out = b.output("out", Type::sint(5));
        let sum = b.add(x, x);
        b.connect(out, sum);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| k.mnemonic() == "shl"), 1);
    }

    #[test]
    fn and_self_on_signed_reinterprets_as_unsigned() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(4));
        let out = b.output("out", Type::uint(4));
        let both = b.and(x, x);
        b.connect(out, both);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Binary(_))), 0);
        assert_eq!(count(&after, |k| *k == OpKind::Cast(CastKind::AsUInt)), 1);
    }

    #[test]
    fn bitwise_identities_preserve_behaviour() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(3));
        let outs: Vec<_> = (0..5)
            .map(|i| b.output(&format!("o{i}"), Type::uint(5)))
            .collect();
        let ones = b.sint(-1, 2);
        let zero = b.sint(0, 5);
        let exprs = [
            b.and(x, ones),
            b.or(x, ones),
            b.or(x, x),
            b.xor(x, x),
            b.xor(zero, x),
        ];
        for (out, expr) in outs.iter().zip(exprs) {
            b.connect(*out, expr);
        }
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Binary(_))), 0);
    }

    #[test]
    fn zero_minus_x_negates() {
        let interner = Interner::new();
        for signed in [false, true] {
            let mut b = ModuleBuilder::new(&interner, "M");
            let ty = if signed { Type::sint(4) } else { Type::uint(4) };
            let x = b.input("x", ty.clone());
            let out = b.output("out", ty.with_width(6));
            let zero = b.constant(ty.with_width(2), ApInt::zero(2));
            let diff = b.sub(zero, x);
            b.connect(out, diff);
            let m = b.finish().unwrap();

            let (after, _) = canon_equivalent(&m, &interner);
            assert_eq!(count(&after, |k| *k == OpKind::Neg), 1);
        }
    }

    #[test]
    fn bitwise_operands_are_padded_to_a_common_width() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(4));
        let y = b.input("y", Type::sint(2));
        let out = b.output("out", Type::uint(4));
        let anded = b.and(x, y);
        b.connect(out, anded);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        let (_, and) = after
            .ops()
            .find(|(_, op)| matches!(op.kind, OpKind::Binary(_)))
            .unwrap();
        assert_eq!(after.value_type(and.operands[1]), &Type::sint(4));
    }

    #[test]
    fn constant_moves_to_the_right_of_comparisons() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::uint(4));
        let out = b.output("out", Type::uint(1));
        let five = b.uint(5, 4);
        let lt = b.cmp(CompareOp::Lt, five, x);
        b.connect(out, lt);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        let (_, cmp) = after
            .ops()
            .find(|(_, op)| matches!(op.kind, OpKind::Compare(_)))
            .unwrap();
        assert_eq!(cmp.kind, OpKind::Compare(CompareOp::Gt));
        assert_eq!(cmp.operands[0], x);

        let (_, again) = canon(&after, &interner);
        assert!(!again.changed());
    }

    #[test]
    fn folds_all_constant_expressions() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let out = b.output("out", Type::uint(5));
        let a = b.uint(9, 4);
        let c = b.uint(12, 4);
        let sum = b.add(a, c);
        b.connect(out, sum);
        let m = b.finish().unwrap();

        let (after, _) = canon(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Binary(_))), 0);
        assert_eq!(
            evaluate(&after, &[]).unwrap(),
            vec![Signal::Int(ApInt::from_u64(21, 5))]
        );
    }

    #[test]
    fn composes_nested_bit_extraction() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::uint(8));
        let out = b.output("out", Type::uint(3));
        let high = b.bits(x, 7, 4);
        let low = b.bits(high, 2, 0);
        b.connect(out, low);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        let kinds: Vec<_> = after
            .ops()
            .filter(|(_, op)| matches!(op.kind, OpKind::Bits { .. }))
            .map(|(_, op)| op.kind.clone())
            .collect();
        assert_eq!(kinds, vec![OpKind::Bits { hi: 6, lo: 4 }]);
    }

    #[test]
    fn nested_mux_on_same_select_collapses() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let c = b.input("c", Type::uint(1));
        let y = b.input("y", Type::uint(3));
        let z = b.input("z", Type::uint(3));
        let x = b.input("x", Type::uint(2));
        let out = b.output("out", Type::uint(3));
        let inner = b.mux(c, y, z);
        let outer = b.mux(c, inner, x);
        b.connect(out, outer);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        let muxes: Vec<_> = after
            .ops()
            .filter(|(_, op)| op.kind == OpKind::Mux)
            .map(|(_, op)| op.operands.clone())
            .collect();
        assert_eq!(muxes, vec![vec![c, y, x]]);
    }

    #[test]
    fn mux_chains_sharing_a_branch_merge_selects() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let s1 = b.input("s1", Type::uint(1));
        let s2 = b.input("s2", Type::uint(1));
        let x = b.input("x", Type::uint(3));
        let y = b.input("y", Type::uint(3));
        let hi = b.output("hi", Type::uint(3));
        let lo = b.output("lo", Type::uint(3));
        let inner_hi = b.mux(s2, x, y);
        let shared_high = b.mux(s1, x, inner_hi);
        b.connect(hi, shared_high);
        let inner_lo = b.mux(s2, x, y);
        let shared_low = b.mux(s1, inner_lo, y);
        b.connect(lo, shared_low);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| *k == OpKind::Mux), 2);
    }

    #[test]
    fn mux_of_concats_with_shared_part_factors() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let c = b.input("c", Type::uint(1));
        let p = b.input("p", Type::uint(2));
        let q = b.input("q", Type::uint(2));
        let x = b.input("x", Type::uint(3));
        let out = b.output("out", Type::uint(5));
        let px = b.cat(p, x);
        let qx = b.cat(q, x);
        let sel = b.mux(c, px, qx);
        b.connect(out, sel);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| *k == OpKind::Concat), 1);
        let (_, mux) = after.ops().find(|(_, op)| op.kind == OpKind::Mux).unwrap();
        assert_eq!(mux.operands, vec![c, p, q]);
    }

    #[test]
    fn constant_select_picks_a_padded_branch() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(2));
        let y = b.input("y", Type::sint(4));
        let out = b.output("out", Type::sint(4));
        let one = b.uint(1, 1);
        let sel = b.mux(one, x, y);
        b.connect(out, sel);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| *k == OpKind::Mux), 0);
        assert_eq!(count(&after, |k| *k == OpKind::Pad(4)), 1);
    }

    #[test]
    fn dynamic_shifts_by_constants_become_static() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(4));
        let left = b.output("left", Type::sint(7));
        let right = b.output("right", Type::sint(4));
        let two = b.uint(2, 2);
        let six = b.uint(6, 3);
        let l = b.dshl(x, two);
        let r = b.dshr(x, six);
        b.connect(left, l);
        b.connect(right, r);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        let dynamic = after
            .ops()
            .filter(|(_, op)| matches!(op.kind.mnemonic(), "dshl" | "dshr"))
            .count();
        assert_eq!(dynamic, 0);
    }

    #[test]
    fn constant_index_reads_the_element_or_invalid() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let inside = b.output("inside", Type::uint(4));
        let outside = b.output("outside", Type::uint(4));
        let table = b.aggregate(
            Type::vector(Type::uint(4), 3),
            vec![ApInt::from_u64(7, 4), ApInt::from_u64(8, 4), ApInt::from_u64(9, 4)],
        );
        let one = b.uint(1, 2);
        let three = b.uint(3, 2);
        let a = b.subaccess(table, one);
        let c = b.subaccess(table, three);
        b.connect(inside, a);
        b.connect(outside, c);
        let m = b.finish().unwrap();

        assert_eq!(
            m.defining_kind(driven_value(&m, outside)),
            Some(&OpKind::Access(Access::Dynamic))
        );
        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Access(_))), 0);
        assert_eq!(count(&after, |k| *k == OpKind::Invalid), 1);
        assert_eq!(
            after.defining_kind(driven_value(&after, outside)),
            Some(&OpKind::Invalid)
        );
        assert_eq!(
            evaluate(&after, &[]).unwrap(),
            vec![
                Signal::Int(ApInt::from_u64(8, 4)),
                Signal::Int(ApInt::zero(4))
            ]
        );
    }

    #[test]
    fn register_with_reset_tied_low_drops_the_reset() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let clk = b.input("clk", Type::Clock);
        let d = b.input("d", Type::uint(4));
        let out = b.output("out", Type::uint(4));
        let never = b.uint(0, 1);
        let init = b.uint(5, 4);
        let r = b.reg_reset("r", Type::uint(4), clk, never, init, false);
        b.connect(r, d);
        b.connect(out, r);
        let m = b.finish().unwrap();

        let (after, _) = canon(&m, &interner);
        let (_, reg) = after
            .ops()
            .find(|(_, op)| matches!(op.kind, OpKind::Register(_)))
            .unwrap();
        assert_eq!(reg.kind, OpKind::Register(RegKind::Plain));
        assert_eq!(reg.operands, vec![clk]);
        assert_eq!(reg.name, interner.get("r"));
        assert_eq!(count(&after, |k| k.is_constant()), 0);
    }

    #[test]
    fn register_with_reset_tied_high_holds_its_reset_value() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let clk = b.input("clk", Type::Clock);
        let d = b.input("d", Type::uint(4));
        let out = b.output("out", Type::uint(4));
        let always = b.uint(1, 1);
        let init = b.uint(5, 4);
        let r = b.reg_reset("r", Type::uint(4), clk, always, init, true);
        b.connect(r, d);
        b.connect(out, r);
        let m = b.finish().unwrap();

        let (after, _) = canon(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Register(_))), 0);
        let (_, node) = after.ops().find(|(_, op)| op.kind == OpKind::Node).unwrap();
        assert_eq!(node.name, interner.get("r"));

        // `out` reads the register before and its reset value after.
        let reset_value = OpKind::Constant(ApInt::from_u64(5, 4));
        let reg = m.defining_op(driven_value(&m, out)).unwrap();
        assert!(matches!(
            m.op(reg).kind,
            OpKind::Register(RegKind::Resettable { .. })
        ));
        assert_eq!(m.defining_kind(m.op(reg).operands[2]), Some(&reset_value));
        assert_eq!(
            after.defining_kind(driven_value(&after, out)),
            Some(&reset_value)
        );
        assert!(after.users(d).is_empty());
        for d in 0..16 {
            let outs = evaluate(
                &after,
                &[ApInt::zero(1).into(), ApInt::from_u64(d, 4).into()],
            )
            .unwrap();
            assert_eq!(outs, vec![Signal::Int(ApInt::from_u64(5, 4))]);
        }
    }

    #[test]
    fn forwarded_values_take_over_the_name_hint() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::uint(4));
        let y = b.input("y", Type::uint(4));
        let out = b.output("out", Type::uint(4));
        let t = b.xor(x, y);
        let both = b.and(t, t);
        b.name(both, "masked");
        b.connect(out, both);
        let m = b.finish().unwrap();
        assert_eq!(m.op(m.defining_op(t).unwrap()).name, None);

        let (after, _) = canon_equivalent(&m, &interner);
        let (_, xor) = after
            .ops()
            .find(|(_, op)| op.kind == OpKind::Binary(BinaryOp::Xor))
            .unwrap();
        assert_eq!(xor.name, interner.get("masked"));
        assert_eq!(count(&after, |k| matches!(k, OpKind::Binary(_))), 1);
    }

    #[test]
    fn loose_connects_become_strict() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::sint(2));
        let y = b.input("y", Type::uint(3));
        let wide = b.output("wide", Type::sint(5));
        let same = b.output("same", Type::uint(3));
        b.connect(wide, x);
        b.connect(same, y);
        let m = b.finish().unwrap();

        let (after, _) = canon_equivalent(&m, &interner);
        assert_eq!(
            count(&after, |k| *k == OpKind::Connect(ConnectKind::Strict)),
            2
        );
        assert_eq!(count(&after, |k| *k == OpKind::Pad(5)), 1);
    }

    #[test]
    fn pinned_operations_are_not_replaced() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let x = b.input("x", Type::uint(4));
        let out = b.output("out", Type::uint(5));
        let zero = b.uint(0, 4);
        let sum = b.add(x, zero);
        b.dont_touch(sum);
        b.connect(out, sum);
        let m = b.finish().unwrap();

        let (after, stats) = canon_equivalent(&m, &interner);
        assert_eq!(count(&after, |k| matches!(k, OpKind::Binary(_))), 1);
        assert!(!stats.by_rule.contains_key("arith-identity"));
    }

    #[test]
    fn folding_can_be_disabled() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let out = b.output("out", Type::uint(4));
        let a = b.uint(9, 4);
        let c = b.uint(12, 4);
        let both = b.xor(a, c);
        b.connect(out, both);
        let mut m = b.finish().unwrap();

        let config = kiln_config::CanonicalizeConfig {
            fold_constants: false,
            parallel: false,
            ..Default::default()
        };
        let stats = crate::canonicalize(&mut m, &interner, &config).unwrap();
        assert!(!stats.by_rule.contains_key("fold-constants"));
        assert_eq!(count(&m, |k| matches!(k, OpKind::Binary(_))), 1);
    }
}
