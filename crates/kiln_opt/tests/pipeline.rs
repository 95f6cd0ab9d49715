//! End-to-end runs of the optimization pipeline.

use kiln_common::{ApInt, Interner};
use kiln_config::{PassToggles, PipelineConfig};
use kiln_diagnostics::DiagnosticSink;
use kiln_infer::error::E_WIDTH_CYCLE;
use kiln_infer::WidthInferenceError;
use kiln_ir::error::E_INSTANCE_CYCLE;
use kiln_ir::{
    evaluate, BinaryOp, Circuit, InlineMode, Module, ModuleBuilder, OpKind, Signal,
    StructuralError, Type, ValueId,
};
use kiln_opt::{Pipeline, PipelineError, PipelineStats};

fn optimize(pipeline: &Pipeline, circuit: &mut Circuit, interner: &Interner) -> PipelineStats {
    let sink = DiagnosticSink::new();
    let stats = pipeline.run(circuit, interner, &sink).unwrap();
    assert!(!sink.has_errors());
    stats
}

/// `o = x ^ y`, with port names chosen by the caller.
fn xor_module(interner: &Interner, name: &str, ports: [&str; 3]) -> Module {
    let mut b = ModuleBuilder::new(interner, name);
    let x = b.input(ports[0], Type::uint(4));
    let y = b.input(ports[1], Type::uint(4));
    let o = b.output(ports[2], Type::uint(4));
    let v = b.xor(x, y);
    b.connect(o, v);
    b.finish().unwrap()
}

/// Top instantiating `first` and `second` side by side.
fn pair(interner: &Interner, first: &Module, second: &Module) -> Module {
    let mut b = ModuleBuilder::new(interner, "Top");
    let i = b.input("i", Type::uint(4));
    let j = b.input("j", Type::uint(4));
    let o1 = b.output("o1", Type::uint(4));
    let o2 = b.output("o2", Type::uint(4));
    let u0 = b.instance("u0", first);
    b.connect(u0[0], i);
    b.connect(u0[1], j);
    b.connect(o1, u0[2]);
    let u1 = b.instance("u1", second);
    b.connect(u1[0], j);
    b.connect(u1[1], i);
    b.connect(o2, u1[2]);
    b.finish().unwrap()
}

fn renamed_pair(interner: &Interner) -> Circuit {
    let a = xor_module(interner, "A", ["x", "y", "o"]);
    let b = xor_module(interner, "B", ["p", "q", "r"]);
    let mut circuit = Circuit::new(pair(interner, &a, &b));
    circuit.add_module(a);
    circuit.add_module(b);
    circuit
}

fn driven_constant(module: &Module, value: ValueId) -> Option<u64> {
    let driver = *module.drivers(value).last()?;
    match module.defining_kind(module.op(driver).operands[1])? {
        OpKind::Constant(c) => c.to_u64(),
        _ => None,
    }
}

#[test]
fn duplicates_differing_in_names_are_merged() {
    let interner = Interner::new();
    let mut circuit = renamed_pair(&interner);

    let stats = optimize(&Pipeline::default(), &mut circuit, &interner);
    assert_eq!(stats.pass("dedup").unwrap().get("modules-merged"), 1);
    assert_eq!(circuit.len(), 2);
    let top = circuit.module(circuit.top());
    let callees: Vec<_> = top.instances().map(|(_, info)| info.module).collect();
    assert_eq!(callees.len(), 2);
    assert_eq!(callees[0], callees[1]);
}

#[test]
fn constants_cross_ports_and_the_callee_disappears() {
    let interner = Interner::new();
    let mut leaf = ModuleBuilder::new(&interner, "Leaf");
    let k = leaf.input("k", Type::uint(4));
    let o = leaf.output("o", Type::uint_unknown());
    let twice = leaf.add(k, k);
    leaf.connect(o, twice);
    let leaf = leaf.finish().unwrap();

    let mut top = ModuleBuilder::new(&interner, "Top");
    let out = top.output("out", Type::uint_unknown());
    let u = top.instance("u", &leaf);
    let three = top.uint(3, 4);
    top.connect(u[0], three);
    top.connect(out, u[1]);
    let mut circuit = Circuit::new(top.finish().unwrap());
    circuit.add_module(leaf);

    let stats = optimize(&Pipeline::default(), &mut circuit, &interner);
    assert!(stats.inferred.resolved > 0);
    assert!(stats.pass("const-prop").unwrap().get("values-folded") > 0);
    assert_eq!(stats.pass("liveness-dce").unwrap().get("modules-erased"), 1);
    assert_eq!(circuit.len(), 1);

    let top = circuit.module(circuit.top());
    assert_eq!(top.value_type(out), &Type::uint(5));
    assert_eq!(driven_constant(top, out), Some(6));
    assert_eq!(top.instances().count(), 0);
}

#[test]
fn uninstantiated_private_modules_are_deleted() {
    let interner = Interner::new();
    let mut circuit = renamed_pair(&interner);
    circuit.add_module(xor_module(&interner, "Orphan", ["a", "b", "c"]));

    let stats = optimize(&Pipeline::default(), &mut circuit, &interner);
    assert_eq!(stats.pass("liveness-dce").unwrap().get("modules-erased"), 1);
    assert!(circuit.lookup(interner.get_or_intern("Orphan")).is_none());
}

#[test]
fn inline_modules_end_up_in_their_caller() {
    let interner = Interner::new();
    let mut leaf = ModuleBuilder::new(&interner, "Leaf");
    let a = leaf.input("a", Type::uint(4));
    let o = leaf.output("o", Type::uint(4));
    let five = leaf.uint(5, 4);
    let x = leaf.xor(a, five);
    let n = leaf.node("n", x);
    leaf.connect(o, n);
    leaf.inline(InlineMode::Inline);
    let leaf = leaf.finish().unwrap();

    let mut top = ModuleBuilder::new(&interner, "Top");
    let i = top.input("i", Type::uint(4));
    let out = top.output("o", Type::uint(4));
    let u = top.instance("u", &leaf);
    top.connect(u[0], i);
    top.connect(out, u[1]);
    let mut circuit = Circuit::new(top.finish().unwrap());
    circuit.add_module(leaf);

    let stats = optimize(&Pipeline::default(), &mut circuit, &interner);
    assert_eq!(stats.pass("inline").unwrap().get("instances-inlined"), 1);
    assert_eq!(circuit.len(), 1);

    let top = circuit.module(circuit.top());
    for v in 0..16u64 {
        let outputs = evaluate(top, &[Signal::from(ApInt::from_u64(v, 4))]).unwrap();
        assert_eq!(outputs[0].as_int().and_then(ApInt::to_u64), Some(v ^ 5));
    }
}

#[test]
fn only_the_marked_twin_is_inlined() {
    let interner = Interner::new();
    let mut a = xor_module(&interner, "A", ["x", "y", "o"]);
    a.inline = InlineMode::Inline;
    let b = xor_module(&interner, "B", ["x", "y", "o"]);
    let mut circuit = Circuit::new(pair(&interner, &a, &b));
    circuit.add_module(a);
    circuit.add_module(b);

    let stats = optimize(&Pipeline::default(), &mut circuit, &interner);
    assert_eq!(stats.pass("dedup").unwrap().get("modules-merged"), 0);
    assert_eq!(stats.pass("inline").unwrap().get("instances-inlined"), 1);
    assert!(circuit.lookup(interner.get_or_intern("A")).is_none());

    let top = circuit.module(circuit.top());
    let callees: Vec<_> = top.instances().map(|(_, info)| info.module).collect();
    assert_eq!(callees, vec![interner.get_or_intern("B")]);
    assert!(top
        .ops()
        .any(|(_, op)| op.kind == OpKind::Binary(BinaryOp::Xor)));
}

#[test]
fn width_cycles_abort_the_pipeline() {
    let interner = Interner::new();
    let mut b = ModuleBuilder::new(&interner, "Top");
    let clk = b.input("clk", Type::Clock);
    let o = b.output("o", Type::uint_unknown());
    let r = b.reg("r", Type::uint_unknown(), clk);
    let one = b.uint(1, 1);
    let next = b.add(r, one);
    b.connect(r, next);
    b.connect(o, r);
    let mut circuit = Circuit::new(b.finish().unwrap());

    let sink = DiagnosticSink::new();
    let result = Pipeline::default().run(&mut circuit, &interner, &sink);
    assert!(matches!(
        result,
        Err(PipelineError::WidthInference(WidthInferenceError::Cycle { .. }))
    ));
    assert!(sink.contains_code(E_WIDTH_CYCLE));
}

#[test]
fn instance_cycles_abort_the_pipeline() {
    let interner = Interner::new();
    let shell = ModuleBuilder::new(&interner, "A").finish().unwrap();
    let mut b = ModuleBuilder::new(&interner, "B");
    b.instance("a", &shell);
    let b = b.finish().unwrap();
    let mut a = ModuleBuilder::new(&interner, "A");
    a.instance("b", &b);
    let a = a.finish().unwrap();
    let mut top = ModuleBuilder::new(&interner, "Top");
    top.instance("a", &a);
    let mut circuit = Circuit::new(top.finish().unwrap());
    circuit.add_module(a);
    circuit.add_module(b);

    let sink = DiagnosticSink::new();
    let result = Pipeline::default().run(&mut circuit, &interner, &sink);
    match result {
        Err(PipelineError::Structural(StructuralError::InstanceCycle { modules })) => {
            assert!(modules.contains(&"A".to_string()));
            assert!(modules.contains(&"B".to_string()));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(sink.contains_code(E_INSTANCE_CYCLE));
    assert_eq!(circuit.len(), 3);
}

#[test]
fn configuration_is_read_from_the_project_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kiln.toml"),
        "[canonicalize]\nparallel = false\n\n[passes]\ndedup = false\n",
    )
    .unwrap();
    let pipeline = Pipeline::from_dir(dir.path()).unwrap();
    assert!(!pipeline.config().canonicalize.parallel);
    assert!(!pipeline.pass_names().contains(&"dedup"));

    let interner = Interner::new();
    let mut circuit = renamed_pair(&interner);
    let stats = optimize(&pipeline, &mut circuit, &interner);
    assert!(stats.pass("dedup").is_none());
    assert_eq!(circuit.len(), 3);
}

#[test]
fn invalid_configuration_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kiln.toml"),
        "[canonicalize]\nmax_rewrites_per_op = 0\n",
    )
    .unwrap();
    assert!(matches!(
        Pipeline::from_dir(dir.path()),
        Err(PipelineError::Config(_))
    ));
}

#[test]
fn disabled_passes_still_canonicalize() {
    let config = PipelineConfig {
        passes: PassToggles {
            const_prop: false,
            liveness_dce: false,
            unused_ports: false,
            dedup: false,
            inline: false,
        },
        ..PipelineConfig::default()
    };
    let interner = Interner::new();
    let mut b = ModuleBuilder::new(&interner, "Top");
    let x = b.input("x", Type::uint(8));
    let o = b.output("o", Type::uint(9));
    let zero = b.uint(0, 8);
    let sum = b.add(x, zero);
    b.connect(o, sum);
    let mut circuit = Circuit::new(b.finish().unwrap());

    let stats = optimize(&Pipeline::new(config), &mut circuit, &interner);
    assert!(stats.passes.is_empty());
    assert!(stats.canonicalize.changed());
    let top = circuit.module(circuit.top());
    assert!(!top
        .ops()
        .any(|(_, op)| matches!(op.kind, OpKind::Binary(_))));
}
