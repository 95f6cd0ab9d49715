//! Convenience construction of modules.
//!
//! Expression result types are derived from operand types. Ill-typed
//! constructions are recorded and reported by [`ModuleBuilder::finish`].

use crate::error::StructuralError;
use crate::ids::ValueId;
use crate::module::{Direction, InlineMode, Module, Visibility};
use crate::op::{
    Access, Annotation, BinaryOp, CastKind, CompareOp, ConnectKind, InstanceInfo, OpKind, RegKind,
    ShiftAmount, ShiftDir,
};
use crate::types::{expr_result_type, Type, Width};
use kiln_common::{ApInt, Interner};

/// Builds a [`Module`] one operation at a time.
pub struct ModuleBuilder<'a> {
    interner: &'a Interner,
    module: Module,
    errors: Vec<String>,
}

impl<'a> ModuleBuilder<'a> {
    /// Starts a private module named `name`.
    pub fn new(interner: &'a Interner, name: &str) -> Self {
        Self {
            interner,
            module: Module::new(interner.get_or_intern(name)),
            errors: Vec::new(),
        }
    }

    /// Marks the module public.
    pub fn public(&mut self) -> &mut Self {
        self.module.visibility = Visibility::Public;
        self
    }

    /// Marks the module external.
    pub fn external(&mut self) -> &mut Self {
        self.module.external = true;
        self
    }

    /// Sets the inline mode.
    pub fn inline(&mut self, mode: InlineMode) -> &mut Self {
        self.module.inline = mode;
        self
    }

    /// Adds a module annotation.
    pub fn annotate(&mut self, annotation: Annotation) -> &mut Self {
        self.module.annotations.push(annotation);
        self
    }

    /// Adds an input port.
    pub fn input(&mut self, name: &str, ty: Type) -> ValueId {
        let name = self.interner.get_or_intern(name);
        self.module.add_port(name, Direction::Input, ty)
    }

    /// Adds an output port.
    pub fn output(&mut self, name: &str, ty: Type) -> ValueId {
        let name = self.interner.get_or_intern(name);
        self.module.add_port(name, Direction::Output, ty)
    }

    fn single(&mut self, kind: OpKind, operands: Vec<ValueId>, ty: Type) -> ValueId {
        let op = self.module.add_op(kind, operands, vec![ty]);
        self.module.op(op).results[0]
    }

    /// Adds an expression, deriving its result type.
    pub fn expr(&mut self, kind: OpKind, operands: Vec<ValueId>) -> ValueId {
        let types: Vec<&Type> = operands.iter().map(|v| self.module.value_type(*v)).collect();
        let ty = match expr_result_type(&kind, &types) {
            Ok(ty) => ty,
            Err(detail) => {
                self.errors.push(format!("{}: {detail}", kind.mnemonic()));
                Type::uint_unknown()
            }
        };
        self.single(kind, operands, ty)
    }

    /// An integer constant of type `ty`. Known widths resize the literal.
    pub fn constant(&mut self, ty: Type, value: ApInt) -> ValueId {
        let value = match ty.bit_width() {
            Some(w) => value.resize(w, ty.is_signed()),
            None => value,
        };
        self.single(OpKind::Constant(value), Vec::new(), ty)
    }

    /// `UInt<width>(value)`.
    pub fn uint(&mut self, value: u64, width: u32) -> ValueId {
        self.constant(Type::uint(width), ApInt::from_u64(value, width))
    }

    /// `SInt<width>(value)`.
    pub fn sint(&mut self, value: i64, width: u32) -> ValueId {
        self.constant(Type::sint(width), ApInt::from_i64(value, width))
    }

    /// An unsigned literal whose width is left to inference.
    pub fn uint_unsized(&mut self, value: u64) -> ValueId {
        let wide = ApInt::from_u64(value, 64);
        let literal = wide.resize(wide.min_unsigned_width(), false);
        self.constant(Type::int(false, Width::Unknown), literal)
    }

    /// A signed literal whose width is left to inference.
    pub fn sint_unsized(&mut self, value: i64) -> ValueId {
        let wide = ApInt::from_i64(value, 64);
        let literal = wide.resize(wide.min_signed_width(), true);
        self.constant(Type::int(true, Width::Unknown), literal)
    }

    /// A clock or reset literal.
    pub fn special(&mut self, ty: Type, value: bool) -> ValueId {
        self.single(OpKind::SpecialConstant(value), Vec::new(), ty)
    }

    /// A vector literal.
    pub fn aggregate(&mut self, ty: Type, elements: Vec<ApInt>) -> ValueId {
        self.single(OpKind::AggregateConstant(elements), Vec::new(), ty)
    }

    /// An invalid value of type `ty`.
    pub fn invalid(&mut self, ty: Type) -> ValueId {
        self.single(OpKind::Invalid, Vec::new(), ty)
    }

    /// `add(a, b)`
    pub fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.expr(OpKind::Binary(BinaryOp::Add), vec![a, b])
    }

    /// `sub(a, b)`
    pub fn sub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.expr(OpKind::Binary(BinaryOp::Sub), vec![a, b])
    }

    /// `and(a, b)`
    pub fn and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.expr(OpKind::Binary(BinaryOp::And), vec![a, b])
    }

    /// `or(a, b)`
    pub fn or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.expr(OpKind::Binary(BinaryOp::Or), vec![a, b])
    }

    /// `xor(a, b)`
    pub fn xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.expr(OpKind::Binary(BinaryOp::Xor), vec![a, b])
    }

    /// A comparison.
    pub fn cmp(&mut self, op: CompareOp, a: ValueId, b: ValueId) -> ValueId {
        self.expr(OpKind::Compare(op), vec![a, b])
    }

    /// `neg(a)`
    pub fn neg(&mut self, a: ValueId) -> ValueId {
        self.expr(OpKind::Neg, vec![a])
    }

    /// `mux(sel, high, low)`
    pub fn mux(&mut self, sel: ValueId, high: ValueId, low: ValueId) -> ValueId {
        self.expr(OpKind::Mux, vec![sel, high, low])
    }

    /// `bits(x, hi, lo)`
    pub fn bits(&mut self, x: ValueId, hi: u32, lo: u32) -> ValueId {
        self.expr(OpKind::Bits { hi, lo }, vec![x])
    }

    /// `cat(high, low)`
    pub fn cat(&mut self, high: ValueId, low: ValueId) -> ValueId {
        self.expr(OpKind::Concat, vec![high, low])
    }

    /// `shl(x, n)`
    pub fn shl(&mut self, x: ValueId, n: u32) -> ValueId {
        let kind = OpKind::Shift {
            dir: ShiftDir::Left,
            amount: ShiftAmount::Static(n),
        };
        self.expr(kind, vec![x])
    }

    /// `shr(x, n)`
    pub fn shr(&mut self, x: ValueId, n: u32) -> ValueId {
        let kind = OpKind::Shift {
            dir: ShiftDir::Right,
            amount: ShiftAmount::Static(n),
        };
        self.expr(kind, vec![x])
    }

    /// `dshl(x, amount)`
    pub fn dshl(&mut self, x: ValueId, amount: ValueId) -> ValueId {
        let kind = OpKind::Shift {
            dir: ShiftDir::Left,
            amount: ShiftAmount::Dynamic,
        };
        self.expr(kind, vec![x, amount])
    }

    /// `dshr(x, amount)`
    pub fn dshr(&mut self, x: ValueId, amount: ValueId) -> ValueId {
        let kind = OpKind::Shift {
            dir: ShiftDir::Right,
            amount: ShiftAmount::Dynamic,
        };
        self.expr(kind, vec![x, amount])
    }

    /// `pad(x, n)`
    pub fn pad(&mut self, x: ValueId, n: u32) -> ValueId {
        self.expr(OpKind::Pad(n), vec![x])
    }

    /// `asUInt(x)`
    pub fn as_uint(&mut self, x: ValueId) -> ValueId {
        self.expr(OpKind::Cast(CastKind::AsUInt), vec![x])
    }

    /// `asSInt(x)`
    pub fn as_sint(&mut self, x: ValueId) -> ValueId {
        self.expr(OpKind::Cast(CastKind::AsSInt), vec![x])
    }

    /// `v[index]` with a constant index.
    pub fn subindex(&mut self, v: ValueId, index: u32) -> ValueId {
        self.expr(OpKind::Access(Access::Static(index)), vec![v])
    }

    /// `v[index]` with a dynamic index.
    pub fn subaccess(&mut self, v: ValueId, index: ValueId) -> ValueId {
        self.expr(OpKind::Access(Access::Dynamic), vec![v, index])
    }

    /// A named node.
    pub fn node(&mut self, name: &str, x: ValueId) -> ValueId {
        let v = self.expr(OpKind::Node, vec![x]);
        self.name(v, name);
        v
    }

    /// A named wire.
    pub fn wire(&mut self, name: &str, ty: Type) -> ValueId {
        let v = self.single(OpKind::Wire, Vec::new(), ty);
        self.name(v, name);
        v
    }

    /// A named register without reset.
    pub fn reg(&mut self, name: &str, ty: Type, clock: ValueId) -> ValueId {
        let v = self.single(OpKind::Register(RegKind::Plain), vec![clock], ty);
        self.name(v, name);
        v
    }

    /// A named register with reset.
    pub fn reg_reset(
        &mut self,
        name: &str,
        ty: Type,
        clock: ValueId,
        reset: ValueId,
        init: ValueId,
        is_async: bool,
    ) -> ValueId {
        let v = self.single(
            OpKind::Register(RegKind::Resettable { is_async }),
            vec![clock, reset, init],
            ty,
        );
        self.name(v, name);
        v
    }

    /// A loose connect.
    pub fn connect(&mut self, dest: ValueId, src: ValueId) {
        self.module.connect(ConnectKind::Loose, dest, src);
    }

    /// A strict connect.
    pub fn strict_connect(&mut self, dest: ValueId, src: ValueId) {
        self.module.connect(ConnectKind::Strict, dest, src);
    }

    /// Instantiates `callee`, returning one value per callee port.
    pub fn instance(&mut self, name: &str, callee: &Module) -> Vec<ValueId> {
        let info = InstanceInfo {
            module: callee.name,
            port_names: callee.ports.iter().map(|p| p.name).collect(),
        };
        let op = self
            .module
            .add_op(OpKind::Instance(info), Vec::new(), callee.port_types());
        self.module.op_mut(op).name = Some(self.interner.get_or_intern(name));
        self.module.op(op).results.clone()
    }

    /// Sets the name hint of the op defining `value`.
    pub fn name(&mut self, value: ValueId, name: &str) {
        if let Some(op) = self.module.defining_op(value) {
            self.module.op_mut(op).name = Some(self.interner.get_or_intern(name));
        }
    }

    /// Gives the op defining `value` an inner symbol.
    pub fn sym(&mut self, value: ValueId, sym: &str) {
        let sym = self.interner.get_or_intern(sym);
        match self.module.defining_op(value) {
            Some(op) => self.module.op_mut(op).sym = Some(sym),
            None => {
                if let Some(index) = self.module.port_index(value) {
                    self.module.ports[index].sym = Some(sym);
                }
            }
        }
    }

    /// Marks the entity defining `value` as dont-touch.
    pub fn dont_touch(&mut self, value: ValueId) {
        match self.module.defining_op(value) {
            Some(op) => self.module.op_mut(op).annotations.push(Annotation::DontTouch),
            None => {
                if let Some(index) = self.module.port_index(value) {
                    self.module.ports[index].annotations.push(Annotation::DontTouch);
                }
            }
        }
    }

    /// The module built so far.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Finishes construction, failing on the first ill-typed operation.
    pub fn finish(self) -> Result<Module, StructuralError> {
        match self.errors.into_iter().next() {
            Some(detail) => Err(StructuralError::IllTypedOp {
                module: self.interner.resolve(self.module.name).to_string(),
                op: detail
                    .split(':')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                detail,
                loc: self.module.loc,
            }),
            None => Ok(self.module),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_expression_types() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let a = b.input("a", Type::uint(4));
        let c = b.input("c", Type::uint(6));
        let s = b.add(a, c);
        let k = b.cat(a, c);
        assert_eq!(b.module().value_type(s), &Type::uint(7));
        assert_eq!(b.module().value_type(k), &Type::uint(10));
    }

    #[test]
    fn casts_and_annotations() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let a = b.input("a", Type::uint(4));
        let s = b.input("s", Type::sint(4));
        let signed = b.as_sint(a);
        let sum = b.add(signed, s);
        b.annotate(Annotation::NoDedup);
        let m = b.finish().unwrap();
        assert_eq!(m.value_type(signed), &Type::sint(4));
        assert_eq!(m.value_type(sum), &Type::sint(5));
        assert!(m.has_annotation(Annotation::NoDedup));
    }

    #[test]
    fn unsized_literals_take_minimal_width() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let u = b.uint_unsized(5);
        let s = b.sint_unsized(-3);
        let m = b.finish().unwrap();
        match m.defining_kind(u) {
            Some(OpKind::Constant(c)) => assert_eq!(c.width(), 3),
            other => panic!("unexpected {other:?}"),
        }
        match m.defining_kind(s) {
            Some(OpKind::Constant(c)) => assert_eq!(c.width(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ill_typed_expression_fails_finish() {
        let interner = Interner::new();
        let mut b = ModuleBuilder::new(&interner, "M");
        let a = b.input("a", Type::uint(4));
        let s = b.input("s", Type::sint(4));
        b.add(a, s);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, StructuralError::IllTypedOp { ref op, .. } if op == "add"));
    }

    #[test]
    fn instance_results_follow_callee_ports() {
        let interner = Interner::new();
        let mut leaf = ModuleBuilder::new(&interner, "Leaf");
        leaf.input("i", Type::uint(2));
        leaf.output("o", Type::sint(3));
        let leaf = leaf.finish().unwrap();

        let mut top = ModuleBuilder::new(&interner, "Top");
        let ports = top.instance("u0", &leaf);
        assert_eq!(ports.len(), 2);
        assert_eq!(top.module().value_type(ports[1]), &Type::sint(3));
    }
}
