//! The mutation context handed to rewrite rules.
//!
//! Rules never touch the module directly. Every operation they create, every
//! user of a replaced value and every operand of a removed operation is
//! recorded so the engine can re-enqueue them and assign rewrite generations.

use kiln_common::{ApInt, KilnResult};
use kiln_ir::fold::{constant_of, is_constant_like};
use kiln_ir::{expr_result_type, CastKind, Module, Op, OpId, OpKind, Type, ValueId};

/// Per-rewrite view of a module.
pub struct Rewriter<'a> {
    module: &'a mut Module,
    root: OpId,
    fold_constants: bool,
    pub(crate) created: Vec<OpId>,
    pub(crate) touched: Vec<OpId>,
    pub(crate) released: Vec<ValueId>,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(module: &'a mut Module, root: OpId, fold_constants: bool) -> Self {
        Self {
            module,
            root,
            fold_constants,
            created: Vec::new(),
            touched: Vec::new(),
            released: Vec::new(),
        }
    }

    /// The module being rewritten.
    pub fn module(&self) -> &Module {
        &*self.module
    }

    /// Whether all-constant operations may be folded.
    pub fn fold_constants(&self) -> bool {
        self.fold_constants
    }

    /// The operation being matched.
    pub fn op(&self, op: OpId) -> &Op {
        self.module.op(op)
    }

    /// Type of a value.
    pub fn ty(&self, value: ValueId) -> &Type {
        self.module.value_type(value)
    }

    /// Known total width of a value.
    pub fn width(&self, value: ValueId) -> Option<u32> {
        self.ty(value).bit_width()
    }

    /// The integer literal defining `value`, if any.
    pub fn constant(&self, value: ValueId) -> Option<&ApInt> {
        constant_of(&*self.module, value)
    }

    /// Returns `true` for any compile-time constant: literal, special,
    /// aggregate, or invalid.
    pub fn is_constant_like(&self, value: ValueId) -> bool {
        is_constant_like(&*self.module, value)
    }

    /// The op defining `value` together with its kind.
    pub fn def(&self, value: ValueId) -> Option<(OpId, &OpKind)> {
        let op = self.module.defining_op(value)?;
        Some((op, &self.module.op(op).kind))
    }

    fn track(&mut self, op: OpId) {
        let loc = self.module.op(self.root).loc;
        self.module.op_mut(op).loc = loc;
        self.created.push(op);
    }

    /// Creates an expression, deriving its type. Fails on ill-typed input.
    pub fn build(&mut self, kind: OpKind, operands: Vec<ValueId>) -> Option<ValueId> {
        let types: Vec<&Type> = operands.iter().map(|v| self.module.value_type(*v)).collect();
        let ty = expr_result_type(&kind, &types).ok()?;
        let op = self.module.add_op(kind, operands, vec![ty]);
        self.track(op);
        Some(self.module.op(op).results[0])
    }

    /// Creates a literal of type `ty`, resizing `value` to its width.
    pub fn build_constant(&mut self, ty: Type, value: ApInt) -> ValueId {
        let value = match ty.bit_width() {
            Some(w) => value.resize(w, ty.is_signed()),
            None => value,
        };
        let op = self.module.add_op(OpKind::Constant(value), Vec::new(), vec![ty]);
        self.track(op);
        self.module.op(op).results[0]
    }

    /// Creates an invalid value of type `ty`.
    pub fn build_invalid(&mut self, ty: Type) -> ValueId {
        let op = self.module.add_op(OpKind::Invalid, Vec::new(), vec![ty]);
        self.track(op);
        self.module.op(op).results[0]
    }

    /// Extends `value` to `width` by its signedness; no-op at equal width.
    pub fn pad_to(&mut self, value: ValueId, width: u32) -> Option<ValueId> {
        match self.width(value)? {
            w if w == width => Some(value),
            w if w < width => self.build(OpKind::Pad(width), vec![value]),
            _ => None,
        }
    }

    /// Reinterprets `value` as unsigned; no-op for `UInt`.
    pub fn as_uint(&mut self, value: ValueId) -> Option<ValueId> {
        if self.ty(value).as_int().is_some_and(|t| !t.signed) {
            return Some(value);
        }
        self.build(OpKind::Cast(CastKind::AsUInt), vec![value])
    }

    /// Replaces the single result of `op` with `value` and erases `op`.
    ///
    /// An unnamed defining op of `value` inherits the name hint, whether the
    /// rule just built it or forwarded an existing value.
    pub fn replace(&mut self, op: OpId, value: ValueId) -> KilnResult<()> {
        if let Some(def) = self.module.defining_op(value) {
            if self.module.op(def).name.is_none() {
                let name = self.module.op(op).name;
                self.module.op_mut(def).name = name;
            }
        }
        self.released.extend(self.module.op(op).operands.iter().copied());
        let users = self.module.replace_op_with_value(op, value)?;
        self.touched.extend(users);
        Ok(())
    }

    /// Replaces `op` with a new operation of a different kind or operands.
    pub fn rebuild(
        &mut self,
        op: OpId,
        kind: OpKind,
        operands: Vec<ValueId>,
    ) -> KilnResult<OpId> {
        let types = self
            .module
            .op(op)
            .results
            .iter()
            .map(|r| self.module.value_type(*r).clone())
            .collect();
        let users: Vec<OpId> = self
            .module
            .op(op)
            .results
            .iter()
            .flat_map(|r| self.module.users(*r))
            .collect();
        self.released.extend(self.module.op(op).operands.iter().copied());
        let new = self.module.rebuild_op(op, kind, operands, types)?;
        self.created.push(new);
        self.touched.extend(users);
        Ok(new)
    }

    /// Erases an operation whose results are unused.
    pub fn erase(&mut self, op: OpId) -> KilnResult<()> {
        self.released.extend(self.module.op(op).operands.iter().copied());
        self.module.erase_op(op)
    }
}
