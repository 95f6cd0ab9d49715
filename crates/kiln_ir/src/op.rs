//! Operations: the tagged union of IR operation kinds and their metadata.

use crate::ids::ValueId;
use kiln_common::{ApInt, Ident, Loc};
use serde::{Deserialize, Serialize};

/// Two-operand arithmetic and bitwise operators.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
}

impl BinaryOp {
    /// Returns `true` if operand order does not matter.
    pub fn is_commutative(self) -> bool {
        !matches!(self, BinaryOp::Sub)
    }

    /// Textual name of the operator.
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }
}

/// Comparison operators, all producing `UInt<1>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CompareOp {
    /// `leq`
    Leq,
    /// `lt`
    Lt,
    /// `geq`
    Geq,
    /// `gt`
    Gt,
    /// `eq`
    Eq,
    /// `neq`
    Neq,
}

impl CompareOp {
    /// The operator that gives the same answer with swapped operands.
    pub fn swapped(self) -> CompareOp {
        match self {
            CompareOp::Leq => CompareOp::Geq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Geq => CompareOp::Leq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Neq => CompareOp::Neq,
        }
    }

    /// Textual name of the operator.
    pub fn mnemonic(self) -> &'static str {
        match self {
            CompareOp::Leq => "leq",
            CompareOp::Lt => "lt",
            CompareOp::Geq => "geq",
            CompareOp::Gt => "gt",
            CompareOp::Eq => "eq",
            CompareOp::Neq => "neq",
        }
    }
}

/// Shift direction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ShiftDir {
    /// Toward the most significant bit.
    Left,
    /// Toward the least significant bit, sign-filling for `SInt`.
    Right,
}

/// Where a shift takes its amount from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ShiftAmount {
    /// A constant amount baked into the operation.
    Static(u32),
    /// The second operand, an unsigned integer.
    Dynamic,
}

/// Reinterpreting casts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CastKind {
    /// `asUInt`
    AsUInt,
    /// `asSInt`
    AsSInt,
}

/// Vector element selection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Access {
    /// Element index fixed at construction; must be in bounds.
    Static(u32),
    /// Index is the second operand; out-of-range reads yield an invalid value.
    Dynamic,
}

/// Register flavours.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum RegKind {
    /// Operands: `[clock]`.
    Plain,
    /// Operands: `[clock, reset, reset_value]`.
    Resettable {
        /// Asynchronous reset when `true`.
        is_async: bool,
    },
}

/// Connect flavours.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ConnectKind {
    /// Source may be narrower than the destination and is extended.
    Loose,
    /// Source and destination types are identical.
    Strict,
}

/// An instantiation of another module.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Symbol name of the instantiated module.
    pub module: Ident,
    /// Port names of the callee in port order; one result per port.
    pub port_names: Vec<Ident>,
}

/// Metadata that pins or classifies an entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Annotation {
    /// The entity must survive optimization.
    DontTouch,
    /// The module must not be merged with structural duplicates.
    NoDedup,
    /// A free-form annotation class; treated as pinning.
    Custom(Ident),
}

impl Annotation {
    /// Returns `true` if the annotation keeps an op or port alive.
    pub fn pins(self) -> bool {
        !matches!(self, Annotation::NoDedup)
    }
}

/// The kind of an operation along with its static attributes.
///
/// Operand layouts are fixed per kind:
///
/// | kind | operands |
/// |------|----------|
/// | binary, compare | `[lhs, rhs]` |
/// | neg, bits, static shift, pad, cast, static access, node | `[input]` |
/// | mux | `[select, high, low]` |
/// | concat | `[high, low]` |
/// | dynamic shift | `[input, amount]` |
/// | dynamic access | `[vector, index]` |
/// | register | `[clock]` or `[clock, reset, reset_value]` |
/// | connect | `[dest, src]` |
/// | constants, wire, instance | none |
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum OpKind {
    /// An integer literal. Its width equals the result width once known.
    Constant(ApInt),
    /// A literal of clock or reset type.
    SpecialConstant(bool),
    /// A vector literal, one value per element.
    AggregateConstant(Vec<ApInt>),
    /// An unspecified value.
    Invalid,
    /// Arithmetic or bitwise operator.
    Binary(BinaryOp),
    /// Comparison operator.
    Compare(CompareOp),
    /// Arithmetic negation producing `SInt<w+1>`.
    Neg,
    /// Two-way select; `high` when the select is 1.
    Mux,
    /// Bit slice `hi..=lo`.
    Bits {
        /// Most significant selected bit.
        hi: u32,
        /// Least significant selected bit.
        lo: u32,
    },
    /// Bit concatenation.
    Concat,
    /// Left or right shift.
    Shift {
        /// Direction.
        dir: ShiftDir,
        /// Amount source.
        amount: ShiftAmount,
    },
    /// Extension to at least the given width.
    Pad(u32),
    /// Reinterpreting cast.
    Cast(CastKind),
    /// Vector element selection.
    Access(Access),
    /// Connect destination without state.
    Wire,
    /// Clocked state element.
    Register(RegKind),
    /// Drives `dest` from `src`.
    Connect(ConnectKind),
    /// Named pass-through of its input.
    Node,
    /// Instantiation of another module.
    Instance(InstanceInfo),
}

impl OpKind {
    /// Number of operands for expression kinds, `None` for declarations.
    pub fn expr_arity(&self) -> Option<usize> {
        match self {
            OpKind::Binary(_) | OpKind::Compare(_) | OpKind::Concat => Some(2),
            OpKind::Mux => Some(3),
            OpKind::Neg | OpKind::Bits { .. } | OpKind::Pad(_) | OpKind::Cast(_) | OpKind::Node => {
                Some(1)
            }
            OpKind::Shift { amount, .. } => Some(match amount {
                ShiftAmount::Static(_) => 1,
                ShiftAmount::Dynamic => 2,
            }),
            OpKind::Access(access) => Some(match access {
                Access::Static(_) => 1,
                Access::Dynamic => 2,
            }),
            _ => None,
        }
    }

    /// Returns `true` for expressions whose result type follows from operand types.
    pub fn is_expression(&self) -> bool {
        self.expr_arity().is_some()
    }

    /// Returns `true` for compile-time constant kinds.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            OpKind::Constant(_)
                | OpKind::SpecialConstant(_)
                | OpKind::AggregateConstant(_)
                | OpKind::Invalid
        )
    }

    /// Returns `true` if the op has no effect besides its results.
    ///
    /// Wires and registers are excluded because connects write into them.
    pub fn is_pure(&self) -> bool {
        self.is_constant() || self.is_expression()
    }

    /// Returns `true` for kinds that may appear as a connect destination.
    pub fn is_declaration(&self) -> bool {
        matches!(self, OpKind::Wire | OpKind::Register(_))
    }

    /// Textual name of the kind.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpKind::Constant(_) => "constant",
            OpKind::SpecialConstant(_) => "specialconstant",
            OpKind::AggregateConstant(_) => "aggregateconstant",
            OpKind::Invalid => "invalidvalue",
            OpKind::Binary(op) => op.mnemonic(),
            OpKind::Compare(op) => op.mnemonic(),
            OpKind::Neg => "neg",
            OpKind::Mux => "mux",
            OpKind::Bits { .. } => "bits",
            OpKind::Concat => "cat",
            OpKind::Shift {
                dir: ShiftDir::Left,
                amount: ShiftAmount::Static(_),
            } => "shl",
            OpKind::Shift {
                dir: ShiftDir::Right,
                amount: ShiftAmount::Static(_),
            } => "shr",
            OpKind::Shift {
                dir: ShiftDir::Left,
                amount: ShiftAmount::Dynamic,
            } => "dshl",
            OpKind::Shift {
                dir: ShiftDir::Right,
                amount: ShiftAmount::Dynamic,
            } => "dshr",
            OpKind::Pad(_) => "pad",
            OpKind::Cast(CastKind::AsUInt) => "asUInt",
            OpKind::Cast(CastKind::AsSInt) => "asSInt",
            OpKind::Access(Access::Static(_)) => "subindex",
            OpKind::Access(Access::Dynamic) => "subaccess",
            OpKind::Wire => "wire",
            OpKind::Register(RegKind::Plain) => "reg",
            OpKind::Register(RegKind::Resettable { .. }) => "regreset",
            OpKind::Connect(ConnectKind::Loose) => "connect",
            OpKind::Connect(ConnectKind::Strict) => "strictconnect",
            OpKind::Node => "node",
            OpKind::Instance(_) => "instance",
        }
    }
}

/// A single operation inside a module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Op {
    /// Kind and static attributes.
    pub kind: OpKind,
    /// Operand values, laid out per kind.
    pub operands: Vec<ValueId>,
    /// Result values (none for connects, one per port for instances).
    pub results: Vec<ValueId>,
    /// Name hint for diagnostics and emitted names.
    pub name: Option<Ident>,
    /// Inner symbol referenced from outside the module; pins the op.
    pub sym: Option<Ident>,
    /// Annotations attached to the op.
    pub annotations: Vec<Annotation>,
    /// Source location.
    pub loc: Loc,
}

impl Op {
    /// Returns `true` if a symbol or annotation forbids removing the op.
    pub fn is_pinned(&self) -> bool {
        self.sym.is_some() || self.annotations.iter().any(|a| a.pins())
    }

    /// Returns the single result of a one-result op.
    pub fn result(&self) -> Option<ValueId> {
        match self.results.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// Returns the instance info if this is an instance.
    pub fn instance(&self) -> Option<&InstanceInfo> {
        match &self.kind {
            OpKind::Instance(info) => Some(info),
            _ => None,
        }
    }
}
