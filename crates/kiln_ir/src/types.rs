//! Hardware types and the result-type rules of expression operations.

use crate::op::{Access, BinaryOp, CastKind, OpKind, ShiftAmount, ShiftDir};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The bit width of an integer type, possibly not yet inferred.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Width {
    /// A concrete width in bits.
    Known(u32),
    /// Left for the width resolver.
    Unknown,
}

impl Width {
    /// Returns the width if known.
    pub fn known(self) -> Option<u32> {
        match self {
            Width::Known(w) => Some(w),
            Width::Unknown => None,
        }
    }
}

/// A signed or unsigned integer type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct IntType {
    /// Two's complement when `true`.
    pub signed: bool,
    /// Bit width.
    pub width: Width,
}

/// The type of an SSA value.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Type {
    /// `UInt<w>` or `SInt<w>`.
    Int(IntType),
    /// A clock signal.
    Clock,
    /// A synchronous reset.
    Reset,
    /// An asynchronous reset.
    AsyncReset,
    /// A fixed-length vector, the only aggregate that survives lowering.
    Vector {
        /// Element type.
        element: Box<Type>,
        /// Number of elements.
        len: u32,
    },
}

impl Type {
    /// `UInt<width>`.
    pub fn uint(width: u32) -> Self {
        Type::Int(IntType {
            signed: false,
            width: Width::Known(width),
        })
    }

    /// `SInt<width>`.
    pub fn sint(width: u32) -> Self {
        Type::Int(IntType {
            signed: true,
            width: Width::Known(width),
        })
    }

    /// An integer type of the given signedness and width.
    pub fn int(signed: bool, width: Width) -> Self {
        Type::Int(IntType { signed, width })
    }

    /// `UInt` with its width left to inference.
    pub fn uint_unknown() -> Self {
        Type::int(false, Width::Unknown)
    }

    /// `SInt` with its width left to inference.
    pub fn sint_unknown() -> Self {
        Type::int(true, Width::Unknown)
    }

    /// A vector of `len` elements.
    pub fn vector(element: Type, len: u32) -> Self {
        Type::Vector {
            element: Box::new(element),
            len,
        }
    }

    /// Returns the integer type, if this is one.
    pub fn as_int(&self) -> Option<IntType> {
        match self {
            Type::Int(int) => Some(*int),
            _ => None,
        }
    }

    /// Returns `true` for `SInt`.
    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int(IntType { signed: true, .. }))
    }

    /// Returns `true` for every type except vectors.
    pub fn is_ground(&self) -> bool {
        !matches!(self, Type::Vector { .. })
    }

    /// Total bit width if every width inside the type is known.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Int(int) => int.width.known(),
            Type::Clock | Type::Reset | Type::AsyncReset => Some(1),
            Type::Vector { element, len } => element.bit_width().map(|w| w * len),
        }
    }

    /// Returns `true` if no width inside the type is unknown.
    pub fn has_known_width(&self) -> bool {
        self.bit_width().is_some()
    }

    /// Replaces the width of an integer type; other types are returned unchanged.
    pub fn with_width(&self, width: u32) -> Type {
        match self {
            Type::Int(int) => Type::int(int.signed, Width::Known(width)),
            other => other.clone(),
        }
    }

    /// Returns `true` for a `UInt` whose width is known to be 1 or unknown.
    pub fn is_bool_like(&self) -> bool {
        matches!(
            self,
            Type::Int(IntType {
                signed: false,
                width: Width::Known(1) | Width::Unknown,
            })
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(int) => {
                let base = if int.signed { "SInt" } else { "UInt" };
                match int.width {
                    Width::Known(w) => write!(f, "{base}<{w}>"),
                    Width::Unknown => write!(f, "{base}"),
                }
            }
            Type::Clock => write!(f, "Clock"),
            Type::Reset => write!(f, "Reset"),
            Type::AsyncReset => write!(f, "AsyncReset"),
            Type::Vector { element, len } => write!(f, "{element}[{len}]"),
        }
    }
}

fn int_operand(ty: &Type, what: &str) -> Result<IntType, String> {
    ty.as_int()
        .ok_or_else(|| format!("{what} must be an integer, found {ty}"))
}

fn same_sign(a: IntType, b: IntType, what: &str) -> Result<bool, String> {
    if a.signed != b.signed {
        return Err(format!("{what} operands must agree in signedness"));
    }
    Ok(a.signed)
}

fn join(a: Width, b: Width, f: impl Fn(u32, u32) -> Option<u32>) -> Result<Width, String> {
    match (a, b) {
        (Width::Known(x), Width::Known(y)) => f(x, y)
            .map(Width::Known)
            .ok_or_else(|| "result width overflows".to_string()),
        _ => Ok(Width::Unknown),
    }
}

fn map(a: Width, f: impl Fn(u32) -> Option<u32>) -> Result<Width, String> {
    match a {
        Width::Known(x) => f(x)
            .map(Width::Known)
            .ok_or_else(|| "result width overflows".to_string()),
        Width::Unknown => Ok(Width::Unknown),
    }
}

/// Width of a ground type that can be reinterpreted as an integer.
fn castable_width(ty: &Type) -> Result<Width, String> {
    match ty {
        Type::Int(int) => Ok(int.width),
        Type::Clock | Type::Reset | Type::AsyncReset => Ok(Width::Known(1)),
        Type::Vector { .. } => Err(format!("cannot cast aggregate {ty}")),
    }
}

/// Computes the result type of an expression operation from its operand types.
///
/// Unknown operand widths produce an unknown result width. Declarations
/// (constants, wires, registers, instances) carry their own types and are
/// rejected here.
pub fn expr_result_type(kind: &OpKind, operands: &[&Type]) -> Result<Type, String> {
    let arity = kind.expr_arity().ok_or_else(|| format!("{} is not an expression", kind.mnemonic()))?;
    if operands.len() != arity {
        return Err(format!(
            "{} expects {arity} operands, found {}",
            kind.mnemonic(),
            operands.len()
        ));
    }
    match kind {
        OpKind::Binary(op) => {
            let a = int_operand(operands[0], "lhs")?;
            let b = int_operand(operands[1], "rhs")?;
            match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    let signed = same_sign(a, b, op.mnemonic())?;
                    let w = join(a.width, b.width, |x, y| x.max(y).checked_add(1))?;
                    Ok(Type::int(signed, w))
                }
                BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                    same_sign(a, b, op.mnemonic())?;
                    Ok(Type::int(false, join(a.width, b.width, |x, y| Some(x.max(y)))?))
                }
            }
        }
        OpKind::Compare(_) => {
            let a = int_operand(operands[0], "lhs")?;
            let b = int_operand(operands[1], "rhs")?;
            same_sign(a, b, "comparison")?;
            Ok(Type::uint(1))
        }
        OpKind::Neg => {
            let a = int_operand(operands[0], "neg input")?;
            Ok(Type::int(true, map(a.width, |w| w.checked_add(1))?))
        }
        OpKind::Mux => {
            if !operands[0].is_bool_like() {
                return Err(format!("mux select must be UInt<1>, found {}", operands[0]));
            }
            match (operands[1], operands[2]) {
                (Type::Int(hi), Type::Int(lo)) => {
                    let signed = same_sign(*hi, *lo, "mux")?;
                    Ok(Type::int(signed, join(hi.width, lo.width, |x, y| Some(x.max(y)))?))
                }
                (hi, lo) if hi == lo => Ok(hi.clone()),
                (hi, lo) => Err(format!("mux branches disagree: {hi} vs {lo}")),
            }
        }
        OpKind::Bits { hi, lo } => {
            if hi < lo {
                return Err(format!("bits range {hi}:{lo} is inverted"));
            }
            let w = castable_width(operands[0])?;
            if let Width::Known(w) = w {
                if *hi >= w {
                    return Err(format!("bits high index {hi} exceeds input width {w}"));
                }
            }
            Ok(Type::uint(hi - lo + 1))
        }
        OpKind::Concat => {
            let a = int_operand(operands[0], "cat high")?;
            let b = int_operand(operands[1], "cat low")?;
            Ok(Type::int(false, join(a.width, b.width, |x, y| x.checked_add(y))?))
        }
        OpKind::Shift { dir, amount } => {
            let a = int_operand(operands[0], "shift input")?;
            let w = match (dir, amount) {
                (ShiftDir::Left, ShiftAmount::Static(n)) => map(a.width, |w| w.checked_add(*n))?,
                (ShiftDir::Right, ShiftAmount::Static(n)) => {
                    map(a.width, |w| Some(w.saturating_sub(*n).max(1)))?
                }
                (dir, ShiftAmount::Dynamic) => {
                    let amt = int_operand(operands[1], "shift amount")?;
                    if amt.signed {
                        return Err("dynamic shift amount must be unsigned".to_string());
                    }
                    match dir {
                        ShiftDir::Left => join(a.width, amt.width, |w, wa| {
                            let span = 1u32.checked_shl(wa)?.checked_sub(1)?;
                            w.checked_add(span)
                        })?,
                        ShiftDir::Right => a.width,
                    }
                }
            };
            Ok(Type::int(a.signed, w))
        }
        OpKind::Pad(n) => {
            let a = int_operand(operands[0], "pad input")?;
            Ok(Type::int(a.signed, map(a.width, |w| Some(w.max(*n)))?))
        }
        OpKind::Cast(cast) => {
            let w = castable_width(operands[0])?;
            Ok(Type::int(*cast == CastKind::AsSInt, w))
        }
        OpKind::Access(access) => {
            let Type::Vector { element, len } = operands[0] else {
                return Err(format!("indexed access into non-vector {}", operands[0]));
            };
            match access {
                Access::Static(index) if index >= len => Err(format!(
                    "static index {index} out of bounds for {}",
                    operands[0]
                )),
                Access::Static(_) => Ok((**element).clone()),
                Access::Dynamic => {
                    let idx = int_operand(operands[1], "index")?;
                    if idx.signed {
                        return Err("dynamic index must be unsigned".to_string());
                    }
                    Ok((**element).clone())
                }
            }
        }
        OpKind::Node => Ok(operands[0].clone()),
        _ => Err(format!("{} is not an expression", kind.mnemonic())),
    }
}
