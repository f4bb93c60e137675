//! Instruction selection: maps an operation on operands of given types to the C spelling of a
//! target intrinsic.
//!
//! Entries are tried in a fixed order: power-of-two shift specializations, native register
//! entries, the scalar fallback, then the lane-by-lane software fallback. Composite operands
//! never reach this module; the expression lowering splits them into native components first.

use std::fmt;

use log::warn;

use super::c_utils::Emitter;
use super::CodeGenError;
use crate::common::{ElemClass, Type};
use crate::ir::{BinOp, Rounding, TargetOp, UnaryOp};
use crate::target::{decompose, is_native};
use crate::utils::exact_log2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Unary(UnaryOp),
    Binary(BinOp),
    Select,
    Target(TargetOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Multiply or divide by a constant power of two, emitted as a shift by immediate.
    Shift(u32),
    Native,
    Scalar,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub emitter: Emitter,
    pub kind: EntryKind,
    pub commutative: bool,
    /// The entry takes the native components of a two-register operand as separate arguments.
    pub expands_pairs: bool,
}

impl Selection {
    fn new(emitter: Emitter, kind: EntryKind) -> Self {
        Selection {
            emitter,
            kind,
            commutative: false,
            expands_pairs: false,
        }
    }

    fn call(name: &'static str, kind: EntryKind) -> Self {
        Selection::new(Emitter::Call(name.into()), kind)
    }

    fn commutative(mut self, commutative: bool) -> Self {
        self.commutative = commutative;
        self
    }

    fn expanding(mut self) -> Self {
        self.expands_pairs = true;
        self
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Unary(op) => write!(f, "{:?}", op),
            Operation::Binary(op) => write!(f, "{:?}", op),
            Operation::Select => write!(f, "Select"),
            Operation::Target(op) => write!(f, "{:?}", op),
        }
    }
}

/// Intrinsic names for the integer register types: `IVP_<op><suffix><post>`.
macro_rules! int_family {
    ($ty:expr, $op:literal) => {
        int_family!($ty, $op, $op, "")
    };
    ($ty:expr, $sop:literal, $uop:literal) => {
        int_family!($ty, $sop, $uop, "")
    };
    ($ty:expr, $sop:literal, $uop:literal, $post:literal) => {
        match ($ty.class, $ty.bits) {
            (ElemClass::Int, 8) => Some(concat!("IVP_", $sop, "2NX8", $post)),
            (ElemClass::UInt, 8) => Some(concat!("IVP_", $uop, "2NX8U", $post)),
            (ElemClass::Int, 16) => Some(concat!("IVP_", $sop, "NX16", $post)),
            (ElemClass::UInt, 16) => Some(concat!("IVP_", $uop, "NX16U", $post)),
            (ElemClass::Int, 32) => Some(concat!("IVP_", $sop, "N_2X32", $post)),
            (ElemClass::UInt, 32) => Some(concat!("IVP_", $uop, "N_2X32U", $post)),
            _ => None,
        }
    };
}

macro_rules! float_family {
    ($ty:expr, $op:literal) => {
        float_family!($ty, $op, "")
    };
    ($ty:expr, $op:literal, $post:literal) => {
        match ($ty.class, $ty.bits) {
            (ElemClass::Float, 32) => Some(concat!("IVP_", $op, "N_2XF32", $post)),
            (ElemClass::Float, 16) => Some(concat!("IVP_", $op, "NXF16", $post)),
            _ => None,
        }
    };
}

/// Predicate register operations, keyed by lane count.
macro_rules! bool_family {
    ($ty:expr, $op:literal) => {
        match ($ty.class, $ty.lanes) {
            (ElemClass::Bool, 16) => Some(concat!("IVP_", $op, "N_2")),
            (ElemClass::Bool, 32) => Some(concat!("IVP_", $op, "N")),
            (ElemClass::Bool, 64) => Some(concat!("IVP_", $op, "2N")),
            _ => None,
        }
    };
}

/// Selects the intrinsic for `op` applied to operands of types `operands`, producing `result`.
///
/// `const_rhs` is the value of the second operand when it is a compile-time integer constant.
pub fn select(
    op: Operation,
    operands: &[Type],
    result: Type,
    const_rhs: Option<i64>,
) -> Result<Selection, CodeGenError> {
    let Some(&ty) = operands.first() else {
        return Err(CodeGenError::MalformedIr(format!("{} without operands", op)));
    };
    if let Some(selection) = shift_entry(op, ty, const_rhs) {
        return Ok(selection);
    }
    if is_native(ty) {
        if let Some(selection) = native_entry(op, operands, result) {
            return Ok(selection);
        }
    } else if let Some(selection) = paired_entry(op, ty, result) {
        return Ok(selection);
    }
    if ty.is_scalar() {
        if let Some(selection) = scalar_entry(op, ty) {
            return Ok(selection);
        }
    } else if let Some(selection) = generic_entry(op, ty) {
        warn!("No native intrinsic for {} on {}; emulating lane by lane", op, ty);
        return Ok(selection);
    }
    Err(CodeGenError::NoMatchingIntrinsic {
        operation: op.to_string(),
        ty,
    })
}

/// Selects an entry that consumes both native halves of a two-register first operand, if one
/// exists.
pub fn select_paired(op: Operation, ty: Type, result: Type) -> Option<Selection> {
    paired_entry(op, ty, result)
}

fn shift_entry(op: Operation, ty: Type, const_rhs: Option<i64>) -> Option<Selection> {
    let Operation::Binary(bin_op @ (BinOp::Mul | BinOp::Div)) = op else {
        return None;
    };
    if !ty.is_int_or_uint() {
        return None;
    }
    let shift = exact_log2(const_rhs?)?;
    if shift >= u32::from(ty.bits) {
        return None;
    }
    if ty.is_scalar() {
        let infix = if bin_op == BinOp::Mul { "<<" } else { ">>" };
        return Some(Selection::new(Emitter::Infix(infix), EntryKind::Shift(shift)));
    }
    if !is_native(ty) {
        return None;
    }
    // Arithmetic right shift is floor division for signed dividends.
    let name = match bin_op {
        BinOp::Mul => int_family!(ty, "SLLI", "SLLI"),
        _ => int_family!(ty, "SRAI", "SRLI"),
    }?;
    Some(Selection::call(name, EntryKind::Shift(shift)))
}

fn native_entry(op: Operation, operands: &[Type], result: Type) -> Option<Selection> {
    let ty = operands[0];
    let native = EntryKind::Native;
    match op {
        Operation::Binary(bin_op) => {
            let commutative = bin_op.is_commutative();
            let (name, template) = match bin_op {
                BinOp::Add => (int_family!(ty, "ADD").or(float_family!(ty, "ADD")), false),
                BinOp::Sub => (int_family!(ty, "SUB").or(float_family!(ty, "SUB")), false),
                BinOp::Mul => match (ty.class, ty.bits) {
                    (ElemClass::Int, 8) => (Some("IVP_PACKL2NX24(IVP_MUL2NX8({0}, {1}))"), true),
                    (ElemClass::UInt, 8) => {
                        (Some("IVP_PACKL2NX24(IVP_MULUU2NX8({0}, {1}))"), true)
                    }
                    (ElemClass::Int, 16) => (Some("IVP_MULNX16PACKL"), false),
                    (ElemClass::UInt, 16) => (Some("IVP_MULNX16UPACKL"), false),
                    (ElemClass::Int, 32) => {
                        (Some("IVP_PACKLN_2X64W(IVP_MULN_2X32({0}, {1}))"), true)
                    }
                    (ElemClass::UInt, 32) => {
                        (Some("IVP_PACKLN_2X64W(IVP_MULUUN_2X32({0}, {1}))"), true)
                    }
                    _ => (float_family!(ty, "MUL"), false),
                },
                BinOp::Div => (float_family!(ty, "DIV"), false),
                BinOp::Mod => (None, false),
                BinOp::Min => (int_family!(ty, "MIN", "MINU").or(float_family!(ty, "MIN")), false),
                BinOp::Max => (int_family!(ty, "MAX", "MAXU").or(float_family!(ty, "MAX")), false),
                BinOp::Eq => (int_family!(ty, "EQ").or(float_family!(ty, "OEQ")), false),
                BinOp::Ne => (int_family!(ty, "NEQ").or(float_family!(ty, "UNEQ")), false),
                BinOp::Lt => (int_family!(ty, "LT", "LTU").or(float_family!(ty, "OLT")), false),
                BinOp::Le => (int_family!(ty, "LE", "LEU").or(float_family!(ty, "OLE")), false),
                // There are no greater-than compares; swap the operands of less-than.
                BinOp::Gt => (
                    int_family!(ty, "LT", "LTU", "({1}, {0})")
                        .or(float_family!(ty, "OLT", "({1}, {0})")),
                    true,
                ),
                BinOp::Ge => (
                    int_family!(ty, "LE", "LEU", "({1}, {0})")
                        .or(float_family!(ty, "OLE", "({1}, {0})")),
                    true,
                ),
                BinOp::And => (bool_family!(ty, "ANDB"), false),
                BinOp::Or => (bool_family!(ty, "ORB"), false),
                BinOp::BitAnd => (int_family!(ty, "AND"), false),
                BinOp::BitOr => (int_family!(ty, "OR"), false),
                BinOp::BitXor => (int_family!(ty, "XOR"), false),
                BinOp::Shl => (int_family!(ty, "SLL"), false),
                BinOp::Shr => (int_family!(ty, "SRA", "SRL"), false),
            };
            let name = name?;
            let emitter = if template {
                Emitter::Template(name)
            } else {
                Emitter::Call(name.into())
            };
            Some(Selection::new(emitter, native).commutative(commutative))
        }
        Operation::Unary(unary_op) => {
            let name = match unary_op {
                UnaryOp::Neg => match ty.class {
                    ElemClass::Int => int_family!(ty, "NEG"),
                    _ => float_family!(ty, "NEG"),
                },
                UnaryOp::Not => bool_family!(ty, "NOTB"),
                UnaryOp::BitNot => int_family!(ty, "NOT"),
                UnaryOp::Abs => match ty.class {
                    ElemClass::Int => int_family!(ty, "ABS"),
                    _ => float_family!(ty, "ABS"),
                },
                UnaryOp::CountLeadingZeros => match (ty.class, ty.bits) {
                    (ElemClass::Int | ElemClass::UInt, 16) => Some("IVP_NSAUNX16"),
                    (ElemClass::Int | ElemClass::UInt, 32) => Some("IVP_NSAUN_2X32"),
                    _ => None,
                },
                UnaryOp::Sqrt => float_family!(ty, "SQRT"),
                UnaryOp::Round => float_family!(ty, "FIRINT"),
            }?;
            Some(Selection::call(name, native))
        }
        Operation::Select => {
            // Operands are (condition, true value, false value); the move-if-true intrinsic
            // takes them as (true value, false value, condition).
            let value_ty = *operands.get(1)?;
            let name = int_family!(value_ty, "MOV", "MOV", "T({1}, {2}, {0})")
                .or(float_family!(value_ty, "MOV", "T({1}, {2}, {0})"))?;
            Some(Selection::new(Emitter::Template(name), native))
        }
        Operation::Target(target_op) => target_entry(target_op, operands, result),
    }
}

fn target_entry(op: TargetOp, operands: &[Type], result: Type) -> Option<Selection> {
    let ty = operands[0];
    let native = EntryKind::Native;
    let key = (ty.class, ty.bits);
    let name = match op {
        TargetOp::SatAdd => match key {
            (ElemClass::Int, 8) => "IVP_ADDS2NX8",
            (ElemClass::Int, 16) => "IVP_ADDSNX16",
            _ => return None,
        },
        TargetOp::SatSub => match key {
            (ElemClass::Int, 8) => "IVP_SUBS2NX8",
            (ElemClass::Int, 16) => "IVP_SUBSNX16",
            _ => return None,
        },
        TargetOp::Avg => int_family!(ty, "AVG", "AVGU")?,
        TargetOp::AvgRound => int_family!(ty, "AVGR", "AVGRU")?,
        TargetOp::AbsDiff => {
            let template = match key {
                (ElemClass::Int, 8) => "xb_vec2Nx8_rtor_xb_vec2Nx8U(IVP_ABSSUB2NX8({0}, {1}))",
                (ElemClass::UInt, 8) => "IVP_ABSSUBU2NX8U({0}, {1})",
                (ElemClass::Int, 16) => "xb_vecNx16_rtor_xb_vecNx16U(IVP_ABSSUBNX16({0}, {1}))",
                (ElemClass::UInt, 16) => "IVP_ABSSUBUNX16U({0}, {1})",
                _ => return None,
            };
            return Some(Selection::new(Emitter::Template(template), native).commutative(true));
        }
        TargetOp::WidenMul => match key {
            (ElemClass::Int, 8) => "IVP_MUL2NX8",
            (ElemClass::UInt, 8) => "IVP_MULUU2NX8",
            (ElemClass::Int, 16) => "IVP_MULNX16",
            (ElemClass::UInt, 16) => "IVP_MULUUNX16",
            (ElemClass::Int, 32) => "IVP_MULN_2X32",
            _ => return None,
        },
        TargetOp::WidenPairMul => match key {
            (ElemClass::Int, 8) => "IVP_MULP2NX8",
            (ElemClass::Int, 16) => "IVP_MULPNX16",
            _ => return None,
        },
        TargetOp::WidenAdd => match key {
            (ElemClass::Int, 8) => "IVP_ADDW2NX8",
            (ElemClass::UInt, 8) => "IVP_ADDWU2NX8U",
            (ElemClass::Int, 16) => "IVP_ADDWNX16",
            (ElemClass::UInt, 16) => "IVP_ADDWUNX16U",
            _ => return None,
        },
        TargetOp::WidenMulAdd => {
            let multiplicand = *operands.get(1)?;
            match (ty.bits, multiplicand.class, multiplicand.bits) {
                (24, ElemClass::Int, 8) => "xt_widen_mul_add_i24",
                (48, ElemClass::Int, 16) => "xt_widen_mul_add_i48",
                _ => return None,
            }
        }
        TargetOp::ConvertLow | TargetOp::ConvertHigh => {
            let low = op == TargetOp::ConvertLow;
            match (key, result.class) {
                ((ElemClass::Int, 48), ElemClass::Int) => {
                    if low {
                        "IVP_CVT32SNX48L"
                    } else {
                        "IVP_CVT32SNX48H"
                    }
                }
                ((ElemClass::Int, 48), ElemClass::UInt) => {
                    if low {
                        "IVP_CVT32UNX48L"
                    } else {
                        "IVP_CVT32UNX48H"
                    }
                }
                ((ElemClass::Int, 24), _) => {
                    if low {
                        "IVP_CVT16S2NX24L"
                    } else {
                        "IVP_CVT16S2NX24H"
                    }
                }
                _ => return None,
            }
        }
        TargetOp::NarrowWithShift(rounding) => match (key, rounding) {
            ((ElemClass::Int, 24), Rounding::Truncate) => "IVP_PACKV2NX24",
            ((ElemClass::Int, 24), Rounding::RoundToNearest) => "IVP_PACKVR2NX24",
            ((ElemClass::Int, 48), Rounding::Truncate) => "IVP_PACKVNX48",
            ((ElemClass::Int, 48), Rounding::RoundToNearest) => "IVP_PACKVRNX48",
            ((ElemClass::Int, 64), Rounding::Truncate) => "IVP_PACKVN_2X64W",
            ((ElemClass::Int, 64), Rounding::RoundToNearest) => "IVP_PACKVRN_2X64W",
            _ => return None,
        },
        TargetOp::SatNarrow => {
            let template = match key {
                (ElemClass::Int, 24) => "IVP_PACKVR2NX24({0}, 0)",
                (ElemClass::Int, 48) => "IVP_PACKVRNX48({0}, 0)",
                _ => return None,
            };
            return Some(Selection::new(Emitter::Template(template), native));
        }
        TargetOp::ReduceAdd => int_family!(ty, "RADD", "RADDU").or(float_family!(ty, "RADD"))?,
        TargetOp::ReduceMin => int_family!(ty, "RMIN", "RMINU").or(float_family!(ty, "RMIN"))?,
        TargetOp::ReduceMax => int_family!(ty, "RMAX", "RMAXU").or(float_family!(ty, "RMAX"))?,
        TargetOp::DynamicShuffle => {
            if result.lanes != ty.lanes {
                return None;
            }
            int_family!(ty, "SHFL").or(float_family!(ty, "SHFL"))?
        }
    };
    let commutative = matches!(
        op,
        TargetOp::SatAdd | TargetOp::Avg | TargetOp::AvgRound | TargetOp::WidenMul | TargetOp::WidenAdd
    );
    Some(Selection::call(name, native).commutative(commutative))
}

/// Entries whose first operand spans exactly two native registers and whose result is one
/// native register. The two halves are passed as `{0}` (low lanes) and `{1}` (high lanes),
/// followed by the remaining operands.
fn paired_entry(op: Operation, ty: Type, result: Type) -> Option<Selection> {
    if !is_native(result) || !matches!(decompose(ty), Some((_, 2))) {
        return None;
    }
    let key = (ty.class, ty.bits);
    let template = match op {
        Operation::Target(TargetOp::SatNarrow) => match key {
            (ElemClass::Int, 32) => "IVP_PACKVRNX48(IVP_CVT48SNX32({1}, {0}), 0)",
            (ElemClass::Int, 16) => "IVP_PACKVR2NX24(IVP_CVT24S2NX16({1}, {0}), 0)",
            _ => return None,
        },
        Operation::Target(TargetOp::NarrowWithShift(Rounding::Truncate)) => match key {
            (ElemClass::Int, 32) => "IVP_PACKVNX48(IVP_CVT48SNX32({1}, {0}), {2})",
            (ElemClass::Int, 16) => "IVP_PACKV2NX24(IVP_CVT24S2NX16({1}, {0}), {2})",
            _ => return None,
        },
        Operation::Target(TargetOp::NarrowWithShift(Rounding::RoundToNearest)) => match key {
            (ElemClass::Int, 32) => "IVP_PACKVRNX48(IVP_CVT48SNX32({1}, {0}), {2})",
            (ElemClass::Int, 16) => "IVP_PACKVR2NX24(IVP_CVT24S2NX16({1}, {0}), {2})",
            _ => return None,
        },
        Operation::Target(TargetOp::DynamicShuffle) => {
            // Selects lanes from a two-register table.
            int_family!(result, "SEL", "SEL", "({1}, {0}, {2})")
                .or(float_family!(result, "SEL", "({1}, {0}, {2})"))?
        }
        _ => return None,
    };
    Some(Selection::new(Emitter::Template(template), EntryKind::Native).expanding())
}

fn scalar_entry(op: Operation, ty: Type) -> Option<Selection> {
    let scalar = EntryKind::Scalar;
    let emitter = match op {
        Operation::Binary(BinOp::Min) => Emitter::Call("xt_min".into()),
        Operation::Binary(BinOp::Max) => Emitter::Call("xt_max".into()),
        Operation::Binary(BinOp::Mod) if ty.is_float() => Emitter::Call("xt_fmod".into()),
        Operation::Binary(BinOp::Div) if ty.is_int() => Emitter::Call("xt_div".into()),
        Operation::Binary(BinOp::Mod) if ty.is_int() => Emitter::Call("xt_mod".into()),
        Operation::Binary(bin_op) => Emitter::Infix(bin_op.c_operator()?),
        Operation::Unary(unary_op) => match unary_op {
            UnaryOp::Neg => Emitter::Prefix("-"),
            UnaryOp::Not => Emitter::Prefix("!"),
            UnaryOp::BitNot => Emitter::Prefix("~"),
            UnaryOp::Abs => Emitter::Call("xt_abs".into()),
            UnaryOp::CountLeadingZeros => Emitter::Call("xt_clz".into()),
            UnaryOp::Sqrt => Emitter::Call("xt_sqrt".into()),
            UnaryOp::Round => Emitter::Call("xt_round".into()),
        },
        Operation::Select => Emitter::Ternary,
        Operation::Target(_) => return None,
    };
    let commutative = matches!(op, Operation::Binary(b) if b.is_commutative());
    Some(Selection::new(emitter, scalar).commutative(commutative))
}

fn generic_entry(op: Operation, ty: Type) -> Option<Selection> {
    if ty.is_accumulator() {
        return None;
    }
    let functor = match op {
        Operation::Binary(bin_op) => match bin_op {
            BinOp::Add => "std::plus<>()",
            BinOp::Sub => "std::minus<>()",
            BinOp::Mul => "std::multiplies<>()",
            BinOp::Div if ty.is_int() => "xt_div_fn()",
            BinOp::Div => "std::divides<>()",
            BinOp::Mod => "xt_mod_fn()",
            BinOp::Min => "xt_min_fn()",
            BinOp::Max => "xt_max_fn()",
            BinOp::Eq => "std::equal_to<>()",
            BinOp::Ne => "std::not_equal_to<>()",
            BinOp::Lt => "std::less<>()",
            BinOp::Le => "std::less_equal<>()",
            BinOp::Gt => "std::greater<>()",
            BinOp::Ge => "std::greater_equal<>()",
            BinOp::And => "std::logical_and<>()",
            BinOp::Or => "std::logical_or<>()",
            BinOp::BitAnd => "std::bit_and<>()",
            BinOp::BitOr => "std::bit_or<>()",
            BinOp::BitXor => "std::bit_xor<>()",
            BinOp::Shl => "xt_shl_fn()",
            BinOp::Shr => "xt_shr_fn()",
        },
        Operation::Unary(unary_op) => match unary_op {
            UnaryOp::Neg => "std::negate<>()",
            UnaryOp::Not => "std::logical_not<>()",
            UnaryOp::BitNot => "std::bit_not<>()",
            UnaryOp::Abs => "xt_abs_fn()",
            UnaryOp::CountLeadingZeros => "xt_clz_fn()",
            UnaryOp::Sqrt => "xt_sqrt_fn()",
            UnaryOp::Round => "xt_round_fn()",
        },
        Operation::Select => "xt_select_fn()",
        Operation::Target(_) => return None,
    };
    let commutative = matches!(op, Operation::Binary(b) if b.is_commutative());
    Some(Selection::new(Emitter::Lanewise(functor), EntryKind::Generic).commutative(commutative))
}

/// Reinterprets between signed and unsigned registers of the same width.
pub fn reinterpret(from: Type, to: Type) -> Option<&'static str> {
    if from.lanes != to.lanes || from.bits != to.bits || !is_native(from) {
        return None;
    }
    match (from.class, to.class, from.bits) {
        (ElemClass::Int, ElemClass::UInt, 8) => Some("xb_vec2Nx8_rtor_xb_vec2Nx8U"),
        (ElemClass::UInt, ElemClass::Int, 8) => Some("xb_vec2Nx8U_rtor_xb_vec2Nx8"),
        (ElemClass::Int, ElemClass::UInt, 16) => Some("xb_vecNx16_rtor_xb_vecNx16U"),
        (ElemClass::UInt, ElemClass::Int, 16) => Some("xb_vecNx16U_rtor_xb_vecNx16"),
        (ElemClass::Int, ElemClass::UInt, 32) => Some("xb_vecN_2x32v_rtor_xb_vecN_2x32Uv"),
        (ElemClass::UInt, ElemClass::Int, 32) => Some("xb_vecN_2x32Uv_rtor_xb_vecN_2x32v"),
        _ => None,
    }
}

/// Sign- or zero-extends the low or high half of a native register into a register of
/// twice the element width. The extension follows the signedness of the source.
pub fn widen_half(from: Type, high: bool) -> Option<&'static str> {
    if !is_native(from) {
        return None;
    }
    let (low_template, high_template) = match (from.class, from.bits) {
        (ElemClass::Int, 8) => (
            "IVP_CVT16S2NX24L(IVP_MUL2NX8({0}, int8x64_t(1)))",
            "IVP_CVT16S2NX24H(IVP_MUL2NX8({0}, int8x64_t(1)))",
        ),
        (ElemClass::UInt, 8) => (
            "IVP_CVT16U2NX24L(IVP_MULUU2NX8({0}, uint8x64_t(1)))",
            "IVP_CVT16U2NX24H(IVP_MULUU2NX8({0}, uint8x64_t(1)))",
        ),
        (ElemClass::Int, 16) => (
            "IVP_CVT32SNX48L(IVP_MULNX16({0}, int16x32_t(1)))",
            "IVP_CVT32SNX48H(IVP_MULNX16({0}, int16x32_t(1)))",
        ),
        (ElemClass::UInt, 16) => (
            "IVP_CVT32UNX48L(IVP_MULUUNX16({0}, uint16x32_t(1)))",
            "IVP_CVT32UNX48H(IVP_MULUUNX16({0}, uint16x32_t(1)))",
        ),
        _ => return None,
    };
    Some(if high { high_template } else { low_template })
}

/// Truncates two native registers (`{0}` low lanes, `{1}` high lanes) into one register of half
/// the element width, keeping the source signedness.
pub fn narrow_pair(from: Type) -> Option<&'static str> {
    if !is_native(from) {
        return None;
    }
    match (from.class, from.bits) {
        (ElemClass::Int, 16) => Some("IVP_PACKL2NX24(IVP_CVT24S2NX16({1}, {0}))"),
        (ElemClass::UInt, 16) => {
            Some("xb_vec2Nx8_rtor_xb_vec2Nx8U(IVP_PACKL2NX24(IVP_CVT24U2NX16({1}, {0})))")
        }
        (ElemClass::Int, 32) => Some("IVP_PACKLNX48(IVP_CVT48SNX32({1}, {0}))"),
        (ElemClass::UInt, 32) => {
            Some("xb_vecNx16_rtor_xb_vecNx16U(IVP_PACKLNX48(IVP_CVT48UNX32({1}, {0})))")
        }
        _ => None,
    }
}

/// Converts between 32-bit integer and 32-bit float registers.
pub fn int_float_convert(from: Type, to: Type) -> Option<&'static str> {
    if !is_native(from) || from.lanes != to.lanes || from.bits != 32 || to.bits != 32 {
        return None;
    }
    match (from.class, to.class) {
        (ElemClass::Int, ElemClass::Float) => Some("IVP_FLOATN_2X32({0}, 0)"),
        (ElemClass::UInt, ElemClass::Float) => Some("IVP_UFLOATN_2X32({0}, 0)"),
        (ElemClass::Float, ElemClass::Int) => Some("IVP_TRUNCN_2XF32({0}, 0)"),
        (ElemClass::Float, ElemClass::UInt) => Some("IVP_UTRUNCN_2XF32({0}, 0)"),
        _ => None,
    }
}

/// Splits a predicate register into its low or high half.
pub fn split_mask(mask: Type, high: bool) -> Option<&'static str> {
    match (mask.lanes, high) {
        (64, false) => Some("IVP_EXTRACTBL2N"),
        (64, true) => Some("IVP_EXTRACTBH2N"),
        (32, false) => Some("IVP_EXTRACTBLN"),
        (32, true) => Some("IVP_EXTRACTBHN"),
        _ => None,
    }
    .filter(|_| mask.is_bool())
}

/// Joins two predicate registers (`{0}` low lanes, `{1}` high lanes) into one of twice the
/// lane count.
pub fn join_masks(half: Type) -> Option<&'static str> {
    match (half.class, half.lanes) {
        (ElemClass::Bool, 16) => Some("IVP_JOINBN_2({1}, {0})"),
        (ElemClass::Bool, 32) => Some("IVP_JOINBN({1}, {0})"),
        _ => None,
    }
}

/// The register-select intrinsic used by the shuffle lowering, e.g. `IVP_SELNX16I`.
pub fn select_immediate(ty: Type) -> Option<&'static str> {
    int_family!(ty, "SEL", "SEL", "I").or(float_family!(ty, "SEL", "I"))
}

/// The lane-width tag used by select immediates, e.g. `16B` in `IVP_SELI_16B_INTERLEAVE_1_LO`.
pub fn select_width_tag(ty: Type) -> Option<&'static str> {
    match ty.bits {
        8 => Some("8B"),
        16 => Some("16B"),
        32 => Some("32B"),
        _ => None,
    }
}

/// The ascending-sequence intrinsic for dense ramps.
pub fn sequence(ty: Type) -> Option<&'static str> {
    if !is_native(ty) {
        return None;
    }
    match (ty.class, ty.bits) {
        (ElemClass::Int, 16) => Some("IVP_SEQNX16"),
        (ElemClass::UInt, 16) => Some("IVP_SEQNX16U"),
        (ElemClass::Int, 32) => Some("IVP_SEQN_2X32"),
        (ElemClass::UInt, 32) => Some("IVP_SEQN_2X32U"),
        _ => None,
    }
}

/// The zeroing intrinsic for wide accumulator registers.
pub fn zero_accumulator(ty: Type) -> Option<&'static str> {
    if !is_native(ty) {
        return None;
    }
    match (ty.class, ty.bits) {
        (ElemClass::Int, 24) => Some("IVP_ZERO2NX24"),
        (ElemClass::Int, 48) => Some("IVP_ZERONX48"),
        (ElemClass::Int, 64) => Some("IVP_ZERON_2X64W"),
        _ => None,
    }
}
