//! The typed vector IR consumed by the code generator.
//!
//! Expressions and statements are produced by an external front end; every expression carries
//! (or derives) a [Type].

use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::common::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumIter)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Abs,
    CountLeadingZeros,
    Sqrt,
    Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumIter)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Rounding {
    #[default]
    Truncate,
    RoundToNearest,
}

/// Target-specific operations introduced by the instruction-selection pattern matcher that runs
/// ahead of this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumIter)]
pub enum TargetOp {
    SatAdd,
    SatSub,
    Avg,
    AvgRound,
    AbsDiff,
    WidenMul,
    WidenPairMul,
    WidenAdd,
    WidenMulAdd,
    ConvertLow,
    ConvertHigh,
    NarrowWithShift(Rounding),
    SatNarrow,
    ReduceAdd,
    ReduceMin,
    ReduceMax,
    DynamicShuffle,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Callee {
    Extern { name: String, pure: bool },
    Target(TargetOp),
    /// `(dst, dst_offset, src, src_offset, elements, element_bytes)`
    DmaCopy1d,
    /// `(transfer_id)`
    DmaWait,
    Prefetch,
}

/// Known alignment of an index: `index = modulus * k + remainder` for some integer `k`.
///
/// A modulus of zero means the index is exactly `remainder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ModulusRemainder {
    pub modulus: i64,
    pub remainder: i64,
}

impl ModulusRemainder {
    pub const UNKNOWN: ModulusRemainder = ModulusRemainder {
        modulus: 1,
        remainder: 0,
    };

    pub const fn new(modulus: i64, remainder: i64) -> Self {
        ModulusRemainder { modulus, remainder }
    }
}

impl Default for ModulusRemainder {
    fn default() -> Self {
        ModulusRemainder::UNKNOWN
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Expr {
    IntImm {
        ty: Type,
        value: i64,
    },
    UIntImm {
        ty: Type,
        value: u64,
    },
    FloatImm {
        ty: Type,
        value: f64,
    },
    Var {
        ty: Type,
        name: String,
    },
    Unary {
        op: UnaryOp,
        a: Box<Expr>,
    },
    Binary {
        op: BinOp,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    Select {
        cond: Box<Expr>,
        t: Box<Expr>,
        f: Box<Expr>,
    },
    Cast {
        ty: Type,
        value: Box<Expr>,
    },
    Reinterpret {
        ty: Type,
        value: Box<Expr>,
    },
    Broadcast {
        value: Box<Expr>,
        lanes: u32,
    },
    Ramp {
        base: Box<Expr>,
        stride: Box<Expr>,
        lanes: u32,
    },
    Load {
        ty: Type,
        buffer: String,
        index: Box<Expr>,
        alignment: ModulusRemainder,
        predicate: Option<Box<Expr>>,
    },
    Shuffle {
        vectors: Vec<Expr>,
        indices: Vec<i32>,
    },
    Call {
        ty: Type,
        callee: Callee,
        args: Vec<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ForKind {
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
    GpuBlock,
    GpuThread,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum MemoryType {
    #[default]
    Auto,
    Stack,
    Register,
    Heap,
    /// Tightly-coupled on-chip memory, filled and drained by the DMA engine.
    Scratchpad,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Stmt {
    Store {
        buffer: String,
        index: Expr,
        value: Expr,
        alignment: ModulusRemainder,
        predicate: Option<Expr>,
    },
    For {
        var: String,
        min: Expr,
        extent: Expr,
        kind: ForKind,
        body: Box<Stmt>,
    },
    Allocate {
        name: String,
        ty: Type,
        memory: MemoryType,
        extents: Vec<Expr>,
        condition: Expr,
        new_expr: Option<Expr>,
        free_function: Option<String>,
        body: Box<Stmt>,
    },
    Free {
        name: String,
    },
    Block(Vec<Stmt>),
    IfThenElse {
        cond: Expr,
        then_case: Box<Stmt>,
        else_case: Option<Box<Stmt>>,
    },
    LetStmt {
        name: String,
        value: Expr,
        body: Box<Stmt>,
    },
    Evaluate(Expr),
    Assert {
        condition: Expr,
        message: String,
    },
    Atomic {
        body: Box<Stmt>,
    },
    /// Leaves the function early with the given status.
    Return(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Linkage {
    #[default]
    External,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum Arg {
    Scalar { name: String, ty: Type },
    Buffer { name: String, elem: Type },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoweredFunc {
    pub name: String,
    pub args: Vec<Arg>,
    pub body: Stmt,
    pub linkage: Linkage,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<LoweredFunc>,
}

impl BinOp {
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub const fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Mul
                | BinOp::Min
                | BinOp::Max
                | BinOp::Eq
                | BinOp::Ne
                | BinOp::And
                | BinOp::Or
                | BinOp::BitAnd
                | BinOp::BitOr
                | BinOp::BitXor
        )
    }

    /// The C operator for scalar operands, if the operation has one.
    pub const fn c_operator(&self) -> Option<&'static str> {
        match self {
            BinOp::Add => Some("+"),
            BinOp::Sub => Some("-"),
            BinOp::Mul => Some("*"),
            BinOp::Div => Some("/"),
            BinOp::Mod => Some("%"),
            BinOp::Eq => Some("=="),
            BinOp::Ne => Some("!="),
            BinOp::Lt => Some("<"),
            BinOp::Le => Some("<="),
            BinOp::Gt => Some(">"),
            BinOp::Ge => Some(">="),
            BinOp::And => Some("&&"),
            BinOp::Or => Some("||"),
            BinOp::BitAnd => Some("&"),
            BinOp::BitOr => Some("|"),
            BinOp::BitXor => Some("^"),
            BinOp::Shl => Some("<<"),
            BinOp::Shr => Some(">>"),
            BinOp::Min | BinOp::Max => None,
        }
    }
}

impl TargetOp {
    /// Returns `true` if the operation maps lanes of its operands to the same lanes of its
    /// result, so that wide operands can be processed one native register at a time.
    pub const fn is_lanewise(&self) -> bool {
        matches!(
            self,
            TargetOp::SatAdd
                | TargetOp::SatSub
                | TargetOp::Avg
                | TargetOp::AvgRound
                | TargetOp::AbsDiff
                | TargetOp::WidenMul
                | TargetOp::WidenPairMul
                | TargetOp::WidenAdd
                | TargetOp::WidenMulAdd
                | TargetOp::NarrowWithShift(_)
                | TargetOp::SatNarrow
        )
    }
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntImm { ty, .. }
            | Expr::UIntImm { ty, .. }
            | Expr::FloatImm { ty, .. }
            | Expr::Var { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::Reinterpret { ty, .. }
            | Expr::Load { ty, .. }
            | Expr::Call { ty, .. } => *ty,
            Expr::Unary { a, .. } => a.ty(),
            Expr::Binary { op, a, .. } => {
                let a_ty = a.ty();
                if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
                    Type::bool(a_ty.lanes)
                } else {
                    a_ty
                }
            }
            Expr::Select { t, .. } => t.ty(),
            Expr::Broadcast { value, lanes } => value.ty().with_lanes(*lanes),
            Expr::Ramp { base, lanes, .. } => base.ty().with_lanes(*lanes),
            Expr::Shuffle { vectors, indices } => {
                let lanes = u32::try_from(indices.len()).unwrap_or(u32::MAX);
                vectors
                    .first()
                    .map_or(Type::bool(lanes), |v| v.ty().with_lanes(lanes))
            }
            Expr::Let { body, .. } => body.ty(),
        }
    }

    pub fn int(ty: Type, value: i64) -> Expr {
        if ty.is_uint() {
            Expr::UIntImm {
                ty,
                value: value as u64,
            }
        } else {
            Expr::IntImm { ty, value }
        }
    }

    pub fn i32(value: i64) -> Expr {
        Expr::int(Type::int(32, 1), value)
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Expr {
        Expr::Var {
            ty,
            name: name.into(),
        }
    }

    pub fn unary(op: UnaryOp, a: Expr) -> Expr {
        Expr::Unary { op, a: Box::new(a) }
    }

    pub fn binary(op: BinOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary {
            op,
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn select(cond: Expr, t: Expr, f: Expr) -> Expr {
        Expr::Select {
            cond: Box::new(cond),
            t: Box::new(t),
            f: Box::new(f),
        }
    }

    pub fn cast(ty: Type, value: Expr) -> Expr {
        Expr::Cast {
            ty,
            value: Box::new(value),
        }
    }

    pub fn broadcast(value: Expr, lanes: u32) -> Expr {
        Expr::Broadcast {
            value: Box::new(value),
            lanes,
        }
    }

    pub fn ramp(base: Expr, stride: Expr, lanes: u32) -> Expr {
        Expr::Ramp {
            base: Box::new(base),
            stride: Box::new(stride),
            lanes,
        }
    }

    pub fn load(ty: Type, buffer: impl Into<String>, index: Expr) -> Expr {
        Expr::Load {
            ty,
            buffer: buffer.into(),
            index: Box::new(index),
            alignment: ModulusRemainder::UNKNOWN,
            predicate: None,
        }
    }

    /// A dense vector load of `lanes` elements starting at `base`.
    pub fn dense_load(
        elem: Type,
        buffer: impl Into<String>,
        base: Expr,
        lanes: u32,
        alignment: ModulusRemainder,
    ) -> Expr {
        Expr::Load {
            ty: elem.with_lanes(lanes),
            buffer: buffer.into(),
            index: Box::new(Expr::ramp(base, Expr::i32(1), lanes)),
            alignment,
            predicate: None,
        }
    }

    pub fn call(ty: Type, callee: Callee, args: Vec<Expr>) -> Expr {
        Expr::Call { ty, callee, args }
    }

    /// Returns the integer value of a constant or a broadcast constant.
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Expr::IntImm { value, .. } => Some(*value),
            Expr::UIntImm { value, .. } => i64::try_from(*value).ok(),
            Expr::Broadcast { value, .. } => value.as_const_int(),
            _ => None,
        }
    }

    pub fn is_const_true(&self) -> bool {
        self.ty().is_bool() && self.as_const_int().is_some_and(|v| v != 0)
    }

    pub fn bool(value: bool) -> Expr {
        Expr::UIntImm {
            ty: Type::bool(1),
            value: u64::from(value),
        }
    }
}

impl Stmt {
    pub fn block(stmts: Vec<Stmt>) -> Stmt {
        Stmt::Block(stmts)
    }

    pub fn store(buffer: impl Into<String>, index: Expr, value: Expr) -> Stmt {
        Stmt::Store {
            buffer: buffer.into(),
            index,
            value,
            alignment: ModulusRemainder::UNKNOWN,
            predicate: None,
        }
    }

    /// A dense vector store of `value` starting at `base`.
    pub fn dense_store(
        buffer: impl Into<String>,
        base: Expr,
        value: Expr,
        alignment: ModulusRemainder,
    ) -> Stmt {
        let lanes = value.ty().lanes;
        Stmt::Store {
            buffer: buffer.into(),
            index: Expr::ramp(base, Expr::i32(1), lanes),
            value,
            alignment,
            predicate: None,
        }
    }

    pub fn serial_for(var: impl Into<String>, min: Expr, extent: Expr, body: Stmt) -> Stmt {
        Stmt::For {
            var: var.into(),
            min,
            extent,
            kind: ForKind::Serial,
            body: Box::new(body),
        }
    }
}
