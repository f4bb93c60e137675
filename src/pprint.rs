//! Human-readable rendering of the IR, used in diagnostics and in the optional IR comment above
//! each generated function.

use itertools::Itertools;
use std::fmt;

use crate::common::ElemClass;
use crate::ir::{BinOp, Callee, Expr, ForKind, Stmt, UnaryOp};
use crate::utils::indent;

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm { ty, value } if ty.is_scalar() => write!(f, "{}", value),
            Expr::UIntImm { ty, value } if ty.is_scalar() => match ty.class {
                ElemClass::Bool => write!(f, "{}", *value != 0),
                _ => write!(f, "{}u", value),
            },
            Expr::FloatImm { ty, value } if ty.is_scalar() => write!(f, "{:?}f", value),
            Expr::IntImm { ty, value } => write!(f, "{}({})", ty, value),
            Expr::UIntImm { ty, value } => write!(f, "{}({})", ty, value),
            Expr::FloatImm { ty, value } => write!(f, "{}({:?})", ty, value),
            Expr::Var { name, .. } => write!(f, "{}", name),
            Expr::Unary { op, a } => match op {
                UnaryOp::Neg => write!(f, "-{}", a),
                UnaryOp::Not => write!(f, "!{}", a),
                UnaryOp::BitNot => write!(f, "~{}", a),
                UnaryOp::Abs => write!(f, "abs({})", a),
                UnaryOp::CountLeadingZeros => write!(f, "count_leading_zeros({})", a),
                UnaryOp::Sqrt => write!(f, "sqrt({})", a),
                UnaryOp::Round => write!(f, "round({})", a),
            },
            Expr::Binary { op, a, b } => match (op, op.c_operator()) {
                (BinOp::Min, _) => write!(f, "min({}, {})", a, b),
                (BinOp::Max, _) => write!(f, "max({}, {})", a, b),
                (_, Some(symbol)) => write!(f, "({} {} {})", a, symbol, b),
                (_, None) => write!(f, "{:?}({}, {})", op, a, b),
            },
            Expr::Select { cond, t, f: fv } => write!(f, "select({}, {}, {})", cond, t, fv),
            Expr::Cast { ty, value } => write!(f, "{}({})", ty, value),
            Expr::Reinterpret { ty, value } => write!(f, "reinterpret<{}>({})", ty, value),
            Expr::Broadcast { value, lanes } => write!(f, "x{}({})", lanes, value),
            Expr::Ramp {
                base,
                stride,
                lanes,
            } => write!(f, "ramp({}, {}, {})", base, stride, lanes),
            Expr::Load {
                buffer,
                index,
                predicate,
                ..
            } => {
                write!(f, "{}[{}]", buffer, index)?;
                if let Some(predicate) = predicate {
                    write!(f, " if {}", predicate)?;
                }
                Ok(())
            }
            Expr::Shuffle { vectors, indices } => write!(
                f,
                "shuffle({}; {})",
                vectors.iter().join(", "),
                indices.iter().join(", ")
            ),
            Expr::Call { callee, args, .. } => {
                match callee {
                    Callee::Extern { name, .. } => write!(f, "{}", name)?,
                    Callee::Target(op) => write!(f, "{:?}", op)?,
                    Callee::DmaCopy1d => write!(f, "dma_copy_1d")?,
                    Callee::DmaWait => write!(f, "dma_wait")?,
                    Callee::Prefetch => write!(f, "prefetch")?,
                }
                write!(f, "({})", args.iter().join(", "))
            }
            Expr::Let { name, value, body } => write!(f, "(let {} = {} in {})", name, value, body),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_stmt(self, f, 0)
    }
}

fn fmt_stmt(stmt: &Stmt, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let pad = indent(depth);
    match stmt {
        Stmt::Store {
            buffer,
            index,
            value,
            predicate,
            ..
        } => {
            write!(f, "{}{}[{}] = {}", pad, buffer, index, value)?;
            if let Some(predicate) = predicate {
                write!(f, " if {}", predicate)?;
            }
            writeln!(f)
        }
        Stmt::For {
            var,
            min,
            extent,
            kind,
            body,
        } => {
            let kind = match kind {
                ForKind::Serial => "",
                ForKind::Parallel => "parallel ",
                ForKind::Vectorized => "vectorized ",
                ForKind::Unrolled => "unrolled ",
                ForKind::GpuBlock => "gpu_block ",
                ForKind::GpuThread => "gpu_thread ",
            };
            writeln!(f, "{}{}for ({}, {}, {}) {{", pad, kind, var, min, extent)?;
            fmt_stmt(body, f, depth + 1)?;
            writeln!(f, "{}}}", pad)
        }
        Stmt::Allocate {
            name,
            ty,
            memory,
            extents,
            condition,
            body,
            ..
        } => {
            write!(f, "{}allocate {}[{}", pad, name, ty)?;
            for extent in extents {
                write!(f, " * {}", extent)?;
            }
            write!(f, "] in {:?}", memory)?;
            if !condition.is_const_true() {
                write!(f, " if {}", condition)?;
            }
            writeln!(f, " {{")?;
            fmt_stmt(body, f, depth + 1)?;
            writeln!(f, "{}}}", pad)
        }
        Stmt::Free { name } => writeln!(f, "{}free {}", pad, name),
        Stmt::Block(stmts) => {
            for s in stmts {
                fmt_stmt(s, f, depth)?;
            }
            Ok(())
        }
        Stmt::IfThenElse {
            cond,
            then_case,
            else_case,
        } => {
            writeln!(f, "{}if ({}) {{", pad, cond)?;
            fmt_stmt(then_case, f, depth + 1)?;
            if let Some(else_case) = else_case {
                writeln!(f, "{}}} else {{", pad)?;
                fmt_stmt(else_case, f, depth + 1)?;
            }
            writeln!(f, "{}}}", pad)
        }
        Stmt::LetStmt { name, value, body } => {
            writeln!(f, "{}let {} = {}", pad, name, value)?;
            fmt_stmt(body, f, depth)
        }
        Stmt::Evaluate(e) => writeln!(f, "{}{}", pad, e),
        Stmt::Assert { condition, message } => {
            writeln!(f, "{}assert({}, {:?})", pad, condition, message)
        }
        Stmt::Atomic { body } => {
            writeln!(f, "{}atomic {{", pad)?;
            fmt_stmt(body, f, depth + 1)?;
            writeln!(f, "{}}}", pad)
        }
        Stmt::Return(code) => writeln!(f, "{}return {}", pad, code),
    }
}
