use itertools::Itertools;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

use crate::common::Type;
use crate::utils::indent;

pub type Operands = SmallVec<[String; 4]>;

/// How the right-hand side of an assignment is spelled in C.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Emitter {
    /// `name(a, b, ...)`
    Call(Cow<'static, str>),
    /// A fixed C snippet whose `{0}`, `{1}`, ... placeholders are replaced by operands.
    Template(&'static str),
    /// `a op b`
    Infix(&'static str),
    /// `op a`
    Prefix(&'static str),
    /// `a ? b : c`
    Ternary,
    /// `(T)a`, where `T` is the assigned type.
    Cast,
    /// `T(a)`, broadcasting a scalar into every lane of `T`.
    Splat,
    /// Rebuilds a composite vector from its native components, lowest lanes first.
    Construct,
    /// Software emulation applying a scalar functor to each lane in turn.
    Lanewise(&'static str),
    /// `a[b]`
    Index,
    /// The single operand, verbatim.
    Operand,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rhs {
    pub emitter: Emitter,
    pub args: Operands,
}

/// A scoped resource whose release must run on every exit path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Guard {
    /// The DMA engine, acquired once per function.
    Dma,
    /// A heap or scratchpad allocation released through `free_fn`.
    Free { ptr: String, free_fn: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CStmt {
    Assign {
        ty: Type,
        name: String,
        rhs: Rhs,
    },
    Exec(String),
    IndexTable {
        name: String,
        values: Vec<i32>,
    },
    StackArray {
        name: String,
        elem: Type,
        size: u64,
    },
    PtrDecl {
        name: String,
        elem: Type,
        init: String,
    },
    Acquire {
        id: String,
        guard: Guard,
    },
    Release {
        id: String,
        guard: Guard,
    },
    For {
        var: String,
        min: String,
        extent: String,
        pragma: Option<&'static str>,
        body: Vec<CStmt>,
    },
    If {
        cond: String,
        then_body: Vec<CStmt>,
        else_body: Vec<CStmt>,
    },
    Scope {
        pragma: Option<&'static str>,
        body: Vec<CStmt>,
    },
    Pragma(&'static str),
    Comment(String),
    Goto(String),
    /// A label followed by an empty statement.
    Label(String),
    Return(ReturnValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnValue {
    Code(i32),
    Var(String),
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Code(code) => write!(f, "{}", code),
            ReturnValue::Var(var) => write!(f, "{}", var),
        }
    }
}

impl Rhs {
    pub fn new(emitter: Emitter, args: impl IntoIterator<Item = String>) -> Self {
        Rhs {
            emitter,
            args: args.into_iter().collect(),
        }
    }

    pub fn call(name: impl Into<Cow<'static, str>>, args: impl IntoIterator<Item = String>) -> Self {
        Rhs::new(Emitter::Call(name.into()), args)
    }

    pub fn operand(value: impl Into<String>) -> Self {
        Rhs::new(Emitter::Operand, [value.into()])
    }

    /// The name of the called function, if the right-hand side is a plain call.
    pub fn callee(&self) -> Option<&str> {
        match &self.emitter {
            Emitter::Call(name) => Some(name),
            _ => None,
        }
    }

    /// Renders the right-hand side for an assignment of type `ty`.
    pub fn render(&self, ty: Type) -> String {
        let arg = |i: usize| self.args.get(i).map_or("", String::as_str);
        match &self.emitter {
            Emitter::Call(name) => format!("{}({})", name, self.args.iter().join(", ")),
            Emitter::Template(template) => {
                let mut out = (*template).to_string();
                for (i, a) in self.args.iter().enumerate() {
                    out = out.replace(&format!("{{{}}}", i), a);
                }
                out
            }
            Emitter::Infix(op) => format!("{} {} {}", arg(0), op, arg(1)),
            Emitter::Prefix(op) => format!("{}{}", op, arg(0)),
            Emitter::Ternary => format!("{} ? {} : {}", arg(0), arg(1), arg(2)),
            Emitter::Cast => format!("({}){}", ty.c_name(), arg(0)),
            Emitter::Splat => format!("{}({})", ty.c_name(), arg(0)),
            Emitter::Construct => format!(
                "{0}({0}::from_native_vector, {1})",
                ty.c_name(),
                self.args.iter().join(", ")
            ),
            Emitter::Lanewise(functor) => format!(
                "xt_lanewise<{}>({}, {})",
                ty.c_name(),
                functor,
                self.args.iter().join(", ")
            ),
            Emitter::Index => format!("{}[{}]", arg(0), arg(1)),
            Emitter::Operand => arg(0).to_string(),
        }
    }
}

impl CStmt {
    pub fn emit<W: fmt::Write>(&self, w: &mut W, depth: usize) -> fmt::Result {
        match self {
            CStmt::Assign { ty, name, rhs } => {
                writeln!(
                    w,
                    "{}{} {} = {};",
                    indent(depth),
                    ty.c_name(),
                    name,
                    rhs.render(*ty)
                )
            }
            CStmt::Exec(s) => writeln!(w, "{}{};", indent(depth), s),
            CStmt::IndexTable { name, values } => writeln!(
                w,
                "{}static const int32_t {}[{}] __attribute__((aligned(64))) = {{{}}};",
                indent(depth),
                name,
                values.len(),
                values.iter().join(", ")
            ),
            CStmt::StackArray { name, elem, size } => writeln!(
                w,
                "{}{} {}[{}] __attribute__((aligned(64)));",
                indent(depth),
                elem.c_scalar_name(),
                name,
                size
            ),
            CStmt::PtrDecl { name, elem, init } => writeln!(
                w,
                "{0}{1} *{2} = ({1} *){3};",
                indent(depth),
                elem.c_scalar_name(),
                name,
                init
            ),
            CStmt::Acquire { id, guard } => match guard {
                Guard::Dma => {
                    writeln!(w, "{}xt_dma_guard {} = xt_dma_open(_ucon);", indent(depth), id)?;
                    writeln!(w, "{}if (!{}.held) {{", indent(depth), id)?;
                    writeln!(
                        w,
                        "{}xt_print(_ucon, \"DMA engine is unavailable\\n\");",
                        indent(depth + 1)
                    )?;
                    writeln!(w, "{}}}", indent(depth))
                }
                Guard::Free { ptr, free_fn } => writeln!(
                    w,
                    "{}xt_release_guard {} = {{{}, {}}};",
                    indent(depth),
                    id,
                    ptr,
                    free_fn
                ),
            },
            CStmt::Release { id, guard } => match guard {
                Guard::Dma => writeln!(w, "{}xt_dma_close(_ucon, &{});", indent(depth), id),
                Guard::Free { .. } => writeln!(w, "{}xt_release(_ucon, &{});", indent(depth), id),
            },
            CStmt::For {
                var,
                min,
                extent,
                pragma,
                body,
            } => {
                if let Some(pragma) = pragma {
                    writeln!(w, "{}#pragma {}", indent(depth), pragma)?;
                }
                writeln!(
                    w,
                    "{0}for (int {1} = {2}; {1} < {2} + {3}; {1}++) {{",
                    indent(depth),
                    var,
                    min,
                    extent
                )?;
                emit_block(w, body, depth + 1)?;
                writeln!(w, "{}}}", indent(depth))
            }
            CStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                writeln!(w, "{}if ({}) {{", indent(depth), cond)?;
                emit_block(w, then_body, depth + 1)?;
                if !else_body.is_empty() {
                    writeln!(w, "{}}} else {{", indent(depth))?;
                    emit_block(w, else_body, depth + 1)?;
                }
                writeln!(w, "{}}}", indent(depth))
            }
            CStmt::Scope { pragma, body } => {
                if let Some(pragma) = pragma {
                    writeln!(w, "{}#pragma {}", indent(depth), pragma)?;
                }
                writeln!(w, "{}{{", indent(depth))?;
                emit_block(w, body, depth + 1)?;
                writeln!(w, "{}}}", indent(depth))
            }
            CStmt::Pragma(pragma) => writeln!(w, "{}#pragma {}", indent(depth), pragma),
            CStmt::Comment(text) => writeln!(w, "{}// {}", indent(depth), text),
            CStmt::Goto(label) => writeln!(w, "{}goto {};", indent(depth), label),
            CStmt::Label(label) => writeln!(w, "{}{}:;", indent(depth), label),
            CStmt::Return(value) => writeln!(w, "{}return {};", indent(depth), value),
        }
    }

    /// Calls `f` on this statement and every statement nested inside it, parents first.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a CStmt)) {
        f(self);
        match self {
            CStmt::For { body, .. } | CStmt::Scope { body, .. } => {
                body.iter().for_each(|s| s.visit(f));
            }
            CStmt::If {
                then_body,
                else_body,
                ..
            } => {
                then_body.iter().for_each(|s| s.visit(f));
                else_body.iter().for_each(|s| s.visit(f));
            }
            _ => {}
        }
    }
}

pub fn emit_block<W: fmt::Write>(w: &mut W, stmts: &[CStmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        stmt.emit(w, depth)?;
    }
    Ok(())
}
