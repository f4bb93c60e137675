use log::debug;
use std::collections::HashMap;
use std::fmt::{self, Write as _};

use super::c_utils::{emit_block, CStmt, Guard, ReturnValue, Rhs};
use super::expr::Value;
use super::header::HeaderEmitter;
use super::memory::Allocation;
use super::namegen::NameGenerator;
use super::{CodeGenError, CodeGenOptions, ValueCache};
use crate::common::Type;
use crate::ir::{Arg, Linkage, LoweredFunc};
use crate::utils::{c_name, c_string_literal, indent, LinePrefixWrite};

/// Lowers one function at a time into a tree of [CStmt].
///
/// All state is per function: the value cache, the allocation table, and the stack of live
/// guards are never shared, so independent functions can be lowered on separate threads.
pub struct XtensaCodeGenerator<'a> {
    pub(super) options: &'a CodeGenOptions,
    pub(super) namer: NameGenerator,
    pub(super) cache: ValueCache,
    pub headers: HeaderEmitter,
    body: Vec<CStmt>,
    nested: Vec<Vec<CStmt>>,
    pub(super) allocations: HashMap<String, Allocation>,
    pub(super) buffers: HashMap<String, Type>,
    pub(super) bindings: HashMap<String, Value>,
    pub(super) guards: Vec<LiveGuard>,
    pub(super) loops: Vec<LoopFrame>,
    pub(super) in_atomic: bool,
}

/// A guard whose release has not been emitted on the fall-through path.
#[derive(Debug, Clone)]
pub(super) struct LiveGuard {
    pub id: String,
    pub guard: Guard,
    /// Block nesting depth at which the guard was acquired.
    pub depth: usize,
}

/// An enclosing parallel loop. Early exits from its body cannot return, so they record a
/// status and jump to `label` at the end of the iteration.
#[derive(Debug, Clone)]
pub(super) struct LoopFrame {
    pub guard_depth: usize,
    pub status: String,
    pub label: String,
    pub used: bool,
}

/// A lowered function, ready to print.
#[derive(Debug, Clone)]
pub struct CFunction {
    pub name: String,
    pub linkage: Linkage,
    pub args: Vec<Arg>,
    pub body: Vec<CStmt>,
    pub ir_comment: Option<String>,
}

impl<'a> XtensaCodeGenerator<'a> {
    pub fn new(options: &'a CodeGenOptions) -> Self {
        XtensaCodeGenerator {
            options,
            namer: NameGenerator::new(),
            cache: ValueCache::new(),
            headers: HeaderEmitter::new(),
            body: vec![],
            nested: vec![],
            allocations: HashMap::new(),
            buffers: HashMap::new(),
            bindings: HashMap::new(),
            guards: vec![],
            loops: vec![],
            in_atomic: false,
        }
    }

    pub fn compile_function(&mut self, f: &LoweredFunc) -> Result<CFunction, CodeGenError> {
        for arg in &f.args {
            if let Arg::Buffer { name, elem } = arg {
                self.buffers.insert(name.clone(), *elem);
            }
        }
        if self.options.dma_scope {
            self.acquire(Guard::Dma);
        }
        self.lower_stmt(&f.body)?;
        self.emit_exit(ReturnValue::Code(0));
        debug!(
            "Lowered {} into {} top-level statements",
            f.name,
            self.body.len()
        );

        Ok(CFunction {
            name: f.name.clone(),
            linkage: f.linkage,
            args: f.args.clone(),
            body: std::mem::take(&mut self.body),
            ir_comment: self.options.include_ir.then(|| f.body.to_string()),
        })
    }

    /// Appends a statement to the innermost open block.
    pub(super) fn push(&mut self, stmt: CStmt) {
        self.nested.last_mut().unwrap_or(&mut self.body).push(stmt);
    }

    /// Starts collecting statements into a new nested block, which is also a new value cache
    /// scope.
    pub(super) fn open_block(&mut self) {
        self.nested.push(vec![]);
        self.cache.push_scope();
    }

    pub(super) fn close_block(&mut self) -> Vec<CStmt> {
        self.cache.pop_scope();
        self.nested.pop().unwrap_or_default()
    }

    pub(super) fn depth(&self) -> usize {
        self.nested.len()
    }

    /// Returns a temporary holding `rhs`, reusing a live one when possible.
    pub(super) fn assign(&mut self, ty: Type, rhs: Rhs, commutative: bool) -> String {
        self.headers.note_type(ty);
        let out = self.nested.last_mut().unwrap_or(&mut self.body);
        self.cache.assign(ty, rhs, commutative, &mut self.namer, out)
    }

    /// Assigns `rhs` to a fresh temporary without consulting or populating the cache.
    pub(super) fn assign_uncached(&mut self, ty: Type, rhs: Rhs) -> String {
        self.headers.note_type(ty);
        let name = self.namer.fresh_name();
        self.push(CStmt::Assign {
            ty,
            name: name.clone(),
            rhs,
        });
        name
    }

    pub(super) fn acquire(&mut self, guard: Guard) -> String {
        let id = self.namer.fresh_name();
        self.push(CStmt::Acquire {
            id: id.clone(),
            guard: guard.clone(),
        });
        self.guards.push(LiveGuard {
            id: id.clone(),
            guard,
            depth: self.depth(),
        });
        id
    }

    /// Releases a live guard on the fall-through path.
    pub(super) fn release(&mut self, id: &str) {
        if let Some(pos) = self.guards.iter().position(|g| g.id == id) {
            let live = self.guards.remove(pos);
            self.push(CStmt::Release {
                id: live.id,
                guard: live.guard,
            });
        }
    }

    /// Emits releases for every guard from `from` onwards, newest first, leaving them live for
    /// the paths that do not take this exit.
    fn release_live_guards(&mut self, from: usize) {
        let releases = self.guards[from.min(self.guards.len())..]
            .iter()
            .rev()
            .map(|g| CStmt::Release {
                id: g.id.clone(),
                guard: g.guard.clone(),
            })
            .collect::<Vec<_>>();
        for release in releases {
            self.push(release);
        }
    }

    /// Leaves the function with `value`, releasing every live guard first.
    ///
    /// Inside a parallel loop the exit is deferred: the guards acquired in the loop body are
    /// released, the status is recorded, and control jumps to the end of the iteration. The
    /// check after the loop performs the actual return.
    pub(super) fn emit_exit(&mut self, value: ReturnValue) {
        if let Some(frame) = self.loops.last_mut() {
            frame.used = true;
            let (guard_depth, status, label) =
                (frame.guard_depth, frame.status.clone(), frame.label.clone());
            self.release_live_guards(guard_depth);
            self.push(CStmt::Pragma("omp atomic write"));
            self.push(CStmt::Exec(format!("{} = {}", status, value)));
            self.push(CStmt::Goto(label));
        } else {
            self.release_live_guards(0);
            self.push(CStmt::Return(value));
        }
    }

    /// Reports `message` through the runtime and exits with status -1.
    pub(super) fn emit_failure(&mut self, message: &str) {
        self.push(CStmt::Exec(format!(
            "xt_error(_ucon, {})",
            c_string_literal(message)
        )));
        self.emit_exit(ReturnValue::Code(-1));
    }

    #[cfg(test)]
    pub(super) fn emitted(&self) -> &[CStmt] {
        &self.body
    }

    /// The declared element type of a buffer argument or live allocation.
    pub(super) fn buffer_elem(&self, name: &str) -> Result<Type, CodeGenError> {
        self.allocations
            .get(name)
            .map(|a| a.elem)
            .or_else(|| self.buffers.get(name).copied())
            .ok_or_else(|| CodeGenError::MalformedIr(format!("unknown buffer `{}`", name)))
    }
}

impl CFunction {
    pub fn emit<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        if let Some(ir) = &self.ir_comment {
            let mut commented = LinePrefixWrite::new(&mut *out, "// ");
            writeln!(commented, "{}", ir.trim_end())?;
        }

        let params = self
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Scalar { name, ty } => format!("{} {}", ty.c_name(), c_name(name)),
                Arg::Buffer { name, elem } => {
                    format!("{} *__restrict {}", elem.c_scalar_name(), c_name(name))
                }
            })
            .collect::<Vec<_>>();
        let linkage = match self.linkage {
            Linkage::External => "",
            Linkage::Internal => "static ",
        };
        writeln!(out, "{}int {}({}) {{", linkage, self.name, params.join(", "))?;
        writeln!(out, "{}void * const _ucon = nullptr;", indent(1))?;
        emit_block(out, &self.body, 1)?;
        writeln!(out, "}}")
    }

    /// Every statement in the body, parents before children.
    pub fn statements(&self) -> Vec<&CStmt> {
        let mut all = vec![];
        for stmt in &self.body {
            stmt.visit(&mut |s| all.push(s));
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Stmt};

    fn function(args: Vec<Arg>, body: Stmt) -> LoweredFunc {
        LoweredFunc {
            name: "f".to_string(),
            args,
            body,
            linkage: Linkage::External,
        }
    }

    #[test]
    fn test_empty_function_acquires_and_releases_dma() {
        let options = CodeGenOptions::default();
        let mut generator = XtensaCodeGenerator::new(&options);
        let f = generator
            .compile_function(&function(vec![], Stmt::block(vec![])))
            .unwrap();
        let mut out = String::new();
        f.emit(&mut out).unwrap();
        assert_eq!(
            out,
            "int f() {\n  void * const _ucon = nullptr;\n  xt_dma_guard _a = xt_dma_open(_ucon);\n  \
             if (!_a.held) {\n    xt_print(_ucon, \"DMA engine is unavailable\\n\");\n  }\n  \
             xt_dma_close(_ucon, &_a);\n  return 0;\n}\n"
        );
    }

    #[test]
    fn test_signature_uses_typed_restrict_pointers() {
        let options = CodeGenOptions {
            dma_scope: false,
            ..CodeGenOptions::default()
        };
        let mut generator = XtensaCodeGenerator::new(&options);
        let mut f = function(
            vec![
                Arg::Buffer {
                    name: "input".to_string(),
                    elem: Type::int(16, 1),
                },
                Arg::Scalar {
                    name: "n".to_string(),
                    ty: Type::int(32, 1),
                },
            ],
            Stmt::block(vec![]),
        );
        f.linkage = Linkage::Internal;
        let lowered = generator.compile_function(&f).unwrap();
        let mut out = String::new();
        lowered.emit(&mut out).unwrap();
        assert!(out.starts_with("static int f(int16_t *__restrict input, int32_t n) {\n"));
        assert!(!out.contains("xt_dma_open"));
    }

    #[test]
    fn test_ir_comment_prefixes_every_line() {
        let options = CodeGenOptions {
            include_ir: true,
            ..CodeGenOptions::default()
        };
        let mut generator = XtensaCodeGenerator::new(&options);
        let body = Stmt::block(vec![
            Stmt::Evaluate(Expr::i32(1)),
            Stmt::Evaluate(Expr::i32(2)),
        ]);
        let lowered = generator
            .compile_function(&function(vec![], body))
            .unwrap();
        let mut out = String::new();
        lowered.emit(&mut out).unwrap();
        let header = out.lines().take_while(|l| !l.starts_with("int f")).collect::<Vec<_>>();
        assert!(!header.is_empty());
        assert!(header.iter().all(|l| l.starts_with("// ")));
    }
}
