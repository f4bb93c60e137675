use log::debug;

use super::c_utils::{CStmt, ReturnValue, Rhs};
use super::expr::Value;
use super::xtensa::{LoopFrame, XtensaCodeGenerator};
use super::{CodeGenError, ParallelStyle};
use crate::common::Type;
use crate::ir::{Callee, Expr, ForKind, Stmt};
use crate::utils::c_name;

impl<'a> XtensaCodeGenerator<'a> {
    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        self.lower_stmt_inner(stmt).map_err(|err| {
            err.at(|| {
                let printed = stmt.to_string();
                printed.lines().next().unwrap_or_default().to_string()
            })
        })
    }

    fn lower_stmt_inner(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match stmt {
            Stmt::Store {
                buffer,
                index,
                value,
                alignment,
                predicate,
            } => self.lower_store(buffer, index, value, *alignment, predicate.as_ref()),
            Stmt::For {
                var,
                min,
                extent,
                kind,
                body,
            } => self.lower_for(var, min, extent, *kind, body),
            Stmt::Allocate { .. } => self.lower_allocate(stmt),
            Stmt::Free { name } => self.lower_free(name),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.lower_stmt(s)?;
                }
                Ok(())
            }
            Stmt::IfThenElse {
                cond,
                then_case,
                else_case,
            } => {
                let cond = self.lower_to_id(cond)?;
                self.open_block();
                let then_result = self.lower_stmt(then_case);
                let then_body = self.close_block();
                then_result?;
                let else_body = match else_case {
                    Some(else_case) => {
                        self.open_block();
                        let else_result = self.lower_stmt(else_case);
                        let else_body = self.close_block();
                        else_result?;
                        else_body
                    }
                    None => vec![],
                };
                self.push(CStmt::If {
                    cond,
                    then_body,
                    else_body,
                });
                Ok(())
            }
            Stmt::LetStmt { name, value, body } => {
                let value = self.lower_expr(value)?;
                let shadowed = self.bindings.insert(name.clone(), value);
                let result = self.lower_stmt(body);
                self.unbind(name, shadowed);
                result
            }
            Stmt::Evaluate(e) => self.lower_evaluate(e),
            Stmt::Assert { condition, message } => {
                if !self.options.assertions {
                    debug!("Dropping assertion: {}", message);
                    return Ok(());
                }
                if condition.is_const_true() {
                    return Ok(());
                }
                let cond = self.lower_to_id(condition)?;
                self.open_block();
                self.emit_failure(message);
                let then_body = self.close_block();
                self.push(CStmt::If {
                    cond: format!("!({})", cond),
                    then_body,
                    else_body: vec![],
                });
                Ok(())
            }
            Stmt::Atomic { body } => {
                if self.in_atomic {
                    return self.lower_stmt(body);
                }
                self.in_atomic = true;
                self.open_block();
                let result = self.lower_stmt(body);
                let body = self.close_block();
                self.in_atomic = false;
                result?;
                self.push(CStmt::Scope { pragma: None, body });
                Ok(())
            }
            Stmt::Return(code) => {
                self.emit_exit(ReturnValue::Code(*code));
                Ok(())
            }
        }
    }

    fn lower_evaluate(&mut self, e: &Expr) -> Result<(), CodeGenError> {
        match e {
            Expr::Call { ty, callee, args }
                if !matches!(callee, Callee::Target(_) | Callee::Extern { pure: true, .. }) =>
            {
                let rhs = self.side_effect_call(callee, args)?;
                self.push(CStmt::Exec(rhs.render(*ty)));
                self.cache.invalidate_all();
                Ok(())
            }
            _ => self.lower_expr(e).map(|_| ()),
        }
    }

    /// Lowers a counted loop.
    ///
    /// A parallel loop body cannot return from the function, so early exits inside it store a
    /// status and jump to a label at the end of the iteration. The status is checked once the
    /// loop completes.
    fn lower_for(
        &mut self,
        var: &str,
        min: &Expr,
        extent: &Expr,
        kind: ForKind,
        body: &Stmt,
    ) -> Result<(), CodeGenError> {
        match kind {
            ForKind::Serial | ForKind::Parallel => {}
            ForKind::Vectorized | ForKind::Unrolled => {
                return Err(CodeGenError::UnsupportedFeature(format!(
                    "{:?} loop over `{}` reached code generation",
                    kind, var
                )))
            }
            ForKind::GpuBlock | ForKind::GpuThread => {
                return Err(CodeGenError::UnsupportedFeature(format!(
                    "{:?} loop over `{}`",
                    kind, var
                )))
            }
        }
        let min = self.lower_to_id(min)?;
        let extent = self.lower_to_id(extent)?;
        // Values computed before the loop may be stale in later iterations.
        self.cache.invalidate_all();

        let parallel =
            kind == ForKind::Parallel && self.options.parallel_style == ParallelStyle::OpenMp;
        if parallel {
            self.headers.emit_openmp_header = true;
            self.loops.push(LoopFrame {
                guard_depth: self.guards.len(),
                status: self.namer.fresh_name(),
                label: self.namer.fresh_name(),
                used: false,
            });
        }

        let loop_var = c_name(var);
        let shadowed = self.bindings.insert(
            var.to_string(),
            Value::whole(Type::int(32, 1), loop_var.clone()),
        );
        self.open_block();
        let result = if parallel {
            self.open_block();
            let result = self.lower_stmt(body);
            let iteration = self.close_block();
            self.push(CStmt::Scope {
                pragma: None,
                body: iteration,
            });
            result
        } else {
            self.lower_stmt(body)
        };
        let frame = if parallel { self.loops.pop() } else { None };
        if let Some(frame) = frame.as_ref().filter(|f| f.used) {
            self.push(CStmt::Label(frame.label.clone()));
        }
        let loop_body = self.close_block();
        self.unbind(var, shadowed);
        result?;

        if let Some(frame) = frame.as_ref().filter(|f| f.used) {
            self.push(CStmt::Assign {
                ty: Type::int(32, 1),
                name: frame.status.clone(),
                rhs: Rhs::operand("0"),
            });
        }
        self.push(CStmt::For {
            var: loop_var,
            min,
            extent,
            pragma: parallel.then_some("omp parallel for"),
            body: loop_body,
        });
        self.cache.invalidate_all();

        if let Some(frame) = frame.filter(|f| f.used) {
            self.open_block();
            self.emit_exit(ReturnValue::Var(frame.status.clone()));
            let then_body = self.close_block();
            self.push(CStmt::If {
                cond: format!("{} != 0", frame.status),
                then_body,
                else_body: vec![],
            });
        }
        Ok(())
    }
}
