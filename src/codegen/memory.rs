use log::debug;

use super::c_utils::{CStmt, Emitter, Guard, Rhs};
use super::expr::Value;
use super::xtensa::XtensaCodeGenerator;
use super::{CodeGenError, MAX_ALLOCATION_BYTES};
use crate::common::Type;
use crate::ir::{Expr, MemoryType, ModulusRemainder, Stmt};
use crate::target::{check_width, decompose, is_native, native_lanes};
use crate::utils::c_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Stack,
    Heap,
    /// On-chip memory from the scratchpad allocator.
    Scratchpad,
}

/// A live allocation, visible to loads and stores in its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub name: String,
    pub elem: Type,
    pub storage: StorageClass,
    /// Element count, as a C expression.
    pub size: String,
    /// The release guard of heap and scratchpad allocations.
    pub guard: Option<String>,
}

/// How a vector access walks memory.
enum Access<'e> {
    /// Consecutive elements starting at the given scalar index.
    Dense(&'e Expr),
    /// One index per lane.
    Indexed,
}

impl<'a> XtensaCodeGenerator<'a> {
    pub(super) fn lower_load(
        &mut self,
        ty: Type,
        buffer: &str,
        index: &Expr,
        alignment: ModulusRemainder,
        predicate: Option<&Expr>,
    ) -> Result<Value, CodeGenError> {
        if predicate.is_some_and(|p| !p.is_const_true()) {
            return Err(CodeGenError::UnsupportedFeature("predicated load".to_string()));
        }
        check_width(ty)?;
        let ptr = self.access_pointer(buffer, ty)?;
        if ty.is_scalar() {
            let idx = self.lower_to_id(index)?;
            let id = self.assign(ty, Rhs::new(Emitter::Index, [ptr, idx]), false);
            return Ok(Value::whole(ty, id));
        }

        let Access::Dense(base) = classify_access(index) else {
            let idx = self.lower_to_id(index)?;
            let gather = format!("xt_gather_load<{}>", ty.c_name());
            let id = self.assign(ty, Rhs::call(gather, [ptr, idx]), false);
            return Ok(Value::whole(ty, id));
        };
        let base = self.lower_to_id(base)?;
        let aligned = is_aligned(ty, alignment);

        if let Some((part, count)) = decompose(ty) {
            let mut parts = Vec::with_capacity(count as usize);
            for i in 0..count {
                let offset = self.part_offset(&base, i * part.lanes);
                let load = load_helper(part, aligned);
                parts.push(self.assign(part, Rhs::call(load, [ptr.clone(), offset]), false));
            }
            return Ok(Value::Parts {
                ty,
                part_ty: part,
                parts,
            });
        }
        let load = load_helper(ty, aligned && is_native(ty));
        let id = self.assign(ty, Rhs::call(load, [ptr, base]), false);
        Ok(Value::whole(ty, id))
    }

    pub(super) fn lower_store(
        &mut self,
        buffer: &str,
        index: &Expr,
        value: &Expr,
        alignment: ModulusRemainder,
        predicate: Option<&Expr>,
    ) -> Result<(), CodeGenError> {
        if predicate.is_some_and(|p| !p.is_const_true()) {
            return Err(CodeGenError::UnsupportedFeature("predicated store".to_string()));
        }
        let ty = value.ty();
        check_width(ty)?;
        if self.in_atomic && ty.is_vector() {
            return Err(CodeGenError::UnsupportedFeature(
                "vector store in an atomic region".to_string(),
            ));
        }
        let value = self.lower_expr(value)?;
        let ptr = self.access_pointer(buffer, ty)?;

        if ty.is_scalar() {
            let idx = self.lower_to_id(index)?;
            let text = self.materialize(value);
            if self.in_atomic {
                self.push(CStmt::Pragma("omp atomic write"));
            }
            self.push(CStmt::Exec(format!("{}[{}] = {}", ptr, idx, text)));
        } else {
            match classify_access(index) {
                Access::Dense(base) => {
                    let base = self.lower_to_id(base)?;
                    let aligned = is_aligned(ty, alignment);
                    if let Some((part, count)) = decompose(ty) {
                        let components = self.components(&value, part)?;
                        for (i, component) in (0..count).zip(components) {
                            let offset = self.part_offset(&base, i * part.lanes);
                            self.push(CStmt::Exec(format!(
                                "{}({}, {}, {})",
                                store_helper(aligned),
                                component,
                                ptr,
                                offset
                            )));
                        }
                    } else {
                        let text = self.materialize(value);
                        self.push(CStmt::Exec(format!(
                            "{}({}, {}, {})",
                            store_helper(aligned && is_native(ty)),
                            text,
                            ptr,
                            base
                        )));
                    }
                }
                Access::Indexed => {
                    let idx = self.lower_to_id(index)?;
                    let text = self.materialize(value);
                    self.push(CStmt::Exec(format!(
                        "xt_scatter_store({}, {}, {})",
                        text, ptr, idx
                    )));
                }
            }
        }
        self.cache.invalidate_all();
        Ok(())
    }

    /// Lowers an `Allocate` node: chooses storage, declares the buffer and its release guard,
    /// then lowers the body with the allocation visible.
    pub(super) fn lower_allocate(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        let Stmt::Allocate {
            name,
            ty,
            memory,
            extents,
            condition,
            new_expr,
            free_function,
            body,
        } = stmt
        else {
            return Err(CodeGenError::MalformedIr(
                "expected an allocation".to_string(),
            ));
        };
        check_width(*ty)?;
        let elem = ty.element_of();
        let elem_bytes = u64::from(elem.bytes());
        let constant = constant_elements(*ty, extents)?;
        if let Some(count) = constant {
            let bytes = u128::from(count) * u128::from(elem.bytes());
            if bytes > u128::from(MAX_ALLOCATION_BYTES) {
                return Err(CodeGenError::AllocationOverflow {
                    name: name.clone(),
                    bytes,
                });
            }
        }

        let storage = match (memory, constant) {
            _ if new_expr.is_some() => StorageClass::Heap,
            (MemoryType::Scratchpad, _) => StorageClass::Scratchpad,
            (MemoryType::Stack | MemoryType::Register, Some(_)) => StorageClass::Stack,
            (MemoryType::Stack | MemoryType::Register, None) => {
                return Err(CodeGenError::UnsupportedFeature(format!(
                    "dynamically sized {:?} allocation `{}`",
                    memory, name
                )))
            }
            (MemoryType::Auto, Some(count))
                if count * u64::from(elem.bytes()) <= self.options.stack_cutoff_bytes =>
            {
                StorageClass::Stack
            }
            _ => StorageClass::Heap,
        };
        debug!("Allocating {} of {} as {:?}", name, ty, storage);

        let var = c_name(name);
        self.open_block();
        let allocation = match (storage, constant) {
            (StorageClass::Stack, Some(count)) => {
                self.push(CStmt::StackArray {
                    name: var.clone(),
                    elem,
                    size: count.max(1),
                });
                Allocation {
                    name: var.clone(),
                    elem,
                    storage,
                    size: count.to_string(),
                    guard: None,
                }
            }
            _ => {
                let mut size = match constant {
                    Some(count) => count.to_string(),
                    None => self.checked_size(name, *ty, extents, elem_bytes)?,
                };
                if !condition.is_const_true() {
                    let cond = self.lower_to_id(condition)?;
                    size = self.assign(
                        Type::int(64, 1),
                        Rhs::new(Emitter::Ternary, [cond, size, "0".to_string()]),
                        false,
                    );
                }
                let init = match new_expr {
                    Some(custom) => self.lower_to_id(custom)?,
                    None => format!(
                        "{}(_ucon, sizeof({}) * {})",
                        match storage {
                            StorageClass::Scratchpad => "xt_scratchpad_malloc",
                            _ => "xt_malloc",
                        },
                        elem.c_scalar_name(),
                        size
                    ),
                };
                self.push(CStmt::PtrDecl {
                    name: var.clone(),
                    elem,
                    init,
                });

                let null_check = if constant.is_some() && condition.is_const_true() {
                    format!("{} == nullptr", var)
                } else {
                    format!("{} == nullptr && {} != 0", var, size)
                };
                self.open_block();
                self.emit_failure(&format!("out of memory allocating `{}`", name));
                let then_body = self.close_block();
                self.push(CStmt::If {
                    cond: null_check,
                    then_body,
                    else_body: vec![],
                });

                let free_fn = match (free_function, storage) {
                    (Some(custom), _) => custom.clone(),
                    (None, StorageClass::Scratchpad) => "xt_scratchpad_free".to_string(),
                    (None, _) => "xt_free".to_string(),
                };
                let guard = self.acquire(Guard::Free {
                    ptr: var.clone(),
                    free_fn,
                });
                Allocation {
                    name: var.clone(),
                    elem,
                    storage,
                    size,
                    guard: Some(guard),
                }
            }
        };

        let guard = allocation.guard.clone();
        let shadowed = self.allocations.insert(name.clone(), allocation);
        let result = self.lower_stmt(body);
        match shadowed {
            Some(previous) => {
                self.allocations.insert(name.clone(), previous);
            }
            None => {
                self.allocations.remove(name);
            }
        }
        result?;
        if let Some(guard) = guard {
            self.release(&guard);
        }
        let body = self.close_block();
        self.push(CStmt::Scope { pragma: None, body });
        Ok(())
    }

    /// Releases an allocation before the end of its scope.
    ///
    /// A guard acquired in the current block stops being live. A guard from an enclosing block
    /// stays live for the other paths out of it, and its release at scope end becomes a no-op at
    /// run time.
    pub(super) fn lower_free(&mut self, name: &str) -> Result<(), CodeGenError> {
        let Some(allocation) = self.allocations.get(name) else {
            return Err(CodeGenError::MalformedIr(format!(
                "free of unknown allocation `{}`",
                name
            )));
        };
        let Some(id) = allocation.guard.clone() else {
            return Ok(());
        };
        let depth = self.depth();
        match self.guards.iter().find(|g| g.id == id) {
            Some(live) if live.depth == depth => self.release(&id),
            Some(live) => {
                let release = CStmt::Release {
                    id: live.id.clone(),
                    guard: live.guard.clone(),
                };
                self.push(release);
            }
            None => {}
        }
        Ok(())
    }

    /// Emits the element count of a dynamically sized allocation, failing at run time if its
    /// byte size exceeds the allocation limit.
    fn checked_size(
        &mut self,
        name: &str,
        ty: Type,
        extents: &[Expr],
        elem_bytes: u64,
    ) -> Result<String, CodeGenError> {
        let limit = MAX_ALLOCATION_BYTES / elem_bytes.max(1);
        let i64_ty = Type::int(64, 1);
        let mut size = ty.lanes.to_string();
        for extent in extents {
            let extent = self.lower_to_id(extent)?;
            let widened = format!("(int64_t)({})", extent);
            size = if size == "1" {
                self.assign(i64_ty, Rhs::operand(widened), false)
            } else {
                self.assign(i64_ty, Rhs::new(Emitter::Infix("*"), [size, widened]), false)
            };
            self.open_block();
            self.emit_failure(&format!(
                "size of `{}` exceeds {} bytes",
                name, MAX_ALLOCATION_BYTES
            ));
            let then_body = self.close_block();
            self.push(CStmt::If {
                cond: format!("{0} < 0 || {0} > {1}LL", size, limit),
                then_body,
                else_body: vec![],
            });
        }
        Ok(size)
    }

    /// The buffer pointer to access elements of `access`'s type through, cast when the buffer was
    /// declared with a different element type.
    fn access_pointer(&self, buffer: &str, access: Type) -> Result<String, CodeGenError> {
        let declared = self.buffer_elem(buffer)?;
        let name = self
            .allocations
            .get(buffer)
            .map_or_else(|| c_name(buffer), |a| a.name.clone());
        if declared == access.element_of() {
            Ok(name)
        } else {
            Ok(format!("(({} *){})", access.element_of().c_scalar_name(), name))
        }
    }

    fn part_offset(&mut self, base: &str, lanes: u32) -> String {
        if lanes == 0 {
            return base.to_string();
        }
        self.assign(
            Type::int(32, 1),
            Rhs::new(Emitter::Infix("+"), [base.to_string(), lanes.to_string()]),
            false,
        )
    }
}

fn classify_access(index: &Expr) -> Access<'_> {
    match index {
        Expr::Ramp { base, stride, .. }
            if stride.as_const_int() == Some(1) && base.ty().is_scalar() =>
        {
            Access::Dense(base)
        }
        _ => Access::Indexed,
    }
}

/// Returns `true` if a dense access of `ty` is known to start on a native register boundary.
fn is_aligned(ty: Type, alignment: ModulusRemainder) -> bool {
    let Ok(lanes) = native_lanes(ty.class, ty.bits) else {
        return false;
    };
    let lanes = i64::from(lanes);
    alignment.modulus % lanes == 0 && alignment.remainder % lanes == 0
}

fn load_helper(ty: Type, aligned: bool) -> String {
    if aligned {
        format!("xt_aligned_load<{}>", ty.c_name())
    } else {
        format!("xt_load<{}>", ty.c_name())
    }
}

fn store_helper(aligned: bool) -> &'static str {
    if aligned {
        "xt_aligned_store"
    } else {
        "xt_store"
    }
}

/// The element count of an allocation whose extents are all constant.
fn constant_elements(ty: Type, extents: &[Expr]) -> Result<Option<u64>, CodeGenError> {
    let mut count = u64::from(ty.lanes);
    for extent in extents {
        let Some(value) = extent.as_const_int() else {
            return Ok(None);
        };
        let value = u64::try_from(value).map_err(|_| {
            CodeGenError::MalformedIr(format!("negative allocation extent {}", value))
        })?;
        count = count.saturating_mul(value);
    }
    Ok(Some(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::CodeGenOptions;
    use crate::ir::{Arg, Linkage, LoweredFunc};
    use proptest::prelude::*;

    fn options() -> CodeGenOptions {
        CodeGenOptions {
            dma_scope: false,
            ..CodeGenOptions::default()
        }
    }

    fn generator(options: &CodeGenOptions) -> XtensaCodeGenerator<'_> {
        let mut generator = XtensaCodeGenerator::new(options);
        generator.buffers.insert("buf".to_string(), Type::int(16, 1));
        generator
    }

    fn assigns(stmts: &[CStmt]) -> Vec<String> {
        stmts
            .iter()
            .filter_map(|s| match s {
                CStmt::Assign { ty, rhs, .. } => Some(rhs.render(*ty)),
                _ => None,
            })
            .collect()
    }

    fn execs(stmts: &[CStmt]) -> Vec<String> {
        let mut out = vec![];
        for stmt in stmts {
            stmt.visit(&mut |s| {
                if let CStmt::Exec(text) = s {
                    out.push(text.clone());
                }
            });
        }
        out
    }

    fn compile(body: Stmt) -> String {
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let f = LoweredFunc {
            name: "f".to_string(),
            args: vec![
                Arg::Buffer {
                    name: "buf".to_string(),
                    elem: Type::int(16, 1),
                },
                Arg::Scalar {
                    name: "n".to_string(),
                    ty: Type::int(32, 1),
                },
            ],
            body,
            linkage: Linkage::External,
        };
        let mut out = String::new();
        generator.compile_function(&f).unwrap().emit(&mut out).unwrap();
        out
    }

    fn allocate(memory: MemoryType, extents: Vec<Expr>, body: Stmt) -> Stmt {
        Stmt::Allocate {
            name: "tmp".to_string(),
            ty: Type::int(32, 1),
            memory,
            extents,
            condition: Expr::bool(true),
            new_expr: None,
            free_function: None,
            body: Box::new(body),
        }
    }

    #[test]
    fn test_accesses_without_a_register_shape_are_rejected() {
        let options = options();
        let index = Expr::ramp(Expr::var("x", Type::int(32, 1)), Expr::i32(1), 16);
        {
            let mut generator = generator(&options);
            let load = Expr::load(Type::float(64, 16), "buf", index.clone());
            let err = generator.lower_expr(&load).unwrap_err();
            assert!(matches!(err.kind(), CodeGenError::UnsupportedWidth(_)));
        }
        {
            let mut generator = generator(&options);
            let store = Stmt::store("buf", index, Expr::var("v", Type::uint(48, 16)));
            let err = generator.lower_stmt(&store).unwrap_err();
            assert!(matches!(err.kind(), CodeGenError::UnsupportedWidth(_)));
            assert!(execs(generator.emitted()).is_empty());
        }
        {
            let mut generator = generator(&options);
            let mut alloc = allocate(MemoryType::Heap, vec![Expr::i32(8)], Stmt::block(vec![]));
            if let Stmt::Allocate { ty, .. } = &mut alloc {
                *ty = Type::int(12, 1);
            }
            let err = generator.lower_stmt(&alloc).unwrap_err();
            assert!(matches!(err.kind(), CodeGenError::UnsupportedWidth(_)));
        }
    }

    #[test]
    fn test_aligned_dense_load_selects_aligned_helper() {
        let options = options();
        let mut generator = generator(&options);
        let e = Expr::dense_load(
            Type::int(16, 1),
            "buf",
            Expr::var("x", Type::int(32, 1)),
            32,
            ModulusRemainder::new(64, 32),
        );
        generator.lower_expr(&e).unwrap();
        assert_eq!(
            assigns(generator.emitted()),
            vec!["xt_aligned_load<int16x32_t>(buf, x)".to_string()]
        );
    }

    #[test]
    fn test_misaligned_dense_load_selects_unaligned_helper() {
        let options = options();
        let mut generator = generator(&options);
        let e = Expr::dense_load(
            Type::int(16, 1),
            "buf",
            Expr::var("x", Type::int(32, 1)),
            32,
            ModulusRemainder::new(32, 4),
        );
        generator.lower_expr(&e).unwrap();
        assert_eq!(
            assigns(generator.emitted()),
            vec!["xt_load<int16x32_t>(buf, x)".to_string()]
        );
    }

    #[test]
    fn test_composite_load_reads_each_register() {
        let options = options();
        let mut generator = generator(&options);
        let e = Expr::dense_load(
            Type::int(16, 1),
            "buf",
            Expr::var("x", Type::int(32, 1)),
            64,
            ModulusRemainder::new(32, 0),
        );
        let value = generator.lower_expr(&e).unwrap();
        assert!(matches!(value, Value::Parts { ref parts, .. } if parts.len() == 2));
        assert_eq!(
            assigns(generator.emitted()),
            vec![
                "xt_aligned_load<int16x32_t>(buf, x)".to_string(),
                "x + 32".to_string(),
                "xt_aligned_load<int16x32_t>(buf, _b)".to_string(),
            ]
        );
    }

    #[test]
    fn test_scalar_load_casts_pointer_when_types_differ() {
        let options = options();
        let mut generator = generator(&options);
        let e = Expr::load(Type::uint(8, 1), "buf", Expr::i32(3));
        generator.lower_expr(&e).unwrap();
        assert_eq!(
            assigns(generator.emitted()),
            vec!["((uint8_t *)buf)[3]".to_string()]
        );
    }

    #[test]
    fn test_strided_load_gathers() {
        let options = options();
        let mut generator = generator(&options);
        let index = Expr::ramp(Expr::i32(0), Expr::i32(2), 16);
        let e = Expr::load(Type::int(16, 16), "buf", index);
        generator.lower_expr(&e).unwrap();
        let rendered = assigns(generator.emitted());
        assert!(rendered
            .last()
            .unwrap()
            .starts_with("xt_gather_load<int16x16_t>(buf, "));
    }

    #[test]
    fn test_predicated_load_is_unsupported() {
        let options = options();
        let mut generator = generator(&options);
        let e = Expr::Load {
            ty: Type::int(16, 32),
            buffer: "buf".to_string(),
            index: Box::new(Expr::ramp(Expr::i32(0), Expr::i32(1), 32)),
            alignment: ModulusRemainder::UNKNOWN,
            predicate: Some(Box::new(Expr::var("m", Type::bool(32)))),
        };
        let err = generator.lower_expr(&e).unwrap_err();
        assert!(matches!(err.kind(), CodeGenError::UnsupportedFeature(_)));
    }

    #[test]
    fn test_store_invalidates_cached_loads() {
        let options = options();
        let mut generator = generator(&options);
        let load = Expr::load(Type::int(16, 1), "buf", Expr::i32(0));
        let first = generator.lower_to_id(&load).unwrap();
        generator
            .lower_store(
                "buf",
                &Expr::i32(1),
                &Expr::int(Type::int(16, 1), 7),
                ModulusRemainder::UNKNOWN,
                None,
            )
            .unwrap();
        let second = generator.lower_to_id(&load).unwrap();
        assert_ne!(first, second);
        assert_eq!(
            execs(generator.emitted()),
            vec!["buf[1] = (int16_t)(7)".to_string()]
        );
    }

    #[test]
    fn test_composite_store_writes_each_register() {
        let options = options();
        let mut generator = generator(&options);
        generator
            .lower_store(
                "buf",
                &Expr::ramp(Expr::i32(0), Expr::i32(1), 64),
                &Expr::var("v", Type::int(16, 64)),
                ModulusRemainder::new(32, 0),
                None,
            )
            .unwrap();
        assert_eq!(
            execs(generator.emitted()),
            vec![
                "xt_aligned_store(v.native_vector[0], buf, 0)".to_string(),
                "xt_aligned_store(v.native_vector[1], buf, _a)".to_string(),
            ]
        );
    }

    #[test]
    fn test_atomic_scalar_store_gets_pragma() {
        let options = options();
        let mut generator = generator(&options);
        generator.in_atomic = true;
        generator
            .lower_store(
                "buf",
                &Expr::i32(0),
                &Expr::int(Type::int(16, 1), 1),
                ModulusRemainder::UNKNOWN,
                None,
            )
            .unwrap();
        assert_eq!(
            generator.emitted().first(),
            Some(&CStmt::Pragma("omp atomic write"))
        );
        let err = generator
            .lower_store(
                "buf",
                &Expr::ramp(Expr::i32(0), Expr::i32(1), 32),
                &Expr::var("v", Type::int(16, 32)),
                ModulusRemainder::UNKNOWN,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CodeGenError::UnsupportedFeature(_)));
    }

    #[test]
    fn test_small_constant_allocation_goes_on_the_stack() {
        let out = compile(allocate(MemoryType::Auto, vec![Expr::i32(256)], Stmt::block(vec![])));
        assert!(out.contains("int32_t tmp[256] __attribute__((aligned(64)));"));
        assert!(!out.contains("xt_malloc"));
    }

    #[test]
    fn test_large_constant_allocation_goes_on_the_heap() {
        let out = compile(allocate(
            MemoryType::Auto,
            vec![Expr::i32(1 << 20)],
            Stmt::block(vec![]),
        ));
        assert!(out.contains("int32_t *tmp = (int32_t *)xt_malloc(_ucon, sizeof(int32_t) * 1048576);"));
        assert!(out.contains("xt_release_guard"));
        assert_eq!(out.matches("xt_release(_ucon, &").count(), 1);
    }

    #[test]
    fn test_dynamic_allocation_is_checked_before_use() {
        let body = Stmt::store("tmp", Expr::i32(0), Expr::i32(1));
        let out = compile(allocate(
            MemoryType::Auto,
            vec![Expr::var("n", Type::int(32, 1))],
            body,
        ));
        let check = out.find("> 536870911LL").unwrap();
        let malloc = out.find("xt_malloc").unwrap();
        let first_use = out.find("tmp[0] = 1").unwrap();
        assert!(check < malloc && malloc < first_use);
        assert!(!out.contains("int32_t tmp["), "stack array declared: {}", out);
    }

    #[test]
    fn test_scratchpad_allocation_uses_scratchpad_allocator() {
        let out = compile(allocate(
            MemoryType::Scratchpad,
            vec![Expr::i32(64)],
            Stmt::block(vec![]),
        ));
        assert!(out.contains("xt_scratchpad_malloc(_ucon, sizeof(int32_t) * 64)"));
        assert!(out.contains("xt_scratchpad_free"));
    }

    #[test]
    fn test_oversized_constant_allocation_is_rejected() {
        let options = options();
        let mut generator = generator(&options);
        let stmt = allocate(
            MemoryType::Heap,
            vec![Expr::i32(1 << 30), Expr::i32(4)],
            Stmt::block(vec![]),
        );
        let err = generator.lower_allocate(&stmt).unwrap_err();
        assert!(matches!(
            err,
            CodeGenError::AllocationOverflow { bytes, .. } if bytes == 1 << 34
        ));
    }

    #[test]
    fn test_dynamic_stack_allocation_is_unsupported() {
        let options = options();
        let mut generator = generator(&options);
        let stmt = allocate(
            MemoryType::Stack,
            vec![Expr::var("n", Type::int(32, 1))],
            Stmt::block(vec![]),
        );
        let err = generator.lower_allocate(&stmt).unwrap_err();
        assert!(matches!(err, CodeGenError::UnsupportedFeature(_)));
    }

    #[test]
    fn test_conditional_allocation_sizes_to_zero() {
        let mut stmt = allocate(MemoryType::Heap, vec![Expr::i32(8)], Stmt::block(vec![]));
        if let Stmt::Allocate { condition, .. } = &mut stmt {
            *condition = Expr::var("c", Type::bool(1));
        }
        let out = compile(stmt);
        assert!(out.contains("int64_t _a = c ? 8 : 0;"));
        assert!(out.contains("sizeof(int32_t) * _a"));
    }

    #[test]
    fn test_custom_allocator_and_free() {
        let mut stmt = allocate(MemoryType::Auto, vec![Expr::i32(4)], Stmt::block(vec![]));
        if let Stmt::Allocate {
            new_expr,
            free_function,
            ..
        } = &mut stmt
        {
            *new_expr = Some(Expr::var("pool", Type::int(32, 1)));
            *free_function = Some("pool_free".to_string());
        }
        let out = compile(stmt);
        assert!(out.contains("int32_t *tmp = (int32_t *)pool;"));
        assert!(out.contains("{tmp, pool_free}"));
    }

    #[test]
    fn test_free_releases_once() {
        let out = compile(allocate(
            MemoryType::Heap,
            vec![Expr::i32(16)],
            Stmt::Free {
                name: "tmp".to_string(),
            },
        ));
        assert_eq!(out.matches("xt_release(_ucon, &").count(), 1);
    }

    #[test]
    fn test_free_of_unknown_allocation_is_malformed() {
        let options = options();
        let mut generator = generator(&options);
        let err = generator.lower_free("nope").unwrap_err();
        assert!(matches!(err, CodeGenError::MalformedIr(_)));
    }

    proptest! {
        #[test]
        fn test_alignment_selection_is_exclusive(modulus in 0i64..256, remainder in 0i64..256) {
            let options = options();
            let mut generator = generator(&options);
            let e = Expr::dense_load(
                Type::int(16, 1),
                "buf",
                Expr::var("x", Type::int(32, 1)),
                32,
                ModulusRemainder::new(modulus, remainder),
            );
            generator.lower_expr(&e).unwrap();
            let rendered = assigns(generator.emitted());
            prop_assert_eq!(rendered.len(), 1);
            let aligned = modulus % 32 == 0 && remainder % 32 == 0;
            prop_assert_eq!(rendered[0].starts_with("xt_aligned_load"), aligned);
            prop_assert_eq!(rendered[0].starts_with("xt_load"), !aligned);
        }
    }
}
