//! Expression lowering.
//!
//! Each IR expression lowers to a [Value]. Operations on native registers and scalars map to a
//! single selected intrinsic. Operations on composite vectors run once per native component, in
//! lane order, and the results are regrouped. Operations on vectors narrower than a register are
//! padded to a full register, applied, and sliced back.

use log::{debug, warn};

use super::c_utils::{Emitter, Rhs};
use super::intrinsics::{self, EntryKind, Operation};
use super::xtensa::XtensaCodeGenerator;
use super::CodeGenError;
use crate::common::{ElemClass, Type};
use crate::ir::{BinOp, Callee, Expr, TargetOp};
use crate::target::{check_width, decompose, is_native, native_lanes, padded_native};
use crate::utils::{c_name, exact_log2};

/// The lowered form of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single C expression, either a temporary or a literal.
    Whole { ty: Type, text: String },
    /// A composite vector held as its native components, lowest lanes first. The composite
    /// itself is only constructed if something needs it whole.
    Parts {
        ty: Type,
        part_ty: Type,
        parts: Vec<String>,
    },
}

impl Value {
    pub fn whole(ty: Type, text: impl Into<String>) -> Self {
        Value::Whole {
            ty,
            text: text.into(),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Whole { ty, .. } | Value::Parts { ty, .. } => *ty,
        }
    }
}

enum Operand {
    Scalar(String),
    Components(Vec<String>),
}

impl<'a> XtensaCodeGenerator<'a> {
    pub(super) fn lower_expr(&mut self, e: &Expr) -> Result<Value, CodeGenError> {
        self.lower_expr_inner(e).map_err(|err| err.at(|| e.to_string()))
    }

    /// Lowers `e` and returns a single C expression for it.
    pub(super) fn lower_to_id(&mut self, e: &Expr) -> Result<String, CodeGenError> {
        let value = self.lower_expr(e)?;
        Ok(self.materialize(value))
    }

    pub(super) fn materialize(&mut self, value: Value) -> String {
        match value {
            Value::Whole { text, .. } => text,
            Value::Parts { ty, parts, .. } => {
                self.assign(ty, Rhs::new(Emitter::Construct, parts), false)
            }
        }
    }

    fn lower_expr_inner(&mut self, e: &Expr) -> Result<Value, CodeGenError> {
        check_width(e.ty())?;
        match e {
            Expr::IntImm { ty, value } if ty.is_scalar() => {
                Ok(Value::whole(*ty, int_literal(*ty, *value)))
            }
            Expr::UIntImm { ty, value } if ty.is_scalar() => {
                Ok(Value::whole(*ty, uint_literal(*ty, *value)))
            }
            Expr::FloatImm { ty, value } if ty.is_scalar() => {
                Ok(Value::whole(*ty, float_literal(*ty, *value)))
            }
            Expr::IntImm { ty, value } => self.lower_broadcast(
                &Expr::IntImm {
                    ty: ty.element_of(),
                    value: *value,
                },
                ty.lanes,
            ),
            Expr::UIntImm { ty, value } => self.lower_broadcast(
                &Expr::UIntImm {
                    ty: ty.element_of(),
                    value: *value,
                },
                ty.lanes,
            ),
            Expr::FloatImm { ty, value } => self.lower_broadcast(
                &Expr::FloatImm {
                    ty: ty.element_of(),
                    value: *value,
                },
                ty.lanes,
            ),
            Expr::Var { ty, name } => Ok(match self.bindings.get(name) {
                Some(bound) => bound.clone(),
                None => Value::whole(*ty, c_name(name)),
            }),
            Expr::Unary { op, a } => {
                let value = self.lower_expr(a)?;
                self.apply(Operation::Unary(*op), vec![value], a.ty(), None)
            }
            Expr::Binary { op, a, b } => {
                let (a_ty, b_ty) = (a.ty(), b.ty());
                if a_ty != b_ty {
                    return Err(CodeGenError::MalformedIr(format!(
                        "{:?} of {} and {}",
                        op, a_ty, b_ty
                    )));
                }
                let const_rhs = b.as_const_int();
                let lhs = self.lower_expr(a)?;
                // The shift amount replaces the operand, so a constant vector is never built.
                let rhs = match const_rhs {
                    Some(c) if shifts_by_immediate(*op, a_ty, c) => {
                        Value::whole(b_ty.element_of(), c.to_string())
                    }
                    _ => self.lower_expr(b)?,
                };
                self.apply(Operation::Binary(*op), vec![lhs, rhs], e.ty(), const_rhs)
            }
            Expr::Select { cond, t, f } => {
                let ty = t.ty();
                if f.ty() != ty {
                    return Err(CodeGenError::MalformedIr(format!(
                        "select between {} and {}",
                        ty,
                        f.ty()
                    )));
                }
                let mask = if cond.ty().is_scalar() && ty.is_vector() {
                    self.lower_broadcast(cond, ty.lanes)?
                } else {
                    self.lower_expr(cond)?
                };
                let t = self.lower_expr(t)?;
                let f = self.lower_expr(f)?;
                self.apply(Operation::Select, vec![mask, t, f], ty, None)
            }
            Expr::Cast { ty, value } => {
                let value = self.lower_expr(value)?;
                self.lower_cast(*ty, value)
            }
            Expr::Reinterpret { ty, value } => {
                let value = self.lower_expr(value)?;
                self.lower_reinterpret(*ty, value)
            }
            Expr::Broadcast { value, lanes } => self.lower_broadcast(value, *lanes),
            Expr::Ramp {
                base,
                stride,
                lanes,
            } => self.lower_ramp(base, stride, *lanes),
            Expr::Load {
                ty,
                buffer,
                index,
                alignment,
                predicate,
            } => self.lower_load(*ty, buffer, index, *alignment, predicate.as_deref()),
            Expr::Shuffle { vectors, indices } => self.lower_shuffle(vectors, indices),
            Expr::Call { ty, callee, args } => self.lower_call(*ty, callee, args),
            Expr::Let { name, value, body } => {
                let value = self.lower_expr(value)?;
                let shadowed = self.bindings.insert(name.clone(), value);
                let result = self.lower_expr(body);
                self.unbind(name, shadowed);
                result
            }
        }
    }

    pub(super) fn unbind(&mut self, name: &str, shadowed: Option<Value>) {
        match shadowed {
            Some(previous) => {
                self.bindings.insert(name.to_string(), previous);
            }
            None => {
                self.bindings.remove(name);
            }
        }
    }

    /// Applies `op` to `args`, choosing between a direct intrinsic, per-component application,
    /// padding, and the lane-by-lane fallback.
    pub(super) fn apply(
        &mut self,
        op: Operation,
        args: Vec<Value>,
        result: Type,
        const_rhs: Option<i64>,
    ) -> Result<Value, CodeGenError> {
        let types = args.iter().map(Value::ty).collect::<Vec<_>>();
        let Some(&lead) = types.first() else {
            return Err(CodeGenError::MalformedIr(format!("{} without operands", op)));
        };
        let simple = |t: &Type| t.is_scalar() || is_native(*t);

        if types.iter().all(simple) && simple(&result) {
            let texts = args.into_iter().map(|v| self.materialize(v)).collect();
            let text = self.emit_selected(op, &types, result, const_rhs, texts)?;
            return Ok(Value::whole(result, text));
        }

        if let (Some(selection), Some((part, 2))) =
            (intrinsics::select_paired(op, lead, result), decompose(lead))
        {
            let mut texts = self.components(&args[0], part)?;
            for value in args.into_iter().skip(1) {
                texts.push(self.materialize(value));
            }
            let text = self.assign(
                result,
                Rhs::new(selection.emitter, texts),
                selection.commutative,
            );
            return Ok(Value::whole(result, text));
        }

        if is_lanewise(op) {
            if let Some(chunk) = component_lanes(&types, result) {
                let count = result.lanes / chunk;
                debug!("Applying {} to {} as {} components", op, result, count);
                let mut operands = Vec::with_capacity(args.len());
                for (value, ty) in args.iter().zip(&types) {
                    operands.push(if ty.is_scalar() {
                        Operand::Scalar(self.materialize(value.clone()))
                    } else {
                        Operand::Components(self.components(value, ty.with_lanes(chunk))?)
                    });
                }
                let part_types = types
                    .iter()
                    .map(|t| if t.is_scalar() { *t } else { t.with_lanes(chunk) })
                    .collect::<Vec<_>>();
                let part_result = result.with_lanes(chunk);
                let mut parts = Vec::with_capacity(count as usize);
                for i in 0..count as usize {
                    let texts = operands
                        .iter()
                        .map(|operand| match operand {
                            Operand::Scalar(text) => text.clone(),
                            Operand::Components(components) => components[i].clone(),
                        })
                        .collect();
                    parts.push(self.emit_selected(op, &part_types, part_result, const_rhs, texts)?);
                }
                return self.regroup(parts, part_result, result);
            }
        }

        if let Some(native) = paddable(op, &types, result) {
            debug!("Padding {} on {} to {}", op, result, native);
            let fill = match op {
                Operation::Binary(BinOp::Mul | BinOp::Div | BinOp::Mod) => "1",
                _ => "0",
            };
            let mut padded = Vec::with_capacity(args.len());
            for value in args {
                let text = self.materialize(value);
                let pad = format!("xt_pad_to_native<{}, {}>", native.c_name(), result.c_name());
                let id = self.assign(native, Rhs::call(pad, [text, fill.to_string()]), false);
                padded.push(Value::whole(native, id));
            }
            let full = self.apply(op, padded, native, const_rhs)?;
            let full = self.materialize(full);
            let slice = format!(
                "xt_slice_from_padded<{}, {}>",
                result.c_name(),
                native.c_name()
            );
            let text = self.assign(result, Rhs::call(slice, [full]), false);
            return Ok(Value::whole(result, text));
        }

        for ty in &types {
            self.headers.note_type(*ty);
        }
        let texts = args.into_iter().map(|v| self.materialize(v)).collect();
        let text = self.emit_selected(op, &types, result, const_rhs, texts)?;
        Ok(Value::whole(result, text))
    }

    pub(super) fn emit_selected(
        &mut self,
        op: Operation,
        types: &[Type],
        result: Type,
        const_rhs: Option<i64>,
        mut args: Vec<String>,
    ) -> Result<String, CodeGenError> {
        let selection = intrinsics::select(op, types, result, const_rhs)?;
        if let EntryKind::Shift(shift) = selection.kind {
            if let Some(amount) = args.get_mut(1) {
                *amount = shift.to_string();
            }
        }
        Ok(self.assign(
            result,
            Rhs::new(selection.emitter, args),
            selection.commutative,
        ))
    }

    /// The components of `value` as registers of type `part`, lowest lanes first.
    ///
    /// This is the only place that maps lanes to components: a whole composite yields its
    /// `native_vector` members, and masks are split or joined when `part` has a different
    /// lane count than the natural components.
    pub(super) fn components(
        &mut self,
        value: &Value,
        part: Type,
    ) -> Result<Vec<String>, CodeGenError> {
        let (natural_ty, natural) = match value {
            Value::Parts { part_ty, parts, .. } => (*part_ty, parts.clone()),
            Value::Whole { ty, text } => match decompose(*ty) {
                Some((native, k)) => (
                    native,
                    (0..k)
                        .map(|i| format!("{}.native_vector[{}]", text, i))
                        .collect(),
                ),
                None => (*ty, vec![text.clone()]),
            },
        };
        self.resize(natural, natural_ty, part)
    }

    /// Reassembles components of type `part` into a value of type `result`.
    pub(super) fn regroup(
        &mut self,
        parts: Vec<String>,
        part: Type,
        result: Type,
    ) -> Result<Value, CodeGenError> {
        let target = match decompose(result) {
            Some((native, _)) => native,
            None => result,
        };
        let mut texts = self.resize(parts, part, target)?;
        if target != result {
            return Ok(Value::Parts {
                ty: result,
                part_ty: target,
                parts: texts,
            });
        }
        match (texts.pop(), texts.is_empty()) {
            (Some(text), true) => Ok(Value::whole(result, text)),
            _ => Err(CodeGenError::MalformedIr(format!(
                "components of {} do not form {}",
                part, result
            ))),
        }
    }

    /// Converts registers of type `from` into registers of type `to`. Only masks can change
    /// lane count, by halving or doubling.
    fn resize(
        &mut self,
        mut texts: Vec<String>,
        mut from: Type,
        to: Type,
    ) -> Result<Vec<String>, CodeGenError> {
        let unsupported = move || CodeGenError::NoMatchingIntrinsic {
            operation: format!("regroup into {}", to),
            ty: from,
        };
        if from == to {
            return Ok(texts);
        }
        let (small, large) = (from.lanes.min(to.lanes), from.lanes.max(to.lanes));
        if !from.is_bool()
            || from.with_lanes(to.lanes) != to
            || large % small != 0
            || !(large / small).is_power_of_two()
        {
            return Err(unsupported());
        }
        while from.lanes > to.lanes {
            let half = from.with_lanes(from.lanes / 2);
            let (Some(lo), Some(hi)) = (
                intrinsics::split_mask(from, false),
                intrinsics::split_mask(from, true),
            ) else {
                return Err(unsupported());
            };
            let mut halves = Vec::with_capacity(texts.len() * 2);
            for text in texts {
                halves.push(self.assign(half, Rhs::call(lo, [text.clone()]), false));
                halves.push(self.assign(half, Rhs::call(hi, [text]), false));
            }
            texts = halves;
            from = half;
        }
        while from.lanes < to.lanes {
            let double = from.with_lanes(from.lanes * 2);
            let Some(join) = intrinsics::join_masks(from) else {
                return Err(unsupported());
            };
            if texts.len() % 2 != 0 {
                return Err(unsupported());
            }
            let mut joined = Vec::with_capacity(texts.len() / 2);
            for pair in texts.chunks(2) {
                let rhs = Rhs::new(Emitter::Template(join), pair.iter().cloned());
                joined.push(self.assign(double, rhs, false));
            }
            texts = joined;
            from = double;
        }
        Ok(texts)
    }

    /// Applies a per-register conversion to every native component of `value`.
    ///
    /// Returns `None` if `value` is not made of native registers or `emitter` has no entry for
    /// them.
    fn map_components(
        &mut self,
        value: &Value,
        to: Type,
        emitter: impl Fn(Type, Type) -> Option<Emitter>,
    ) -> Result<Option<Value>, CodeGenError> {
        let from = value.ty();
        let part = match decompose(from) {
            Some((native, _)) => native,
            None if is_native(from) => from,
            None => return Ok(None),
        };
        let to_part = to.with_lanes(part.lanes);
        let Some(emitter) = emitter(part, to_part).filter(|_| is_native(to_part)) else {
            return Ok(None);
        };
        let components = self.components(value, part)?;
        let mut converted = Vec::with_capacity(components.len());
        for component in components {
            converted.push(self.assign(to_part, Rhs::new(emitter.clone(), [component]), false));
        }
        self.regroup(converted, to_part, to).map(Some)
    }

    pub(super) fn lower_cast(&mut self, to: Type, value: Value) -> Result<Value, CodeGenError> {
        let from = value.ty();
        if from == to {
            return Ok(value);
        }
        if from.lanes != to.lanes {
            return Err(CodeGenError::MalformedIr(format!(
                "cast from {} to {} changes the lane count",
                from, to
            )));
        }
        if from.is_scalar() {
            let text = self.materialize(value);
            let id = self.assign(to, Rhs::new(Emitter::Cast, [text]), false);
            return Ok(Value::whole(to, id));
        }
        if from.bits == to.bits && from.is_int_or_uint() && to.is_int_or_uint() {
            return self.lower_reinterpret(to, value);
        }
        if from.bits == 32 && to.bits == 32 && !from.is_bool() && !to.is_bool() {
            let converted = self.map_components(&value, to, |a, b| {
                intrinsics::int_float_convert(a, b).map(Emitter::Template)
            })?;
            if let Some(converted) = converted {
                return Ok(converted);
            }
        }
        if from.is_int_or_uint() && to.is_int_or_uint() {
            if u32::from(to.bits) == 2 * u32::from(from.bits) {
                if let Some(widened) = self.widen(&value)? {
                    return self.lower_reinterpret(to, widened);
                }
            } else if u32::from(from.bits) == 2 * u32::from(to.bits) {
                if let Some(narrowed) = self.narrow(&value)? {
                    return self.lower_reinterpret(to, narrowed);
                }
            }
        }

        warn!("No register conversion from {} to {}; converting lane by lane", from, to);
        self.headers.note_type(from);
        let text = self.materialize(value);
        let convert = format!("xt_convert<{}, {}>", to.c_name(), from.c_name());
        let id = self.assign(to, Rhs::call(convert, [text]), false);
        Ok(Value::whole(to, id))
    }

    /// Doubles the element width, extending by the signedness of the source. The result keeps
    /// the source's class.
    fn widen(&mut self, value: &Value) -> Result<Option<Value>, CodeGenError> {
        let from = value.ty();
        let part = match decompose(from) {
            Some((native, _)) => native,
            None if is_native(from) => from,
            None => return Ok(None),
        };
        let (Some(lo), Some(hi)) = (
            intrinsics::widen_half(part, false),
            intrinsics::widen_half(part, true),
        ) else {
            return Ok(None);
        };
        let wide = from.with_bits(from.bits * 2);
        let half = wide.with_lanes(part.lanes / 2);
        if !is_native(half) {
            return Ok(None);
        }
        let components = self.components(value, part)?;
        let mut halves = Vec::with_capacity(components.len() * 2);
        for component in components {
            halves.push(self.assign(
                half,
                Rhs::new(Emitter::Template(lo), [component.clone()]),
                false,
            ));
            halves.push(self.assign(half, Rhs::new(Emitter::Template(hi), [component]), false));
        }
        self.regroup(halves, half, wide).map(Some)
    }

    /// Halves the element width by truncation. The result keeps the source's class.
    fn narrow(&mut self, value: &Value) -> Result<Option<Value>, CodeGenError> {
        let from = value.ty();
        let Some((part, k)) = decompose(from) else {
            return Ok(None);
        };
        let Some(template) = intrinsics::narrow_pair(part) else {
            return Ok(None);
        };
        let narrow = from.with_bits(from.bits / 2);
        let packed = narrow.with_lanes(part.lanes * 2);
        if k % 2 != 0 || !is_native(packed) {
            return Ok(None);
        }
        let components = self.components(value, part)?;
        let mut parts = Vec::with_capacity(components.len() / 2);
        for pair in components.chunks(2) {
            let rhs = Rhs::new(Emitter::Template(template), pair.iter().cloned());
            parts.push(self.assign(packed, rhs, false));
        }
        self.regroup(parts, packed, narrow).map(Some)
    }

    pub(super) fn lower_reinterpret(
        &mut self,
        to: Type,
        value: Value,
    ) -> Result<Value, CodeGenError> {
        let from = value.ty();
        if from == to {
            return Ok(value);
        }
        if from.bits == to.bits
            && from.lanes == to.lanes
            && from.is_int_or_uint()
            && to.is_int_or_uint()
        {
            let relabeled = self.map_components(&value, to, |a, b| {
                intrinsics::reinterpret(a, b).map(|name| Emitter::Call(name.into()))
            })?;
            if let Some(relabeled) = relabeled {
                return Ok(relabeled);
            }
        }
        self.headers.note_type(from);
        let text = self.materialize(value);
        let reinterpret = format!("xt_reinterpret<{}, {}>", to.c_name(), from.c_name());
        let id = self.assign(to, Rhs::call(reinterpret, [text]), false);
        Ok(Value::whole(to, id))
    }

    /// Lowers `value` replicated to `lanes` lanes in total.
    pub(super) fn lower_broadcast(
        &mut self,
        value: &Expr,
        lanes: u32,
    ) -> Result<Value, CodeGenError> {
        let elem = value.ty();
        if elem.is_vector() {
            if lanes % elem.lanes != 0 {
                return Err(CodeGenError::MalformedIr(format!(
                    "cannot broadcast {} to {} lanes",
                    elem, lanes
                )));
            }
            let n = i32::try_from(elem.lanes)
                .map_err(|_| CodeGenError::MalformedIr(format!("{} is too wide", elem)))?;
            let indices = (0..lanes).map(|i| i as i32 % n).collect::<Vec<_>>();
            return self.lower_shuffle(std::slice::from_ref(value), &indices);
        }
        if lanes == 1 {
            return self.lower_expr(value);
        }

        let ty = elem.with_lanes(lanes);
        let text = self.lower_to_id(value)?;
        let (part, count) = match decompose(ty) {
            Some(decomposed) => decomposed,
            None if is_native(ty) => (ty, 1),
            None => {
                let id = self.assign(ty, Rhs::new(Emitter::Cast, [text]), false);
                return Ok(Value::whole(ty, id));
            }
        };
        let splat = if part.is_accumulator() {
            match intrinsics::zero_accumulator(part).filter(|_| value.as_const_int() == Some(0)) {
                Some(zero) => self.assign(part, Rhs::call(zero, Vec::new()), false),
                None => {
                    let name = format!("xt_splat<{}>", part.c_name());
                    self.assign(part, Rhs::call(name, [text]), false)
                }
            }
        } else if part.is_bool() {
            let name = format!("xt_splat_mask<{}>", part.c_name());
            self.assign(part, Rhs::call(name, [text]), false)
        } else {
            self.assign(part, Rhs::new(Emitter::Splat, [text]), false)
        };
        if count == 1 {
            Ok(Value::whole(ty, splat))
        } else {
            Ok(Value::Parts {
                ty,
                part_ty: part,
                parts: vec![splat; count as usize],
            })
        }
    }

    fn lower_ramp(&mut self, base: &Expr, stride: &Expr, lanes: u32) -> Result<Value, CodeGenError> {
        let elem = base.ty();
        if elem.is_vector() {
            return Err(CodeGenError::UnsupportedFeature(
                "ramp with a vector base".to_string(),
            ));
        }
        if stride.ty() != elem {
            return Err(CodeGenError::MalformedIr(format!(
                "ramp base is {} but stride is {}",
                elem,
                stride.ty()
            )));
        }
        let ty = elem.with_lanes(lanes);
        let const_stride = stride.as_const_int();

        if let Some((part, count)) = decompose(ty) {
            let mut parts = Vec::with_capacity(count as usize);
            for i in 0..i64::from(count) {
                let first_lane = i * i64::from(part.lanes);
                let offset = match const_stride {
                    Some(s) => {
                        let offset = first_lane.checked_mul(s).ok_or_else(|| {
                            CodeGenError::MalformedIr(format!(
                                "ramp stride {} overflows at lane {}",
                                s, first_lane
                            ))
                        })?;
                        Expr::int(elem, offset)
                    }
                    None => Expr::binary(BinOp::Mul, Expr::int(elem, first_lane), stride.clone()),
                };
                let part_base = if i == 0 {
                    base.clone()
                } else {
                    Expr::binary(BinOp::Add, base.clone(), offset)
                };
                parts.push(self.lower_to_id(&Expr::ramp(part_base, stride.clone(), part.lanes))?);
            }
            return Ok(Value::Parts {
                ty,
                part_ty: part,
                parts,
            });
        }

        if let Some(sequence) = intrinsics::sequence(ty) {
            let seq = self.assign(ty, Rhs::call(sequence, Vec::new()), false);
            let seq = Value::whole(ty, seq);
            let scaled = match const_stride {
                Some(1) => seq,
                Some(c) if shifts_by_immediate(BinOp::Mul, ty, c) => self.apply(
                    Operation::Binary(BinOp::Mul),
                    vec![seq, Value::whole(elem, c.to_string())],
                    ty,
                    const_stride,
                )?,
                _ => {
                    let stride = self.lower_broadcast(stride, lanes)?;
                    self.apply(
                        Operation::Binary(BinOp::Mul),
                        vec![seq, stride],
                        ty,
                        const_stride,
                    )?
                }
            };
            if base.as_const_int() == Some(0) {
                return Ok(scaled);
            }
            let base = self.lower_broadcast(base, lanes)?;
            return self.apply(Operation::Binary(BinOp::Add), vec![base, scaled], ty, None);
        }

        let base = self.lower_to_id(base)?;
        let stride = self.lower_to_id(stride)?;
        let ramp = format!("xt_ramp<{}>", ty.c_name());
        let id = self.assign(ty, Rhs::call(ramp, [base, stride]), false);
        Ok(Value::whole(ty, id))
    }

    fn lower_call(
        &mut self,
        ty: Type,
        callee: &Callee,
        args: &[Expr],
    ) -> Result<Value, CodeGenError> {
        match callee {
            Callee::Target(op) => self.lower_target_op(*op, ty, args),
            Callee::Extern { pure: true, name } => {
                let mut texts = Vec::with_capacity(args.len());
                for arg in args {
                    texts.push(self.lower_to_id(arg)?);
                }
                let id = self.assign(ty, Rhs::call(name.clone(), texts), false);
                Ok(Value::whole(ty, id))
            }
            _ => {
                let rhs = self.side_effect_call(callee, args)?;
                let id = self.assign_uncached(ty, rhs);
                self.cache.invalidate_all();
                Ok(Value::whole(ty, id))
            }
        }
    }

    /// Builds a call that may touch memory. The caller must invalidate the value cache after
    /// emitting it.
    pub(super) fn side_effect_call(
        &mut self,
        callee: &Callee,
        args: &[Expr],
    ) -> Result<Rhs, CodeGenError> {
        let (name, arity) = match callee {
            Callee::Extern { name, .. } => (name.clone(), None),
            Callee::DmaCopy1d => ("xt_dma_copy_1d".to_string(), Some(6)),
            Callee::DmaWait => ("xt_dma_wait".to_string(), Some(1)),
            Callee::Prefetch => {
                return Err(CodeGenError::UnsupportedFeature("prefetch".to_string()))
            }
            Callee::Target(op) => {
                return Err(CodeGenError::MalformedIr(format!(
                    "{:?} is not a side-effecting call",
                    op
                )))
            }
        };
        let mut texts = vec![];
        if let Some(arity) = arity {
            if args.len() != arity {
                return Err(CodeGenError::MalformedIr(format!(
                    "{} takes {} arguments, got {}",
                    name,
                    arity,
                    args.len()
                )));
            }
            texts.push("_ucon".to_string());
        }
        for arg in args {
            texts.push(self.lower_to_id(arg)?);
        }
        Ok(Rhs::call(name, texts))
    }

    fn lower_target_op(
        &mut self,
        op: TargetOp,
        ty: Type,
        args: &[Expr],
    ) -> Result<Value, CodeGenError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }
        let combine = match op {
            TargetOp::ReduceAdd => Some(BinOp::Add),
            TargetOp::ReduceMin => Some(BinOp::Min),
            TargetOp::ReduceMax => Some(BinOp::Max),
            _ => None,
        };
        let Some(combine) = combine else {
            let const_rhs = args.get(1).and_then(Expr::as_const_int);
            return self.apply(Operation::Target(op), values, ty, const_rhs);
        };

        // Reductions over composites first combine the components lane-wise, then reduce the
        // single remaining register.
        let [value] = <[Value; 1]>::try_from(values).map_err(|values| {
            CodeGenError::MalformedIr(format!("{:?} takes 1 argument, got {}", op, values.len()))
        })?;
        let folded = match decompose(value.ty()) {
            Some((part, _)) => {
                let components = self.components(&value, part)?;
                let mut acc = components[0].clone();
                for component in &components[1..] {
                    acc = self.emit_selected(
                        Operation::Binary(combine),
                        &[part, part],
                        part,
                        None,
                        vec![acc, component.clone()],
                    )?;
                }
                Value::whole(part, acc)
            }
            None => value,
        };
        self.apply(Operation::Target(op), vec![folded], ty, None)
    }
}

fn is_lanewise(op: Operation) -> bool {
    match op {
        Operation::Unary(_) | Operation::Binary(_) | Operation::Select => true,
        Operation::Target(target_op) => target_op.is_lanewise(),
    }
}

/// The lane count of one component when an operation over `types` producing `result` can run
/// one native register at a time.
fn component_lanes(types: &[Type], result: Type) -> Option<u32> {
    let vectors = types
        .iter()
        .copied()
        .chain(std::iter::once(result))
        .filter(Type::is_vector)
        .collect::<Vec<_>>();
    let chunk = vectors
        .iter()
        .filter(|t| !t.is_bool())
        .map(|t| native_lanes(t.class, t.bits).ok())
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .min()
        .unwrap_or(native_lanes(ElemClass::Bool, 1).ok()?);
    let fits = vectors.iter().all(|t| {
        t.lanes == result.lanes && t.lanes > chunk && t.lanes % chunk == 0
            && is_native(t.with_lanes(chunk))
    });
    fits.then_some(chunk)
}

/// The native type to pad to when a unary or arithmetic binary operation runs on a vector
/// narrower than one register.
fn paddable(op: Operation, types: &[Type], result: Type) -> Option<Type> {
    match op {
        Operation::Unary(_) => {}
        Operation::Binary(b) if !b.is_comparison() => {}
        _ => return None,
    }
    if result.is_bool() || types.iter().any(|t| *t != result) {
        return None;
    }
    padded_native(result).filter(|native| is_native(*native))
}

/// Returns `true` if `op` with constant right operand `c` on `ty` lowers to a shift by an
/// immediate, in which case the operand itself is never materialized.
fn shifts_by_immediate(op: BinOp, ty: Type, c: i64) -> bool {
    matches!(op, BinOp::Mul | BinOp::Div)
        && ty.is_int_or_uint()
        && matches!(ty.bits, 8 | 16 | 32)
        && exact_log2(c).is_some_and(|shift| shift < u32::from(ty.bits))
        && (ty.is_scalar() || is_native(ty) || decompose(ty).is_some())
}

fn int_literal(ty: Type, value: i64) -> String {
    match (ty.class, ty.bits) {
        (ElemClass::Bool, _) => bool_literal(value != 0),
        (_, 64) if value == i64::MIN => "(int64_t)(-9223372036854775807LL - 1)".to_string(),
        (_, 64) => format!("(int64_t)({}LL)", value),
        (_, 32) if value == i64::from(i32::MIN) => "(-2147483647 - 1)".to_string(),
        (_, 32) => value.to_string(),
        _ => format!("({})({})", ty.c_scalar_name(), value),
    }
}

fn uint_literal(ty: Type, value: u64) -> String {
    match (ty.class, ty.bits) {
        (ElemClass::Bool, _) => bool_literal(value != 0),
        (_, 64) => format!("{}ULL", value),
        (_, 32) => format!("{}U", value),
        _ => format!("({})({})", ty.c_scalar_name(), value),
    }
}

fn float_literal(ty: Type, value: f64) -> String {
    let text = if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string()
    } else if ty.bits == 64 {
        format!("{:?}", value)
    } else {
        format!("{:?}f", value as f32)
    };
    match ty.bits {
        16 => format!("(float16_t)({})", text),
        _ => text,
    }
}

fn bool_literal(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::c_utils::CStmt;
    use crate::codegen::CodeGenOptions;
    use crate::ir::{Rounding, UnaryOp};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn options() -> CodeGenOptions {
        CodeGenOptions {
            dma_scope: false,
            ..CodeGenOptions::default()
        }
    }

    /// Lowers `e` into a fresh generator and returns the resulting value and every emitted
    /// right-hand side, rendered.
    fn lower(e: &Expr) -> (Value, Vec<String>) {
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let value = generator.lower_expr(e).unwrap();
        let rendered = generator
            .emitted()
            .iter()
            .filter_map(|s| match s {
                CStmt::Assign { ty, rhs, .. } => Some(rhs.render(*ty)),
                _ => None,
            })
            .collect();
        (value, rendered)
    }

    fn count_containing(rendered: &[String], needle: &str) -> usize {
        rendered.iter().filter(|r| r.contains(needle)).count()
    }

    #[test]
    fn test_wide_add_splits_into_two_native_adds() {
        let ty = Type::int(16, 64);
        let e = Expr::binary(BinOp::Add, Expr::var("a", ty), Expr::var("b", ty));
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let value = generator.lower_expr(&e).unwrap();
        let text = generator.materialize(value);
        let rendered = generator
            .emitted()
            .iter()
            .filter_map(|s| match s {
                CStmt::Assign { ty, rhs, .. } => Some(rhs.render(*ty)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                "IVP_ADDNX16(a.native_vector[0], b.native_vector[0])".to_string(),
                "IVP_ADDNX16(a.native_vector[1], b.native_vector[1])".to_string(),
                "int16x64_t(int16x64_t::from_native_vector, _a, _b)".to_string(),
            ]
        );
        assert_eq!(text, "_c");
        assert!(rendered
            .iter()
            .all(|r| !r.contains("xt_lanewise") && !r.contains("xt_shuffle")));
    }

    #[test]
    fn test_repeated_subexpression_is_assigned_once() {
        let ty = Type::int(16, 32);
        let sum = Expr::binary(BinOp::Add, Expr::var("a", ty), Expr::var("b", ty));
        let e = Expr::binary(BinOp::Mul, sum.clone(), sum);
        let (_, rendered) = lower(&e);
        assert_eq!(count_containing(&rendered, "IVP_ADDNX16"), 1);
        assert_eq!(rendered[1], "IVP_MULNX16PACKL(_a, _a)");
    }

    #[test]
    fn test_comparison_of_composites_joins_masks() {
        let ty = Type::int(32, 32);
        let e = Expr::binary(BinOp::Lt, Expr::var("a", ty), Expr::var("b", ty));
        let (value, rendered) = lower(&e);
        assert_eq!(value.ty(), Type::bool(32));
        assert_eq!(count_containing(&rendered, "IVP_LTN_2X32"), 2);
        assert_eq!(rendered.last().unwrap(), "IVP_JOINBN_2(_b, _a)");
    }

    #[test]
    fn test_select_on_composite_splits_the_mask() {
        let ty = Type::int(16, 64);
        let e = Expr::select(
            Expr::var("m", Type::bool(64)),
            Expr::var("a", ty),
            Expr::var("b", ty),
        );
        let (_, rendered) = lower(&e);
        assert!(rendered.contains(&"IVP_EXTRACTBL2N(m)".to_string()));
        assert!(rendered.contains(&"IVP_EXTRACTBH2N(m)".to_string()));
        assert_eq!(count_containing(&rendered, "IVP_MOVNX16T"), 2);
    }

    #[test]
    fn test_split_mask_halves_feed_components_in_order() {
        let ty = Type::int(16, 64);
        let e = Expr::select(
            Expr::var("m", Type::bool(64)),
            Expr::var("a", ty),
            Expr::var("b", ty),
        );
        let (_, rendered) = lower(&e);
        assert_eq!(rendered[0], "IVP_EXTRACTBL2N(m)");
        assert_eq!(rendered[1], "IVP_EXTRACTBH2N(m)");
        for (i, half) in ["_a", "_b"].iter().enumerate() {
            let component = &rendered[2 + i];
            assert!(component.contains(half), "{}", component);
            assert!(component.contains(&format!("a.native_vector[{}]", i)));
            assert!(component.contains(&format!("b.native_vector[{}]", i)));
        }
    }

    /// Follows labelled mask lanes through the emitted splits and joins.
    fn trace_lanes(stmts: &[CStmt], lanes: &mut HashMap<String, Vec<u32>>) {
        for stmt in stmts {
            let CStmt::Assign { ty, name, rhs } = stmt else {
                continue;
            };
            let call = rhs.render(*ty);
            let open = call.find('(').unwrap();
            let callee = &call[..open];
            let args = call[open + 1..call.len() - 1]
                .split(", ")
                .map(|a| lanes[a].clone())
                .collect::<Vec<_>>();
            let traced = if callee.starts_with("IVP_EXTRACTBL") {
                args[0][..args[0].len() / 2].to_vec()
            } else if callee.starts_with("IVP_EXTRACTBH") {
                args[0][args[0].len() / 2..].to_vec()
            } else if callee.starts_with("IVP_JOINB") {
                [args[1].clone(), args[0].clone()].concat()
            } else {
                panic!("unexpected {}", call);
            };
            lanes.insert(name.clone(), traced);
        }
    }

    #[test]
    fn test_sub_native_operation_is_padded_with_identity() {
        let ty = Type::int(16, 16);
        let e = Expr::binary(BinOp::Mul, Expr::var("a", ty), Expr::var("b", ty));
        let (value, rendered) = lower(&e);
        assert_eq!(value.ty(), ty);
        assert_eq!(
            rendered[0],
            "xt_pad_to_native<int16x32_t, int16x16_t>(a, 1)"
        );
        assert_eq!(rendered[2], "IVP_MULNX16PACKL(_a, _b)");
        assert_eq!(
            rendered[3],
            "xt_slice_from_padded<int16x16_t, int16x32_t>(_c)"
        );
    }

    #[test]
    fn test_signed_widening_cast_uses_sign_extension() {
        let e = Expr::cast(Type::int(32, 32), Expr::var("a", Type::int(16, 32)));
        let (value, rendered) = lower(&e);
        assert!(matches!(value, Value::Parts { ref parts, .. } if parts.len() == 2));
        assert_eq!(
            rendered,
            vec![
                "IVP_CVT32SNX48L(IVP_MULNX16(a, int16x32_t(1)))".to_string(),
                "IVP_CVT32SNX48H(IVP_MULNX16(a, int16x32_t(1)))".to_string(),
            ]
        );
    }

    #[test]
    fn test_unsigned_widening_to_signed_zero_extends_then_relabels() {
        let e = Expr::cast(Type::int(16, 64), Expr::var("a", Type::uint(8, 64)));
        let (_, rendered) = lower(&e);
        assert!(rendered[0].starts_with("IVP_CVT16U2NX24L"));
        assert_eq!(count_containing(&rendered, "xb_vecNx16U_rtor_xb_vecNx16"), 2);
    }

    #[test]
    fn test_same_width_cast_is_reinterpretation() {
        let e = Expr::cast(Type::uint(16, 64), Expr::var("a", Type::int(16, 64)));
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec![
                "xb_vecNx16_rtor_xb_vecNx16U(a.native_vector[0])".to_string(),
                "xb_vecNx16_rtor_xb_vecNx16U(a.native_vector[1])".to_string(),
            ]
        );
    }

    #[test]
    fn test_narrowing_cast_packs_pairs() {
        let e = Expr::cast(Type::int(8, 64), Expr::var("a", Type::int(16, 64)));
        let (value, rendered) = lower(&e);
        assert_eq!(
            value,
            Value::whole(Type::int(8, 64), "_a")
        );
        assert_eq!(
            rendered,
            vec!["IVP_PACKL2NX24(IVP_CVT24S2NX16(a.native_vector[1], a.native_vector[0]))"
                .to_string()]
        );
    }

    #[test]
    fn test_int_to_float_conversion() {
        let e = Expr::cast(Type::float(32, 16), Expr::var("a", Type::int(32, 16)));
        let (_, rendered) = lower(&e);
        assert_eq!(rendered, vec!["IVP_FLOATN_2X32(a, 0)".to_string()]);
    }

    #[test]
    fn test_unmatched_cast_falls_back_to_convert() {
        let e = Expr::cast(Type::float(16, 32), Expr::var("a", Type::int(8, 32)));
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec!["xt_convert<float16x32_t, int8x32_t>(a)".to_string()]
        );
    }

    #[test]
    fn test_broadcast_of_zero_accumulator() {
        let e = Expr::broadcast(Expr::int(Type::int(48, 1), 0), 32);
        let (_, rendered) = lower(&e);
        assert_eq!(rendered, vec!["IVP_ZERONX48()".to_string()]);
    }

    #[test]
    fn test_composite_broadcast_reuses_one_splat() {
        let e = Expr::broadcast(Expr::var("x", Type::int(16, 1)), 128);
        let (value, rendered) = lower(&e);
        assert_eq!(rendered, vec!["int16x32_t(x)".to_string()]);
        match value {
            Value::Parts { parts, .. } => assert_eq!(parts, vec!["_a".to_string(); 4]),
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[test]
    fn test_dense_ramp_uses_sequence() {
        let e = Expr::ramp(Expr::var("x", Type::int(32, 1)), Expr::i32(1), 16);
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec![
                "IVP_SEQN_2X32()".to_string(),
                "int32x16_t(x)".to_string(),
                "IVP_ADDN_2X32(_b, _a)".to_string(),
            ]
        );
    }

    #[test]
    fn test_strided_ramp_scales_by_shift() {
        let e = Expr::ramp(Expr::i32(0), Expr::i32(4), 16);
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec!["IVP_SEQN_2X32()".to_string(), "IVP_SLLIN_2X32(_a, 2)".to_string()]
        );
    }

    #[test]
    fn test_let_binds_without_copying() {
        let ty = Type::int(16, 32);
        let e = Expr::Let {
            name: "t".to_string(),
            value: Box::new(Expr::binary(
                BinOp::Add,
                Expr::var("a", ty),
                Expr::var("b", ty),
            )),
            body: Box::new(Expr::binary(
                BinOp::Sub,
                Expr::var("t", ty),
                Expr::var("a", ty),
            )),
        };
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec!["IVP_ADDNX16(a, b)".to_string(), "IVP_SUBNX16(_a, a)".to_string()]
        );
    }

    #[test]
    fn test_reduction_of_composite_folds_components_first() {
        let e = Expr::call(
            Type::int(16, 1),
            Callee::Target(TargetOp::ReduceMax),
            vec![Expr::var("a", Type::int(16, 64))],
        );
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec![
                "IVP_MAXNX16(a.native_vector[0], a.native_vector[1])".to_string(),
                "IVP_RMAXNX16(_a)".to_string(),
            ]
        );
    }

    #[test]
    fn test_paired_narrow_with_shift() {
        let e = Expr::call(
            Type::int(16, 32),
            Callee::Target(TargetOp::NarrowWithShift(Rounding::RoundToNearest)),
            vec![Expr::var("a", Type::int(32, 32)), Expr::i32(4)],
        );
        let (_, rendered) = lower(&e);
        assert_eq!(
            rendered,
            vec![
                "IVP_PACKVRNX48(IVP_CVT48SNX32(a.native_vector[1], a.native_vector[0]), 4)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_impure_call_invalidates_the_cache() {
        let ty = Type::int(32, 1);
        let sum = Expr::binary(BinOp::Add, Expr::var("a", ty), Expr::var("b", ty));
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let first = generator.lower_to_id(&sum).unwrap();
        let call = Expr::call(
            ty,
            Callee::Extern {
                name: "tick".to_string(),
                pure: false,
            },
            vec![],
        );
        generator.lower_expr(&call).unwrap();
        let second = generator.lower_to_id(&sum).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_prefetch_is_unsupported() {
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let e = Expr::call(Type::int(32, 1), Callee::Prefetch, vec![]);
        let err = generator.lower_expr(&e).unwrap_err();
        assert!(matches!(err.kind(), CodeGenError::UnsupportedFeature(_)));
        assert!(matches!(err, CodeGenError::At { .. }));
    }

    #[test]
    fn test_mismatched_operands_are_malformed() {
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let e = Expr::binary(
            BinOp::Add,
            Expr::var("a", Type::int(16, 32)),
            Expr::var("b", Type::int(32, 16)),
        );
        let err = generator.lower_expr(&e).unwrap_err();
        assert!(matches!(err.kind(), CodeGenError::MalformedIr(_)));
    }

    #[test]
    fn test_vectors_without_a_register_shape_are_rejected() {
        let options = options();
        for ty in [Type::uint(48, 32), Type::int(12, 32), Type::float(64, 16)] {
            let mut generator = XtensaCodeGenerator::new(&options);
            let e = Expr::binary(BinOp::Add, Expr::var("a", ty), Expr::var("b", ty));
            let err = generator.lower_expr(&e).unwrap_err();
            assert!(
                matches!(err.kind(), CodeGenError::UnsupportedWidth(w) if w.bits == ty.bits),
                "{} lowered to {:?}",
                ty,
                err
            );
            assert!(generator.emitted().is_empty());
        }
    }

    #[test]
    fn test_scalar_double_is_still_supported() {
        let ty = Type::float(64, 1);
        let e = Expr::binary(BinOp::Add, Expr::var("a", ty), Expr::var("b", ty));
        let (value, _) = lower(&e);
        assert_eq!(value.ty(), ty);
    }

    #[test]
    fn test_composite_ramp_with_huge_stride_is_malformed() {
        let options = options();
        let mut generator = XtensaCodeGenerator::new(&options);
        let e = Expr::ramp(
            Expr::int(Type::int(64, 1), 0),
            Expr::int(Type::int(64, 1), i64::MAX / 2),
            32,
        );
        let err = generator.lower_expr(&e).unwrap_err();
        assert!(matches!(err.kind(), CodeGenError::MalformedIr(_)));
    }

    #[test]
    fn test_literals() {
        assert_eq!(int_literal(Type::int(32, 1), -5), "-5");
        assert_eq!(int_literal(Type::int(32, 1), i64::from(i32::MIN)), "(-2147483647 - 1)");
        assert_eq!(int_literal(Type::int(16, 1), 7), "(int16_t)(7)");
        assert_eq!(int_literal(Type::int(64, 1), 1), "(int64_t)(1LL)");
        assert_eq!(uint_literal(Type::uint(32, 1), 7), "7U");
        assert_eq!(uint_literal(Type::bool(1), 1), "true");
        assert_eq!(float_literal(Type::float(32, 1), 0.5), "0.5f");
        assert_eq!(float_literal(Type::float(32, 1), f64::NEG_INFINITY), "-INFINITY");
        assert_eq!(float_literal(Type::float(64, 1), 2.0), "2.0");
    }

    #[test]
    fn test_not_on_native_mask() {
        let e = Expr::unary(UnaryOp::Not, Expr::var("m", Type::bool(16)));
        let (_, rendered) = lower(&e);
        assert_eq!(rendered, vec!["IVP_NOTBN_2(m)".to_string()]);
    }

    fn composite_int_type() -> impl Strategy<Value = Type> {
        (
            prop_oneof![Just(ElemClass::Int), Just(ElemClass::UInt)],
            prop_oneof![Just(8u8), Just(16u8), Just(32u8)],
            2u32..5,
        )
            .prop_map(|(class, bits, k)| {
                let native = native_lanes(class, bits).unwrap();
                Type::new(class, bits, native * k)
            })
    }

    proptest! {
        #[test]
        fn test_components_and_regroup_keep_lane_order(
            mask in any::<bool>(),
            registers in prop_oneof![Just(1u32), Just(2), Just(4)],
            part_lanes in prop_oneof![Just(16u32), Just(32), Just(64)],
        ) {
            let (native, part) = if mask {
                (Type::bool(64), Type::bool(part_lanes))
            } else {
                (Type::int(16, 32), Type::int(16, 32))
            };
            let ty = native.with_lanes(native.lanes * registers);
            let options = options();
            let mut generator = XtensaCodeGenerator::new(&options);
            let parts = generator.components(&Value::whole(ty, "v"), part).unwrap();
            let regrouped = generator.regroup(parts.clone(), part, ty).unwrap();

            let mut lanes = HashMap::new();
            for r in 0..registers {
                let text = if registers == 1 {
                    "v".to_string()
                } else {
                    format!("v.native_vector[{}]", r)
                };
                let start = r * native.lanes;
                lanes.insert(text, (start..start + native.lanes).collect::<Vec<_>>());
            }
            trace_lanes(generator.emitted(), &mut lanes);
            let flatten = |texts: &[String]| {
                texts.iter().flat_map(|t| lanes[t].clone()).collect::<Vec<_>>()
            };
            let expected = (0..ty.lanes).collect::<Vec<_>>();
            prop_assert!(parts.iter().all(|p| lanes[p].len() == part.lanes as usize));
            prop_assert_eq!(flatten(&parts), expected.clone());
            let texts = match regrouped {
                Value::Whole { text, .. } => vec![text],
                Value::Parts { parts, .. } => parts,
            };
            prop_assert_eq!(flatten(&texts), expected);
        }

        #[test]
        fn test_composite_add_pairs_components_by_index(registers in 2u32..=4) {
            let ty = Type::int(16, 32 * registers);
            let e = Expr::binary(BinOp::Add, Expr::var("a", ty), Expr::var("b", ty));
            let (value, rendered) = lower(&e);
            for (i, call) in rendered.iter().enumerate() {
                prop_assert_eq!(
                    call,
                    &format!("IVP_ADDNX16(a.native_vector[{i}], b.native_vector[{i}])")
                );
            }
            let Value::Parts { parts, .. } = value else {
                panic!("expected a composite sum");
            };
            prop_assert_eq!(parts.len(), registers as usize);
            for (i, part) in parts.iter().enumerate() {
                prop_assert_eq!(part, &format!("_{}", crate::utils::ascii_name(i)));
            }
        }

        #[test]
        fn test_composite_ops_emit_one_native_op_per_component(
            ty in composite_int_type(),
            op in prop_oneof![Just(BinOp::Add), Just(BinOp::Sub), Just(BinOp::Max), Just(BinOp::BitXor)],
        ) {
            let (part, k) = decompose(ty).unwrap();
            let e = Expr::binary(op, Expr::var("a", ty), Expr::var("b", ty));
            let (value, rendered) = lower(&e);
            prop_assert_eq!(rendered.len(), k as usize);
            for (i, r) in rendered.iter().enumerate() {
                let needle = format!("a.native_vector[{}]", i);
                prop_assert!(r.contains(&needle));
                prop_assert!(r.starts_with("IVP_"));
            }
            match value {
                Value::Parts { part_ty, parts, .. } => {
                    prop_assert_eq!(part_ty, part);
                    prop_assert_eq!(parts.len(), k as usize);
                }
                other => prop_assert!(false, "expected parts, got {:?}", other),
            }
        }

        #[test]
        fn test_multiply_and_divide_by_eight_shift(ty in composite_int_type(), native in any::<bool>()) {
            let ty = if native { decompose(ty).unwrap().0 } else { ty };
            for op in [BinOp::Mul, BinOp::Div] {
                let e = Expr::binary(op, Expr::var("a", ty), Expr::broadcast(Expr::int(ty.element_of(), 8), ty.lanes));
                let (_, rendered) = lower(&e);
                prop_assert!(!rendered.is_empty());
                for r in &rendered {
                    prop_assert!(r.starts_with("IVP_SLLI") || r.starts_with("IVP_SRAI") || r.starts_with("IVP_SRLI"), "{}", r);
                    prop_assert!(r.ends_with(", 3)"));
                }
            }
        }
    }
}
