use log::{debug, warn};

use super::c_utils::{CStmt, Rhs};
use super::expr::Value;
use super::intrinsics;
use super::xtensa::XtensaCodeGenerator;
use super::CodeGenError;
use crate::common::Type;
use crate::ir::Expr;
use crate::target::{decompose, is_native, native_lanes};

/// The shape of a shuffle, in the order strategies are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// Lanes of the given number of equal-length streams alternate.
    Interleave(usize),
    /// A contiguous run of lanes starting at the given source lane.
    Slice(usize),
    /// Every other lane, starting at the given offset.
    Deinterleave(usize),
    /// The sources, in order, unchanged.
    Concat,
    General,
}

impl<'a> XtensaCodeGenerator<'a> {
    pub(super) fn lower_shuffle(
        &mut self,
        vectors: &[Expr],
        indices: &[i32],
    ) -> Result<Value, CodeGenError> {
        let Some(first) = vectors.first() else {
            return Err(CodeGenError::MalformedIr("shuffle of no vectors".to_string()));
        };
        let elem = first.ty().element_of();
        if let Some(other) = vectors.iter().find(|v| v.ty().element_of() != elem) {
            return Err(CodeGenError::MalformedIr(format!(
                "shuffle mixes {} and {}",
                first.ty(),
                other.ty()
            )));
        }
        let total = vectors.iter().map(|v| v.ty().lanes as usize).sum::<usize>();
        if indices.is_empty() {
            return Err(CodeGenError::MalformedIr("shuffle with no indices".to_string()));
        }
        if let Some(bad) = indices
            .iter()
            .find(|&&i| i < -1 || i64::from(i) >= total as i64)
        {
            return Err(CodeGenError::MalformedIr(format!(
                "shuffle index {} outside 0..{}",
                bad, total
            )));
        }
        let lanes = u32::try_from(indices.len())
            .map_err(|_| CodeGenError::MalformedIr("shuffle is too wide".to_string()))?;
        let result = elem.with_lanes(lanes);

        let mut sources = Vec::with_capacity(vectors.len());
        for vector in vectors {
            sources.push(self.lower_expr(vector)?);
        }
        if sources.len() == 1 && is_identity(indices, total) {
            return Ok(sources.remove(0));
        }

        // Register-level strategies need every source laid out as whole native registers.
        if let Some(part) = native_part(elem) {
            if let Some(components) = self.source_components(&sources, part)? {
                let streams = equal_length_sources(vectors);
                let pattern = classify(indices, part.lanes as usize, components.len(), streams);
                debug!("Shuffle to {} classified as {:?}", result, pattern);
                if let Some(value) = self.shuffle_registers(pattern, &components, part, result)? {
                    return Ok(value);
                }
            }
        }

        if is_identity(indices, total) {
            let mut texts = Vec::with_capacity(sources.len());
            for source in sources {
                self.headers.note_type(source.ty());
                texts.push(self.materialize(source));
            }
            let concat = format!("xt_concat<{}>", result.c_name());
            let id = self.assign(result, Rhs::call(concat, texts), false);
            return Ok(Value::whole(result, id));
        }

        self.general_shuffle(sources, indices, elem.with_lanes(total as u32), result)
    }

    /// The concatenated native components of every source, or `None` if some source is not
    /// made of whole registers of type `part`.
    fn source_components(
        &mut self,
        sources: &[Value],
        part: Type,
    ) -> Result<Option<Vec<String>>, CodeGenError> {
        let mut components = vec![];
        for source in sources {
            let ty = source.ty();
            let whole_registers = ty == part || decompose(ty).is_some_and(|(p, _)| p == part);
            if !whole_registers {
                return Ok(None);
            }
            components.extend(self.components(source, part)?);
        }
        Ok(Some(components))
    }

    fn shuffle_registers(
        &mut self,
        pattern: Pattern,
        src: &[String],
        part: Type,
        result: Type,
    ) -> Result<Option<Value>, CodeGenError> {
        let width = part.lanes as usize;
        let out_parts = result.lanes as usize / width;
        let (Some(select), Some(tag)) = (
            intrinsics::select_immediate(part),
            intrinsics::select_width_tag(part),
        ) else {
            return Ok(None);
        };
        let select_imm = |generator: &mut Self, hi: &str, lo: &str, immediate: String| {
            generator.assign(
                part,
                Rhs::call(select, [hi.to_string(), lo.to_string(), immediate]),
                false,
            )
        };

        let parts = match pattern {
            Pattern::Interleave(ways) => {
                if !ways.is_power_of_two() || src.len() % ways != 0 {
                    return Ok(None);
                }
                let streams = src
                    .chunks(src.len() / ways)
                    .map(<[String]>::to_vec)
                    .collect();
                self.interleave_streams(streams, select, tag, part)
            }
            Pattern::Slice(start) => {
                let mut parts = Vec::with_capacity(out_parts);
                for j in 0..out_parts {
                    let offset = start + j * width;
                    let (q, r) = (offset / width, offset % width);
                    if r == 0 {
                        parts.push(src[q].clone());
                    } else {
                        parts.push(select_imm(
                            self,
                            &src[q + 1],
                            &src[q],
                            format!("IVP_SELI_{}_ROTATE_RIGHT_{}", tag, r),
                        ));
                    }
                }
                parts
            }
            Pattern::Deinterleave(offset) => {
                let mut parts = Vec::with_capacity(out_parts);
                for j in 0..out_parts {
                    parts.push(select_imm(
                        self,
                        &src[2 * j + 1],
                        &src[2 * j],
                        format!("IVP_SELI_{}_EXTRACT_1_OF_2_OFF_{}", tag, offset),
                    ));
                }
                parts
            }
            Pattern::Concat => src.to_vec(),
            Pattern::General => return Ok(None),
        };
        self.regroup(parts, part, result).map(Some)
    }

    /// Interleaves a power-of-two number of register streams of equal length, one lane from
    /// each in turn. The even and odd streams are interleaved first, then the two results.
    fn interleave_streams(
        &mut self,
        mut streams: Vec<Vec<String>>,
        select: &'static str,
        tag: &'static str,
        part: Type,
    ) -> Vec<String> {
        if streams.len() == 1 {
            return streams.remove(0);
        }
        let (evens, odds): (Vec<_>, Vec<_>) = streams
            .into_iter()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);
        let evens = evens.into_iter().map(|(_, s)| s).collect();
        let odds = odds.into_iter().map(|(_, s)| s).collect();
        let lo = self.interleave_streams(evens, select, tag, part);
        let hi = self.interleave_streams(odds, select, tag, part);
        let mut out = Vec::with_capacity(2 * lo.len());
        for (a, b) in lo.iter().zip(&hi) {
            for half in ["LO", "HI"] {
                let immediate = format!("IVP_SELI_{}_INTERLEAVE_1_{}", tag, half);
                out.push(self.assign(
                    part,
                    Rhs::call(select, [b.clone(), a.clone(), immediate]),
                    false,
                ));
            }
        }
        out
    }

    /// Gathers lanes through a constant index table. Don't-care lanes read source lane 0.
    fn general_shuffle(
        &mut self,
        sources: Vec<Value>,
        indices: &[i32],
        source_ty: Type,
        result: Type,
    ) -> Result<Value, CodeGenError> {
        warn!(
            "Shuffle to {} matches no register pattern; using an index table",
            result
        );
        let mut sources = sources;
        let source = if sources.len() == 1 {
            sources.remove(0)
        } else {
            let part = native_part(source_ty.element_of());
            let components = match part {
                Some(part) => self.source_components(&sources, part)?,
                None => None,
            };
            match (components, part) {
                (Some(components), Some(part)) => self.regroup(components, part, source_ty)?,
                _ => {
                    let mut texts = Vec::with_capacity(sources.len());
                    for source in sources {
                        self.headers.note_type(source.ty());
                        texts.push(self.materialize(source));
                    }
                    let concat = format!("xt_concat<{}>", source_ty.c_name());
                    let id = self.assign(source_ty, Rhs::call(concat, texts), false);
                    Value::whole(source_ty, id)
                }
            }
        };
        self.headers.note_type(source_ty);
        let source = self.materialize(source);

        let table = indices.iter().map(|&i| i.max(0)).collect::<Vec<_>>();
        let table_name = match self.cache.table(&table) {
            Some(name) => name.to_string(),
            None => {
                let name = self.namer.fresh_name();
                self.push(CStmt::IndexTable {
                    name: name.clone(),
                    values: table.clone(),
                });
                self.cache.insert_table(table, name.clone());
                name
            }
        };
        let shuffle = format!(
            "xt_shuffle<{}, {}>",
            result.c_name(),
            source_ty.c_name()
        );
        let id = self.assign(result, Rhs::call(shuffle, [source, table_name]), false);
        Ok(Value::whole(result, id))
    }
}

/// The native register type for `elem`, if register-level shuffles apply to it.
fn native_part(elem: Type) -> Option<Type> {
    if elem.is_bool() {
        return None;
    }
    let lanes = native_lanes(elem.class, elem.bits).ok()?;
    Some(elem.with_lanes(lanes)).filter(|t| is_native(*t))
}

fn is_identity(indices: &[i32], total: usize) -> bool {
    indices.len() == total && indices.iter().enumerate().all(|(i, &x)| x as usize == i && x >= 0)
}

/// The number of shuffle sources if they all have the same lane count, otherwise 1.
fn equal_length_sources(vectors: &[Expr]) -> usize {
    let lanes = vectors.first().map(|v| v.ty().lanes);
    if vectors.iter().all(|v| Some(v.ty().lanes) == lanes) {
        vectors.len()
    } else {
        1
    }
}

/// Classifies `indices` over `registers` source registers of `width` lanes each, which came from
/// `sources` equal-length vectors.
fn classify(indices: &[i32], width: usize, registers: usize, sources: usize) -> Pattern {
    let n = indices.len();
    let total = width * registers;
    let at = |i: usize| usize::try_from(indices[i]).ok();

    if n % width != 0 || indices.iter().any(|&i| i < 0) {
        return Pattern::General;
    }
    // Either the sources or their individual registers may be the interleaved streams.
    for ways in [sources, registers] {
        if ways < 2 || n != total || total % ways != 0 {
            continue;
        }
        let stride = total / ways;
        if (0..n).all(|i| at(i) == Some((i % ways) * stride + i / ways)) {
            return Pattern::Interleave(ways);
        }
    }
    if let Some(start) = at(0) {
        if start + n <= total && (0..n).all(|i| at(i) == Some(start + i)) {
            return if start == 0 && n == total {
                Pattern::Concat
            } else {
                Pattern::Slice(start)
            };
        }
    }
    for offset in 0..2 {
        if n * 2 == total && (0..n).all(|i| at(i) == Some(2 * i + offset)) {
            return Pattern::Deinterleave(offset);
        }
    }
    Pattern::General
}
