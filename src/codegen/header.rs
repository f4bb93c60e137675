use indexmap::IndexSet;
use std::fmt;

use crate::common::Type;
use crate::target::{decompose, is_native};

/// Collects the vector types a translation unit uses and writes the prelude that declares them.
pub struct HeaderEmitter {
    /// Types represented as a tuple of native registers.
    pub composite_types: IndexSet<Type>,
    /// Vector types with no register mapping, declared as compiler vector extensions.
    pub vector_type_defs: IndexSet<Type>,
    pub emit_openmp_header: bool,
}

impl HeaderEmitter {
    pub fn new() -> Self {
        Self {
            composite_types: IndexSet::new(),
            vector_type_defs: IndexSet::new(),
            emit_openmp_header: false,
        }
    }

    /// Records that generated code names `ty`.
    pub fn note_type(&mut self, ty: Type) {
        if ty.is_scalar() || is_native(ty) {
            return;
        }
        if let Some((part, _)) = decompose(ty) {
            self.note_type(part);
            self.composite_types.insert(ty);
        } else {
            self.vector_type_defs.insert(ty);
        }
    }

    pub fn merge(&mut self, other: HeaderEmitter) {
        self.composite_types.extend(other.composite_types);
        self.vector_type_defs.extend(other.vector_type_defs);
        self.emit_openmp_header |= other.emit_openmp_header;
    }

    pub fn emit<W: fmt::Write>(&self, out: &mut W) -> Result<(), fmt::Error> {
        out.write_str(include_str!("../codegen/partials/xtensa.h"))?;
        out.write_char('\n')?;
        if self.emit_openmp_header {
            out.write_str("#include <omp.h>\n\n")?;
        }

        for vec_type in &self.vector_type_defs {
            writeln!(
                out,
                "typedef {} {} __attribute__((ext_vector_type({})));",
                vec_type.c_scalar_name(),
                vec_type.c_name(),
                vec_type.lanes
            )?;
        }
        if !self.vector_type_defs.is_empty() {
            out.write_char('\n')?;
        }

        for composite in &self.composite_types {
            if let Some((part, count)) = decompose(*composite) {
                writeln!(
                    out,
                    "using {} = MultipleOfNativeVector<{}, {}>;",
                    composite.c_name(),
                    part.c_name(),
                    count
                )?;
            }
        }
        if !self.composite_types.is_empty() {
            out.write_char('\n')?;
        }

        Ok(())
    }
}

impl Default for HeaderEmitter {
    fn default() -> Self {
        HeaderEmitter::new()
    }
}
