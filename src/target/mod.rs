mod xtensa;

pub use xtensa::{NativeVecType, XTENSA_VEC_TYPES};

use crate::common::{ElemClass, Type};

/// No hardware register shape exists for a requested element class and width.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no native register shape for {class}{bits} elements")]
pub struct UnsupportedWidth {
    pub class: ElemClass,
    pub bits: u8,
}

/// Returns the number of lanes one hardware register holds for elements of the given class and
/// width.
///
/// Boolean masks exist natively at several lane counts; the widest is returned.
pub fn native_lanes(class: ElemClass, bits: u8) -> Result<u32, UnsupportedWidth> {
    XTENSA_VEC_TYPES
        .iter()
        .filter(|v| v.class == class && v.bits == bits)
        .map(|v| v.lanes)
        .max()
        .ok_or(UnsupportedWidth { class, bits })
}

/// Checks that `ty` has a C representation on this target: a modeled element width and, for
/// vectors, an element type that some hardware register holds.
pub fn check_width(ty: Type) -> Result<(), UnsupportedWidth> {
    if !ty.has_valid_width() {
        return Err(UnsupportedWidth {
            class: ty.class,
            bits: ty.bits,
        });
    }
    if ty.is_vector() {
        native_lanes(ty.class, ty.bits)?;
    }
    Ok(())
}

/// Returns the register description of `ty` if `ty` is exactly one hardware register.
pub fn native_vec_type(ty: Type) -> Option<&'static NativeVecType> {
    XTENSA_VEC_TYPES
        .iter()
        .find(|v| v.class == ty.class && v.bits == ty.bits && v.lanes == ty.lanes)
}

pub fn is_native(ty: Type) -> bool {
    ty.is_vector() && native_vec_type(ty).is_some()
}

/// Splits a wide vector type into its native register type and a multiplicity.
///
/// Returns `None` for native types, for scalars, and for types whose lane count is not a
/// multiple of the native lane count (including sub-native types).
pub fn decompose(ty: Type) -> Option<(Type, u32)> {
    if ty.is_scalar() || is_native(ty) {
        return None;
    }
    let native = native_lanes(ty.class, ty.bits).ok()?;
    if ty.lanes > native && ty.lanes % native == 0 {
        Some((ty.with_lanes(native), ty.lanes / native))
    } else {
        None
    }
}

/// Returns the native type which `ty` can be padded into, if `ty` is a sub-native vector whose
/// lane count divides the native lane count.
pub fn padded_native(ty: Type) -> Option<Type> {
    if ty.is_scalar() || ty.is_bool() {
        return None;
    }
    let native = native_lanes(ty.class, ty.bits).ok()?;
    if ty.lanes < native && native % ty.lanes == 0 {
        Some(ty.with_lanes(native))
    } else {
        None
    }
}

/// The intrinsic name suffix of a native register type, e.g. `NX16U` for 32 lanes of `u16`.
pub fn suffix(ty: Type) -> Option<&'static str> {
    native_vec_type(ty).map(|v| v.suffix)
}
