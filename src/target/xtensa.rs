use crate::common::ElemClass;

/// One hardware vector register shape of the Xtensa vector unit.
#[derive(Debug, Hash, Eq, PartialEq)]
pub struct NativeVecType {
    pub class: ElemClass,
    pub bits: u8,
    pub lanes: u32,
    pub native_type_name: &'static str,
    pub suffix: &'static str,
}

macro_rules! define_xtensa_vec_types {
    ($name:ident, $len:expr, $( ($class:ident, $bits:expr, $lanes:expr, $native:expr, $suffix:expr) ),* $(,)?) => {
        pub const $name: [NativeVecType; $len] = [
            $(
                NativeVecType {
                    class: ElemClass::$class,
                    bits: $bits,
                    lanes: $lanes,
                    native_type_name: $native,
                    suffix: $suffix,
                },
            )*
        ];
    };
}

define_xtensa_vec_types!(
    XTENSA_VEC_TYPES,
    14,
    (Int, 8, 64, "xb_vec2Nx8", "2NX8"),
    (UInt, 8, 64, "xb_vec2Nx8U", "2NX8U"),
    (Int, 16, 32, "xb_vecNx16", "NX16"),
    (UInt, 16, 32, "xb_vecNx16U", "NX16U"),
    (Int, 24, 64, "xb_vec2Nx24", "2NX24"),
    (Int, 32, 16, "xb_vecN_2x32v", "N_2X32"),
    (UInt, 32, 16, "xb_vecN_2x32Uv", "N_2X32U"),
    (Int, 48, 32, "xb_vecNx48", "NX48"),
    (Int, 64, 16, "xb_vecN_2x64w", "N_2X64W"),
    (Float, 16, 32, "xb_vecNxf16", "NXF16"),
    (Float, 32, 16, "xb_vecN_2xf32", "N_2XF32"),
    // Predicate registers.
    (Bool, 1, 16, "vboolN_2", "BN_2"),
    (Bool, 1, 32, "vboolN", "BN"),
    (Bool, 1, 64, "vbool2N", "B2N"),
);
