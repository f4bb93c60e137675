use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ElemClass {
    Int,
    UInt,
    Float,
    Bool,
}

/// The type of an IR value: an element class, an element width in bits, and a lane count.
///
/// A [Type] with one lane is a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Type {
    pub class: ElemClass,
    pub bits: u8,
    pub lanes: u32,
}

impl Type {
    pub const fn new(class: ElemClass, bits: u8, lanes: u32) -> Self {
        Type { class, bits, lanes }
    }

    pub const fn int(bits: u8, lanes: u32) -> Self {
        Type::new(ElemClass::Int, bits, lanes)
    }

    pub const fn uint(bits: u8, lanes: u32) -> Self {
        Type::new(ElemClass::UInt, bits, lanes)
    }

    pub const fn float(bits: u8, lanes: u32) -> Self {
        Type::new(ElemClass::Float, bits, lanes)
    }

    pub const fn bool(lanes: u32) -> Self {
        Type::new(ElemClass::Bool, 1, lanes)
    }

    pub const fn is_scalar(&self) -> bool {
        self.lanes == 1
    }

    pub const fn is_vector(&self) -> bool {
        self.lanes > 1
    }

    pub const fn is_int(&self) -> bool {
        matches!(self.class, ElemClass::Int)
    }

    pub const fn is_uint(&self) -> bool {
        matches!(self.class, ElemClass::UInt)
    }

    pub const fn is_int_or_uint(&self) -> bool {
        matches!(self.class, ElemClass::Int | ElemClass::UInt)
    }

    pub const fn is_float(&self) -> bool {
        matches!(self.class, ElemClass::Float)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self.class, ElemClass::Bool)
    }

    /// Returns `true` for the wide accumulator element widths (24, 48 and 64 bits), which
    /// only appear as the result of widening target operations.
    pub const fn is_accumulator(&self) -> bool {
        matches!(self.class, ElemClass::Int) && matches!(self.bits, 24 | 48 | 64)
    }

    pub const fn element_of(&self) -> Type {
        self.with_lanes(1)
    }

    pub const fn with_lanes(&self, lanes: u32) -> Type {
        Type::new(self.class, self.bits, lanes)
    }

    pub const fn with_bits(&self, bits: u8) -> Type {
        Type::new(self.class, bits, self.lanes)
    }

    pub const fn with_class(&self, class: ElemClass) -> Type {
        Type::new(class, self.bits, self.lanes)
    }

    /// The bytes required to store one element of this type in memory.
    pub const fn bytes(&self) -> u32 {
        if self.bits <= 8 {
            1
        } else {
            (self.bits as u32 + 7) / 8
        }
    }

    /// The C name of a single element of this type.
    pub const fn c_scalar_name(&self) -> &'static str {
        match (self.class, self.bits) {
            (ElemClass::Bool, _) => "bool",
            (ElemClass::Int, 8) => "int8_t",
            (ElemClass::Int, 16) => "int16_t",
            (ElemClass::Int, 24) => "int24_t",
            (ElemClass::Int, 32) => "int32_t",
            (ElemClass::Int, 48) => "int48_t",
            (ElemClass::Int, 64) => "int64_t",
            (ElemClass::UInt, 8) => "uint8_t",
            (ElemClass::UInt, 16) => "uint16_t",
            (ElemClass::UInt, 32) => "uint32_t",
            (ElemClass::UInt, 64) => "uint64_t",
            (ElemClass::Float, 16) => "float16_t",
            (ElemClass::Float, 32) => "float",
            (ElemClass::Float, 64) => "double",
            _ => "void",
        }
    }

    /// The C name of this type as emitted in generated code.
    ///
    /// Vector names follow the `<elem><bits>x<lanes>_t` convention of the target's headers, with
    /// boolean masks spelled `uint1x<lanes>_t`.
    pub fn c_name(&self) -> String {
        if self.is_scalar() {
            return self.c_scalar_name().to_string();
        }
        let base = match self.class {
            ElemClass::Int => "int",
            ElemClass::UInt => "uint",
            ElemClass::Float => "float",
            ElemClass::Bool => return format!("uint1x{}_t", self.lanes),
        };
        format!("{}{}x{}_t", base, self.bits, self.lanes)
    }

    /// Returns `true` if `bits` is an element width this backend models for the class.
    pub const fn has_valid_width(&self) -> bool {
        match self.class {
            ElemClass::Bool => self.bits == 1,
            ElemClass::Int => matches!(self.bits, 8 | 16 | 24 | 32 | 48 | 64),
            ElemClass::UInt => matches!(self.bits, 8 | 16 | 32 | 64),
            ElemClass::Float => matches!(self.bits, 16 | 32 | 64),
        }
    }
}

impl Display for ElemClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElemClass::Int => write!(f, "i"),
            ElemClass::UInt => write!(f, "u"),
            ElemClass::Float => write!(f, "f"),
            ElemClass::Bool => write!(f, "bool"),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.class {
            ElemClass::Bool => write!(f, "bool")?,
            _ => write!(f, "{}{}", self.class, self.bits)?,
        }
        if self.is_vector() {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}
