use std::fmt;

/// Element types a tensor descriptor can carry.
///
/// The dtype is fixed for the lifetime of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// Unsigned 8-bit affine-quantized integer.
    U8,
    /// Signed 8-bit affine-quantized integer.
    I8,
    /// 32-bit signed integer, used for index tensors such as segment ids.
    I32,
}

impl DType {
    /// Returns the width in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 => 2,
            DType::U8 | DType::I8 => 1,
        }
    }

    /// Returns true for the 8-bit affine-quantized types.
    pub fn is_quantized(&self) -> bool {
        matches!(self, DType::U8 | DType::I8)
    }

    /// Returns true for the floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }

    /// Inclusive range of representable quantized codes, or `None` for
    /// non-quantized types.
    pub fn quant_range(&self) -> Option<(i32, i32)> {
        match self {
            DType::U8 => Some((u8::MIN as i32, u8::MAX as i32)),
            DType::I8 => Some((i8::MIN as i32, i8::MAX as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::U8 => write!(f, "u8"),
            DType::I8 => write!(f, "i8"),
            DType::I32 => write!(f, "i32"),
        }
    }
}
