//! Affine quantization codec.
//!
//! A real value `v` is stored as `q = round(v / scale) + zero_point`, clamped
//! to the code range of the storage type. Scales are carried as a Q31
//! mantissa plus a power-of-two exponent so that integer kernels can rescale
//! between domains without touching floating point:
//!
//! ```text
//! scale = multiplier * 2^(shift - 31),   multiplier in [2^30, 2^31)
//! ```

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Storage types that hold affine-quantized codes.
pub trait QuantElem: Copy + Default + PartialOrd + Send + Sync + 'static {
    const DTYPE: DType;
    const QMIN: i32;
    const QMAX: i32;

    /// Narrow a wide value, saturating at the code range.
    fn saturate(v: i64) -> Self;

    fn to_i32(self) -> i32;
}

impl QuantElem for u8 {
    const DTYPE: DType = DType::U8;
    const QMIN: i32 = u8::MIN as i32;
    const QMAX: i32 = u8::MAX as i32;

    #[inline]
    fn saturate(v: i64) -> Self {
        v.clamp(Self::QMIN as i64, Self::QMAX as i64) as u8
    }

    #[inline]
    fn to_i32(self) -> i32 {
        self as i32
    }
}

impl QuantElem for i8 {
    const DTYPE: DType = DType::I8;
    const QMIN: i32 = i8::MIN as i32;
    const QMAX: i32 = i8::MAX as i32;

    #[inline]
    fn saturate(v: i64) -> Self {
        v.clamp(Self::QMIN as i64, Self::QMAX as i64) as i8
    }

    #[inline]
    fn to_i32(self) -> i32 {
        self as i32
    }
}

/// Quantization domain of one tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuantParams {
    /// Code that represents real zero.
    pub zero_point: i32,
    /// Q31 mantissa of the scale.
    pub multiplier: i32,
    /// Power-of-two exponent of the scale.
    pub shift: i32,
}

impl QuantParams {
    pub fn new(zero_point: i32, multiplier: i32, shift: i32) -> Self {
        QuantParams {
            zero_point,
            multiplier,
            shift,
        }
    }

    /// Build a domain from a real scale and a zero point.
    pub fn from_scale(scale: f32, zero_point: i32) -> Self {
        let (multiplier, shift) = quantize_multiplier(scale as f64);
        QuantParams {
            zero_point,
            multiplier,
            shift,
        }
    }

    /// Derive the domain covering the real interval `[min, max]` for `dtype`.
    ///
    /// The interval is always widened to contain zero so that real zero is
    /// exactly representable.
    pub fn from_range(min: f32, max: f32, dtype: DType) -> Result<Self> {
        let (qmin, qmax) = dtype
            .quant_range()
            .ok_or_else(|| TensorError::UnsupportedDType(format!("{} is not quantized", dtype)))?;
        if !min.is_finite() || !max.is_finite() {
            return Err(TensorError::Other(format!(
                "quantization range [{}, {}] is not finite",
                min, max
            )));
        }
        let min = min.min(0.0);
        let max = max.max(0.0);
        if max == min {
            return Ok(QuantParams::from_scale(1.0, 0.clamp(qmin, qmax)));
        }

        let scale = (max - min) / (qmax - qmin) as f32;
        let zero_point = ((qmin as f32 - min / scale).round() as i32).clamp(qmin, qmax);
        Ok(QuantParams::from_scale(scale, zero_point))
    }

    /// The real scale represented by `(multiplier, shift)`.
    pub fn scale(&self) -> f32 {
        multiplier_to_scale(self.multiplier, self.shift) as f32
    }

    pub fn quantize<T: QuantElem>(&self, v: f32) -> T {
        quantize(v, self.zero_point, self.scale())
    }

    pub fn dequantize<T: QuantElem>(&self, q: T) -> f32 {
        dequantize(q, self.zero_point, self.scale())
    }

    /// Move a code from this domain into `output` using integer arithmetic.
    pub fn requantize_to<T: QuantElem>(&self, q: T, output: &QuantParams) -> T {
        requantize(
            q,
            self.zero_point,
            self.multiplier,
            self.shift,
            output.zero_point,
            output.multiplier,
            output.shift,
        )
    }
}

/// `q = round(v / scale) + zero_point`, saturated to `T`'s code range.
///
/// NaN maps to the zero point and infinities saturate.
#[inline]
pub fn quantize<T: QuantElem>(v: f32, zero_point: i32, scale: f32) -> T {
    // Float-to-int `as` casts saturate and send NaN to 0.
    let q = (v / scale).round() as i64;
    T::saturate(q.saturating_add(zero_point as i64))
}

/// `v = (q - zero_point) * scale`.
#[inline]
pub fn dequantize<T: QuantElem>(q: T, zero_point: i32, scale: f32) -> f32 {
    (q.to_i32() - zero_point) as f32 * scale
}

/// Rescale a code from one domain to another without a float intermediate.
///
/// The two scales are first folded into a single Q31 multiplier and exponent
/// (`in_scale / out_scale`), which is then applied to `q_in - in_zero_point`
/// with a rounding doubling high-multiply followed by a rounding shift.
pub fn requantize<T: QuantElem>(
    q_in: T,
    in_zero_point: i32,
    in_multiplier: i32,
    in_shift: i32,
    out_zero_point: i32,
    out_multiplier: i32,
    out_shift: i32,
) -> T {
    let (multiplier, shift) = rescale_multiplier(in_multiplier, in_shift, out_multiplier, out_shift);
    let x = q_in.to_i32() - in_zero_point;
    let y = multiply_by_quantized_multiplier(x, multiplier, shift);
    T::saturate(y as i64 + out_zero_point as i64)
}

/// Q31 multiplier and exponent for `in_scale / out_scale`.
///
/// Degenerate scales (non-positive mantissas) collapse to a zero multiplier.
pub fn rescale_multiplier(
    in_multiplier: i32,
    in_shift: i32,
    out_multiplier: i32,
    out_shift: i32,
) -> (i32, i32) {
    if in_multiplier <= 0 || out_multiplier <= 0 {
        return (0, 0);
    }
    let num = (in_multiplier as i64) << 31;
    let den = out_multiplier as i64;
    let mut ratio = (num + den / 2) / den;
    if ratio == 0 {
        return (0, 0);
    }
    let mut shift = in_shift - out_shift;
    while ratio >= 1i64 << 31 {
        ratio = (ratio + 1) >> 1;
        shift += 1;
    }
    while ratio < 1i64 << 30 {
        ratio <<= 1;
        shift -= 1;
    }
    (ratio as i32, shift)
}

/// Decompose a positive real multiplier into a Q31 mantissa in
/// `[2^30, 2^31)` and a power-of-two exponent.
///
/// Zero, negative and non-finite inputs, and multipliers too small to
/// represent, yield `(0, 0)`.
pub fn quantize_multiplier(real: f64) -> (i32, i32) {
    if !(real.is_finite() && real > 0.0) {
        return (0, 0);
    }
    let mut q = real;
    let mut shift = 0i32;
    while q >= 1.0 {
        q /= 2.0;
        shift += 1;
    }
    while q < 0.5 {
        q *= 2.0;
        shift -= 1;
    }
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        shift += 1;
    }
    if shift < -31 {
        return (0, 0);
    }
    (q_fixed as i32, shift)
}

/// The real value of a `(multiplier, shift)` pair.
pub fn multiplier_to_scale(multiplier: i32, shift: i32) -> f64 {
    multiplier as f64 / (1i64 << 31) as f64 * 2f64.powi(shift)
}

/// `round(a * b / 2^31)`, saturating the single overflowing case.
#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// `round(x / 2^exponent)`, rounding half away from zero.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!((0..=31).contains(&exponent));
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i32::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// `round(x * multiplier * 2^(shift - 31))` in integer arithmetic.
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
    let left = shift.max(0);
    let right = (-shift).max(0);
    if right > 31 {
        return 0;
    }
    let shifted = if left >= 32 {
        if x == 0 {
            0
        } else if x > 0 {
            i32::MAX
        } else {
            i32::MIN
        }
    } else {
        ((x as i64) << left).clamp(i32::MIN as i64, i32::MAX as i64) as i32
    };
    rounding_divide_by_pot(saturating_rounding_doubling_high_mul(shifted, multiplier), right)
}
