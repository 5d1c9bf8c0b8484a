//! Dequantize-compute-quantize wrappers.
//!
//! A float kernel runs on the real values of low-precision inputs (u8/i8
//! codes are dequantized, f16 is widened) and its result is written back in
//! the output's own representation (quantized into the output domain or
//! narrowed to f16).

use qnn_tensor::{DType, Tensor};

use crate::backend::DisoKernel;
use crate::error::Result;
use crate::ops::elementwise::DisoParams;

/// Real values of `t` as an f32 tensor with the same shape and layout.
pub(crate) fn to_f32_tensor(t: &Tensor) -> Result<Tensor> {
    Ok(Tensor::from_f32(t.to_f32_vec()?, t.shape().clone(), t.layout())?)
}

/// Zeroed f32 tensor shaped like `t`.
pub(crate) fn f32_like(t: &Tensor) -> Result<Tensor> {
    Ok(Tensor::zeros(t.shape().clone(), DType::F32, t.layout())?)
}

/// Write float results into `output` in its own representation.
pub(crate) fn store(output: &mut Tensor, values: &Tensor) -> Result<()> {
    output.fill_from_f32(values.data_f32()?)?;
    Ok(())
}

/// Run a single-input float kernel on the real values of `input`.
pub fn siso_via_f32<P>(
    input: &Tensor,
    output: &mut Tensor,
    params: &P,
    kernel: fn(&Tensor, &mut Tensor, &P) -> Result<()>,
) -> Result<()> {
    let x = to_f32_tensor(input)?;
    let mut y = f32_like(output)?;
    kernel(&x, &mut y, params)?;
    store(output, &y)
}

/// Run a two-input float kernel on the real values of `lhs` and `rhs`.
pub fn diso_via_f32(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut Tensor,
    params: &DisoParams,
    kernel: DisoKernel,
) -> Result<()> {
    let a = to_f32_tensor(lhs)?;
    let b = to_f32_tensor(rhs)?;
    let mut y = f32_like(output)?;
    kernel(&a, &b, &mut y, params)?;
    store(output, &y)
}

/// Run a float convolution-family kernel on the real values of its
/// operands. An i32 bias is taken to be in the accumulator domain
/// (`input_scale * weight_scale`, zero point 0).
pub fn conv_via_f32<P>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &P,
    f: fn(&Tensor, &mut Tensor, &Tensor, Option<&Tensor>, &P) -> Result<()>,
) -> Result<()> {
    let x = to_f32_tensor(input)?;
    let w = to_f32_tensor(kernel)?;
    let b = match bias {
        Some(b) if b.dtype() == DType::I32 => {
            let scale = input.quant_or_err()?.scale() * kernel.quant_or_err()?.scale();
            let real: Vec<f32> = b.data_i32()?.iter().map(|&v| v as f32 * scale).collect();
            Some(Tensor::from_f32(real, b.shape().clone(), b.layout())?)
        }
        Some(b) => Some(to_f32_tensor(b)?),
        None => None,
    };
    let mut y = f32_like(output)?;
    f(&x, &mut y, &w, b.as_ref(), params)?;
    store(output, &y)
}

/// Define named kernels that run a float single-input kernel through
/// [`siso_via_f32`], so they can be bound as plain function pointers.
macro_rules! siso_through_f32 {
    ($params:ty; $($name:ident => $float:path),* $(,)?) => {
        $(
            pub fn $name(
                input: &::qnn_tensor::Tensor,
                output: &mut ::qnn_tensor::Tensor,
                params: &$params,
            ) -> $crate::error::Result<()> {
                $crate::reference::wrapper::siso_via_f32(input, output, params, $float)
            }
        )*
    };
}

/// Binary counterpart of `siso_through_f32`.
macro_rules! diso_through_f32 {
    ($($name:ident => $float:path),* $(,)?) => {
        $(
            pub fn $name(
                lhs: &::qnn_tensor::Tensor,
                rhs: &::qnn_tensor::Tensor,
                output: &mut ::qnn_tensor::Tensor,
                params: &$crate::ops::elementwise::DisoParams,
            ) -> $crate::error::Result<()> {
                $crate::reference::wrapper::diso_via_f32(lhs, rhs, output, params, $float)
            }
        )*
    };
}

pub(crate) use diso_through_f32;
pub(crate) use siso_through_f32;
