//! Relu family, leaky relu and elu.

use qnn_tensor::Tensor;

use crate::error::{OpError, Result};
use crate::ops::activation::ReluParams;
use crate::reference::wrapper::siso_through_f32;
use crate::registry::OpKind;

/// Apply `f` to every element of an f32 tensor.
pub(crate) fn map_f32(
    op: OpKind,
    input: &Tensor,
    output: &mut Tensor,
    f: impl Fn(f32) -> f32,
) -> Result<()> {
    if input.numel() != output.numel() {
        return Err(OpError::invalid(
            op,
            format!("{} input elements, {} output", input.numel(), output.numel()),
        ));
    }
    let x = input.data_f32()?;
    for (o, &v) in output.data_f32_mut()?.iter_mut().zip(x) {
        *o = f(v);
    }
    Ok(())
}

pub fn relu_f32(input: &Tensor, output: &mut Tensor, _params: &ReluParams) -> Result<()> {
    map_f32(OpKind::Relu, input, output, |v| v.max(0.0))
}

pub fn relu1_f32(input: &Tensor, output: &mut Tensor, _params: &ReluParams) -> Result<()> {
    map_f32(OpKind::Relu1, input, output, |v| v.clamp(0.0, 1.0))
}

pub fn relu6_f32(input: &Tensor, output: &mut Tensor, _params: &ReluParams) -> Result<()> {
    map_f32(OpKind::Relu6, input, output, |v| v.clamp(0.0, 6.0))
}

/// `min(max(x, 0), n)`.
pub fn relun_f32(input: &Tensor, output: &mut Tensor, params: &ReluParams) -> Result<()> {
    let n = params.n;
    if n.is_nan() || n < 0.0 {
        return Err(OpError::invalid(OpKind::ReluN, format!("upper bound {}", n)));
    }
    map_f32(OpKind::ReluN, input, output, |v| v.max(0.0).min(n))
}

pub fn leaky_relu_f32(input: &Tensor, output: &mut Tensor, params: &ReluParams) -> Result<()> {
    let alpha = params.alpha;
    map_f32(OpKind::LeakyRelu, input, output, |v| if v < 0.0 { alpha * v } else { v })
}

/// `x < 0 ? alpha * (e^x - 1) : x`.
pub fn elu_f32(input: &Tensor, output: &mut Tensor, params: &ReluParams) -> Result<()> {
    let alpha = params.alpha;
    map_f32(OpKind::Elu, input, output, |v| if v < 0.0 { alpha * v.exp_m1() } else { v })
}

siso_through_f32! { ReluParams;
    relu_via_f32 => relu_f32,
    relu1_via_f32 => relu1_f32,
    relu6_via_f32 => relu6_f32,
    relun_via_f32 => relun_f32,
    leaky_relu_via_f32 => leaky_relu_f32,
    elu_via_f32 => elu_f32,
}
