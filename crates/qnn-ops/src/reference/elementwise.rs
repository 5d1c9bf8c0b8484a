//! Unary and broadcasting binary elementwise kernels.

use qnn_tensor::geometry::broadcast_offsets;
use qnn_tensor::{Shape, Tensor};

use crate::error::{OpError, Result};
use crate::ops::elementwise::{DisoParams, SisoParams};
use crate::reference::activation::map_f32;
use crate::reference::wrapper::{diso_through_f32, siso_through_f32};
use crate::registry::OpKind;

pub fn negative_f32(input: &Tensor, output: &mut Tensor, _params: &SisoParams) -> Result<()> {
    map_f32(OpKind::Negative, input, output, |v| -v)
}

pub fn floor_f32(input: &Tensor, output: &mut Tensor, _params: &SisoParams) -> Result<()> {
    map_f32(OpKind::Floor, input, output, f32::floor)
}

pub fn abs_f32(input: &Tensor, output: &mut Tensor, _params: &SisoParams) -> Result<()> {
    map_f32(OpKind::Abs, input, output, f32::abs)
}

siso_through_f32! { SisoParams;
    negative_via_f32 => negative_f32,
    floor_via_f32 => floor_f32,
    abs_via_f32 => abs_f32,
}

/// `output = f(lhs, rhs)` under numpy broadcasting. The output must already
/// have the broadcast shape.
fn broadcast_f32(
    op: OpKind,
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut Tensor,
    f: impl Fn(f32, f32) -> f32,
) -> Result<()> {
    let shape = Shape::broadcast_shape(lhs.shape(), rhs.shape())?;
    if &shape != output.shape() {
        return Err(OpError::invalid(
            op,
            format!("output shape {} is not the broadcast shape {}", output.shape(), shape),
        ));
    }
    let a = lhs.data_f32()?;
    let b = rhs.data_f32()?;
    let y = output.data_f32_mut()?;

    if lhs.shape() == rhs.shape() {
        for ((o, &x), &z) in y.iter_mut().zip(a).zip(b) {
            *o = f(x, z);
        }
        return Ok(());
    }

    let a_off = broadcast_offsets(shape.dims(), lhs.dims());
    let b_off = broadcast_offsets(shape.dims(), rhs.dims());
    for (i, o) in y.iter_mut().enumerate() {
        *o = f(a[a_off[i]], b[b_off[i]]);
    }
    Ok(())
}

macro_rules! binary_f32 {
    ($($name:ident, $op:expr => $f:expr;)*) => {
        $(
            pub fn $name(
                lhs: &Tensor,
                rhs: &Tensor,
                output: &mut Tensor,
                _params: &DisoParams,
            ) -> Result<()> {
                broadcast_f32($op, lhs, rhs, output, $f)
            }
        )*
    };
}

binary_f32! {
    add_f32, OpKind::Add => |a, b| a + b;
    sub_f32, OpKind::Sub => |a, b| a - b;
    mul_f32, OpKind::Mul => |a, b| a * b;
    div_f32, OpKind::Div => |a, b| a / b;
    floor_divide_f32, OpKind::FloorDivide => |a: f32, b: f32| (a / b).floor();
    maximum_f32, OpKind::Maximum => f32::max;
    minimum_f32, OpKind::Minimum => f32::min;
}

diso_through_f32! {
    add_via_f32 => add_f32,
    sub_via_f32 => sub_f32,
    mul_via_f32 => mul_f32,
    div_via_f32 => div_f32,
    floor_divide_via_f32 => floor_divide_f32,
    maximum_via_f32 => maximum_f32,
    minimum_via_f32 => minimum_f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnn_tensor::{DType, Layout, QuantParams};

    fn flat(data: Vec<f32>, dims: &[usize]) -> Tensor {
        Tensor::from_f32(data, dims, Layout::Flat).unwrap()
    }

    #[test]
    fn test_unary() {
        let input = flat(vec![-1.5, 0.0, 2.25], &[3]);
        let mut out = Tensor::zeros([3], DType::F32, Layout::Flat).unwrap();
        let p = SisoParams::default();
        negative_f32(&input, &mut out, &p).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[1.5, -0.0, -2.25]);
        floor_f32(&input, &mut out, &p).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[-2.0, 0.0, 2.0]);
        abs_f32(&input, &mut out, &p).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[1.5, 0.0, 2.25]);
    }

    #[test]
    fn test_broadcast_both_sides() {
        // [2, 1] op [3] -> [2, 3]
        let a = flat(vec![10.0, 20.0], &[2, 1]);
        let b = flat(vec![1.0, 2.0, 3.0], &[3]);
        let mut out = Tensor::zeros([2, 3], DType::F32, Layout::Flat).unwrap();
        let p = DisoParams::default();
        sub_f32(&a, &b, &mut out, &p).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[9.0, 8.0, 7.0, 19.0, 18.0, 17.0]);
        maximum_f32(&b, &a, &mut out, &p).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[10.0, 10.0, 10.0, 20.0, 20.0, 20.0]);
    }

    #[test]
    fn test_output_must_have_broadcast_shape() {
        let a = flat(vec![1.0, 2.0], &[2]);
        let mut out = Tensor::zeros([3], DType::F32, Layout::Flat).unwrap();
        let err = mul_f32(&a, &a, &mut out, &DisoParams::default()).unwrap_err();
        assert!(matches!(err, OpError::InvalidParams { op: OpKind::Mul, .. }));

        let b = flat(vec![1.0, 2.0, 3.0], &[3]);
        let err = mul_f32(&a, &b, &mut out, &DisoParams::default()).unwrap_err();
        assert_eq!(err.status(), crate::error::Status::InvalidArgument);
    }

    #[test]
    fn test_quantized_operands_in_different_domains() {
        let a = Tensor::quantized_from_f32(
            &[1.0, 2.0],
            [2],
            Layout::Flat,
            DType::U8,
            QuantParams::from_scale(0.5, 10),
        )
        .unwrap();
        let b = Tensor::quantized_from_f32(
            &[4.0, 4.0],
            [2],
            Layout::Flat,
            DType::U8,
            QuantParams::from_scale(0.25, 0),
        )
        .unwrap();
        let out_q = QuantParams::from_scale(0.125, 0);
        let mut out = Tensor::zeros([2], DType::U8, Layout::Flat).unwrap().with_quant(out_q);
        div_via_f32(&a, &b, &mut out, &DisoParams::default()).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![0.25, 0.5]);
    }
}
