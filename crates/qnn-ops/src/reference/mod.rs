//! Portable reference kernels and the tables that bind them.
//!
//! Every kernel here is a plain function matching one of the signatures in
//! [`crate::backend`]. [`ReferenceBackend`] maps `(operator, dtype, layout)`
//! onto them; anything it does not list has no reference kernel.

pub mod activation;
pub mod conv;
pub mod deconv;
pub mod elementwise;
pub mod layout;
pub mod pool;
pub mod resize;
pub mod segment;
pub mod wrapper;

use qnn_tensor::{DType, Layout, Tensor, TensorError};

use crate::backend::{
    Conv3dKernel, ConvKernel, DisoKernel, Im2colKernel, KernelProvider, PadKernel, PoolKernel,
    ReluKernel, ResizeKernel, SegmentKernel, SisoKernel, SliceKernel, SplitKernel,
};
use crate::error::{OpError, Result};
use crate::registry::OpKind;

/// Split `dims` into `(batch, channels, [d, h, w])` for `layout`. Planar
/// layouts report a unit depth, 1-D layouts a unit depth and height.
pub(crate) fn split_dims(op: OpKind, dims: &[usize], layout: Layout) -> Result<(usize, usize, [usize; 3])> {
    let split = match (layout, dims) {
        (Layout::Ncw, &[n, c, w]) => (n, c, [1, 1, w]),
        (Layout::Nwc, &[n, w, c]) => (n, c, [1, 1, w]),
        (Layout::Nchw, &[n, c, h, w]) => (n, c, [1, h, w]),
        (Layout::Nhwc, &[n, h, w, c]) => (n, c, [1, h, w]),
        (Layout::Ncdhw, &[n, c, d, h, w]) => (n, c, [d, h, w]),
        (Layout::Ndhwc, &[n, d, h, w, c]) => (n, c, [d, h, w]),
        _ => {
            return Err(OpError::invalid(
                op,
                format!("dims {:?} do not fit layout {}", dims, layout),
            ))
        }
    };
    Ok(split)
}

/// Flat offset of element `(n, c, z, y, x)` in a tensor with `channels`
/// channels and spatial extents `spatial`.
#[inline]
pub(crate) fn tensor_index(
    channel_last: bool,
    channels: usize,
    spatial: [usize; 3],
    n: usize,
    c: usize,
    [z, y, x]: [usize; 3],
) -> usize {
    let [d, h, w] = spatial;
    if channel_last {
        (((n * d + z) * h + y) * w + x) * channels + c
    } else {
        (((n * channels + c) * d + z) * h + y) * w + x
    }
}

/// Codes of a quantized tensor with its zero point subtracted.
pub(crate) fn centered_codes(t: &Tensor) -> Result<Vec<i32>> {
    let zp = t.quant_or_err()?.zero_point;
    let codes = match t.dtype() {
        DType::U8 => t.data_u8()?.iter().map(|&v| v as i32 - zp).collect(),
        DType::I8 => t.data_i8()?.iter().map(|&v| v as i32 - zp).collect(),
        other => {
            return Err(TensorError::UnsupportedDType(format!("{} is not quantized", other)).into())
        }
    };
    Ok(codes)
}

/// The built-in kernel set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceBackend;

impl KernelProvider for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn conv2d(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<ConvKernel> {
        if !matches!(layout, Layout::Nchw | Layout::Nhwc) {
            return None;
        }
        let f: ConvKernel = match (op, dtype) {
            (OpKind::Conv2d, DType::F32) => conv::conv2d_f32::<false>,
            (OpKind::Conv2d, DType::U8) => conv::conv2d_quant::<u8, false>,
            (OpKind::Conv2d, DType::I8) => conv::conv2d_quant::<i8, false>,
            (OpKind::Conv2dRelu, DType::F32) => conv::conv2d_f32::<true>,
            (OpKind::Conv2dRelu, DType::U8) => conv::conv2d_quant::<u8, true>,
            (OpKind::Conv2dRelu, DType::I8) => conv::conv2d_quant::<i8, true>,
            (OpKind::DepthwiseConv2d, DType::F32) => conv::depthwise_conv2d_f32::<false>,
            (OpKind::DepthwiseConv2d, DType::U8) => conv::depthwise_conv2d_quant::<u8, false>,
            (OpKind::DepthwiseConv2d, DType::I8) => conv::depthwise_conv2d_quant::<i8, false>,
            (OpKind::DepthwiseConv2dRelu, DType::F32) => conv::depthwise_conv2d_f32::<true>,
            (OpKind::DepthwiseConv2dRelu, DType::U8) => conv::depthwise_conv2d_quant::<u8, true>,
            (OpKind::DepthwiseConv2dRelu, DType::I8) => conv::depthwise_conv2d_quant::<i8, true>,
            (OpKind::GroupConv2d, DType::F32) => conv::group_conv2d_f32::<false>,
            (OpKind::GroupConv2d, DType::U8) => conv::group_conv2d_quant::<u8, false>,
            (OpKind::GroupConv2d, DType::I8) => conv::group_conv2d_quant::<i8, false>,
            (OpKind::GroupConv2dRelu, DType::F32) => conv::group_conv2d_f32::<true>,
            (OpKind::GroupConv2dRelu, DType::U8) => conv::group_conv2d_quant::<u8, true>,
            (OpKind::GroupConv2dRelu, DType::I8) => conv::group_conv2d_quant::<i8, true>,
            (OpKind::Deconv2d, DType::F32) => deconv::deconv2d_f32,
            (OpKind::Deconv2d, DType::U8 | DType::I8) => deconv::deconv2d_quant,
            _ => return None,
        };
        Some(f)
    }

    fn conv3d(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<Conv3dKernel> {
        let f: Conv3dKernel = match (op, dtype, layout) {
            (OpKind::Conv3d, DType::F32, Layout::Ncdhw | Layout::Ndhwc) => conv::conv3d_f32,
            (OpKind::Conv3d, DType::U8, Layout::Ncdhw | Layout::Ndhwc) => conv::conv3d_quant::<u8>,
            (OpKind::Conv3d, DType::I8, Layout::Ncdhw | Layout::Ndhwc) => conv::conv3d_quant::<i8>,
            (OpKind::Deconv3d, DType::F32, Layout::Ncdhw) => deconv::deconv3d_ncdhw_f32,
            (OpKind::Deconv3d, DType::F32 | DType::U8 | DType::I8, Layout::Ncdhw | Layout::Ndhwc) => {
                deconv::deconv3d_unimplemented
            }
            _ => return None,
        };
        Some(f)
    }

    fn pool(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<PoolKernel> {
        use pool::*;
        match (op, layout) {
            (
                OpKind::MaxPool2d
                | OpKind::AvgPool2d
                | OpKind::GlobalMaxPool2d
                | OpKind::GlobalAvgPool2d,
                Layout::Nchw | Layout::Nhwc,
            )
            | (OpKind::MaxPool3d | OpKind::AvgPool3d, Layout::Ncdhw) => {}
            (OpKind::MaxPool3d | OpKind::AvgPool3d, Layout::Ndhwc) => {
                return match dtype {
                    DType::F32 | DType::U8 | DType::I8 => Some(pool3d_unimplemented as PoolKernel),
                    _ => None,
                };
            }
            _ => return None,
        }
        let f: PoolKernel = match (op, dtype) {
            (OpKind::MaxPool2d, DType::F32) => maxpool2d_f32,
            (OpKind::MaxPool2d, DType::U8) => maxpool2d_quant::<u8>,
            (OpKind::MaxPool2d, DType::I8) => maxpool2d_quant::<i8>,
            (OpKind::AvgPool2d, DType::F32) => avgpool2d_f32,
            (OpKind::AvgPool2d, DType::U8) => avgpool2d_quant::<u8>,
            (OpKind::AvgPool2d, DType::I8) => avgpool2d_quant::<i8>,
            (OpKind::GlobalMaxPool2d, DType::F32) => global_maxpool2d_f32,
            (OpKind::GlobalMaxPool2d, DType::U8) => global_maxpool2d_quant::<u8>,
            (OpKind::GlobalMaxPool2d, DType::I8) => global_maxpool2d_quant::<i8>,
            (OpKind::GlobalAvgPool2d, DType::F32) => global_avgpool2d_f32,
            (OpKind::GlobalAvgPool2d, DType::U8) => global_avgpool2d_quant::<u8>,
            (OpKind::GlobalAvgPool2d, DType::I8) => global_avgpool2d_quant::<i8>,
            (OpKind::MaxPool3d, DType::F32) => maxpool3d_f32,
            (OpKind::MaxPool3d, DType::U8) => maxpool3d_quant::<u8>,
            (OpKind::MaxPool3d, DType::I8) => maxpool3d_quant::<i8>,
            (OpKind::AvgPool3d, DType::F32) => avgpool3d_f32,
            (OpKind::AvgPool3d, DType::U8) => avgpool3d_quant::<u8>,
            (OpKind::AvgPool3d, DType::I8) => avgpool3d_quant::<i8>,
            _ => return None,
        };
        Some(f)
    }

    fn resize(&self, dtype: DType, layout: Layout) -> Option<ResizeKernel> {
        if !matches!(layout, Layout::Nchw | Layout::Nhwc) {
            return None;
        }
        let f: ResizeKernel = match dtype {
            DType::F32 => resize::resize_f32,
            DType::U8 => resize::resize_quant::<u8>,
            DType::I8 => resize::resize_quant::<i8>,
            _ => return None,
        };
        Some(f)
    }

    fn relu(&self, op: OpKind, dtype: DType) -> Option<ReluKernel> {
        use activation::*;
        let native = dtype == DType::F32;
        if !native && !matches!(dtype, DType::F16 | DType::U8 | DType::I8) {
            return None;
        }
        let f: ReluKernel = match (op, native) {
            (OpKind::Relu, true) => relu_f32,
            (OpKind::Relu, false) => relu_via_f32,
            (OpKind::Relu1, true) => relu1_f32,
            (OpKind::Relu1, false) => relu1_via_f32,
            (OpKind::Relu6, true) => relu6_f32,
            (OpKind::Relu6, false) => relu6_via_f32,
            (OpKind::ReluN, true) => relun_f32,
            (OpKind::ReluN, false) => relun_via_f32,
            (OpKind::LeakyRelu, true) => leaky_relu_f32,
            (OpKind::LeakyRelu, false) => leaky_relu_via_f32,
            (OpKind::Elu, true) => elu_f32,
            (OpKind::Elu, false) => elu_via_f32,
            _ => return None,
        };
        Some(f)
    }

    fn siso(&self, op: OpKind, dtype: DType, _layout: Layout) -> Option<SisoKernel> {
        use elementwise::*;
        // data movement works on every dtype
        match op {
            OpKind::Transpose => return Some(layout::transpose),
            OpKind::Flatten => return Some(layout::flatten),
            _ => {}
        }
        let native = dtype == DType::F32;
        if !native && !matches!(dtype, DType::F16 | DType::U8 | DType::I8) {
            return None;
        }
        let f: SisoKernel = match (op, native) {
            (OpKind::Negative, true) => negative_f32,
            (OpKind::Negative, false) => negative_via_f32,
            (OpKind::Floor, true) => floor_f32,
            (OpKind::Floor, false) => floor_via_f32,
            (OpKind::Abs, true) => abs_f32,
            (OpKind::Abs, false) => abs_via_f32,
            _ => return None,
        };
        Some(f)
    }

    fn diso(&self, op: OpKind, dtype: DType) -> Option<DisoKernel> {
        use elementwise::*;
        let native = dtype == DType::F32;
        if !native && !matches!(dtype, DType::F16 | DType::U8 | DType::I8) {
            return None;
        }
        let f: DisoKernel = match (op, native) {
            (OpKind::Add, true) => add_f32,
            (OpKind::Add, false) => add_via_f32,
            (OpKind::Sub, true) => sub_f32,
            (OpKind::Sub, false) => sub_via_f32,
            (OpKind::Mul, true) => mul_f32,
            (OpKind::Mul, false) => mul_via_f32,
            (OpKind::Div, true) => div_f32,
            (OpKind::Div, false) => div_via_f32,
            (OpKind::FloorDivide, true) => floor_divide_f32,
            (OpKind::FloorDivide, false) => floor_divide_via_f32,
            (OpKind::Maximum, true) => maximum_f32,
            (OpKind::Maximum, false) => maximum_via_f32,
            (OpKind::Minimum, true) => minimum_f32,
            (OpKind::Minimum, false) => minimum_via_f32,
            _ => return None,
        };
        Some(f)
    }

    fn im2col(&self, dtype: DType, data_layout: Layout) -> Option<Im2colKernel> {
        match (dtype, data_layout) {
            (DType::F32 | DType::U8 | DType::I8, Layout::Nchw) => Some(layout::im2col),
            _ => None,
        }
    }

    fn pad(&self, _dtype: DType, _layout: Layout) -> Option<PadKernel> {
        Some(layout::pad)
    }

    fn slice(&self, _dtype: DType) -> Option<SliceKernel> {
        Some(layout::slice)
    }

    fn split(&self, _dtype: DType) -> Option<SplitKernel> {
        Some(layout::split)
    }

    fn segment(&self, op: OpKind, dtype: DType) -> Option<SegmentKernel> {
        let f: SegmentKernel = match (op, dtype) {
            (OpKind::SegmentSum, DType::F32) => segment::segment_sum_f32,
            (OpKind::SegmentSum, DType::U8 | DType::I8) => segment::segment_sum_via_f32,
            _ => return None,
        };
        Some(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_dims() {
        let op = OpKind::Conv2d;
        assert_eq!(split_dims(op, &[2, 3, 4, 5], Layout::Nchw).unwrap(), (2, 3, [1, 4, 5]));
        assert_eq!(split_dims(op, &[2, 4, 5, 3], Layout::Nhwc).unwrap(), (2, 3, [1, 4, 5]));
        assert_eq!(
            split_dims(op, &[1, 6, 2, 3, 4], Layout::Ndhwc).unwrap(),
            (1, 4, [6, 2, 3])
        );
        assert!(split_dims(op, &[2, 3, 4], Layout::Nchw).is_err());
    }

    #[test]
    fn test_tensor_index_orders() {
        // [n=1, c=2, h=2, w=3]
        assert_eq!(tensor_index(false, 2, [1, 2, 3], 0, 1, [0, 1, 2]), 11);
        // [n=1, h=2, w=3, c=2]
        assert_eq!(tensor_index(true, 2, [1, 2, 3], 0, 1, [0, 1, 2]), 11);
        assert_eq!(tensor_index(true, 2, [1, 2, 3], 0, 0, [0, 0, 1]), 2);
        assert_eq!(tensor_index(false, 2, [1, 2, 3], 0, 0, [0, 0, 1]), 1);
    }

    #[test]
    fn test_centered_codes() {
        let q = qnn_tensor::QuantParams::from_scale(1.0, 3);
        let t = Tensor::from_u8(vec![0, 3, 5], [3], Layout::Flat, q).unwrap();
        assert_eq!(centered_codes(&t).unwrap(), vec![-3, 0, 2]);
        let f = Tensor::zeros([1], DType::F32, Layout::Flat).unwrap();
        assert!(centered_codes(&f).is_err());
    }

    #[test]
    fn test_table_lookups_are_stable() {
        let b = ReferenceBackend;
        let a = b.conv2d(OpKind::DepthwiseConv2d, DType::I8, Layout::Nhwc).unwrap();
        let c = b.conv2d(OpKind::DepthwiseConv2d, DType::I8, Layout::Nhwc).unwrap();
        assert_eq!(a as usize, c as usize);

        assert!(b.conv2d(OpKind::Conv2d, DType::F16, Layout::Nchw).is_none());
        assert!(b.conv2d(OpKind::Conv2d, DType::F32, Layout::Ncdhw).is_none());
        assert!(b.conv3d(OpKind::Deconv3d, DType::U8, Layout::Ndhwc).is_some());
        assert!(b.pool(OpKind::MaxPool2d, DType::F32, Layout::Ncdhw).is_none());
        assert!(b.pool(OpKind::MaxPool3d, DType::F32, Layout::Nchw).is_none());
        assert!(b.pool(OpKind::AvgPool3d, DType::U8, Layout::Ndhwc).is_some());
        assert!(b.siso(OpKind::Transpose, DType::I32, Layout::Nhwc).is_some());
        assert!(b.siso(OpKind::Abs, DType::I32, Layout::Flat).is_none());
        assert!(b.diso(OpKind::Maximum, DType::F16).is_some());
        assert!(b.im2col(DType::F32, Layout::Nhwc).is_none());
        assert!(b.segment(OpKind::SegmentSum, DType::I32).is_none());
    }
}
