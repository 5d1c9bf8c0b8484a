//! Data-movement operators: transpose, flatten, pad, slice, split, im2col.
//!
//! None of these change values; quantized outputs are requantized only when
//! their domain differs from the input's.

use qnn_tensor::{Layout, Tensor};

use crate::backend::{Im2colKernel, PadKernel, SliceKernel, SplitKernel};
use crate::error::Result;
use crate::ops::elementwise::SisoParams;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

/// Convert `input` from its own layout into `params.base.layout`.
pub fn transpose_init(input: &Tensor, _output: &Tensor, params: &mut SisoParams) -> Result<()> {
    params.init(OpKind::Transpose, input)
}

pub fn transpose(input: &Tensor, output: &mut Tensor, params: &SisoParams) -> Result<()> {
    params.invoke(OpKind::Transpose, input, output)
}

/// Copy `input` into a 2-D `[N, rest]` output.
pub fn flatten_init(input: &Tensor, _output: &Tensor, params: &mut SisoParams) -> Result<()> {
    params.init(OpKind::Flatten, input)
}

pub fn flatten(input: &Tensor, output: &mut Tensor, params: &SisoParams) -> Result<()> {
    params.invoke(OpKind::Flatten, input, output)
}

/// Constant padding, `pad_before[i]` / `pad_after[i]` elements on axis `i`.
#[derive(Debug, Clone, Default)]
pub struct PadParams {
    pub base: OpBase,
    pub pad_before: Vec<usize>,
    pub pad_after: Vec<usize>,
    /// Real value written into the padding; quantized outputs store its code.
    pub pad_value: f32,
    slot: KernelSlot<PadKernel>,
}

impl PadParams {
    pub fn new(base: OpBase, pad_before: Vec<usize>, pad_after: Vec<usize>) -> Self {
        PadParams {
            base,
            pad_before,
            pad_after,
            pad_value: 0.0,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.pad_value = value;
        self
    }
}

pub fn pad_init(input: &Tensor, _output: &Tensor, params: &mut PadParams) -> Result<()> {
    let op = OpKind::Pad;
    let found = params.base.provider().pad(input.dtype(), params.base.layout);
    params.slot.bind(op, &params.base, input.dtype(), found)
}

pub fn pad(input: &Tensor, output: &mut Tensor, params: &PadParams) -> Result<()> {
    let op = OpKind::Pad;
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input], &[output]);
    f(input, output, params)
}

/// Strided slice: axis `i` keeps `begin[i], begin[i] + strides[i], ...`
/// below `end[i]`.
#[derive(Debug, Clone, Default)]
pub struct SliceParams {
    pub base: OpBase,
    pub begin: Vec<usize>,
    pub end: Vec<usize>,
    pub strides: Vec<usize>,
    slot: KernelSlot<SliceKernel>,
}

impl SliceParams {
    /// Unit strides on every axis.
    pub fn new(base: OpBase, begin: Vec<usize>, end: Vec<usize>) -> Self {
        let strides = vec![1; begin.len()];
        SliceParams {
            base,
            begin,
            end,
            strides,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }
}

pub fn slice_init(input: &Tensor, _output: &Tensor, params: &mut SliceParams) -> Result<()> {
    let op = OpKind::Slice;
    let found = params.base.provider().slice(input.dtype());
    params.slot.bind(op, &params.base, input.dtype(), found)
}

pub fn slice(input: &Tensor, output: &mut Tensor, params: &SliceParams) -> Result<()> {
    let op = OpKind::Slice;
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input], &[output]);
    f(input, output, params)
}

/// Split along `axis`; each output takes as many slices as its own extent
/// on that axis.
#[derive(Debug, Clone, Default)]
pub struct SplitParams {
    pub base: OpBase,
    pub axis: usize,
    slot: KernelSlot<SplitKernel>,
}

impl SplitParams {
    pub fn new(base: OpBase, axis: usize) -> Self {
        SplitParams {
            base,
            axis,
            slot: KernelSlot::empty(),
        }
    }
}

pub fn split_init(input: &Tensor, _outputs: &[Tensor], params: &mut SplitParams) -> Result<()> {
    let op = OpKind::Split;
    let found = params.base.provider().split(input.dtype());
    params.slot.bind(op, &params.base, input.dtype(), found)
}

pub fn split(input: &Tensor, outputs: &mut [Tensor], params: &SplitParams) -> Result<()> {
    let op = OpKind::Split;
    let f = params.slot.bound(op)?;
    let refs: Vec<&Tensor> = outputs.iter().collect();
    params.base.trace_invoke(op, &[input], &refs);
    f(input, outputs, params)
}

/// Unfold NCHW patches into a `[C * kernel_h * kernel_w, N * out_h * out_w]`
/// matrix.
#[derive(Debug, Clone)]
pub struct Im2colParams {
    pub base: OpBase,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_down: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    slot: KernelSlot<Im2colKernel>,
}

impl Im2colParams {
    pub fn new(base: OpBase, kernel_h: usize, kernel_w: usize) -> Self {
        Im2colParams {
            base,
            kernel_h,
            kernel_w,
            stride_h: 1,
            stride_w: 1,
            pad_top: 0,
            pad_down: 0,
            pad_left: 0,
            pad_right: 0,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_stride(mut self, h: usize, w: usize) -> Self {
        self.stride_h = h;
        self.stride_w = w;
        self
    }

    pub fn with_pad(mut self, top: usize, left: usize, down: usize, right: usize) -> Self {
        self.pad_top = top;
        self.pad_left = left;
        self.pad_down = down;
        self.pad_right = right;
        self
    }
}

pub fn im2col_init(input: &Tensor, _output: &Tensor, params: &mut Im2colParams) -> Result<()> {
    let op = OpKind::Im2col;
    params.base.expect_layout(op, &[Layout::Nchw])?;
    let found = params.base.provider().im2col(input.dtype(), params.base.layout);
    params.slot.bind(op, &params.base, input.dtype(), found)
}

pub fn im2col(input: &Tensor, output: &mut Tensor, params: &Im2colParams) -> Result<()> {
    let op = OpKind::Im2col;
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input], &[output]);
    f(input, output, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use qnn_tensor::DType;

    #[test]
    fn test_transpose_to_declared_layout() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let input = Tensor::from_f32(data, [1, 2, 2, 3], Layout::Nchw).unwrap();
        let mut output = Tensor::zeros([1, 2, 3, 2], DType::F32, Layout::Nhwc).unwrap();
        let mut params = SisoParams::new(OpBase::new(Layout::Nhwc));
        transpose_init(&input, &output, &mut params).unwrap();
        transpose(&input, &mut output, &params).unwrap();
        assert_eq!(
            output.data_f32().unwrap(),
            &[0.0, 6.0, 1.0, 7.0, 2.0, 8.0, 3.0, 9.0, 4.0, 10.0, 5.0, 11.0]
        );
    }

    #[test]
    fn test_pad_then_slice_back() {
        let input = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0], [2, 2], Layout::Flat).unwrap();
        let mut padded = Tensor::zeros([3, 4], DType::F32, Layout::Flat).unwrap();
        let mut pad_params =
            PadParams::new(OpBase::new(Layout::Flat), vec![1, 1], vec![0, 1]).with_value(-1.0);
        pad_init(&input, &padded, &mut pad_params).unwrap();
        pad(&input, &mut padded, &pad_params).unwrap();
        assert_eq!(
            padded.data_f32().unwrap(),
            &[-1.0, -1.0, -1.0, -1.0, -1.0, 1.0, 2.0, -1.0, -1.0, 3.0, 4.0, -1.0]
        );

        let mut back = Tensor::zeros([2, 2], DType::F32, Layout::Flat).unwrap();
        let mut slice_params = SliceParams::new(OpBase::new(Layout::Flat), vec![1, 1], vec![3, 3]);
        slice_init(&padded, &back, &mut slice_params).unwrap();
        slice(&padded, &mut back, &slice_params).unwrap();
        assert_eq!(back.data_f32().unwrap(), input.data_f32().unwrap());
    }

    #[test]
    fn test_flatten_keeps_batch() {
        let input = Tensor::from_i32((0..12).collect(), [2, 3, 2, 1], Layout::Nchw).unwrap();
        let mut output = Tensor::zeros([2, 6], DType::I32, Layout::Flat).unwrap();
        let mut params = SisoParams::new(OpBase::new(Layout::Nchw));
        flatten_init(&input, &output, &mut params).unwrap();
        flatten(&input, &mut output, &params).unwrap();
        assert_eq!(output.data_i32().unwrap(), input.data_i32().unwrap());
    }

    #[test]
    fn test_split_into_uneven_parts() {
        let input = Tensor::from_i32((0..6).collect(), [3, 2], Layout::Flat).unwrap();
        let mut outputs = vec![
            Tensor::zeros([1, 2], DType::I32, Layout::Flat).unwrap(),
            Tensor::zeros([2, 2], DType::I32, Layout::Flat).unwrap(),
        ];
        let mut params = SplitParams::new(OpBase::new(Layout::Flat), 0);
        split_init(&input, &outputs, &mut params).unwrap();
        split(&input, &mut outputs, &params).unwrap();
        assert_eq!(outputs[0].data_i32().unwrap(), &[0, 1]);
        assert_eq!(outputs[1].data_i32().unwrap(), &[2, 3, 4, 5]);
    }

    #[test]
    fn test_im2col_requires_nchw() {
        let input = Tensor::zeros([1, 2, 2, 1], DType::F32, Layout::Nhwc).unwrap();
        let mut params = Im2colParams::new(OpBase::new(Layout::Nhwc), 2, 2);
        let err = im2col_init(&input, &input, &mut params).unwrap_err();
        assert_eq!(err.status(), Status::UnsupportedLayout);
    }
}
