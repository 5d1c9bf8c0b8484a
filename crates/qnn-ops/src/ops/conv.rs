//! 2-D convolution, fused convolution + relu and 2-D deconvolution.

use qnn_tensor::{Layout, Tensor};

use crate::backend::ConvKernel;
use crate::error::{OpError, Result};
use crate::params::{KernelSlot, OpBase};
use crate::registry::{derive_conv_kind, OpKind};

/// Parameters of a 2-D convolution or deconvolution.
#[derive(Debug, Clone)]
pub struct ConvParams {
    pub base: OpBase,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
    pub pad_down: usize,
    pub pad_right: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub group: usize,
    op: Option<OpKind>,
    slot: KernelSlot<ConvKernel>,
}

impl ConvParams {
    /// Unit stride and dilation, no padding, one group.
    pub fn new(base: OpBase) -> Self {
        ConvParams {
            base,
            stride_h: 1,
            stride_w: 1,
            pad_top: 0,
            pad_left: 0,
            pad_down: 0,
            pad_right: 0,
            dilation_h: 1,
            dilation_w: 1,
            group: 1,
            op: None,
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

    pub fn with_dilation(mut self, h: usize, w: usize) -> Self {
        self.dilation_h = h;
        self.dilation_w = w;
        self
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    /// Operator identity resolved by the last successful init.
    pub fn bound_op(&self) -> Option<OpKind> {
        self.op
    }

    pub fn kernel(&self) -> Option<ConvKernel> {
        self.slot.get()
    }
}

impl Default for ConvParams {
    fn default() -> Self {
        Self::new(OpBase::default())
    }
}

const CONV_LAYOUTS: [Layout; 2] = [Layout::Nchw, Layout::Nhwc];

fn init_grouped(
    input: &Tensor,
    kernel: &Tensor,
    params: &mut ConvParams,
    fused_relu: bool,
) -> Result<()> {
    let layout = params.base.layout;
    let kind = derive_conv_kind(layout, params.group, input.dims(), kernel.dims()).ok_or(
        OpError::UnsupportedLayout {
            op: if fused_relu { OpKind::Conv2dRelu } else { OpKind::Conv2d },
            layout,
        },
    )?;
    let op = kind.op(fused_relu);
    let found = params.base.provider().conv2d(op, input.dtype(), layout);
    params.slot.bind(op, &params.base, input.dtype(), found)?;
    params.op = Some(op);
    Ok(())
}

fn invoke(
    fallback: OpKind,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    let op = params.op.unwrap_or(fallback);
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input, kernel], &[output]);
    f(input, output, kernel, bias, params)
}

/// Bind a plain, depthwise or grouped convolution kernel, chosen by
/// [`derive_conv_kind`] from the group count and the tensor dims.
pub fn conv2d_init(
    input: &Tensor,
    _output: &Tensor,
    kernel: &Tensor,
    _bias: Option<&Tensor>,
    params: &mut ConvParams,
) -> Result<()> {
    init_grouped(input, kernel, params, false)
}

pub fn conv2d(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    invoke(OpKind::Conv2d, input, output, kernel, bias, params)
}

/// [`conv2d_init`] for the convolution with a fused relu.
pub fn conv2d_relu_init(
    input: &Tensor,
    _output: &Tensor,
    kernel: &Tensor,
    _bias: Option<&Tensor>,
    params: &mut ConvParams,
) -> Result<()> {
    init_grouped(input, kernel, params, true)
}

pub fn conv2d_relu(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    invoke(OpKind::Conv2dRelu, input, output, kernel, bias, params)
}

pub fn deconv2d_init(
    input: &Tensor,
    _output: &Tensor,
    _kernel: &Tensor,
    _bias: Option<&Tensor>,
    params: &mut ConvParams,
) -> Result<()> {
    let op = OpKind::Deconv2d;
    params.base.expect_layout(op, &CONV_LAYOUTS)?;
    let found = params.base.provider().conv2d(op, input.dtype(), params.base.layout);
    params.slot.bind(op, &params.base, input.dtype(), found)?;
    params.op = Some(op);
    Ok(())
}

pub fn deconv2d(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    invoke(OpKind::Deconv2d, input, output, kernel, bias, params)
}
