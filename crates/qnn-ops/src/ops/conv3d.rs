//! 3-D convolution and deconvolution.

use qnn_tensor::{Layout, Tensor};

use crate::backend::Conv3dKernel;
use crate::error::Result;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

/// Parameters of a 3-D convolution or deconvolution.
#[derive(Debug, Clone)]
pub struct Conv3dParams {
    pub base: OpBase,
    pub stride_d: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_front: usize,
    pub pad_back: usize,
    pub pad_top: usize,
    pub pad_down: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub dilation_d: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub group: usize,
    slot: KernelSlot<Conv3dKernel>,
}

impl Conv3dParams {
    pub fn new(base: OpBase) -> Self {
        Conv3dParams {
            base,
            stride_d: 1,
            stride_h: 1,
            stride_w: 1,
            pad_front: 0,
            pad_back: 0,
            pad_top: 0,
            pad_down: 0,
            pad_left: 0,
            pad_right: 0,
            dilation_d: 1,
            dilation_h: 1,
            dilation_w: 1,
            group: 1,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_stride(mut self, d: usize, h: usize, w: usize) -> Self {
        self.stride_d = d;
        self.stride_h = h;
        self.stride_w = w;
        self
    }

    /// Padding as `(front, back)`, `(top, down)`, `(left, right)`.
    pub fn with_pad(mut self, d: (usize, usize), h: (usize, usize), w: (usize, usize)) -> Self {
        (self.pad_front, self.pad_back) = d;
        (self.pad_top, self.pad_down) = h;
        (self.pad_left, self.pad_right) = w;
        self
    }

    pub fn with_dilation(mut self, d: usize, h: usize, w: usize) -> Self {
        self.dilation_d = d;
        self.dilation_h = h;
        self.dilation_w = w;
        self
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    pub fn kernel(&self) -> Option<Conv3dKernel> {
        self.slot.get()
    }
}

impl Default for Conv3dParams {
    fn default() -> Self {
        Self::new(OpBase::new(Layout::Ncdhw))
    }
}

const VOLUME_LAYOUTS: [Layout; 2] = [Layout::Ncdhw, Layout::Ndhwc];

fn init(op: OpKind, input: &Tensor, params: &mut Conv3dParams) -> Result<()> {
    params.base.expect_layout(op, &VOLUME_LAYOUTS)?;
    let found = params.base.provider().conv3d(op, input.dtype(), params.base.layout);
    params.slot.bind(op, &params.base, input.dtype(), found)
}

fn invoke(
    op: OpKind,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input, kernel], &[output]);
    f(input, output, kernel, bias, params)
}

pub fn conv3d_init(
    input: &Tensor,
    _output: &Tensor,
    _kernel: &Tensor,
    _bias: Option<&Tensor>,
    params: &mut Conv3dParams,
) -> Result<()> {
    init(OpKind::Conv3d, input, params)
}

pub fn conv3d(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    invoke(OpKind::Conv3d, input, output, kernel, bias, params)
}

pub fn deconv3d_init(
    input: &Tensor,
    _output: &Tensor,
    _kernel: &Tensor,
    _bias: Option<&Tensor>,
    params: &mut Conv3dParams,
) -> Result<()> {
    init(OpKind::Deconv3d, input, params)
}

pub fn deconv3d(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    invoke(OpKind::Deconv3d, input, output, kernel, bias, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OpError, Status};
    use qnn_tensor::DType;

    #[test]
    fn test_deconv3d_channel_last_is_unimplemented() {
        let input = Tensor::zeros([1, 1, 1, 1, 1], DType::F32, Layout::Ndhwc).unwrap();
        let kernel = Tensor::zeros([1, 1, 1, 1, 1], DType::F32, Layout::Ndhwc).unwrap();
        let mut output = Tensor::zeros([1, 1, 1, 1, 1], DType::F32, Layout::Ndhwc).unwrap();
        let mut params = Conv3dParams::new(OpBase::new(Layout::Ndhwc));
        deconv3d_init(&input, &output, &kernel, None, &mut params).unwrap();
        let err = deconv3d(&input, &mut output, &kernel, None, &params).unwrap_err();
        assert_eq!(err.status(), Status::Unimplemented);
    }

    #[test]
    fn test_rejects_planar_layouts() {
        let input = Tensor::zeros([1, 1, 2, 2], DType::F32, Layout::Nchw).unwrap();
        let mut params = Conv3dParams::new(OpBase::new(Layout::Nchw));
        let err = conv3d_init(&input, &input, &input, None, &mut params).unwrap_err();
        assert_eq!(
            err,
            OpError::UnsupportedLayout {
                op: OpKind::Conv3d,
                layout: Layout::Nchw
            }
        );
    }

    #[test]
    fn test_conv3d_unbound() {
        let input = Tensor::zeros([1, 1, 1, 1, 1], DType::F32, Layout::Ncdhw).unwrap();
        let mut output = input.clone();
        let err = conv3d(&input, &mut output, &input, None, &Conv3dParams::default()).unwrap_err();
        assert_eq!(err.status(), Status::CallbackUnset);
    }
}
