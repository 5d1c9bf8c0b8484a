//! Spatial resize of NCHW / NHWC tensors.

use qnn_tensor::{Layout, Tensor};

use crate::backend::ResizeKernel;
use crate::error::Result;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResizeMode {
    #[default]
    Bilinear,
    NearestNeighbor,
    /// Accepted by init; invoking it reports `Unimplemented`.
    Bicubic,
}

#[derive(Debug, Clone)]
pub struct ResizeParams {
    pub base: OpBase,
    pub mode: ResizeMode,
    /// Map the corner pixels of input and output onto each other.
    pub align_corners: bool,
    slot: KernelSlot<ResizeKernel>,
}

impl ResizeParams {
    pub fn new(base: OpBase, mode: ResizeMode) -> Self {
        ResizeParams {
            base,
            mode,
            align_corners: false,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_align_corners(mut self, align: bool) -> Self {
        self.align_corners = align;
        self
    }

    pub fn kernel(&self) -> Option<ResizeKernel> {
        self.slot.get()
    }
}

impl Default for ResizeParams {
    fn default() -> Self {
        Self::new(OpBase::default(), ResizeMode::default())
    }
}

pub fn resize_init(input: &Tensor, _output: &Tensor, params: &mut ResizeParams) -> Result<()> {
    let op = OpKind::Resize;
    params.base.expect_layout(op, &[Layout::Nchw, Layout::Nhwc])?;
    let found = params.base.provider().resize(input.dtype(), params.base.layout);
    params.slot.bind(op, &params.base, input.dtype(), found)
}

pub fn resize(input: &Tensor, output: &mut Tensor, params: &ResizeParams) -> Result<()> {
    let op = OpKind::Resize;
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input], &[output]);
    f(input, output, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use approx::assert_relative_eq;
    use qnn_tensor::DType;

    #[test]
    fn test_bilinear_upscale() {
        let input = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0], [1, 2, 2, 1], Layout::Nhwc).unwrap();
        let mut output = Tensor::zeros([1, 4, 4, 1], DType::F32, Layout::Nhwc).unwrap();
        let mut params = ResizeParams::new(OpBase::new(Layout::Nhwc), ResizeMode::Bilinear);
        resize_init(&input, &output, &mut params).unwrap();
        resize(&input, &mut output, &params).unwrap();
        let out = output.data_f32().unwrap();
        // (1, 1) samples input (0.5, 0.5): the mean of all four pixels
        assert_relative_eq!(out[5], 2.5);
        assert_relative_eq!(out[0], 1.0);
        // last row and column clamp to the input edge
        assert_relative_eq!(out[15], 4.0);
    }

    #[test]
    fn test_bicubic_is_unimplemented() {
        let input = Tensor::zeros([1, 2, 2, 1], DType::F32, Layout::Nhwc).unwrap();
        let mut output = Tensor::zeros([1, 4, 4, 1], DType::F32, Layout::Nhwc).unwrap();
        let mut params = ResizeParams::new(OpBase::new(Layout::Nhwc), ResizeMode::Bicubic);
        resize_init(&input, &output, &mut params).unwrap();
        let err = resize(&input, &mut output, &params).unwrap_err();
        assert_eq!(err.status(), Status::Unimplemented);
    }

    #[test]
    fn test_volume_layout_rejected() {
        let input = Tensor::zeros([1, 1, 1, 2, 2], DType::F32, Layout::Ncdhw).unwrap();
        let mut params = ResizeParams::new(OpBase::new(Layout::Ncdhw), ResizeMode::NearestNeighbor);
        let err = resize_init(&input, &input, &mut params).unwrap_err();
        assert_eq!(err.status(), Status::UnsupportedLayout);
    }
}
