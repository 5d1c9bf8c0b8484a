//! Max, average and global pooling.

use qnn_tensor::{Layout, Tensor};

use crate::backend::PoolKernel;
use crate::error::Result;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

/// Window parameters for 2-D and 3-D pooling. The depth fields are ignored
/// by the 2-D operators.
#[derive(Debug, Clone)]
pub struct PoolParams {
    pub base: OpBase,
    pub filter_d: usize,
    pub filter_h: usize,
    pub filter_w: usize,
    pub stride_d: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_front: usize,
    pub pad_back: usize,
    pub pad_top: usize,
    pub pad_down: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    /// Average pooling divides by the nominal window size instead of the
    /// number of taps inside the input.
    pub count_include_pad: bool,
    slot: KernelSlot<PoolKernel>,
}

impl PoolParams {
    /// 1x1x1 window, unit stride, no padding.
    pub fn new(base: OpBase) -> Self {
        PoolParams {
            base,
            filter_d: 1,
            filter_h: 1,
            filter_w: 1,
            stride_d: 1,
            stride_h: 1,
            stride_w: 1,
            pad_front: 0,
            pad_back: 0,
            pad_top: 0,
            pad_down: 0,
            pad_left: 0,
            pad_right: 0,
            count_include_pad: false,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_filter(mut self, h: usize, w: usize) -> Self {
        self.filter_h = h;
        self.filter_w = w;
        self
    }

    pub fn with_filter_3d(mut self, d: usize, h: usize, w: usize) -> Self {
        self.filter_d = d;
        self.with_filter(h, w)
    }

    pub fn with_stride(mut self, h: usize, w: usize) -> Self {
        self.stride_h = h;
        self.stride_w = w;
        self
    }

    pub fn with_stride_3d(mut self, d: usize, h: usize, w: usize) -> Self {
        self.stride_d = d;
        self.with_stride(h, w)
    }

    pub fn with_pad(mut self, top: usize, left: usize, down: usize, right: usize) -> Self {
        self.pad_top = top;
        self.pad_left = left;
        self.pad_down = down;
        self.pad_right = right;
        self
    }

    pub fn with_pad_depth(mut self, front: usize, back: usize) -> Self {
        self.pad_front = front;
        self.pad_back = back;
        self
    }

    pub fn with_count_include_pad(mut self, include: bool) -> Self {
        self.count_include_pad = include;
        self
    }

    pub fn kernel(&self) -> Option<PoolKernel> {
        self.slot.get()
    }
}

impl Default for PoolParams {
    fn default() -> Self {
        Self::new(OpBase::default())
    }
}

const PLANAR: [Layout; 2] = [Layout::Nchw, Layout::Nhwc];
const VOLUME: [Layout; 2] = [Layout::Ncdhw, Layout::Ndhwc];

fn init(op: OpKind, layouts: &[Layout], input: &Tensor, params: &mut PoolParams) -> Result<()> {
    params.base.expect_layout(op, layouts)?;
    let found = params.base.provider().pool(op, input.dtype(), params.base.layout);
    params.slot.bind(op, &params.base, input.dtype(), found)
}

fn invoke(op: OpKind, input: &Tensor, output: &mut Tensor, params: &PoolParams) -> Result<()> {
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input], &[output]);
    f(input, output, params)
}

macro_rules! pool_op {
    ($init:ident, $invoke:ident, $op:expr, $layouts:expr) => {
        pub fn $init(input: &Tensor, _output: &Tensor, params: &mut PoolParams) -> Result<()> {
            init($op, &$layouts, input, params)
        }

        pub fn $invoke(input: &Tensor, output: &mut Tensor, params: &PoolParams) -> Result<()> {
            invoke($op, input, output, params)
        }
    };
}

pool_op!(maxpool2d_init, maxpool2d, OpKind::MaxPool2d, PLANAR);
pool_op!(avgpool2d_init, avgpool2d, OpKind::AvgPool2d, PLANAR);
pool_op!(global_maxpool2d_init, global_maxpool2d, OpKind::GlobalMaxPool2d, PLANAR);
pool_op!(global_avgpool2d_init, global_avgpool2d, OpKind::GlobalAvgPool2d, PLANAR);
pool_op!(maxpool3d_init, maxpool3d, OpKind::MaxPool3d, VOLUME);
pool_op!(avgpool3d_init, avgpool3d, OpKind::AvgPool3d, VOLUME);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use qnn_tensor::DType;

    #[test]
    fn test_boundary_window_floors_at_zero() {
        // 1-D max pool, window 3, stride 1, no padding over [1, 2]: both
        // windows are clipped by the right edge.
        let input = Tensor::from_f32(vec![1.0, 2.0], [1, 1, 1, 2], Layout::Nchw).unwrap();
        let mut output = Tensor::zeros([1, 1, 1, 2], DType::F32, Layout::Nchw).unwrap();
        let mut params = PoolParams::new(OpBase::new(Layout::Nchw)).with_filter(1, 3);
        maxpool2d_init(&input, &output, &mut params).unwrap();
        maxpool2d(&input, &mut output, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[2.0, 2.0]);

        // with negative inputs the clipped windows are floored at zero
        let input = Tensor::from_f32(vec![-1.0, -2.0], [1, 1, 1, 2], Layout::Nchw).unwrap();
        maxpool2d(&input, &mut output, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn test_layout_acceptance() {
        let input = Tensor::zeros([1, 1, 2, 2], DType::F32, Layout::Nchw).unwrap();
        let mut params = PoolParams::new(OpBase::new(Layout::Nchw));
        let err = maxpool3d_init(&input, &input, &mut params).unwrap_err();
        assert_eq!(err.status(), Status::UnsupportedLayout);

        let mut params = PoolParams::new(OpBase::new(Layout::Ncw));
        let err = avgpool2d_init(&input, &input, &mut params).unwrap_err();
        assert_eq!(err.status(), Status::UnsupportedLayout);
    }

    #[test]
    fn test_no_kernel_for_index_tensors() {
        let input = Tensor::zeros([1, 1, 2, 2], DType::I32, Layout::Nchw).unwrap();
        let mut params = PoolParams::new(OpBase::new(Layout::Nchw));
        let err = global_avgpool2d_init(&input, &input, &mut params).unwrap_err();
        assert_eq!(err.status(), Status::UnsupportedDtype);
    }

    #[test]
    fn test_invoke_unbound() {
        let input = Tensor::zeros([1, 1, 2, 2], DType::F32, Layout::Nchw).unwrap();
        let mut output = input.clone();
        let err = avgpool2d(&input, &mut output, &PoolParams::default()).unwrap_err();
        assert_eq!(err.status(), Status::CallbackUnset);
    }
}
