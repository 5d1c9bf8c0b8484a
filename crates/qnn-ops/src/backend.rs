use std::fmt::Debug;

use qnn_tensor::{DType, Layout, Tensor};

use crate::error::Result;
use crate::ops::activation::ReluParams;
use crate::ops::conv::ConvParams;
use crate::ops::conv3d::Conv3dParams;
use crate::ops::elementwise::{DisoParams, SisoParams};
use crate::ops::layout::{Im2colParams, PadParams, SliceParams, SplitParams};
use crate::ops::pool::PoolParams;
use crate::ops::resize::ResizeParams;
use crate::ops::segment::SegmentParams;
use crate::reference::ReferenceBackend;
use crate::registry::OpKind;

/// `(input, output, kernel, bias, params)`
pub type ConvKernel = fn(&Tensor, &mut Tensor, &Tensor, Option<&Tensor>, &ConvParams) -> Result<()>;
/// `(input, output, kernel, bias, params)`
pub type Conv3dKernel =
    fn(&Tensor, &mut Tensor, &Tensor, Option<&Tensor>, &Conv3dParams) -> Result<()>;
pub type PoolKernel = fn(&Tensor, &mut Tensor, &PoolParams) -> Result<()>;
pub type ResizeKernel = fn(&Tensor, &mut Tensor, &ResizeParams) -> Result<()>;
pub type ReluKernel = fn(&Tensor, &mut Tensor, &ReluParams) -> Result<()>;
pub type SisoKernel = fn(&Tensor, &mut Tensor, &SisoParams) -> Result<()>;
/// `(lhs, rhs, output, params)`
pub type DisoKernel = fn(&Tensor, &Tensor, &mut Tensor, &DisoParams) -> Result<()>;
pub type Im2colKernel = fn(&Tensor, &mut Tensor, &Im2colParams) -> Result<()>;
pub type PadKernel = fn(&Tensor, &mut Tensor, &PadParams) -> Result<()>;
pub type SliceKernel = fn(&Tensor, &mut Tensor, &SliceParams) -> Result<()>;
pub type SplitKernel = fn(&Tensor, &mut [Tensor], &SplitParams) -> Result<()>;
/// `(data, segment_ids, output, params)`
pub type SegmentKernel = fn(&Tensor, &Tensor, &mut Tensor, &SegmentParams) -> Result<()>;

/// Source of kernels for operator init.
///
/// Every lookup is keyed by operator identity, input dtype and layout and
/// returns `None` when no kernel is registered for the combination. Lookups
/// are pure: the same key always yields the same function.
pub trait KernelProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "reference").
    fn name(&self) -> &str;

    /// Plain, depthwise, grouped and fused-relu 2-D convolution, and 2-D
    /// deconvolution.
    fn conv2d(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<ConvKernel>;

    /// 3-D convolution and deconvolution.
    fn conv3d(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<Conv3dKernel>;

    /// Max, average and global pooling in 2-D and 3-D.
    fn pool(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<PoolKernel>;

    fn resize(&self, dtype: DType, layout: Layout) -> Option<ResizeKernel>;

    /// The relu family, elu and leaky relu.
    fn relu(&self, op: OpKind, dtype: DType) -> Option<ReluKernel>;

    /// Single-input elementwise and layout operators.
    fn siso(&self, op: OpKind, dtype: DType, layout: Layout) -> Option<SisoKernel>;

    /// Broadcasting binary operators.
    fn diso(&self, op: OpKind, dtype: DType) -> Option<DisoKernel>;

    fn im2col(&self, dtype: DType, layout: Layout) -> Option<Im2colKernel>;

    fn pad(&self, dtype: DType, layout: Layout) -> Option<PadKernel>;

    fn slice(&self, dtype: DType) -> Option<SliceKernel>;

    fn split(&self, dtype: DType) -> Option<SplitKernel>;

    fn segment(&self, op: OpKind, dtype: DType) -> Option<SegmentKernel>;
}

static REFERENCE: ReferenceBackend = ReferenceBackend;

/// Which kernel provider an operator binds from.
#[derive(Debug, Clone, Copy, Default)]
pub enum Api {
    /// The built-in reference kernels.
    #[default]
    Reference,
    /// An externally supplied provider, e.g. an accelerator binding.
    Custom(&'static dyn KernelProvider),
}

impl Api {
    pub fn provider(&self) -> &'static dyn KernelProvider {
        match self {
            Api::Reference => &REFERENCE,
            Api::Custom(p) => *p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Provider that only knows f32 relu, borrowed from the reference set.
    #[derive(Debug)]
    struct ReluOnly;

    impl KernelProvider for ReluOnly {
        fn name(&self) -> &str {
            "relu-only"
        }
        fn conv2d(&self, _: OpKind, _: DType, _: Layout) -> Option<ConvKernel> {
            None
        }
        fn conv3d(&self, _: OpKind, _: DType, _: Layout) -> Option<Conv3dKernel> {
            None
        }
        fn pool(&self, _: OpKind, _: DType, _: Layout) -> Option<PoolKernel> {
            None
        }
        fn resize(&self, _: DType, _: Layout) -> Option<ResizeKernel> {
            None
        }
        fn relu(&self, op: OpKind, dtype: DType) -> Option<ReluKernel> {
            match (op, dtype) {
                (OpKind::Relu, DType::F32) => REFERENCE.relu(op, dtype),
                _ => None,
            }
        }
        fn siso(&self, _: OpKind, _: DType, _: Layout) -> Option<SisoKernel> {
            None
        }
        fn diso(&self, _: OpKind, _: DType) -> Option<DisoKernel> {
            None
        }
        fn im2col(&self, _: DType, _: Layout) -> Option<Im2colKernel> {
            None
        }
        fn pad(&self, _: DType, _: Layout) -> Option<PadKernel> {
            None
        }
        fn slice(&self, _: DType) -> Option<SliceKernel> {
            None
        }
        fn split(&self, _: DType) -> Option<SplitKernel> {
            None
        }
        fn segment(&self, _: OpKind, _: DType) -> Option<SegmentKernel> {
            None
        }
    }

    static RELU_ONLY: ReluOnly = ReluOnly;

    #[test]
    fn test_reference_is_default() {
        assert_eq!(Api::default().provider().name(), "reference");
    }

    #[test]
    fn test_custom_provider_binds() {
        use crate::ops::activation::{relu, relu_init, ReluParams};
        use crate::params::OpBase;

        let base = OpBase::new(Layout::Nchw).with_api(Api::Custom(&RELU_ONLY));
        let input = Tensor::from_f32(vec![-1.0, 2.0], [2], Layout::Flat).unwrap();
        let mut output = Tensor::zeros([2], DType::F32, Layout::Flat).unwrap();

        let mut params = ReluParams::new(base.clone());
        relu_init(&input, &output, &mut params).unwrap();
        relu(&input, &mut output, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[0.0, 2.0]);

        // the custom provider has no u8 relu
        let q = Tensor::from_u8(vec![0, 1], [2], Layout::Flat, Default::default()).unwrap();
        let mut params = ReluParams::new(base);
        let err = relu_init(&q, &q, &mut params).unwrap_err();
        assert_eq!(err.status(), crate::error::Status::UnsupportedDtype);
    }
}
