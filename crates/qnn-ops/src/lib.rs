//! `qnn-ops` - neural-network operators for the qnn runtime.
//!
//! Every operator is a pair of calls over a parameter record:
//! - `*_init` validates the layout and binds the kernel registered for the
//!   operator, the input dtype and the layout into the record;
//! - the invoke call (`conv2d`, `maxpool2d`, ...) runs the bound kernel.
//!
//! Kernels come from a [`KernelProvider`]. The built-in
//! [`ReferenceBackend`] holds portable reference kernels for f32 and the
//! quantized u8/i8 types; f16 and most quantized paths go through the
//! dequantize-compute-quantize wrappers in [`reference::wrapper`].

pub mod backend;
pub mod error;
pub mod ops;
pub mod params;
pub mod reference;
pub mod registry;

pub use backend::{Api, KernelProvider};
pub use error::{OpError, Result, Status};
pub use params::{KernelSlot, OpBase};
pub use reference::ReferenceBackend;
pub use registry::{derive_conv_kind, ConvKind, OpKind};

pub use ops::activation::ReluParams;
pub use ops::conv::ConvParams;
pub use ops::conv3d::Conv3dParams;
pub use ops::elementwise::{DisoParams, SisoParams};
pub use ops::layout::{Im2colParams, PadParams, SliceParams, SplitParams};
pub use ops::pool::PoolParams;
pub use ops::resize::{ResizeMode, ResizeParams};
pub use ops::segment::SegmentParams;
