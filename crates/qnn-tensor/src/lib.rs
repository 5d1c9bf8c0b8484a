//! `qnn-tensor` - tensor descriptors and numeric plumbing for the qnn operator library.
//!
//! This crate provides:
//! - A `Tensor` descriptor: shape, dtype, layout, quantization domain and buffer
//! - Data type and layout definitions (F32, F16, U8, I8, I32; NCHW, NHWC, ...)
//! - The affine quantization codec with integer-only requantization
//! - Index geometry shared by the spatial kernels

pub mod dtype;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod quant;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use layout::Layout;
pub use quant::{QuantElem, QuantParams};
pub use shape::{Shape, MAX_RANK};
pub use storage::CpuStorage;
pub use tensor::Tensor;

pub use half::f16;
