use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::layout::Layout;
use crate::quant::{QuantElem, QuantParams};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// Tensor descriptor: shape, dtype, layout and quantization domain together
/// with the flat buffer they describe.
///
/// The buffer always holds exactly `shape.numel()` elements; every
/// constructor checks it. Kernels read input descriptors and write into the
/// existing extent of the output descriptor, never reallocating it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
    layout: Layout,
    quant: Option<QuantParams>,
    name: Option<String>,
}

impl Tensor {
    /// Wrap existing storage.
    ///
    /// # Errors
    /// Fails if the buffer length does not match the shape or the rank
    /// exceeds [`crate::shape::MAX_RANK`].
    pub fn from_storage(storage: CpuStorage, shape: Shape, layout: Layout) -> Result<Self> {
        shape.check_rank()?;
        if storage.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![storage.len()],
            });
        }
        Ok(Tensor {
            storage,
            shape,
            layout,
            quant: None,
            name: None,
        })
    }

    pub fn from_f32(data: Vec<f32>, shape: impl Into<Shape>, layout: Layout) -> Result<Self> {
        Self::from_storage(CpuStorage::F32(data), shape.into(), layout)
    }

    pub fn from_f16(data: Vec<f16>, shape: impl Into<Shape>, layout: Layout) -> Result<Self> {
        Self::from_storage(CpuStorage::F16(data), shape.into(), layout)
    }

    pub fn from_i32(data: Vec<i32>, shape: impl Into<Shape>, layout: Layout) -> Result<Self> {
        Self::from_storage(CpuStorage::I32(data), shape.into(), layout)
    }

    /// Quantized u8 tensor in the domain `quant`.
    pub fn from_u8(
        data: Vec<u8>,
        shape: impl Into<Shape>,
        layout: Layout,
        quant: QuantParams,
    ) -> Result<Self> {
        Ok(Self::from_storage(CpuStorage::U8(data), shape.into(), layout)?.with_quant(quant))
    }

    /// Quantized i8 tensor in the domain `quant`.
    pub fn from_i8(
        data: Vec<i8>,
        shape: impl Into<Shape>,
        layout: Layout,
        quant: QuantParams,
    ) -> Result<Self> {
        Ok(Self::from_storage(CpuStorage::I8(data), shape.into(), layout)?.with_quant(quant))
    }

    /// Quantize float data into a new `dtype` tensor in the domain `quant`.
    pub fn quantized_from_f32(
        data: &[f32],
        shape: impl Into<Shape>,
        layout: Layout,
        dtype: DType,
        quant: QuantParams,
    ) -> Result<Self> {
        let mut t = Tensor::zeros(shape, dtype, layout)?.with_quant(quant);
        t.fill_from_f32(data)?;
        Ok(t)
    }

    /// Zero-filled tensor.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, layout: Layout) -> Result<Self> {
        let shape = shape.into();
        let storage = CpuStorage::zeros(dtype, shape.numel());
        Self::from_storage(storage, shape, layout)
    }

    /// Attach a quantization domain.
    pub fn with_quant(mut self, quant: QuantParams) -> Self {
        self.quant = Some(quant);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn quant(&self) -> Option<&QuantParams> {
        self.quant.as_ref()
    }

    pub fn set_quant(&mut self, quant: QuantParams) {
        self.quant = Some(quant);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Quantization domain, required for quantized dtypes.
    ///
    /// Float tensors without a domain get the identity domain.
    pub fn quant_or_err(&self) -> Result<QuantParams> {
        match self.quant {
            Some(q) => Ok(q),
            None if self.dtype().is_quantized() => Err(TensorError::MissingQuantParams {
                dtype: self.dtype().to_string(),
            }),
            None => Ok(QuantParams::from_scale(1.0, 0)),
        }
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut CpuStorage {
        &mut self.storage
    }

    pub fn data_f32(&self) -> Result<&[f32]> {
        self.storage.as_f32_slice()
    }

    pub fn data_f32_mut(&mut self) -> Result<&mut [f32]> {
        self.storage.as_f32_slice_mut()
    }

    pub fn data_u8(&self) -> Result<&[u8]> {
        self.storage.as_u8_slice()
    }

    pub fn data_i8(&self) -> Result<&[i8]> {
        self.storage.as_i8_slice()
    }

    pub fn data_i32(&self) -> Result<&[i32]> {
        self.storage.as_i32_slice()
    }

    /// Typed view of a quantized buffer.
    pub fn data_q<T: QuantElem>(&self) -> Result<&[T]> {
        quant_slice::<T>(&self.storage)
    }

    /// Typed mutable view of a quantized buffer.
    pub fn data_q_mut<T: QuantElem>(&mut self) -> Result<&mut [T]> {
        quant_slice_mut::<T>(&mut self.storage)
    }

    /// Real values of the tensor: dequantized codes, widened halves, or a
    /// copy of f32 data.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match &self.storage {
            CpuStorage::F32(v) => Ok(v.clone()),
            CpuStorage::F16(v) => Ok(v.iter().map(|x| x.to_f32()).collect()),
            CpuStorage::U8(v) => {
                let q = self.quant_or_err()?;
                let scale = q.scale();
                Ok(v.iter()
                    .map(|&x| crate::quant::dequantize(x, q.zero_point, scale))
                    .collect())
            }
            CpuStorage::I8(v) => {
                let q = self.quant_or_err()?;
                let scale = q.scale();
                Ok(v.iter()
                    .map(|&x| crate::quant::dequantize(x, q.zero_point, scale))
                    .collect())
            }
            CpuStorage::I32(v) => Ok(v.iter().map(|&x| x as f32).collect()),
        }
    }

    /// Overwrite the buffer from real values, quantizing into the tensor's
    /// own domain or narrowing to f16 as needed.
    pub fn fill_from_f32(&mut self, values: &[f32]) -> Result<()> {
        if values.len() != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: vec![values.len()],
            });
        }
        let quant = self.quant_or_err()?;
        let scale = quant.scale();
        match &mut self.storage {
            CpuStorage::F32(v) => v.copy_from_slice(values),
            CpuStorage::F16(v) => {
                for (dst, &src) in v.iter_mut().zip(values) {
                    *dst = f16::from_f32(src);
                }
            }
            CpuStorage::U8(v) => {
                for (dst, &src) in v.iter_mut().zip(values) {
                    *dst = crate::quant::quantize(src, quant.zero_point, scale);
                }
            }
            CpuStorage::I8(v) => {
                for (dst, &src) in v.iter_mut().zip(values) {
                    *dst = crate::quant::quantize(src, quant.zero_point, scale);
                }
            }
            CpuStorage::I32(v) => {
                for (dst, &src) in v.iter_mut().zip(values) {
                    // Saturating cast; NaN becomes 0.
                    *dst = src.round() as i32;
                }
            }
        }
        Ok(())
    }

    /// Set every element to the real value `v` in the tensor's own domain.
    pub fn fill_value(&mut self, v: f32) -> Result<()> {
        let quant = self.quant_or_err()?;
        let scale = quant.scale();
        match &mut self.storage {
            CpuStorage::F32(d) => d.fill(v),
            CpuStorage::F16(d) => d.fill(f16::from_f32(v)),
            CpuStorage::U8(d) => d.fill(crate::quant::quantize(v, quant.zero_point, scale)),
            CpuStorage::I8(d) => d.fill(crate::quant::quantize(v, quant.zero_point, scale)),
            CpuStorage::I32(d) => d.fill(v.round() as i32),
        }
        Ok(())
    }

    /// Same data under a new shape with the same element count.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Tensor> {
        let new_shape = new_shape.into();
        new_shape.check_rank()?;
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
            layout: self.layout,
            quant: self.quant,
            name: self.name.clone(),
        })
    }
}

fn quant_slice<T: QuantElem>(storage: &CpuStorage) -> Result<&[T]> {
    let any: &dyn std::any::Any = match storage {
        CpuStorage::U8(v) => v,
        CpuStorage::I8(v) => v,
        other => {
            return Err(TensorError::DTypeMismatch {
                expected: T::DTYPE.to_string(),
                got: other.dtype().to_string(),
            })
        }
    };
    any.downcast_ref::<Vec<T>>()
        .map(|v| v.as_slice())
        .ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: storage.dtype().to_string(),
        })
}

fn quant_slice_mut<T: QuantElem>(storage: &mut CpuStorage) -> Result<&mut [T]> {
    let got = storage.dtype();
    let any: &mut dyn std::any::Any = match storage {
        CpuStorage::U8(v) => v,
        CpuStorage::I8(v) => v,
        _ => {
            return Err(TensorError::DTypeMismatch {
                expected: T::DTYPE.to_string(),
                got: got.to_string(),
            })
        }
    };
    any.downcast_mut::<Vec<T>>()
        .map(|v| v.as_mut_slice())
        .ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: got.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tensor() {
        let t = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3], Layout::Flat).unwrap();
        assert_eq!(t.dims(), &[2, 3]);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.layout(), Layout::Flat);
        assert!(t.quant().is_none());
        assert_eq!(t.data_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(Tensor::from_f32(vec![1.0, 2.0], [3], Layout::Flat).is_err());
        assert!(Tensor::from_u8(vec![1], [2], Layout::Flat, QuantParams::default()).is_err());
    }

    #[test]
    fn test_rank_limit() {
        let dims = vec![1usize; crate::shape::MAX_RANK + 1];
        let err = Tensor::zeros(dims, DType::F32, Layout::Flat).unwrap_err();
        assert!(matches!(err, TensorError::RankTooLarge { .. }));
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3], Layout::Flat).unwrap();
        let r = t.reshape([3, 2]).unwrap();
        assert_eq!(r.dims(), &[3, 2]);
        assert_eq!(r.data_f32().unwrap(), t.data_f32().unwrap());
        assert!(t.reshape([4]).is_err());
    }

    #[test]
    fn test_quantized_roundtrip() {
        let q = QuantParams::from_scale(0.5, 10);
        let t = Tensor::quantized_from_f32(&[0.0, 1.0, -2.5, 200.0], [4], Layout::Flat, DType::U8, q)
            .unwrap();
        assert_eq!(t.data_u8().unwrap(), &[10, 12, 5, 255]);
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.0, 1.0, -2.5, 122.5]);
    }

    #[test]
    fn test_missing_quant_params() {
        let t = Tensor::zeros([2], DType::I8, Layout::Flat).unwrap();
        assert!(matches!(
            t.to_f32_vec().unwrap_err(),
            TensorError::MissingQuantParams { .. }
        ));
        // Float tensors fall back to the identity domain.
        let f = Tensor::zeros([2], DType::F32, Layout::Flat).unwrap();
        assert_eq!(f.quant_or_err().unwrap().scale(), 1.0);
    }

    #[test]
    fn test_fill_value() {
        let mut t = Tensor::zeros([3], DType::U8, Layout::Flat)
            .unwrap()
            .with_quant(QuantParams::from_scale(0.5, 128));
        t.fill_value(0.0).unwrap();
        assert_eq!(t.data_u8().unwrap(), &[128; 3]);
        t.fill_value(1.0).unwrap();
        assert_eq!(t.data_u8().unwrap(), &[130; 3]);

        let mut f = Tensor::zeros([2], DType::F32, Layout::Flat).unwrap();
        f.fill_value(-3.5).unwrap();
        assert_eq!(f.data_f32().unwrap(), &[-3.5, -3.5]);
    }

    #[test]
    fn test_f16_widen_narrow() {
        let mut t = Tensor::zeros([3], DType::F16, Layout::Flat).unwrap();
        t.fill_from_f32(&[0.5, -1.0, 2.0]).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_typed_quant_views() {
        let mut t = Tensor::from_i8(vec![-1, 2], [2], Layout::Flat, QuantParams::default()).unwrap();
        assert_eq!(t.data_q::<i8>().unwrap(), &[-1, 2]);
        assert!(t.data_q::<u8>().is_err());
        t.data_q_mut::<i8>().unwrap()[1] = 7;
        assert_eq!(t.data_i8().unwrap(), &[-1, 7]);

        let f = Tensor::zeros([1], DType::F32, Layout::Flat).unwrap();
        assert!(f.data_q::<u8>().is_err());
    }
}
