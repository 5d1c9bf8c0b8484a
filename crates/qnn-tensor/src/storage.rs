use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// CPU-side tensor storage: one flat, contiguous buffer per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F16(Vec<f16>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    I32(Vec<i32>),
}

macro_rules! slice_accessors {
    ($variant:ident, $ty:ty, $get:ident, $get_mut:ident) => {
        /// Returns the data as a typed slice.
        ///
        /// # Errors
        /// Returns `DTypeMismatch` if the storage holds another dtype.
        pub fn $get(&self) -> Result<&[$ty]> {
            match self {
                CpuStorage::$variant(v) => Ok(v.as_slice()),
                other => Err(TensorError::DTypeMismatch {
                    expected: DType::$variant.to_string(),
                    got: other.dtype().to_string(),
                }),
            }
        }

        /// Returns the data as a typed mutable slice.
        ///
        /// # Errors
        /// Returns `DTypeMismatch` if the storage holds another dtype.
        pub fn $get_mut(&mut self) -> Result<&mut [$ty]> {
            match self {
                CpuStorage::$variant(v) => Ok(v.as_mut_slice()),
                other => Err(TensorError::DTypeMismatch {
                    expected: DType::$variant.to_string(),
                    got: other.dtype().to_string(),
                }),
            }
        }
    };
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F16(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
            CpuStorage::I8(v) => v.len(),
            CpuStorage::I32(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DType::U8 => CpuStorage::U8(vec![0; n]),
            DType::I8 => CpuStorage::I8(vec![0; n]),
            DType::I32 => CpuStorage::I32(vec![0; n]),
        }
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::I8(_) => DType::I8,
            CpuStorage::I32(_) => DType::I32,
        }
    }

    /// Size of the buffer in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.dtype().size_in_bytes()
    }

    slice_accessors!(F32, f32, as_f32_slice, as_f32_slice_mut);
    slice_accessors!(F16, f16, as_f16_slice, as_f16_slice_mut);
    slice_accessors!(U8, u8, as_u8_slice, as_u8_slice_mut);
    slice_accessors!(I8, i8, as_i8_slice, as_i8_slice_mut);
    slice_accessors!(I32, i32, as_i32_slice, as_i32_slice_mut);

    /// `dst[i] = self[indices[i]]` for every `Some` entry; `None` entries
    /// leave `dst[i]` untouched.
    ///
    /// # Errors
    /// Fails if `dst` holds another dtype, if `indices` and `dst` differ in
    /// length, or if an index is out of bounds.
    pub fn gather_into(&self, indices: &[Option<usize>], dst: &mut CpuStorage) -> Result<()> {
        if indices.len() != dst.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![dst.len()],
                got: vec![indices.len()],
            });
        }
        let len = self.len();
        if let Some(bad) = indices.iter().flatten().find(|&&i| i >= len) {
            return Err(TensorError::Other(format!(
                "gather index {} out of bounds for {} elements",
                bad, len
            )));
        }

        fn gather<T: Copy>(src: &[T], indices: &[Option<usize>], dst: &mut [T]) {
            for (d, idx) in dst.iter_mut().zip(indices) {
                if let Some(i) = idx {
                    *d = src[*i];
                }
            }
        }

        match (self, dst) {
            (CpuStorage::F32(s), CpuStorage::F32(d)) => gather(s, indices, d),
            (CpuStorage::F16(s), CpuStorage::F16(d)) => gather(s, indices, d),
            (CpuStorage::U8(s), CpuStorage::U8(d)) => gather(s, indices, d),
            (CpuStorage::I8(s), CpuStorage::I8(d)) => gather(s, indices, d),
            (CpuStorage::I32(s), CpuStorage::I32(d)) => gather(s, indices, d),
            (s, d) => {
                return Err(TensorError::DTypeMismatch {
                    expected: s.dtype().to_string(),
                    got: d.dtype().to_string(),
                })
            }
        }
        Ok(())
    }

    /// Copy every element of `src` (same dtype and length) into `self`.
    pub fn copy_from(&mut self, src: &CpuStorage) -> Result<()> {
        if src.len() != self.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.len()],
                got: vec![src.len()],
            });
        }
        match (self, src) {
            (CpuStorage::F32(d), CpuStorage::F32(s)) => d.copy_from_slice(s),
            (CpuStorage::F16(d), CpuStorage::F16(s)) => d.copy_from_slice(s),
            (CpuStorage::U8(d), CpuStorage::U8(s)) => d.copy_from_slice(s),
            (CpuStorage::I8(d), CpuStorage::I8(s)) => d.copy_from_slice(s),
            (CpuStorage::I32(d), CpuStorage::I32(s)) => d.copy_from_slice(s),
            (d, s) => {
                return Err(TensorError::DTypeMismatch {
                    expected: d.dtype().to_string(),
                    got: s.dtype().to_string(),
                })
            }
        }
        Ok(())
    }

    /// Copy the buffer out as native-endian bytes.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match self {
            CpuStorage::F32(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            CpuStorage::F16(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            CpuStorage::U8(v) => v.clone(),
            CpuStorage::I8(v) => v.iter().map(|&x| x as u8).collect(),
            CpuStorage::I32(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
        }
    }

    /// Overwrite the buffer from native-endian bytes.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` unless `bytes` covers the buffer exactly.
    pub fn copy_from_ne_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.size_in_bytes() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.size_in_bytes()],
                got: vec![bytes.len()],
            });
        }
        match self {
            CpuStorage::F32(v) => {
                for (dst, src) in v.iter_mut().zip(bytes.chunks_exact(4)) {
                    *dst = f32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
                }
            }
            CpuStorage::F16(v) => {
                for (dst, src) in v.iter_mut().zip(bytes.chunks_exact(2)) {
                    *dst = f16::from_ne_bytes([src[0], src[1]]);
                }
            }
            CpuStorage::U8(v) => v.copy_from_slice(bytes),
            CpuStorage::I8(v) => {
                for (dst, &src) in v.iter_mut().zip(bytes) {
                    *dst = src as i8;
                }
            }
            CpuStorage::I32(v) => {
                for (dst, src) in v.iter_mut().zip(bytes.chunks_exact(4)) {
                    *dst = i32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<f32>> for CpuStorage {
    fn from(v: Vec<f32>) -> Self {
        CpuStorage::F32(v)
    }
}

impl From<Vec<f16>> for CpuStorage {
    fn from(v: Vec<f16>) -> Self {
        CpuStorage::F16(v)
    }
}

impl From<Vec<u8>> for CpuStorage {
    fn from(v: Vec<u8>) -> Self {
        CpuStorage::U8(v)
    }
}

impl From<Vec<i8>> for CpuStorage {
    fn from(v: Vec<i8>) -> Self {
        CpuStorage::I8(v)
    }
}

impl From<Vec<i32>> for CpuStorage {
    fn from(v: Vec<i32>) -> Self {
        CpuStorage::I32(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec() {
        let s = CpuStorage::from(vec![1.0f32, 2.0, 3.0]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.dtype(), DType::F32);
        assert_eq!(s.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zeros() {
        let s = CpuStorage::zeros(DType::U8, 5);
        assert_eq!(s.as_u8_slice().unwrap(), &[0; 5]);
        let s = CpuStorage::zeros(DType::F16, 2);
        assert_eq!(s.as_f16_slice().unwrap(), &[f16::ZERO; 2]);
        assert!(CpuStorage::zeros(DType::I32, 0).is_empty());
    }

    #[test]
    fn test_wrong_accessor() {
        let s = CpuStorage::from(vec![1u8, 2]);
        let err = s.as_f32_slice().unwrap_err();
        assert_eq!(
            err,
            TensorError::DTypeMismatch {
                expected: "f32".to_string(),
                got: "u8".to_string()
            }
        );
    }

    #[test]
    fn test_mut_slice() {
        let mut s = CpuStorage::from(vec![-1i8, 2]);
        s.as_i8_slice_mut().unwrap()[0] = 42;
        assert_eq!(s.as_i8_slice().unwrap(), &[42, 2]);
    }

    #[test]
    fn test_gather_into() {
        let src = CpuStorage::from(vec![10u8, 20, 30]);
        let mut dst = CpuStorage::from(vec![0u8, 0, 0, 99]);
        src.gather_into(&[Some(2), Some(0), Some(2), None], &mut dst).unwrap();
        assert_eq!(dst.as_u8_slice().unwrap(), &[30, 10, 30, 99]);

        assert!(src.gather_into(&[Some(3), None, None, None], &mut dst).is_err());
        assert!(src.gather_into(&[Some(0)], &mut dst).is_err());
        let mut wrong = CpuStorage::zeros(DType::F32, 1);
        assert!(src.gather_into(&[Some(0)], &mut wrong).is_err());
    }

    #[test]
    fn test_copy_from() {
        let src = CpuStorage::from(vec![1i32, -2]);
        let mut dst = CpuStorage::zeros(DType::I32, 2);
        dst.copy_from(&src).unwrap();
        assert_eq!(dst, src);
        assert!(CpuStorage::zeros(DType::I8, 2).copy_from(&src).is_err());
    }

    #[test]
    fn test_byte_copy() {
        let src = CpuStorage::from(vec![1.5f32, -2.0]);
        let bytes = src.to_ne_bytes();
        assert_eq!(bytes.len(), 8);

        let mut dst = CpuStorage::zeros(DType::F32, 2);
        dst.copy_from_ne_bytes(&bytes).unwrap();
        assert_eq!(dst, src);

        assert!(dst.copy_from_ne_bytes(&bytes[..4]).is_err());

        let mut i8s = CpuStorage::zeros(DType::I8, 2);
        i8s.copy_from_ne_bytes(&[0xff, 0x01]).unwrap();
        assert_eq!(i8s.as_i8_slice().unwrap(), &[-1, 1]);
    }
}
