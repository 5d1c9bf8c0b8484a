use crate::error::{Result, TensorError};
use std::fmt;

/// Largest rank a tensor descriptor may have.
pub const MAX_RANK: usize = 8;

/// Dimension sizes of a tensor, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Element count; 1 for the rank-0 shape.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Error if the rank exceeds [`MAX_RANK`].
    pub fn check_rank(&self) -> Result<()> {
        match self.dims.len() {
            rank if rank > MAX_RANK => Err(TensorError::RankTooLarge {
                rank,
                max: MAX_RANK,
            }),
            _ => Ok(()),
        }
    }

    /// Row-major element strides: `[d1*d2, d2, 1]` for `[d0, d1, d2]`.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (1..self.dims.len()).rev() {
            strides[i - 1] = strides[i] * self.dims[i];
        }
        strides
    }

    /// Numpy broadcast of two shapes: align from the innermost axis, a
    /// missing or size-1 axis stretches to the other side's size.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let rank = a.ndim().max(b.ndim());
        let axis = |s: &Shape, i: usize| {
            (i + s.ndim())
                .checked_sub(rank)
                .map_or(1, |j| s.dims[j])
        };
        (0..rank)
            .map(|i| match (axis(a, i), axis(b, i)) {
                (x, y) if x == y || y == 1 => Ok(x),
                (1, y) => Ok(y),
                _ => Err(TensorError::BroadcastError {
                    a: a.dims.clone(),
                    b: b.dims.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(Shape::new)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_numel() {
        let s = Shape::from([1, 3, 4, 5]);
        assert_eq!(s.ndim(), 4);
        assert_eq!(s.numel(), 60);
        assert_eq!(s.to_string(), "[1, 3, 4, 5]");
        assert_eq!(Shape::default().to_string(), "[]");
    }

    #[test]
    fn test_strides() {
        assert_eq!(Shape::from([2, 3, 4]).strides(), vec![12, 4, 1]);
        assert_eq!(Shape::from([1, 2, 2, 3]).strides(), vec![12, 6, 3, 1]);
    }

    #[test]
    fn test_rank_zero() {
        let s = Shape::new(vec![]);
        assert_eq!(s.numel(), 1);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_rank_limit() {
        assert!(Shape::new(vec![1; MAX_RANK]).check_rank().is_ok());
        let err = Shape::new(vec![1; MAX_RANK + 1]).check_rank().unwrap_err();
        assert_eq!(
            err,
            TensorError::RankTooLarge {
                rank: MAX_RANK + 1,
                max: MAX_RANK
            }
        );
    }

    #[test]
    fn test_broadcast() {
        let c = Shape::broadcast_shape(&Shape::from([2, 1]), &Shape::from([1, 3])).unwrap();
        assert_eq!(c.dims(), &[2, 3]);

        // rank-1 against rank-3: missing axes count as 1
        let c = Shape::broadcast_shape(&Shape::from([3]), &Shape::from([4, 2, 3])).unwrap();
        assert_eq!(c.dims(), &[4, 2, 3]);

        let c = Shape::broadcast_shape(&Shape::from([1, 1]), &Shape::from([1, 5])).unwrap();
        assert_eq!(c.dims(), &[1, 5]);

        let err = Shape::broadcast_shape(&Shape::from([2, 3]), &Shape::from([2, 4])).unwrap_err();
        assert!(matches!(err, TensorError::BroadcastError { .. }));
    }
}
