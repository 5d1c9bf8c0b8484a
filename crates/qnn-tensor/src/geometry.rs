//! Index geometry shared by every spatial kernel.
//!
//! Everything here is a pure function over dimension slices: flat-index
//! computation, clamped window bounds, output extents and axis permutation.

use crate::error::{Result, TensorError};
use crate::layout::Layout;

/// Row-major flat offset of `index` inside a tensor of shape `dims`.
///
/// Both slices must have the same length and every coordinate must be in
/// bounds; this is checked in debug builds only.
#[inline]
pub fn flat_index(dims: &[usize], index: &[usize]) -> usize {
    debug_assert_eq!(dims.len(), index.len());
    let mut offset = 0;
    for (d, i) in dims.iter().zip(index) {
        debug_assert!(i < d, "index {:?} out of bounds for {:?}", index, dims);
        offset = offset * d + i;
    }
    offset
}

/// Filter-relative `[begin, end)` of the taps that land inside `[0, extent)`
/// for a window of `filter` taps starting at input coordinate `origin`.
///
/// A window lying entirely outside the input yields an empty range.
#[inline]
pub fn window_bounds(origin: isize, filter: usize, extent: usize) -> (usize, usize) {
    dilated_window_bounds(origin, filter, 1, extent)
}

/// [`window_bounds`] for a window whose taps sit `dilation` apart: tap `t`
/// reads input coordinate `origin + t * dilation`.
#[inline]
pub fn dilated_window_bounds(
    origin: isize,
    filter: usize,
    dilation: usize,
    extent: usize,
) -> (usize, usize) {
    let d = dilation.max(1) as isize;
    let ceil_div = |a: isize| if a <= 0 { 0 } else { (a + d - 1) / d };
    let begin = ceil_div(-origin);
    let end = ceil_div(extent as isize - origin).min(filter as isize);
    let begin = begin.min(end);
    (begin as usize, end as usize)
}

/// Clamp a coordinate into `[0, extent - 1]`. `extent` must be non-zero.
#[inline]
pub fn clamp_coord(v: isize, extent: usize) -> usize {
    v.clamp(0, extent as isize - 1) as usize
}

/// Input coordinate of the first tap for output position `out`.
#[inline]
pub fn window_origin(out: usize, stride: usize, pad_before: usize) -> isize {
    (out * stride) as isize - pad_before as isize
}

/// Output extent of a strided, padded, dilated window sweep, or `None` when
/// the dilated window does not fit into the padded input or the stride is 0.
pub fn out_extent(
    input: usize,
    pad_before: usize,
    pad_after: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
) -> Option<usize> {
    if stride == 0 || kernel == 0 || dilation == 0 {
        return None;
    }
    let span = dilation * (kernel - 1) + 1;
    let padded = input + pad_before + pad_after;
    if span > padded {
        return None;
    }
    Some((padded - span) / stride + 1)
}

/// Permute the axes of a row-major buffer.
///
/// Output axis `i` is input axis `perm[i]`. Returns the permuted buffer and
/// its dims.
pub fn transpose<T: Copy>(data: &[T], dims: &[usize], perm: &[usize]) -> Result<(Vec<T>, Vec<usize>)> {
    check_perm(dims.len(), perm)?;
    let numel: usize = dims.iter().product();
    if data.len() != numel {
        return Err(TensorError::ShapeMismatch {
            expected: vec![numel],
            got: vec![data.len()],
        });
    }

    let out_dims: Vec<usize> = perm.iter().map(|&p| dims[p]).collect();
    let in_strides = crate::shape::Shape::from_slice(dims).strides();
    // Stride in the input for each output axis.
    let src_strides: Vec<usize> = perm.iter().map(|&p| in_strides[p]).collect();

    let mut out = Vec::with_capacity(numel);
    let mut counter = vec![0usize; out_dims.len()];
    for _ in 0..numel {
        let src: usize = counter
            .iter()
            .zip(&src_strides)
            .map(|(c, s)| c * s)
            .sum();
        out.push(data[src]);
        // Advance the odometer, innermost axis first.
        for axis in (0..counter.len()).rev() {
            counter[axis] += 1;
            if counter[axis] < out_dims[axis] {
                break;
            }
            counter[axis] = 0;
        }
    }
    Ok((out, out_dims))
}

fn check_perm(ndim: usize, perm: &[usize]) -> Result<()> {
    let mut seen = vec![false; ndim];
    if perm.len() != ndim {
        return Err(TensorError::Other(format!(
            "permutation {:?} does not match rank {}",
            perm, ndim
        )));
    }
    for &p in perm {
        if p >= ndim || seen[p] {
            return Err(TensorError::InvalidAxis { axis: p, ndim });
        }
        seen[p] = true;
    }
    Ok(())
}

/// Axis permutation that converts a tensor from layout `from` to layout `to`.
///
/// Only conversions between the channel-first and channel-last layouts of
/// the same spatial rank (and the identity) are defined.
pub fn layout_perm(from: Layout, to: Layout) -> Result<Vec<usize>> {
    let rank = from.rank().ok_or_else(|| {
        TensorError::Other(format!("cannot permute from layout {}", from))
    })?;
    if from == to {
        return Ok((0..rank).collect());
    }
    if from.spatial_rank() != to.spatial_rank() || to == Layout::Flat {
        return Err(TensorError::Other(format!(
            "no axis permutation from {} to {}",
            from, to
        )));
    }
    if from.is_channel_first() {
        // N C S... -> N S... C
        let mut perm = vec![0];
        perm.extend(2..rank);
        perm.push(1);
        Ok(perm)
    } else {
        // N S... C -> N C S...
        let mut perm = vec![0, rank - 1];
        perm.extend(1..rank - 1);
        Ok(perm)
    }
}

/// Convert a rank-4 NCHW buffer to NHWC.
pub fn nchw_to_nhwc<T: Copy>(data: &[T], dims: &[usize]) -> Result<(Vec<T>, Vec<usize>)> {
    transpose(data, dims, &layout_perm(Layout::Nchw, Layout::Nhwc)?)
}

/// Convert a rank-4 NHWC buffer to NCHW.
pub fn nhwc_to_nchw<T: Copy>(data: &[T], dims: &[usize]) -> Result<(Vec<T>, Vec<usize>)> {
    transpose(data, dims, &layout_perm(Layout::Nhwc, Layout::Nchw)?)
}

/// For every element of a tensor of shape `out_dims`, the flat offset of the
/// element it reads from a tensor of shape `in_dims` under numpy
/// broadcasting. `in_dims` must already be broadcast-compatible.
pub fn broadcast_offsets(out_dims: &[usize], in_dims: &[usize]) -> Vec<usize> {
    let numel: usize = out_dims.iter().product();
    let lead = out_dims.len() - in_dims.len();
    let in_strides = crate::shape::Shape::from_slice(in_dims).strides();

    // Zero stride on broadcast (size 1 or missing) axes.
    let strides: Vec<usize> = (0..out_dims.len())
        .map(|axis| {
            if axis < lead || in_dims[axis - lead] == 1 {
                0
            } else {
                in_strides[axis - lead]
            }
        })
        .collect();

    let mut offsets = Vec::with_capacity(numel);
    let mut counter = vec![0usize; out_dims.len()];
    for _ in 0..numel {
        offsets.push(counter.iter().zip(&strides).map(|(c, s)| c * s).sum());
        for axis in (0..counter.len()).rev() {
            counter[axis] += 1;
            if counter[axis] < out_dims[axis] {
                break;
            }
            counter[axis] = 0;
        }
    }
    offsets
}
