//! Data-movement kernels.
//!
//! Each kernel computes, for every output element, the input element it
//! takes (or none, for padding) and gathers through that table. Values are
//! never recomputed; quantized codes are only requantized when the output
//! domain differs from the input's.

use qnn_tensor::geometry::{self, flat_index, layout_perm, out_extent};
use qnn_tensor::{DType, QuantElem, QuantParams, Tensor};

use crate::error::{OpError, Result};
use crate::ops::elementwise::SisoParams;
use crate::ops::layout::{Im2colParams, PadParams, SliceParams, SplitParams};
use crate::registry::OpKind;

/// Move codes gathered from `input` into the output domain. Only positions
/// marked in `moved` are touched; `None` means every position.
fn rebase_codes(input: &Tensor, output: &mut Tensor, moved: Option<&[Option<usize>]>) -> Result<()> {
    let (Some(&from), Some(&to)) = (input.quant(), output.quant()) else {
        return Ok(());
    };
    if from == to {
        return Ok(());
    }

    fn rebase<T: QuantElem>(
        codes: &mut [T],
        moved: Option<&[Option<usize>]>,
        from: &QuantParams,
        to: &QuantParams,
    ) {
        for (i, c) in codes.iter_mut().enumerate() {
            if moved.map_or(true, |m| m[i].is_some()) {
                *c = from.requantize_to(*c, to);
            }
        }
    }

    match output.dtype() {
        DType::U8 => rebase::<u8>(output.data_q_mut()?, moved, &from, &to),
        DType::I8 => rebase::<i8>(output.data_q_mut()?, moved, &from, &to),
        _ => {}
    }
    Ok(())
}

fn move_elements(input: &Tensor, output: &mut Tensor, indices: &[Option<usize>]) -> Result<()> {
    input.storage().gather_into(indices, output.storage_mut())?;
    rebase_codes(input, output, Some(indices))
}

/// Row-major coordinate of flat offset `i` in `dims`.
fn unravel(mut i: usize, dims: &[usize], coord: &mut [usize]) {
    for (c, &d) in coord.iter_mut().zip(dims).rev() {
        *c = i % d;
        i /= d;
    }
}

fn expect_dims(op: OpKind, output: &Tensor, expected: &[usize]) -> Result<()> {
    if output.dims() != expected {
        return Err(OpError::invalid(
            op,
            format!("output dims {:?}, expected {:?}", output.dims(), expected),
        ));
    }
    Ok(())
}

fn expect_per_axis(op: OpKind, what: &str, len: usize, rank: usize) -> Result<()> {
    if len != rank {
        return Err(OpError::invalid(
            op,
            format!("{} has {} entries for rank {}", what, len, rank),
        ));
    }
    Ok(())
}

/// Permute `input` from its own layout into `params.base.layout`.
pub fn transpose(input: &Tensor, output: &mut Tensor, params: &SisoParams) -> Result<()> {
    let op = OpKind::Transpose;
    let perm = layout_perm(input.layout(), params.base.layout)?;
    let iota: Vec<usize> = (0..input.numel()).collect();
    let (src, dims) = geometry::transpose(&iota, input.dims(), &perm)?;
    expect_dims(op, output, &dims)?;
    let indices: Vec<Option<usize>> = src.into_iter().map(Some).collect();
    move_elements(input, output, &indices)
}

/// Copy into a `[N, rest]` output.
pub fn flatten(input: &Tensor, output: &mut Tensor, _params: &SisoParams) -> Result<()> {
    let op = OpKind::Flatten;
    let batch = input.dims().first().copied().unwrap_or(1);
    let rest = if batch == 0 { 0 } else { input.numel() / batch };
    expect_dims(op, output, &[batch, rest])?;
    output.storage_mut().copy_from(input.storage())?;
    rebase_codes(input, output, None)
}

pub fn pad(input: &Tensor, output: &mut Tensor, params: &PadParams) -> Result<()> {
    let op = OpKind::Pad;
    let in_dims = input.dims();
    let rank = in_dims.len();
    expect_per_axis(op, "pad_before", params.pad_before.len(), rank)?;
    expect_per_axis(op, "pad_after", params.pad_after.len(), rank)?;
    let out_dims: Vec<usize> = (0..rank)
        .map(|a| params.pad_before[a] + in_dims[a] + params.pad_after[a])
        .collect();
    expect_dims(op, output, &out_dims)?;

    output.fill_value(params.pad_value)?;

    let mut coord = vec![0; rank];
    let mut src = vec![0; rank];
    let indices: Vec<Option<usize>> = (0..output.numel())
        .map(|i| {
            unravel(i, &out_dims, &mut coord);
            for a in 0..rank {
                let c = coord[a].checked_sub(params.pad_before[a])?;
                if c >= in_dims[a] {
                    return None;
                }
                src[a] = c;
            }
            Some(flat_index(in_dims, &src))
        })
        .collect();
    move_elements(input, output, &indices)
}

pub fn slice(input: &Tensor, output: &mut Tensor, params: &SliceParams) -> Result<()> {
    let op = OpKind::Slice;
    let in_dims = input.dims();
    let rank = in_dims.len();
    expect_per_axis(op, "begin", params.begin.len(), rank)?;
    expect_per_axis(op, "end", params.end.len(), rank)?;
    expect_per_axis(op, "strides", params.strides.len(), rank)?;

    let mut out_dims = Vec::with_capacity(rank);
    for a in 0..rank {
        let (begin, end, stride) = (params.begin[a], params.end[a].min(in_dims[a]), params.strides[a]);
        if stride == 0 || begin > end {
            return Err(OpError::invalid(
                op,
                format!("axis {}: begin {} end {} stride {}", a, begin, end, stride),
            ));
        }
        out_dims.push((end - begin).div_ceil(stride));
    }
    expect_dims(op, output, &out_dims)?;

    let mut coord = vec![0; rank];
    let indices: Vec<Option<usize>> = (0..output.numel())
        .map(|i| {
            unravel(i, &out_dims, &mut coord);
            for (a, c) in coord.iter_mut().enumerate() {
                *c = params.begin[a] + *c * params.strides[a];
            }
            Some(flat_index(in_dims, &coord))
        })
        .collect();
    move_elements(input, output, &indices)
}

/// Each output takes the next `output.dims()[axis]` slices of the input.
pub fn split(input: &Tensor, outputs: &mut [Tensor], params: &SplitParams) -> Result<()> {
    let op = OpKind::Split;
    let in_dims = input.dims();
    let axis = params.axis;
    if axis >= in_dims.len() {
        return Err(OpError::invalid(
            op,
            format!("axis {} for rank {}", axis, in_dims.len()),
        ));
    }
    let total: usize = outputs.iter().map(|o| o.dims().get(axis).copied().unwrap_or(0)).sum();
    if total != in_dims[axis] {
        return Err(OpError::invalid(
            op,
            format!("outputs cover {} of {} slices", total, in_dims[axis]),
        ));
    }

    let mut offset = 0;
    for output in outputs.iter_mut() {
        let mut expected = in_dims.to_vec();
        expected[axis] = output.dims().get(axis).copied().unwrap_or(0);
        expect_dims(op, output, &expected)?;

        let mut coord = vec![0; in_dims.len()];
        let indices: Vec<Option<usize>> = (0..output.numel())
            .map(|i| {
                unravel(i, &expected, &mut coord);
                coord[axis] += offset;
                Some(flat_index(in_dims, &coord))
            })
            .collect();
        move_elements(input, output, &indices)?;
        offset += expected[axis];
    }
    Ok(())
}

/// Unfold NCHW patches: row `(c * kh + ky) * kw + kx`, column
/// `(n * out_h + oy) * out_w + ox`. Taps in the padding read real zero.
pub fn im2col(input: &Tensor, output: &mut Tensor, params: &Im2colParams) -> Result<()> {
    let op = OpKind::Im2col;
    let &[n, c, h, w] = input.dims() else {
        return Err(OpError::invalid(op, format!("input dims {:?} are not NCHW", input.dims())));
    };
    let (kh, kw) = (params.kernel_h, params.kernel_w);
    let out_h = out_extent(h, params.pad_top, params.pad_down, kh, params.stride_h, 1);
    let out_w = out_extent(w, params.pad_left, params.pad_right, kw, params.stride_w, 1);
    let (Some(out_h), Some(out_w)) = (out_h, out_w) else {
        return Err(OpError::invalid(
            op,
            format!("{}x{} window does not fit {}x{} input", kh, kw, h, w),
        ));
    };
    let rows = c * kh * kw;
    let cols = n * out_h * out_w;
    expect_dims(op, output, &[rows, cols])?;

    output.fill_value(0.0)?;

    let mut indices = vec![None; rows * cols];
    for ci in 0..c {
        for ky in 0..kh {
            for kx in 0..kw {
                let row = (ci * kh + ky) * kw + kx;
                for ni in 0..n {
                    for oy in 0..out_h {
                        let iy = (oy * params.stride_h + ky) as isize - params.pad_top as isize;
                        for ox in 0..out_w {
                            let ix = (ox * params.stride_w + kx) as isize - params.pad_left as isize;
                            if iy < 0 || ix < 0 || iy as usize >= h || ix as usize >= w {
                                continue;
                            }
                            let col = (ni * out_h + oy) * out_w + ox;
                            indices[row * cols + col] =
                                Some(((ni * c + ci) * h + iy as usize) * w + ix as usize);
                        }
                    }
                }
            }
        }
    }
    move_elements(input, output, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::OpBase;
    use qnn_tensor::Layout;

    fn base() -> OpBase {
        OpBase::new(Layout::Flat)
    }

    #[test]
    fn test_transpose_back_to_channel_first() {
        let data: Vec<u8> = (0..12).collect();
        let q = QuantParams::from_scale(1.0, 0);
        let input = Tensor::from_u8(data, [1, 2, 3, 2], Layout::Nhwc, q).unwrap();
        let mut output = Tensor::zeros([1, 2, 2, 3], DType::U8, Layout::Nchw)
            .unwrap()
            .with_quant(q);
        transpose(&input, &mut output, &SisoParams::new(OpBase::new(Layout::Nchw))).unwrap();
        assert_eq!(output.data_u8().unwrap(), &[0, 2, 4, 6, 8, 10, 1, 3, 5, 7, 9, 11]);
    }

    #[test]
    fn test_transpose_rejects_wrong_output() {
        let input = Tensor::zeros([1, 2, 2, 3], DType::F32, Layout::Nchw).unwrap();
        let mut output = input.clone();
        let err = transpose(&input, &mut output, &SisoParams::new(OpBase::new(Layout::Nhwc)))
            .unwrap_err();
        assert!(matches!(err, OpError::InvalidParams { .. }));
    }

    #[test]
    fn test_flatten_requantizes() {
        let input = Tensor::from_i8(
            vec![1, -2, 3, -4],
            [1, 2, 2, 1],
            Layout::Nhwc,
            QuantParams::from_scale(1.0, 0),
        )
        .unwrap();
        let mut output = Tensor::zeros([1, 4], DType::I8, Layout::Flat)
            .unwrap()
            .with_quant(QuantParams::from_scale(0.5, 0));
        flatten(&input, &mut output, &SisoParams::default()).unwrap();
        assert_eq!(output.data_i8().unwrap(), &[2, -4, 6, -8]);
    }

    #[test]
    fn test_pad_constant() {
        let input = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0], [2, 2], Layout::Flat).unwrap();
        let mut output = Tensor::zeros([3, 3], DType::F32, Layout::Flat).unwrap();
        let p = PadParams::new(base(), vec![1, 0], vec![0, 1]).with_value(9.0);
        pad(&input, &mut output, &p).unwrap();
        assert_eq!(
            output.data_f32().unwrap(),
            &[9.0, 9.0, 9.0, 1.0, 2.0, 9.0, 3.0, 4.0, 9.0]
        );
    }

    #[test]
    fn test_pad_quantized_value() {
        let q = QuantParams::from_scale(0.5, 4);
        let input = Tensor::from_u8(vec![10], [1], Layout::Flat, q).unwrap();
        let mut output = Tensor::zeros([3], DType::U8, Layout::Flat).unwrap().with_quant(q);
        let p = PadParams::new(base(), vec![1], vec![1]).with_value(1.0);
        pad(&input, &mut output, &p).unwrap();
        assert_eq!(output.data_u8().unwrap(), &[6, 10, 6]);
    }

    #[test]
    fn test_strided_slice() {
        let input = Tensor::from_i32((0..12).collect(), [3, 4], Layout::Flat).unwrap();
        let mut output = Tensor::zeros([2, 2], DType::I32, Layout::Flat).unwrap();
        let p = SliceParams::new(base(), vec![0, 1], vec![3, 4]).with_strides(vec![2, 2]);
        slice(&input, &mut output, &p).unwrap();
        assert_eq!(output.data_i32().unwrap(), &[1, 3, 9, 11]);
    }

    #[test]
    fn test_slice_zero_stride() {
        let input = Tensor::zeros([2], DType::F32, Layout::Flat).unwrap();
        let mut output = input.clone();
        let p = SliceParams::new(base(), vec![0], vec![2]).with_strides(vec![0]);
        assert!(slice(&input, &mut output, &p).is_err());
    }

    #[test]
    fn test_split_inner_axis() {
        let input = Tensor::from_f32((0..6).map(|v| v as f32).collect(), [2, 3], Layout::Flat).unwrap();
        let mut outputs = vec![
            Tensor::zeros([2, 1], DType::F32, Layout::Flat).unwrap(),
            Tensor::zeros([2, 2], DType::F32, Layout::Flat).unwrap(),
        ];
        split(&input, &mut outputs, &SplitParams::new(base(), 1)).unwrap();
        assert_eq!(outputs[0].data_f32().unwrap(), &[0.0, 3.0]);
        assert_eq!(outputs[1].data_f32().unwrap(), &[1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_split_must_cover_axis() {
        let input = Tensor::zeros([4], DType::F32, Layout::Flat).unwrap();
        let mut outputs = vec![Tensor::zeros([3], DType::F32, Layout::Flat).unwrap()];
        assert!(split(&input, &mut outputs, &SplitParams::new(base(), 0)).is_err());
    }

    #[test]
    fn test_im2col_patches() {
        let input =
            Tensor::from_f32((1..=9).map(|v| v as f32).collect(), [1, 1, 3, 3], Layout::Nchw).unwrap();
        let mut output = Tensor::zeros([4, 4], DType::F32, Layout::Flat).unwrap();
        let p = Im2colParams::new(OpBase::new(Layout::Nchw), 2, 2);
        im2col(&input, &mut output, &p).unwrap();
        assert_eq!(
            output.data_f32().unwrap(),
            &[
                1.0, 2.0, 4.0, 5.0, //
                2.0, 3.0, 5.0, 6.0, //
                4.0, 5.0, 7.0, 8.0, //
                5.0, 6.0, 8.0, 9.0,
            ]
        );
    }

    #[test]
    fn test_im2col_pads_with_zero_point() {
        let q = QuantParams::from_scale(1.0, 3);
        let input = Tensor::from_u8(vec![7], [1, 1, 1, 1], Layout::Nchw, q).unwrap();
        let mut output = Tensor::zeros([2, 1], DType::U8, Layout::Flat).unwrap().with_quant(q);
        let p = Im2colParams::new(OpBase::new(Layout::Nchw), 1, 2).with_pad(0, 1, 0, 0);
        im2col(&input, &mut output, &p).unwrap();
        assert_eq!(output.data_u8().unwrap(), &[3, 7]);
    }

    #[test]
    fn test_unravel() {
        let mut c = [0; 3];
        unravel(23, &[2, 3, 4], &mut c);
        assert_eq!(c, [1, 2, 3]);
    }
}
