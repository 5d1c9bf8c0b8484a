//! Bilinear and nearest-neighbour resize.
//!
//! The sampling loop works on channel-last rows. Channel-first tensors are
//! transposed to channel-last, resized and transposed back.

use log::warn;
use qnn_tensor::geometry::{nchw_to_nhwc, nhwc_to_nchw};
use qnn_tensor::{Layout, QuantElem, Tensor};

use crate::error::{OpError, Result};
use crate::ops::resize::{ResizeMode, ResizeParams};
use crate::reference::split_dims;
use crate::registry::OpKind;

/// Input step per output step along one axis.
///
/// Under `align_corners` the corner samples coincide, giving
/// `(in - 1) / (out - 1)`; a single output sample falls back to `in / out`.
pub fn resize_scale(input: usize, output: usize, align_corners: bool) -> f32 {
    if align_corners && output > 1 {
        (input - 1) as f32 / (output - 1) as f32
    } else {
        input as f32 / output as f32
    }
}

/// Element types the sampling loop handles.
pub trait Sample: Copy + Default {
    fn to_f32(self) -> f32;
    /// Narrow a blended value. Codes truncate toward zero.
    fn from_blend(v: f32) -> Self;
}

impl Sample for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
    #[inline]
    fn from_blend(v: f32) -> f32 {
        v
    }
}

impl Sample for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn from_blend(v: f32) -> u8 {
        v as u8
    }
}

impl Sample for i8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn from_blend(v: f32) -> i8 {
        v as i8
    }
}

#[derive(Debug, Clone, Copy)]
struct Plane {
    batch: usize,
    height: usize,
    width: usize,
    channels: usize,
}

fn resize_nhwc<T: Sample>(src: &[T], from: Plane, dst: &mut [T], to: Plane, params: &ResizeParams) {
    let h_scale = resize_scale(from.height, to.height, params.align_corners);
    let w_scale = resize_scale(from.width, to.width, params.align_corners);
    let c = from.channels;
    let at = |n: usize, y: usize, x: usize| ((n * from.height + y) * from.width + x) * c;

    for n in 0..to.batch {
        for y in 0..to.height {
            let in_y = y as f32 * h_scale;
            for x in 0..to.width {
                let in_x = x as f32 * w_scale;
                let out = ((n * to.height + y) * to.width + x) * c;
                match params.mode {
                    ResizeMode::NearestNeighbor => {
                        let (sy, sx) = if params.align_corners {
                            (in_y.round(), in_x.round())
                        } else {
                            (in_y.floor(), in_x.floor())
                        };
                        let sy = (sy as usize).min(from.height - 1);
                        let sx = (sx as usize).min(from.width - 1);
                        let base = at(n, sy, sx);
                        dst[out..out + c].copy_from_slice(&src[base..base + c]);
                    }
                    _ => {
                        let y0 = (in_y.floor() as usize).min(from.height - 1);
                        let x0 = (in_x.floor() as usize).min(from.width - 1);
                        let y1 = (y0 + 1).min(from.height - 1);
                        let x1 = (x0 + 1).min(from.width - 1);
                        let dy = in_y - y0 as f32;
                        let dx = in_x - x0 as f32;
                        let (p00, p01, p10, p11) = (at(n, y0, x0), at(n, y0, x1), at(n, y1, x0), at(n, y1, x1));
                        for ch in 0..c {
                            let top = src[p00 + ch].to_f32() * (1.0 - dx) + src[p01 + ch].to_f32() * dx;
                            let bottom = src[p10 + ch].to_f32() * (1.0 - dx) + src[p11 + ch].to_f32() * dx;
                            dst[out + ch] = T::from_blend(top * (1.0 - dy) + bottom * dy);
                        }
                    }
                }
            }
        }
    }
}

fn resize_typed<T: Sample>(
    input: &Tensor,
    src: &[T],
    output_dims: &[usize],
    dst: &mut [T],
    params: &ResizeParams,
) -> Result<()> {
    let op = OpKind::Resize;
    if params.mode == ResizeMode::Bicubic {
        warn!("resize: bicubic sampling has no reference kernel");
        return Err(OpError::unimplemented(op, "bicubic"));
    }

    let layout = params.base.layout;
    let (batch, channels, [_, h, w]) = split_dims(op, input.dims(), layout)?;
    let (out_n, out_c, [_, oh, ow]) = split_dims(op, output_dims, layout)?;
    if out_n != batch || out_c != channels {
        return Err(OpError::invalid(
            op,
            format!("output dims {:?} for input dims {:?}", output_dims, input.dims()),
        ));
    }
    if h == 0 || w == 0 {
        return Err(OpError::invalid(op, "empty input plane"));
    }

    let from = Plane {
        batch,
        height: h,
        width: w,
        channels,
    };
    let to = Plane {
        batch,
        height: oh,
        width: ow,
        channels,
    };

    match layout {
        Layout::Nhwc => resize_nhwc(src, from, dst, to, params),
        _ => {
            let (rows, _) = nchw_to_nhwc(src, input.dims())?;
            let mut resized = vec![T::default(); dst.len()];
            resize_nhwc(&rows, from, &mut resized, to, params);
            let (back, _) = nhwc_to_nchw(&resized, &[batch, oh, ow, channels])?;
            dst.copy_from_slice(&back);
        }
    }
    Ok(())
}

pub fn resize_f32(input: &Tensor, output: &mut Tensor, params: &ResizeParams) -> Result<()> {
    let dims = output.dims().to_vec();
    resize_typed(input, input.data_f32()?, &dims, output.data_f32_mut()?, params)
}

/// Resize on raw codes. Input and output share one quantization domain.
pub fn resize_quant<T: QuantElem + Sample>(
    input: &Tensor,
    output: &mut Tensor,
    params: &ResizeParams,
) -> Result<()> {
    let dims = output.dims().to_vec();
    resize_typed(input, input.data_q::<T>()?, &dims, output.data_q_mut::<T>()?, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::OpBase;
    use approx::assert_relative_eq;
    use qnn_tensor::{DType, QuantParams};

    fn params(layout: Layout, mode: ResizeMode) -> ResizeParams {
        ResizeParams::new(OpBase::new(layout), mode)
    }

    #[test]
    fn test_scale() {
        assert_relative_eq!(resize_scale(2, 4, false), 0.5);
        assert_relative_eq!(resize_scale(3, 5, true), 0.5);
        assert_relative_eq!(resize_scale(3, 1, true), 3.0);
    }

    #[test]
    fn test_bilinear_align_corners_channel_first() {
        // two channels, 2x2 each
        let nchw = Tensor::from_f32(
            vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0],
            [1, 2, 2, 2],
            Layout::Nchw,
        )
        .unwrap();
        let mut out = Tensor::zeros([1, 2, 3, 3], DType::F32, Layout::Nchw).unwrap();
        resize_f32(&nchw, &mut out, &params(Layout::Nchw, ResizeMode::Bilinear).with_align_corners(true))
            .unwrap();
        let y = out.data_f32().unwrap();
        // align-corners maps the centre to the mean of the plane
        assert_relative_eq!(y[4], 2.5);
        assert_relative_eq!(y[9 + 4], 25.0);
        assert_relative_eq!(y[8], 4.0);
        assert_relative_eq!(y[9], 10.0);
    }

    #[test]
    fn test_nearest_downscale() {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let input = Tensor::from_f32(data, [1, 4, 4, 1], Layout::Nhwc).unwrap();
        let mut out = Tensor::zeros([1, 2, 2, 1], DType::F32, Layout::Nhwc).unwrap();
        resize_f32(&input, &mut out, &params(Layout::Nhwc, ResizeMode::NearestNeighbor)).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn test_quantized_bilinear_truncates_codes() {
        let q = QuantParams::from_scale(1.0, 0);
        let input = Tensor::from_u8(vec![0, 3], [1, 1, 2, 1], Layout::Nhwc, q).unwrap();
        let mut out = Tensor::zeros([1, 1, 4, 1], DType::U8, Layout::Nhwc).unwrap().with_quant(q);
        resize_quant::<u8>(&input, &mut out, &params(Layout::Nhwc, ResizeMode::Bilinear)).unwrap();
        // samples at 0, 0.5, 1, 1.5 -> 0, 1.5, 3, 3
        assert_eq!(out.data_u8().unwrap(), &[0, 1, 3, 3]);
    }

    #[test]
    fn test_channel_mismatch() {
        let input = Tensor::zeros([1, 2, 2, 1], DType::F32, Layout::Nhwc).unwrap();
        let mut out = Tensor::zeros([1, 4, 4, 2], DType::F32, Layout::Nhwc).unwrap();
        let err = resize_f32(&input, &mut out, &params(Layout::Nhwc, ResizeMode::Bilinear)).unwrap_err();
        assert!(matches!(err, OpError::InvalidParams { .. }));
    }
}
