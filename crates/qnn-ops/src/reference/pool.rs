//! Max, average and global pooling over clamped windows.
//!
//! Windows are clipped to the input instead of being padded with sentinel
//! values. A clipped max window is floored at real zero, which keeps the
//! result of a window hanging over the edge from going below the padding.

use log::warn;
use qnn_tensor::geometry::{window_bounds, window_origin};
use qnn_tensor::{QuantElem, Tensor};

use crate::error::{OpError, Result};
use crate::ops::pool::PoolParams;
use crate::reference::{split_dims, tensor_index};
use crate::registry::OpKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduce {
    Max,
    Avg,
}

/// Extents and window of one pooling call, depth first.
#[derive(Debug, Clone)]
struct PoolGeometry {
    batch: usize,
    channels: usize,
    in_s: [usize; 3],
    out_s: [usize; 3],
    filter: [usize; 3],
    stride: [usize; 3],
    pad: [usize; 3],
    channel_last: bool,
}

impl PoolGeometry {
    fn new(op: OpKind, input: &Tensor, output: &Tensor, params: &PoolParams) -> Result<Self> {
        let layout = params.base.layout;
        let (batch, channels, in_s) = split_dims(op, input.dims(), layout)?;
        let (out_n, out_c, out_s) = split_dims(op, output.dims(), layout)?;
        if out_n != batch || out_c != channels {
            return Err(OpError::invalid(
                op,
                format!("output dims {:?} for input dims {:?}", output.dims(), input.dims()),
            ));
        }

        let volume = matches!(op, OpKind::MaxPool3d | OpKind::AvgPool3d);
        let global = matches!(op, OpKind::GlobalMaxPool2d | OpKind::GlobalAvgPool2d);
        let (filter, stride, pad) = if global {
            if out_s != [1, 1, 1] {
                return Err(OpError::invalid(
                    op,
                    format!("global pooling into spatial extent {:?}", out_s),
                ));
            }
            (in_s, [1, 1, 1], [0, 0, 0])
        } else if volume {
            (
                [params.filter_d, params.filter_h, params.filter_w],
                [params.stride_d, params.stride_h, params.stride_w],
                [params.pad_front, params.pad_top, params.pad_left],
            )
        } else {
            (
                [1, params.filter_h, params.filter_w],
                [1, params.stride_h, params.stride_w],
                [0, params.pad_top, params.pad_left],
            )
        };
        if filter.contains(&0) || stride.contains(&0) {
            return Err(OpError::invalid(op, "zero filter extent or stride"));
        }

        Ok(PoolGeometry {
            batch,
            channels,
            in_s,
            out_s,
            filter,
            stride,
            pad,
            channel_last: layout.is_channel_last(),
        })
    }

    fn nominal(&self) -> usize {
        self.filter.iter().product()
    }

    /// Call `f(output_offset, taps)` for every output element, where `taps`
    /// holds the input offsets of the window cells inside the input.
    fn for_each_window(&self, mut f: impl FnMut(usize, &[usize])) {
        let mut taps = Vec::with_capacity(self.nominal());
        for n in 0..self.batch {
            for c in 0..self.channels {
                for oz in 0..self.out_s[0] {
                    let z0 = window_origin(oz, self.stride[0], self.pad[0]);
                    let (kz0, kz1) = window_bounds(z0, self.filter[0], self.in_s[0]);
                    for oy in 0..self.out_s[1] {
                        let y0 = window_origin(oy, self.stride[1], self.pad[1]);
                        let (ky0, ky1) = window_bounds(y0, self.filter[1], self.in_s[1]);
                        for ox in 0..self.out_s[2] {
                            let x0 = window_origin(ox, self.stride[2], self.pad[2]);
                            let (kx0, kx1) = window_bounds(x0, self.filter[2], self.in_s[2]);

                            taps.clear();
                            for kz in kz0..kz1 {
                                let iz = (z0 + kz as isize) as usize;
                                for ky in ky0..ky1 {
                                    let iy = (y0 + ky as isize) as usize;
                                    for kx in kx0..kx1 {
                                        let ix = (x0 + kx as isize) as usize;
                                        taps.push(tensor_index(
                                            self.channel_last,
                                            self.channels,
                                            self.in_s,
                                            n,
                                            c,
                                            [iz, iy, ix],
                                        ));
                                    }
                                }
                            }
                            let out = tensor_index(
                                self.channel_last,
                                self.channels,
                                self.out_s,
                                n,
                                c,
                                [oz, oy, ox],
                            );
                            f(out, &taps);
                        }
                    }
                }
            }
        }
    }
}

fn reduce_of(op: OpKind) -> Reduce {
    match op {
        OpKind::MaxPool2d | OpKind::GlobalMaxPool2d | OpKind::MaxPool3d => Reduce::Max,
        _ => Reduce::Avg,
    }
}

fn pool_f32(op: OpKind, input: &Tensor, output: &mut Tensor, params: &PoolParams) -> Result<()> {
    let g = PoolGeometry::new(op, input, output, params)?;
    let nominal = g.nominal();
    let reduce = reduce_of(op);
    let x = input.data_f32()?;
    let y = output.data_f32_mut()?;

    g.for_each_window(|out, taps| {
        y[out] = match reduce {
            _ if taps.is_empty() => 0.0,
            Reduce::Max => {
                let m = taps.iter().map(|&i| x[i]).fold(f32::NEG_INFINITY, f32::max);
                if taps.len() < nominal {
                    m.max(0.0)
                } else {
                    m
                }
            }
            Reduce::Avg => {
                let sum: f32 = taps.iter().map(|&i| x[i]).sum();
                let divisor = if params.count_include_pad {
                    nominal
                } else {
                    taps.len()
                };
                sum / divisor as f32
            }
        };
    });
    Ok(())
}

/// Integer division rounding half away from zero.
#[inline]
fn rounding_div(num: i64, den: i64) -> i64 {
    if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}

/// Pooling on codes. The reduction runs in the input domain; the result is
/// then requantized into the output domain.
fn pool_quant<T: QuantElem>(
    op: OpKind,
    input: &Tensor,
    output: &mut Tensor,
    params: &PoolParams,
) -> Result<()> {
    let g = PoolGeometry::new(op, input, output, params)?;
    let in_q = input.quant_or_err()?;
    let out_q = output.quant_or_err()?;
    let nominal = g.nominal();
    let reduce = reduce_of(op);
    let zp = T::saturate(in_q.zero_point as i64);
    let x = input.data_q::<T>()?;
    let y = output.data_q_mut::<T>()?;

    g.for_each_window(|out, taps| {
        let code = match reduce {
            _ if taps.is_empty() => zp,
            Reduce::Max => {
                let mut m = x[taps[0]];
                for &i in &taps[1..] {
                    if x[i] > m {
                        m = x[i];
                    }
                }
                if taps.len() < nominal && zp > m {
                    zp
                } else {
                    m
                }
            }
            Reduce::Avg => {
                // padded cells hold real zero, i.e. contribute nothing
                // once the zero point is removed
                let sum: i64 = taps
                    .iter()
                    .map(|&i| (x[i].to_i32() - in_q.zero_point) as i64)
                    .sum();
                let divisor = if params.count_include_pad {
                    nominal
                } else {
                    taps.len()
                };
                T::saturate(rounding_div(sum, divisor as i64) + in_q.zero_point as i64)
            }
        };
        y[out] = in_q.requantize_to(code, &out_q);
    });
    Ok(())
}

macro_rules! pool_kernels {
    ($($float:ident, $quant:ident => $op:expr;)*) => {
        $(
            pub fn $float(input: &Tensor, output: &mut Tensor, params: &PoolParams) -> Result<()> {
                pool_f32($op, input, output, params)
            }

            pub fn $quant<T: QuantElem>(
                input: &Tensor,
                output: &mut Tensor,
                params: &PoolParams,
            ) -> Result<()> {
                pool_quant::<T>($op, input, output, params)
            }
        )*
    };
}

pool_kernels! {
    maxpool2d_f32, maxpool2d_quant => OpKind::MaxPool2d;
    avgpool2d_f32, avgpool2d_quant => OpKind::AvgPool2d;
    global_maxpool2d_f32, global_maxpool2d_quant => OpKind::GlobalMaxPool2d;
    global_avgpool2d_f32, global_avgpool2d_quant => OpKind::GlobalAvgPool2d;
    maxpool3d_f32, maxpool3d_quant => OpKind::MaxPool3d;
    avgpool3d_f32, avgpool3d_quant => OpKind::AvgPool3d;
}

/// Bound for channel-last 3-D pooling, which has no reference kernel.
pub fn pool3d_unimplemented(input: &Tensor, _output: &mut Tensor, params: &PoolParams) -> Result<()> {
    let variant = format!("{} {}", input.dtype(), params.base.layout);
    warn!("pool3d: no reference kernel for {}", variant);
    Err(OpError::unimplemented(OpKind::MaxPool3d, variant))
}
