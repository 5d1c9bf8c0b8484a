//! Transposed convolution by scatter-accumulate.
//!
//! Each input element is scattered into every output position its
//! receptive field covers. Positions receive contributions from several
//! inputs, so accumulation goes to a zeroed scratch buffer the size of the
//! whole output; bias is added once scattering is complete.

use log::warn;
use qnn_tensor::{Layout, Tensor};

use crate::error::{OpError, Result};
use crate::ops::conv::ConvParams;
use crate::ops::conv3d::Conv3dParams;
use crate::reference::conv::Window;
use crate::reference::wrapper::conv_via_f32;
use crate::reference::{split_dims, tensor_index};
use crate::registry::OpKind;

fn scatter_f32(
    op: OpKind,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    layout: Layout,
    win: Window,
) -> Result<()> {
    let (batch, in_c, in_s) = split_dims(op, input.dims(), layout)?;
    let (out_n, out_c, out_s) = split_dims(op, output.dims(), layout)?;
    if out_n != batch {
        return Err(OpError::invalid(op, format!("batch {} in, {} out", batch, out_n)));
    }
    if win.group != 1 {
        return Err(OpError::invalid(op, format!("{} groups", win.group)));
    }
    if win.stride.contains(&0) || win.dilation.contains(&0) {
        return Err(OpError::invalid(op, "zero stride or dilation"));
    }

    // kernel is [in, out, (d,) h, w]
    let kdims = kernel.dims();
    if kdims.len() != input.dims().len() || kdims[0] != in_c || kdims[1] != out_c {
        return Err(OpError::invalid(
            op,
            format!(
                "kernel dims {:?} do not match {} -> {} channels",
                kdims, in_c, out_c
            ),
        ));
    }
    let k = match kdims[2..] {
        [h, w] => [1, h, w],
        [d, h, w] => [d, h, w],
        _ => return Err(OpError::invalid(op, format!("kernel dims {:?}", kdims))),
    };
    if let Some(b) = bias {
        if b.numel() != out_c {
            return Err(OpError::invalid(
                op,
                format!("bias has {} elements for {} channels", b.numel(), out_c),
            ));
        }
    }

    let channel_last = layout.is_channel_last();
    let x = input.data_f32()?;
    let w = kernel.data_f32()?;
    let mut scratch = vec![0.0f32; output.numel()];

    for n in 0..batch {
        for ic in 0..in_c {
            for iz in 0..in_s[0] {
                for iy in 0..in_s[1] {
                    for ix in 0..in_s[2] {
                        let v = x[tensor_index(channel_last, in_c, in_s, n, ic, [iz, iy, ix])];
                        for oc in 0..out_c {
                            let w_base = (ic * out_c + oc) * k[0] * k[1] * k[2];
                            for kz in 0..k[0] {
                                let Some(oz) = target(iz, kz, 0, &win, out_s) else {
                                    continue;
                                };
                                for ky in 0..k[1] {
                                    let Some(oy) = target(iy, ky, 1, &win, out_s) else {
                                        continue;
                                    };
                                    for kx in 0..k[2] {
                                        let Some(ox) = target(ix, kx, 2, &win, out_s) else {
                                            continue;
                                        };
                                        let wi = w_base + (kz * k[1] + ky) * k[2] + kx;
                                        let oi = tensor_index(
                                            channel_last,
                                            out_c,
                                            out_s,
                                            n,
                                            oc,
                                            [oz, oy, ox],
                                        );
                                        scratch[oi] += v * w[wi];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(b) = bias {
        let b = b.data_f32()?;
        for n in 0..batch {
            for oc in 0..out_c {
                for oz in 0..out_s[0] {
                    for oy in 0..out_s[1] {
                        for ox in 0..out_s[2] {
                            scratch[tensor_index(channel_last, out_c, out_s, n, oc, [oz, oy, ox])] +=
                                b[oc];
                        }
                    }
                }
            }
        }
    }

    output.data_f32_mut()?.copy_from_slice(&scratch);
    Ok(())
}

/// Output coordinate reached from input coordinate `i` through tap `t`
/// on spatial axis `axis`, if it lies inside the output.
#[inline]
fn target(i: usize, t: usize, axis: usize, win: &Window, out_s: [usize; 3]) -> Option<usize> {
    let o = (i * win.stride[axis] + t * win.dilation[axis]) as isize - win.pad[axis] as isize;
    (o >= 0 && (o as usize) < out_s[axis]).then_some(o as usize)
}

pub fn deconv2d_f32(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    scatter_f32(
        OpKind::Deconv2d,
        input,
        output,
        kernel,
        bias,
        params.base.layout,
        Window::planar(params),
    )
}

pub fn deconv2d_quant(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    conv_via_f32(input, output, kernel, bias, params, deconv2d_f32)
}

pub fn deconv3d_ncdhw_f32(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    scatter_f32(
        OpKind::Deconv3d,
        input,
        output,
        kernel,
        bias,
        Layout::Ncdhw,
        Window::volume(params),
    )
}

/// Bound for the remaining 3-D deconvolution pairings, which have no
/// reference kernel.
pub fn deconv3d_unimplemented(
    input: &Tensor,
    _output: &mut Tensor,
    _kernel: &Tensor,
    _bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    let variant = format!("{} {}", input.dtype(), params.base.layout);
    warn!("deconv3d: no reference kernel for {}", variant);
    Err(OpError::unimplemented(OpKind::Deconv3d, variant))
}
