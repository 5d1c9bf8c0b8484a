//! Direct convolution, planar and volumetric.
//!
//! Every variant (plain, depthwise, grouped; 2-D and 3-D; channel-first and
//! channel-last) runs through one volumetric accumulation loop. Planar
//! convolutions use a unit depth axis.

use qnn_tensor::geometry::{dilated_window_bounds, window_origin};
use qnn_tensor::quant::{multiply_by_quantized_multiplier, quantize_multiplier};
use qnn_tensor::{DType, Layout, QuantElem, Tensor};

use crate::error::{OpError, Result};
use crate::ops::conv::ConvParams;
use crate::ops::conv3d::Conv3dParams;
use crate::reference::{centered_codes, split_dims, tensor_index};
use crate::registry::{ConvKind, OpKind};

/// Axis order of a convolution weight tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WeightLayout {
    /// `[out, in / group, (d,) h, w]`
    ChannelFirst,
    /// `[out, (d,) h, w, in / group]`
    ChannelLast,
    /// `[1, h, w, out]`: channel-last depthwise, `out = in * multiplier`.
    DepthwiseLast,
}

/// Stride, leading padding and dilation per spatial axis `[d, h, w]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub stride: [usize; 3],
    pub pad: [usize; 3],
    pub dilation: [usize; 3],
    pub group: usize,
}

impl Window {
    pub(crate) fn planar(p: &ConvParams) -> Self {
        Window {
            stride: [1, p.stride_h, p.stride_w],
            pad: [0, p.pad_top, p.pad_left],
            dilation: [1, p.dilation_h, p.dilation_w],
            group: p.group,
        }
    }

    pub(crate) fn volume(p: &Conv3dParams) -> Self {
        Window {
            stride: [p.stride_d, p.stride_h, p.stride_w],
            pad: [p.pad_front, p.pad_top, p.pad_left],
            dilation: [p.dilation_d, p.dilation_h, p.dilation_w],
            group: p.group,
        }
    }
}

/// Extents of one convolution.
#[derive(Debug, Clone)]
pub(crate) struct ConvGeometry {
    pub batch: usize,
    pub in_c: usize,
    pub in_s: [usize; 3],
    pub out_c: usize,
    pub out_s: [usize; 3],
    pub k: [usize; 3],
    pub win: Window,
    pub channel_last: bool,
    pub weight: WeightLayout,
}

fn kernel_extents(
    op: OpKind,
    dims: &[usize],
    weight: WeightLayout,
    rank: usize,
) -> Result<(usize, usize, [usize; 3])> {
    if dims.len() != rank {
        return Err(OpError::invalid(
            op,
            format!("kernel dims {:?} do not have rank {}", dims, rank),
        ));
    }
    let spatial = |s: &[usize]| match *s {
        [h, w] => [1, h, w],
        [d, h, w] => [d, h, w],
        _ => [0, 0, 0],
    };
    let last = rank - 1;
    match weight {
        WeightLayout::ChannelFirst => Ok((dims[0], dims[1], spatial(&dims[2..]))),
        WeightLayout::ChannelLast => Ok((dims[0], dims[last], spatial(&dims[1..last]))),
        WeightLayout::DepthwiseLast => {
            if dims[0] != 1 {
                return Err(OpError::invalid(
                    op,
                    format!("depthwise kernel dims {:?} must start with 1", dims),
                ));
            }
            Ok((dims[last], 1, spatial(&dims[1..last])))
        }
    }
}

impl ConvGeometry {
    pub(crate) fn new(
        op: OpKind,
        input: &Tensor,
        output: &Tensor,
        kernel: &Tensor,
        layout: Layout,
        weight: WeightLayout,
        win: Window,
    ) -> Result<Self> {
        let (batch, in_c, in_s) = split_dims(op, input.dims(), layout)?;
        let (out_n, out_c, out_s) = split_dims(op, output.dims(), layout)?;
        let (k_oc, k_icg, k) = kernel_extents(op, kernel.dims(), weight, input.dims().len())?;

        if out_n != batch {
            return Err(OpError::invalid(
                op,
                format!("batch {} in, {} out", batch, out_n),
            ));
        }
        if win.group == 0 || in_c % win.group != 0 || out_c % win.group != 0 {
            return Err(OpError::invalid(
                op,
                format!("{} groups do not divide {} -> {} channels", win.group, in_c, out_c),
            ));
        }
        if k_oc != out_c || k_icg * win.group != in_c {
            return Err(OpError::invalid(
                op,
                format!(
                    "kernel dims {:?} do not match {} -> {} channels in {} groups",
                    kernel.dims(),
                    in_c,
                    out_c,
                    win.group
                ),
            ));
        }
        if win.stride.contains(&0) || win.dilation.contains(&0) || k.contains(&0) {
            return Err(OpError::invalid(op, "zero stride, dilation or kernel extent"));
        }

        Ok(ConvGeometry {
            batch,
            in_c,
            in_s,
            out_c,
            out_s,
            k,
            win,
            channel_last: layout.is_channel_last(),
            weight,
        })
    }

    #[inline]
    fn input_index(&self, n: usize, c: usize, z: usize, y: usize, x: usize) -> usize {
        tensor_index(self.channel_last, self.in_c, self.in_s, n, c, [z, y, x])
    }

    #[inline]
    fn output_index(&self, n: usize, c: usize, z: usize, y: usize, x: usize) -> usize {
        tensor_index(self.channel_last, self.out_c, self.out_s, n, c, [z, y, x])
    }

    #[inline]
    fn weight_index(&self, oc: usize, icl: usize, z: usize, y: usize, x: usize) -> usize {
        let [kd, kh, kw] = self.k;
        let icg = self.in_c / self.win.group;
        match self.weight {
            WeightLayout::ChannelFirst => (((oc * icg + icl) * kd + z) * kh + y) * kw + x,
            WeightLayout::ChannelLast => (((oc * kd + z) * kh + y) * kw + x) * icg + icl,
            WeightLayout::DepthwiseLast => ((z * kh + y) * kw + x) * self.out_c + oc,
        }
    }

    fn output_len(&self) -> usize {
        self.batch * self.out_c * self.out_s.iter().product::<usize>()
    }
}

/// Accumulator arithmetic: f32 for float kernels, wrapping i32 for
/// quantized ones.
pub(crate) trait Accum: Copy + Default {
    fn mac(self, a: Self, b: Self) -> Self;
    fn plus(self, b: Self) -> Self;
}

impl Accum for f32 {
    #[inline]
    fn mac(self, a: f32, b: f32) -> f32 {
        self + a * b
    }
    #[inline]
    fn plus(self, b: f32) -> f32 {
        self + b
    }
}

impl Accum for i32 {
    #[inline]
    fn mac(self, a: i32, b: i32) -> i32 {
        self.wrapping_add(a.wrapping_mul(b))
    }
    #[inline]
    fn plus(self, b: i32) -> i32 {
        self.wrapping_add(b)
    }
}

/// Sum of `input * weight` over every clamped window, plus the per-channel
/// bias, in output order.
pub(crate) fn accumulate<T: Accum>(g: &ConvGeometry, x: &[T], w: &[T], bias: Option<&[T]>) -> Vec<T> {
    let icg = g.in_c / g.win.group;
    let ocg = g.out_c / g.win.group;
    let [in_d, in_h, in_w] = g.in_s;
    let [out_d, out_h, out_w] = g.out_s;
    let Window {
        stride,
        pad,
        dilation,
        ..
    } = g.win;

    let mut out = vec![T::default(); g.output_len()];
    for n in 0..g.batch {
        for oc in 0..g.out_c {
            let first_ic = (oc / ocg) * icg;
            let b = bias.map_or(T::default(), |b| b[oc]);
            for oz in 0..out_d {
                let z0 = window_origin(oz, stride[0], pad[0]);
                let (kz0, kz1) = dilated_window_bounds(z0, g.k[0], dilation[0], in_d);
                for oy in 0..out_h {
                    let y0 = window_origin(oy, stride[1], pad[1]);
                    let (ky0, ky1) = dilated_window_bounds(y0, g.k[1], dilation[1], in_h);
                    for ox in 0..out_w {
                        let x0 = window_origin(ox, stride[2], pad[2]);
                        let (kx0, kx1) = dilated_window_bounds(x0, g.k[2], dilation[2], in_w);

                        let mut acc = T::default();
                        for icl in 0..icg {
                            let ic = first_ic + icl;
                            for kz in kz0..kz1 {
                                let iz = (z0 + (kz * dilation[0]) as isize) as usize;
                                for ky in ky0..ky1 {
                                    let iy = (y0 + (ky * dilation[1]) as isize) as usize;
                                    for kx in kx0..kx1 {
                                        let ix = (x0 + (kx * dilation[2]) as isize) as usize;
                                        acc = acc.mac(
                                            x[g.input_index(n, ic, iz, iy, ix)],
                                            w[g.weight_index(oc, icl, kz, ky, kx)],
                                        );
                                    }
                                }
                            }
                        }
                        out[g.output_index(n, oc, oz, oy, ox)] = acc.plus(b);
                    }
                }
            }
        }
    }
    out
}

fn check_bias(op: OpKind, bias: &Tensor, channels: usize) -> Result<()> {
    if bias.numel() != channels {
        return Err(OpError::invalid(
            op,
            format!("bias has {} elements for {} channels", bias.numel(), channels),
        ));
    }
    Ok(())
}

pub(crate) fn run_f32(
    op: OpKind,
    g: &ConvGeometry,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    relu: bool,
) -> Result<()> {
    let b = match bias {
        Some(b) => {
            check_bias(op, b, g.out_c)?;
            Some(b.data_f32()?)
        }
        None => None,
    };
    let acc = accumulate(g, input.data_f32()?, kernel.data_f32()?, b);
    for (o, v) in output.data_f32_mut()?.iter_mut().zip(acc) {
        *o = if relu { v.max(0.0) } else { v };
    }
    Ok(())
}

/// Integer convolution: `(x - zp_x) * (w - zp_w)` accumulated in i32, then
/// rescaled by `in_scale * w_scale / out_scale` into the output domain.
pub(crate) fn run_quant<T: QuantElem>(
    op: OpKind,
    g: &ConvGeometry,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    relu: bool,
) -> Result<()> {
    let in_q = input.quant_or_err()?;
    let w_q = kernel.quant_or_err()?;
    let out_q = output.quant_or_err()?;

    let x: Vec<i32> = input
        .data_q::<T>()?
        .iter()
        .map(|&v| v.to_i32() - in_q.zero_point)
        .collect();
    let w = centered_codes(kernel)?;
    let acc_scale = in_q.scale() as f64 * w_q.scale() as f64;

    let b: Option<Vec<i32>> = match bias {
        Some(b) => {
            check_bias(op, b, g.out_c)?;
            match b.dtype() {
                DType::I32 => Some(b.data_i32()?.to_vec()),
                DType::F32 => Some(
                    b.data_f32()?
                        .iter()
                        .map(|&v| (v as f64 / acc_scale).round() as i32)
                        .collect(),
                ),
                other => {
                    return Err(OpError::invalid(op, format!("bias dtype {}", other)));
                }
            }
        }
        None => None,
    };

    let acc = accumulate(g, &x, &w, b.as_deref());
    let (multiplier, shift) = quantize_multiplier(acc_scale / out_q.scale() as f64);
    let floor = if relu {
        out_q.zero_point.max(T::QMIN)
    } else {
        T::QMIN
    } as i64;
    for (o, a) in output.data_q_mut::<T>()?.iter_mut().zip(acc) {
        let v = multiply_by_quantized_multiplier(a, multiplier, shift) as i64 + out_q.zero_point as i64;
        *o = T::saturate(v.max(floor));
    }
    Ok(())
}

fn planar_geometry(
    kind: ConvKind,
    relu: bool,
    input: &Tensor,
    output: &Tensor,
    kernel: &Tensor,
    params: &ConvParams,
) -> Result<ConvGeometry> {
    let op = kind.op(relu);
    let layout = params.base.layout;
    let weight = match (layout.is_channel_last(), kind) {
        (false, _) => WeightLayout::ChannelFirst,
        (true, ConvKind::Depthwise) => WeightLayout::DepthwiseLast,
        (true, _) => WeightLayout::ChannelLast,
    };
    let g = ConvGeometry::new(op, input, output, kernel, layout, weight, Window::planar(params))?;
    match kind {
        ConvKind::Plain if g.win.group != 1 => Err(OpError::invalid(
            op,
            format!("plain convolution with {} groups", g.win.group),
        )),
        ConvKind::Depthwise if g.win.group != g.in_c => Err(OpError::invalid(
            op,
            format!("depthwise convolution with {} groups over {} channels", g.win.group, g.in_c),
        )),
        _ => Ok(g),
    }
}

fn planar_f32(
    kind: ConvKind,
    relu: bool,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    let g = planar_geometry(kind, relu, input, output, kernel, params)?;
    run_f32(kind.op(relu), &g, input, output, kernel, bias, relu)
}

fn planar_quant<T: QuantElem>(
    kind: ConvKind,
    relu: bool,
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    let g = planar_geometry(kind, relu, input, output, kernel, params)?;
    run_quant::<T>(kind.op(relu), &g, input, output, kernel, bias, relu)
}

pub fn conv2d_f32<const RELU: bool>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    planar_f32(ConvKind::Plain, RELU, input, output, kernel, bias, params)
}

pub fn depthwise_conv2d_f32<const RELU: bool>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    planar_f32(ConvKind::Depthwise, RELU, input, output, kernel, bias, params)
}

pub fn group_conv2d_f32<const RELU: bool>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    planar_f32(ConvKind::Grouped, RELU, input, output, kernel, bias, params)
}

pub fn conv2d_quant<T: QuantElem, const RELU: bool>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    planar_quant::<T>(ConvKind::Plain, RELU, input, output, kernel, bias, params)
}

pub fn depthwise_conv2d_quant<T: QuantElem, const RELU: bool>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    planar_quant::<T>(ConvKind::Depthwise, RELU, input, output, kernel, bias, params)
}

pub fn group_conv2d_quant<T: QuantElem, const RELU: bool>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &ConvParams,
) -> Result<()> {
    planar_quant::<T>(ConvKind::Grouped, RELU, input, output, kernel, bias, params)
}

fn volume_geometry(
    input: &Tensor,
    output: &Tensor,
    kernel: &Tensor,
    params: &Conv3dParams,
) -> Result<ConvGeometry> {
    let layout = params.base.layout;
    let weight = if layout.is_channel_last() {
        WeightLayout::ChannelLast
    } else {
        WeightLayout::ChannelFirst
    };
    ConvGeometry::new(OpKind::Conv3d, input, output, kernel, layout, weight, Window::volume(params))
}

pub fn conv3d_f32(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    let g = volume_geometry(input, output, kernel, params)?;
    run_f32(OpKind::Conv3d, &g, input, output, kernel, bias, false)
}

pub fn conv3d_quant<T: QuantElem>(
    input: &Tensor,
    output: &mut Tensor,
    kernel: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv3dParams,
) -> Result<()> {
    let g = volume_geometry(input, output, kernel, params)?;
    run_quant::<T>(OpKind::Conv3d, &g, input, output, kernel, bias, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::OpBase;
    use approx::assert_relative_eq;
    use qnn_tensor::QuantParams;

    fn f32_tensor(data: Vec<f32>, dims: &[usize], layout: Layout) -> Tensor {
        Tensor::from_f32(data, dims.to_vec(), layout).unwrap()
    }

    #[test]
    fn test_conv2d_nchw_with_padding_and_bias() {
        // 3x3 ones kernel over a 3x3 ramp, pad 1: output = window sums + 1
        let input = f32_tensor((1..=9).map(|v| v as f32).collect(), &[1, 1, 3, 3], Layout::Nchw);
        let kernel = f32_tensor(vec![1.0; 9], &[1, 1, 3, 3], Layout::Nchw);
        let bias = f32_tensor(vec![1.0], &[1], Layout::Flat);
        let mut output = Tensor::zeros([1, 1, 3, 3], DType::F32, Layout::Nchw).unwrap();
        let params = ConvParams::new(OpBase::new(Layout::Nchw)).with_pad(1, 1, 1, 1);
        conv2d_f32::<false>(&input, &mut output, &kernel, Some(&bias), &params).unwrap();
        assert_eq!(
            output.data_f32().unwrap(),
            &[13.0, 22.0, 17.0, 28.0, 46.0, 34.0, 25.0, 40.0, 29.0]
        );
    }

    #[test]
    fn test_layouts_agree() {
        // 2 input channels, 3 output channels, 3x3 kernel, stride 2, pad 1
        let ci = 2;
        let co = 3;
        let input_nchw: Vec<f32> = (0..ci * 5 * 5).map(|v| (v as f32 * 0.37).sin()).collect();
        let weight_oihw: Vec<f32> = (0..co * ci * 9).map(|v| (v as f32 * 0.11).cos()).collect();
        let (input_nhwc, _) =
            qnn_tensor::geometry::nchw_to_nhwc(&input_nchw, &[1, ci, 5, 5]).unwrap();
        let (weight_ohwi, _) =
            qnn_tensor::geometry::transpose(&weight_oihw, &[co, ci, 3, 3], &[0, 2, 3, 1]).unwrap();

        let first = ConvParams::new(OpBase::new(Layout::Nchw))
            .with_stride(2, 2)
            .with_pad(1, 1, 1, 1);
        let last = ConvParams::new(OpBase::new(Layout::Nhwc))
            .with_stride(2, 2)
            .with_pad(1, 1, 1, 1);

        let mut out_first = Tensor::zeros([1, co, 3, 3], DType::F32, Layout::Nchw).unwrap();
        conv2d_f32::<false>(
            &f32_tensor(input_nchw, &[1, ci, 5, 5], Layout::Nchw),
            &mut out_first,
            &f32_tensor(weight_oihw, &[co, ci, 3, 3], Layout::Nchw),
            None,
            &first,
        )
        .unwrap();

        let mut out_last = Tensor::zeros([1, 3, 3, co], DType::F32, Layout::Nhwc).unwrap();
        conv2d_f32::<false>(
            &f32_tensor(input_nhwc, &[1, 5, 5, ci], Layout::Nhwc),
            &mut out_last,
            &f32_tensor(weight_ohwi, &[co, 3, 3, ci], Layout::Nhwc),
            None,
            &last,
        )
        .unwrap();

        let (back, _) =
            qnn_tensor::geometry::nhwc_to_nchw(out_last.data_f32().unwrap(), &[1, 3, 3, co])
                .unwrap();
        for (a, b) in out_first.data_f32().unwrap().iter().zip(&back) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_depthwise_multiplier_channel_last() {
        // 2 channels, multiplier 2: outputs [c0*w0, c0*w1, c1*w2, c1*w3]
        let input = f32_tensor(vec![1.0, 10.0], &[1, 1, 1, 2], Layout::Nhwc);
        let kernel = f32_tensor(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 1, 4], Layout::Nhwc);
        let mut output = Tensor::zeros([1, 1, 1, 4], DType::F32, Layout::Nhwc).unwrap();
        let params = ConvParams::new(OpBase::new(Layout::Nhwc)).with_group(2);
        depthwise_conv2d_f32::<false>(&input, &mut output, &kernel, None, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[1.0, 2.0, 30.0, 40.0]);
    }

    #[test]
    fn test_grouped_channels_stay_in_group() {
        // 4 channels in 2 groups, 1x1 kernel of ones: each output sums its
        // own group's inputs
        let input = f32_tensor(vec![1.0, 2.0, 10.0, 20.0], &[1, 4, 1, 1], Layout::Nchw);
        let kernel = f32_tensor(vec![1.0; 4], &[2, 2, 1, 1], Layout::Nchw);
        let mut output = Tensor::zeros([1, 2, 1, 1], DType::F32, Layout::Nchw).unwrap();
        let params = ConvParams::new(OpBase::new(Layout::Nchw)).with_group(2);
        group_conv2d_f32::<false>(&input, &mut output, &kernel, None, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[3.0, 30.0]);
    }

    #[test]
    fn test_dilation() {
        // 1x5 input, 1x2 kernel dilated by 2 reads x[i] and x[i + 2]
        let input = f32_tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0], &[1, 1, 1, 5], Layout::Nchw);
        let kernel = f32_tensor(vec![1.0, 1.0], &[1, 1, 1, 2], Layout::Nchw);
        let mut output = Tensor::zeros([1, 1, 1, 3], DType::F32, Layout::Nchw).unwrap();
        let params = ConvParams::new(OpBase::new(Layout::Nchw)).with_dilation(1, 2);
        conv2d_f32::<false>(&input, &mut output, &kernel, None, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_fused_relu() {
        let input = f32_tensor(vec![1.0, -2.0], &[1, 1, 1, 2], Layout::Nchw);
        let kernel = f32_tensor(vec![1.0], &[1, 1, 1, 1], Layout::Nchw);
        let mut output = Tensor::zeros([1, 1, 1, 2], DType::F32, Layout::Nchw).unwrap();
        let params = ConvParams::new(OpBase::new(Layout::Nchw));
        conv2d_f32::<true>(&input, &mut output, &kernel, None, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_quant_matches_float_within_one_step() {
        let in_q = QuantParams::from_scale(0.05, 128);
        let w_q = QuantParams::from_scale(0.02, 0);
        let out_q = QuantParams::from_scale(0.25, 128);
        let xs: Vec<f32> = (0..16).map(|v| (v as f32 * 0.7).sin() * 3.0).collect();
        let ws: Vec<f32> = (0..9).map(|v| (v as f32 * 1.3).cos()).collect();

        let input = Tensor::quantized_from_f32(&xs, [1, 1, 4, 4], Layout::Nchw, DType::U8, in_q).unwrap();
        let kernel = Tensor::quantized_from_f32(&ws, [1, 1, 3, 3], Layout::Nchw, DType::I8, w_q).unwrap();
        let bias = Tensor::from_f32(vec![0.5], [1], Layout::Flat).unwrap();
        let mut q_out = Tensor::zeros([1, 1, 2, 2], DType::U8, Layout::Nchw).unwrap().with_quant(out_q);
        let params = ConvParams::new(OpBase::new(Layout::Nchw));
        conv2d_quant::<u8, false>(&input, &mut q_out, &kernel, Some(&bias), &params).unwrap();

        // float reference on the dequantized operands
        let fx = Tensor::from_f32(input.to_f32_vec().unwrap(), [1, 1, 4, 4], Layout::Nchw).unwrap();
        let fw = Tensor::from_f32(kernel.to_f32_vec().unwrap(), [1, 1, 3, 3], Layout::Nchw).unwrap();
        let mut f_out = Tensor::zeros([1, 1, 2, 2], DType::F32, Layout::Nchw).unwrap();
        conv2d_f32::<false>(&fx, &mut f_out, &fw, Some(&bias), &params).unwrap();

        for (q, f) in q_out.to_f32_vec().unwrap().iter().zip(f_out.data_f32().unwrap()) {
            assert!((q - f).abs() <= 0.125 + 1e-3, "{} vs {}", q, f);
        }
    }

    #[test]
    fn test_quant_relu_clamps_at_zero_point() {
        let q = QuantParams::from_scale(1.0, 5);
        let input = Tensor::from_i8(vec![2, 8], [1, 1, 1, 2], Layout::Nchw, q).unwrap();
        let kernel = Tensor::from_i8(vec![6], [1, 1, 1, 1], Layout::Nchw, q).unwrap();
        let mut output = Tensor::zeros([1, 1, 1, 2], DType::I8, Layout::Nchw).unwrap().with_quant(q);
        let params = ConvParams::new(OpBase::new(Layout::Nchw));
        conv2d_quant::<i8, true>(&input, &mut output, &kernel, None, &params).unwrap();
        // -3 * 1 -> clamped to 0 (code 5); 3 * 1 -> code 8
        assert_eq!(output.data_i8().unwrap(), &[5, 8]);
    }

    #[test]
    fn test_channel_mismatch_is_invalid() {
        let input = Tensor::zeros([1, 3, 2, 2], DType::F32, Layout::Nchw).unwrap();
        let kernel = Tensor::zeros([1, 2, 1, 1], DType::F32, Layout::Nchw).unwrap();
        let mut output = Tensor::zeros([1, 1, 2, 2], DType::F32, Layout::Nchw).unwrap();
        let params = ConvParams::new(OpBase::new(Layout::Nchw));
        let err = conv2d_f32::<false>(&input, &mut output, &kernel, None, &params).unwrap_err();
        assert_eq!(err.status(), crate::error::Status::InvalidArgument);
    }

    #[test]
    fn test_conv3d_ncdhw() {
        // 2x2x2 ones kernel over a 2x2x2 volume of ones, stride 1, no pad
        let input = Tensor::from_f32(vec![1.0; 8], [1, 1, 2, 2, 2], Layout::Ncdhw).unwrap();
        let kernel = Tensor::from_f32(vec![1.0; 8], [1, 1, 2, 2, 2], Layout::Ncdhw).unwrap();
        let mut output = Tensor::zeros([1, 1, 1, 1, 1], DType::F32, Layout::Ncdhw).unwrap();
        let params = Conv3dParams::new(OpBase::new(Layout::Ncdhw));
        conv3d_f32(&input, &mut output, &kernel, None, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[8.0]);

        // same-padded: each corner sees all 8 inputs
        let mut output = Tensor::zeros([1, 1, 2, 2, 2], DType::F32, Layout::Ncdhw).unwrap();
        let params = Conv3dParams::new(OpBase::new(Layout::Ncdhw)).with_pad((1, 0), (1, 0), (1, 0));
        conv3d_f32(&input, &mut output, &kernel, None, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[1.0, 2.0, 2.0, 4.0, 2.0, 4.0, 4.0, 8.0]);
    }
}
