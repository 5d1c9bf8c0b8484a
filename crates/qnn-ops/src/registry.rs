//! Operator identities and the convolution grouping decision.

use std::fmt;

use qnn_tensor::Layout;

/// Identity of an operator, the first key of every kernel lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Conv2d,
    DepthwiseConv2d,
    GroupConv2d,
    Conv2dRelu,
    DepthwiseConv2dRelu,
    GroupConv2dRelu,
    Deconv2d,
    Conv3d,
    Deconv3d,
    MaxPool2d,
    AvgPool2d,
    GlobalMaxPool2d,
    GlobalAvgPool2d,
    MaxPool3d,
    AvgPool3d,
    Resize,
    Relu,
    Relu1,
    Relu6,
    ReluN,
    LeakyRelu,
    Elu,
    Negative,
    Floor,
    Abs,
    Add,
    Sub,
    Mul,
    Div,
    FloorDivide,
    Maximum,
    Minimum,
    Transpose,
    Flatten,
    Pad,
    Slice,
    Split,
    Im2col,
    SegmentSum,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Conv2d => "conv2d",
            OpKind::DepthwiseConv2d => "depthwise_conv2d",
            OpKind::GroupConv2d => "group_conv2d",
            OpKind::Conv2dRelu => "conv2d_relu",
            OpKind::DepthwiseConv2dRelu => "depthwise_conv2d_relu",
            OpKind::GroupConv2dRelu => "group_conv2d_relu",
            OpKind::Deconv2d => "deconv2d",
            OpKind::Conv3d => "conv3d",
            OpKind::Deconv3d => "deconv3d",
            OpKind::MaxPool2d => "maxpool2d",
            OpKind::AvgPool2d => "avgpool2d",
            OpKind::GlobalMaxPool2d => "global_maxpool2d",
            OpKind::GlobalAvgPool2d => "global_avgpool2d",
            OpKind::MaxPool3d => "maxpool3d",
            OpKind::AvgPool3d => "avgpool3d",
            OpKind::Resize => "resize",
            OpKind::Relu => "relu",
            OpKind::Relu1 => "relu1",
            OpKind::Relu6 => "relu6",
            OpKind::ReluN => "relun",
            OpKind::LeakyRelu => "leaky_relu",
            OpKind::Elu => "elu",
            OpKind::Negative => "negative",
            OpKind::Floor => "floor",
            OpKind::Abs => "abs",
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::FloorDivide => "floor_divide",
            OpKind::Maximum => "maximum",
            OpKind::Minimum => "minimum",
            OpKind::Transpose => "transpose",
            OpKind::Flatten => "flatten",
            OpKind::Pad => "pad",
            OpKind::Slice => "slice",
            OpKind::Split => "split",
            OpKind::Im2col => "im2col",
            OpKind::SegmentSum => "segment_sum",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a 2-D convolution's channels are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvKind {
    /// One group: every output channel sees every input channel.
    Plain,
    /// One input channel per group, each producing a channel multiplier's
    /// worth of outputs.
    Depthwise,
    /// Any other grouping.
    Grouped,
}

impl ConvKind {
    /// Operator identity for this grouping, optionally with a fused relu.
    pub fn op(&self, fused_relu: bool) -> OpKind {
        match (self, fused_relu) {
            (ConvKind::Plain, false) => OpKind::Conv2d,
            (ConvKind::Depthwise, false) => OpKind::DepthwiseConv2d,
            (ConvKind::Grouped, false) => OpKind::GroupConv2d,
            (ConvKind::Plain, true) => OpKind::Conv2dRelu,
            (ConvKind::Depthwise, true) => OpKind::DepthwiseConv2dRelu,
            (ConvKind::Grouped, true) => OpKind::GroupConv2dRelu,
        }
    }
}

/// Decide the grouping of a 2-D convolution from its group count and the
/// input and kernel dims.
///
/// Depthwise means `group` equals the input channel count and the kernel's
/// per-group input-channel axis is 1: kernel dim 1 (OIHW) under NCHW, kernel
/// dim 0 (the `1 x H x W x C*M` depthwise kernel) under NHWC. Returns `None`
/// for layouts other than NCHW and NHWC.
pub fn derive_conv_kind(
    layout: Layout,
    group: usize,
    input: &[usize],
    kernel: &[usize],
) -> Option<ConvKind> {
    let (channel_axis, unit_axis) = match layout {
        Layout::Nchw => (1, 1),
        Layout::Nhwc => (3, 0),
        _ => return None,
    };
    if group == 1 {
        return Some(ConvKind::Plain);
    }
    let channels = input.get(channel_axis).copied();
    let unit = kernel.get(unit_axis).copied();
    if channels == Some(group) && unit == Some(1) {
        Some(ConvKind::Depthwise)
    } else {
        Some(ConvKind::Grouped)
    }
}
