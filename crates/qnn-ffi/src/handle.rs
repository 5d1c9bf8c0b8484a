//! Opaque objects behind the C handles.

use qnn_ops::ops::{activation, conv, elementwise, pool, resize};
use qnn_ops::{
    ConvParams, DisoParams, OpBase, OpError, OpKind, PoolParams, ReluParams, ResizeParams, Result,
};
use qnn_tensor::Tensor;

use crate::types::{
    QnnBinaryKind, QnnConv2dDesc, QnnConvVariant, QnnPool2dDesc, QnnPoolKind, QnnReluKind,
};

/// A tensor owned by the library on behalf of a C caller.
#[derive(Debug)]
pub struct QnnTensor {
    pub(crate) tensor: Tensor,
}

/// An operator parameter record with its bound kernel.
#[derive(Debug)]
pub enum QnnOp {
    Conv2d {
        variant: QnnConvVariant,
        params: ConvParams,
    },
    Pool2d {
        kind: QnnPoolKind,
        params: PoolParams,
    },
    Resize(ResizeParams),
    Relu {
        kind: QnnReluKind,
        params: ReluParams,
    },
    Binary {
        kind: QnnBinaryKind,
        params: DisoParams,
    },
}

impl QnnOp {
    pub(crate) fn conv2d(desc: &QnnConv2dDesc) -> Self {
        let params = ConvParams::new(OpBase::new(desc.layout.into()).with_name("ffi"))
            .with_stride(desc.stride_h, desc.stride_w)
            .with_pad(desc.pad_top, desc.pad_left, desc.pad_down, desc.pad_right)
            .with_dilation(desc.dilation_h, desc.dilation_w)
            .with_group(desc.group);
        QnnOp::Conv2d {
            variant: desc.variant,
            params,
        }
    }

    pub(crate) fn pool2d(desc: &QnnPool2dDesc) -> Self {
        let params = PoolParams::new(OpBase::new(desc.layout.into()).with_name("ffi"))
            .with_filter(desc.filter_h, desc.filter_w)
            .with_stride(desc.stride_h, desc.stride_w)
            .with_pad(desc.pad_top, desc.pad_left, desc.pad_down, desc.pad_right)
            .with_count_include_pad(desc.count_include_pad);
        QnnOp::Pool2d {
            kind: desc.kind,
            params,
        }
    }

    /// The operator a failed operand check is reported against.
    fn kind(&self) -> OpKind {
        match self {
            QnnOp::Conv2d { variant, .. } => match variant {
                QnnConvVariant::Conv => OpKind::Conv2d,
                QnnConvVariant::ConvRelu => OpKind::Conv2dRelu,
                QnnConvVariant::Deconv => OpKind::Deconv2d,
            },
            QnnOp::Pool2d { kind, .. } => match kind {
                QnnPoolKind::Max => OpKind::MaxPool2d,
                QnnPoolKind::Avg => OpKind::AvgPool2d,
                QnnPoolKind::GlobalMax => OpKind::GlobalMaxPool2d,
                QnnPoolKind::GlobalAvg => OpKind::GlobalAvgPool2d,
            },
            QnnOp::Resize(_) => OpKind::Resize,
            QnnOp::Relu { kind, .. } => match kind {
                QnnReluKind::Relu => OpKind::Relu,
                QnnReluKind::Relu1 => OpKind::Relu1,
                QnnReluKind::Relu6 => OpKind::Relu6,
                QnnReluKind::ReluN => OpKind::ReluN,
                QnnReluKind::LeakyRelu => OpKind::LeakyRelu,
                QnnReluKind::Elu => OpKind::Elu,
            },
            QnnOp::Binary { kind, .. } => match kind {
                QnnBinaryKind::Add => OpKind::Add,
                QnnBinaryKind::Sub => OpKind::Sub,
                QnnBinaryKind::Mul => OpKind::Mul,
                QnnBinaryKind::Div => OpKind::Div,
                QnnBinaryKind::FloorDivide => OpKind::FloorDivide,
                QnnBinaryKind::Maximum => OpKind::Maximum,
                QnnBinaryKind::Minimum => OpKind::Minimum,
            },
        }
    }

    /// Check the input count: conv takes `[input, kernel]` or
    /// `[input, kernel, bias]`, binary ops two operands, the rest one.
    fn expect_inputs(&self, inputs: &[&Tensor]) -> Result<()> {
        let ok = match self {
            QnnOp::Conv2d { .. } => matches!(inputs.len(), 2 | 3),
            QnnOp::Binary { .. } => inputs.len() == 2,
            _ => inputs.len() == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(OpError::InvalidParams {
                op: self.kind(),
                reason: format!("{} inputs", inputs.len()),
            })
        }
    }

    pub(crate) fn init(&mut self, inputs: &[&Tensor], output: &Tensor) -> Result<()> {
        self.expect_inputs(inputs)?;
        let input = inputs[0];
        match self {
            QnnOp::Conv2d { variant, params } => {
                let kernel = inputs[1];
                let bias = inputs.get(2).copied();
                match variant {
                    QnnConvVariant::Conv => conv::conv2d_init(input, output, kernel, bias, params),
                    QnnConvVariant::ConvRelu => {
                        conv::conv2d_relu_init(input, output, kernel, bias, params)
                    }
                    QnnConvVariant::Deconv => {
                        conv::deconv2d_init(input, output, kernel, bias, params)
                    }
                }
            }
            QnnOp::Pool2d { kind, params } => match kind {
                QnnPoolKind::Max => pool::maxpool2d_init(input, output, params),
                QnnPoolKind::Avg => pool::avgpool2d_init(input, output, params),
                QnnPoolKind::GlobalMax => pool::global_maxpool2d_init(input, output, params),
                QnnPoolKind::GlobalAvg => pool::global_avgpool2d_init(input, output, params),
            },
            QnnOp::Resize(params) => resize::resize_init(input, output, params),
            QnnOp::Relu { kind, params } => match kind {
                QnnReluKind::Relu => activation::relu_init(input, output, params),
                QnnReluKind::Relu1 => activation::relu1_init(input, output, params),
                QnnReluKind::Relu6 => activation::relu6_init(input, output, params),
                QnnReluKind::ReluN => activation::relun_init(input, output, params),
                QnnReluKind::LeakyRelu => activation::leaky_relu_init(input, output, params),
                QnnReluKind::Elu => activation::elu_init(input, output, params),
            },
            QnnOp::Binary { kind, params } => {
                let rhs = inputs[1];
                match kind {
                    QnnBinaryKind::Add => elementwise::add_init(input, rhs, output, params),
                    QnnBinaryKind::Sub => elementwise::sub_init(input, rhs, output, params),
                    QnnBinaryKind::Mul => elementwise::mul_init(input, rhs, output, params),
                    QnnBinaryKind::Div => elementwise::div_init(input, rhs, output, params),
                    QnnBinaryKind::FloorDivide => {
                        elementwise::floor_divide_init(input, rhs, output, params)
                    }
                    QnnBinaryKind::Maximum => elementwise::maximum_init(input, rhs, output, params),
                    QnnBinaryKind::Minimum => elementwise::minimum_init(input, rhs, output, params),
                }
            }
        }
    }

    pub(crate) fn invoke(&self, inputs: &[&Tensor], output: &mut Tensor) -> Result<()> {
        self.expect_inputs(inputs)?;
        let input = inputs[0];
        match self {
            QnnOp::Conv2d { variant, params } => {
                let kernel = inputs[1];
                let bias = inputs.get(2).copied();
                match variant {
                    QnnConvVariant::Conv => conv::conv2d(input, output, kernel, bias, params),
                    QnnConvVariant::ConvRelu => {
                        conv::conv2d_relu(input, output, kernel, bias, params)
                    }
                    QnnConvVariant::Deconv => conv::deconv2d(input, output, kernel, bias, params),
                }
            }
            QnnOp::Pool2d { kind, params } => match kind {
                QnnPoolKind::Max => pool::maxpool2d(input, output, params),
                QnnPoolKind::Avg => pool::avgpool2d(input, output, params),
                QnnPoolKind::GlobalMax => pool::global_maxpool2d(input, output, params),
                QnnPoolKind::GlobalAvg => pool::global_avgpool2d(input, output, params),
            },
            QnnOp::Resize(params) => resize::resize(input, output, params),
            QnnOp::Relu { kind, params } => match kind {
                QnnReluKind::Relu => activation::relu(input, output, params),
                QnnReluKind::Relu1 => activation::relu1(input, output, params),
                QnnReluKind::Relu6 => activation::relu6(input, output, params),
                QnnReluKind::ReluN => activation::relun(input, output, params),
                QnnReluKind::LeakyRelu => activation::leaky_relu(input, output, params),
                QnnReluKind::Elu => activation::elu(input, output, params),
            },
            QnnOp::Binary { kind, params } => {
                let rhs = inputs[1];
                match kind {
                    QnnBinaryKind::Add => elementwise::add(input, rhs, output, params),
                    QnnBinaryKind::Sub => elementwise::sub(input, rhs, output, params),
                    QnnBinaryKind::Mul => elementwise::mul(input, rhs, output, params),
                    QnnBinaryKind::Div => elementwise::div(input, rhs, output, params),
                    QnnBinaryKind::FloorDivide => {
                        elementwise::floor_divide(input, rhs, output, params)
                    }
                    QnnBinaryKind::Maximum => elementwise::maximum(input, rhs, output, params),
                    QnnBinaryKind::Minimum => elementwise::minimum(input, rhs, output, params),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnn_tensor::{DType, Layout};

    #[test]
    fn test_operand_count_checked_before_dispatch() {
        let mut op = QnnOp::Binary {
            kind: QnnBinaryKind::Mul,
            params: DisoParams::default(),
        };
        let a = Tensor::from_f32(vec![1.0], [1], Layout::Flat).unwrap();
        let out = Tensor::zeros([1], DType::F32, Layout::Flat).unwrap();
        let err = op.init(&[&a], &out).unwrap_err();
        assert!(matches!(err, OpError::InvalidParams { op: OpKind::Mul, .. }));
        op.init(&[&a, &a], &out).unwrap();
    }

    #[test]
    fn test_conv_desc_carries_geometry() {
        let desc = QnnConv2dDesc {
            layout: crate::types::QnnLayout::Nhwc,
            stride_h: 2,
            group: 4,
            ..QnnConv2dDesc::default()
        };
        let QnnOp::Conv2d { params, .. } = QnnOp::conv2d(&desc) else {
            panic!("expected a conv handle");
        };
        assert_eq!(params.base.layout, Layout::Nhwc);
        assert_eq!(params.stride_h, 2);
        assert_eq!(params.stride_w, 1);
        assert_eq!(params.group, 4);
    }
}
