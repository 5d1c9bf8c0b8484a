//! The relu family, leaky relu and elu.

use qnn_tensor::Tensor;

use crate::backend::ReluKernel;
use crate::error::Result;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

#[derive(Debug, Clone)]
pub struct ReluParams {
    pub base: OpBase,
    /// Upper bound of `relun`.
    pub n: f32,
    /// Negative slope of leaky relu; scale of elu's negative branch.
    pub alpha: f32,
    slot: KernelSlot<ReluKernel>,
}

impl ReluParams {
    /// `n = 6`, `alpha = 1`.
    pub fn new(base: OpBase) -> Self {
        ReluParams {
            base,
            n: 6.0,
            alpha: 1.0,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_n(mut self, n: f32) -> Self {
        self.n = n;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn kernel(&self) -> Option<ReluKernel> {
        self.slot.get()
    }
}

impl Default for ReluParams {
    fn default() -> Self {
        Self::new(OpBase::default())
    }
}

// Elementwise: any layout is accepted.
fn init(op: OpKind, input: &Tensor, params: &mut ReluParams) -> Result<()> {
    let found = params.base.provider().relu(op, input.dtype());
    params.slot.bind(op, &params.base, input.dtype(), found)
}

fn invoke(op: OpKind, input: &Tensor, output: &mut Tensor, params: &ReluParams) -> Result<()> {
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input], &[output]);
    f(input, output, params)
}

macro_rules! relu_op {
    ($init:ident, $invoke:ident, $op:expr) => {
        pub fn $init(input: &Tensor, _output: &Tensor, params: &mut ReluParams) -> Result<()> {
            init($op, input, params)
        }

        pub fn $invoke(input: &Tensor, output: &mut Tensor, params: &ReluParams) -> Result<()> {
            invoke($op, input, output, params)
        }
    };
}

relu_op!(relu_init, relu, OpKind::Relu);
relu_op!(relu1_init, relu1, OpKind::Relu1);
relu_op!(relu6_init, relu6, OpKind::Relu6);
relu_op!(relun_init, relun, OpKind::ReluN);
relu_op!(leaky_relu_init, leaky_relu, OpKind::LeakyRelu);
relu_op!(elu_init, elu, OpKind::Elu);
