//! Unary and broadcasting binary elementwise operators.

use qnn_tensor::Tensor;

use crate::backend::{DisoKernel, SisoKernel};
use crate::error::Result;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

/// Parameters of a single-input, single-output operator.
#[derive(Debug, Clone, Default)]
pub struct SisoParams {
    pub base: OpBase,
    slot: KernelSlot<SisoKernel>,
}

impl SisoParams {
    pub fn new(base: OpBase) -> Self {
        SisoParams {
            base,
            slot: KernelSlot::empty(),
        }
    }

    pub fn kernel(&self) -> Option<SisoKernel> {
        self.slot.get()
    }

    pub(crate) fn init(&mut self, op: OpKind, input: &Tensor) -> Result<()> {
        let found = self.base.provider().siso(op, input.dtype(), self.base.layout);
        self.slot.bind(op, &self.base, input.dtype(), found)
    }

    pub(crate) fn invoke(&self, op: OpKind, input: &Tensor, output: &mut Tensor) -> Result<()> {
        let f = self.slot.bound(op)?;
        self.base.trace_invoke(op, &[input], &[output]);
        f(input, output, self)
    }
}

/// Parameters of a two-input, single-output operator.
#[derive(Debug, Clone, Default)]
pub struct DisoParams {
    pub base: OpBase,
    slot: KernelSlot<DisoKernel>,
}

impl DisoParams {
    pub fn new(base: OpBase) -> Self {
        DisoParams {
            base,
            slot: KernelSlot::empty(),
        }
    }

    pub fn kernel(&self) -> Option<DisoKernel> {
        self.slot.get()
    }
}

macro_rules! siso_op {
    ($init:ident, $invoke:ident, $op:expr) => {
        pub fn $init(input: &Tensor, _output: &Tensor, params: &mut SisoParams) -> Result<()> {
            params.init($op, input)
        }

        pub fn $invoke(input: &Tensor, output: &mut Tensor, params: &SisoParams) -> Result<()> {
            params.invoke($op, input, output)
        }
    };
}

siso_op!(negative_init, negative, OpKind::Negative);
siso_op!(floor_init, floor, OpKind::Floor);
siso_op!(abs_init, abs, OpKind::Abs);

macro_rules! diso_op {
    ($init:ident, $invoke:ident, $op:expr) => {
        pub fn $init(
            lhs: &Tensor,
            _rhs: &Tensor,
            _output: &Tensor,
            params: &mut DisoParams,
        ) -> Result<()> {
            let found = params.base.provider().diso($op, lhs.dtype());
            params.slot.bind($op, &params.base, lhs.dtype(), found)
        }

        pub fn $invoke(
            lhs: &Tensor,
            rhs: &Tensor,
            output: &mut Tensor,
            params: &DisoParams,
        ) -> Result<()> {
            let f = params.slot.bound($op)?;
            params.base.trace_invoke($op, &[lhs, rhs], &[output]);
            f(lhs, rhs, output, params)
        }
    };
}

diso_op!(add_init, add, OpKind::Add);
diso_op!(sub_init, sub, OpKind::Sub);
diso_op!(mul_init, mul, OpKind::Mul);
diso_op!(div_init, div, OpKind::Div);
diso_op!(floor_divide_init, floor_divide, OpKind::FloorDivide);
diso_op!(maximum_init, maximum, OpKind::Maximum);
diso_op!(minimum_init, minimum, OpKind::Minimum);
