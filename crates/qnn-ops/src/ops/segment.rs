//! Segment reductions over the leading axis.

use qnn_tensor::Tensor;

use crate::backend::SegmentKernel;
use crate::error::Result;
use crate::params::{KernelSlot, OpBase};
use crate::registry::OpKind;

#[derive(Debug, Clone, Default)]
pub struct SegmentParams {
    pub base: OpBase,
    /// Number of output segments; the output's leading extent.
    pub num_segments: usize,
    /// Accept segment ids in any order. Sorted ids are required otherwise.
    pub unsorted: bool,
    slot: KernelSlot<SegmentKernel>,
}

impl SegmentParams {
    pub fn new(base: OpBase, num_segments: usize) -> Self {
        SegmentParams {
            base,
            num_segments,
            unsorted: false,
            slot: KernelSlot::empty(),
        }
    }

    pub fn with_unsorted(mut self, unsorted: bool) -> Self {
        self.unsorted = unsorted;
        self
    }
}

pub fn segment_sum_init(
    input: &Tensor,
    _segment_ids: &Tensor,
    _output: &Tensor,
    params: &mut SegmentParams,
) -> Result<()> {
    let op = OpKind::SegmentSum;
    let found = params.base.provider().segment(op, input.dtype());
    params.slot.bind(op, &params.base, input.dtype(), found)
}

/// `output[s] = sum of input[i] over every i with segment_ids[i] == s`.
pub fn segment_sum(
    input: &Tensor,
    segment_ids: &Tensor,
    output: &mut Tensor,
    params: &SegmentParams,
) -> Result<()> {
    let op = OpKind::SegmentSum;
    let f = params.slot.bound(op)?;
    params.base.trace_invoke(op, &[input, segment_ids], &[output]);
    f(input, segment_ids, output, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use qnn_tensor::{DType, Layout};

    #[test]
    fn test_segment_sum_rows() {
        let input = Tensor::from_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2], Layout::Flat).unwrap();
        let ids = Tensor::from_i32(vec![0, 0, 2], [3], Layout::Flat).unwrap();
        let mut output = Tensor::zeros([3, 2], DType::F32, Layout::Flat).unwrap();
        let mut params = SegmentParams::new(OpBase::new(Layout::Flat), 3);
        segment_sum_init(&input, &ids, &output, &mut params).unwrap();
        segment_sum(&input, &ids, &mut output, &params).unwrap();
        // segment 1 has no members
        assert_eq!(output.data_f32().unwrap(), &[4.0, 6.0, 0.0, 0.0, 5.0, 6.0]);
    }

    #[test]
    fn test_unsorted_ids_need_flag() {
        let input = Tensor::from_f32(vec![1.0, 2.0, 3.0], [3], Layout::Flat).unwrap();
        let ids = Tensor::from_i32(vec![1, 0, 1], [3], Layout::Flat).unwrap();
        let mut output = Tensor::zeros([2], DType::F32, Layout::Flat).unwrap();

        let mut params = SegmentParams::new(OpBase::new(Layout::Flat), 2);
        segment_sum_init(&input, &ids, &output, &mut params).unwrap();
        let err = segment_sum(&input, &ids, &mut output, &params).unwrap_err();
        assert_eq!(err.status(), Status::InvalidArgument);

        let mut params = SegmentParams::new(OpBase::new(Layout::Flat), 2).with_unsorted(true);
        segment_sum_init(&input, &ids, &output, &mut params).unwrap();
        segment_sum(&input, &ids, &mut output, &params).unwrap();
        assert_eq!(output.data_f32().unwrap(), &[2.0, 4.0]);
    }
}
