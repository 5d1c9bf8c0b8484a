//! Segment sum over the leading axis.

use qnn_tensor::Tensor;

use crate::error::{OpError, Result};
use crate::ops::segment::SegmentParams;
use crate::reference::wrapper::{f32_like, store, to_f32_tensor};
use crate::registry::OpKind;

/// Validated segment ids as output row indices.
fn segment_rows(data: &Tensor, segment_ids: &Tensor, params: &SegmentParams) -> Result<Vec<usize>> {
    let op = OpKind::SegmentSum;
    let rows = data.dims().first().copied().unwrap_or(1);
    let ids = segment_ids.data_i32()?;
    if ids.len() != rows {
        return Err(OpError::invalid(
            op,
            format!("{} segment ids for {} rows", ids.len(), rows),
        ));
    }

    let mut out = Vec::with_capacity(rows);
    for (i, &id) in ids.iter().enumerate() {
        if id < 0 || id as usize >= params.num_segments {
            return Err(OpError::invalid(
                op,
                format!("segment id {} outside [0, {})", id, params.num_segments),
            ));
        }
        if !params.unsorted && i > 0 && id < ids[i - 1] {
            return Err(OpError::invalid(
                op,
                format!("segment ids are not sorted at row {}", i),
            ));
        }
        out.push(id as usize);
    }
    Ok(out)
}

/// `output[s] = sum of data[i] over every i with segment_ids[i] == s`;
/// segments without members are zero.
pub fn segment_sum_f32(
    data: &Tensor,
    segment_ids: &Tensor,
    output: &mut Tensor,
    params: &SegmentParams,
) -> Result<()> {
    let rows = segment_rows(data, segment_ids, params)?;
    let inner = if rows.is_empty() {
        data.numel()
    } else {
        data.numel() / rows.len()
    };
    if output.numel() != params.num_segments * inner
        || output.dims().first().copied() != Some(params.num_segments)
    {
        return Err(OpError::invalid(
            OpKind::SegmentSum,
            format!(
                "output dims {:?} for {} segments of {} elements",
                output.dims(),
                params.num_segments,
                inner
            ),
        ));
    }

    let x = data.data_f32()?;
    let y = output.data_f32_mut()?;
    y.fill(0.0);
    for (i, &s) in rows.iter().enumerate() {
        let src = &x[i * inner..(i + 1) * inner];
        for (o, v) in y[s * inner..(s + 1) * inner].iter_mut().zip(src) {
            *o += v;
        }
    }
    Ok(())
}

/// Segment sum on the real values of a quantized tensor.
pub fn segment_sum_via_f32(
    data: &Tensor,
    segment_ids: &Tensor,
    output: &mut Tensor,
    params: &SegmentParams,
) -> Result<()> {
    let x = to_f32_tensor(data)?;
    let mut y = f32_like(output)?;
    segment_sum_f32(&x, segment_ids, &mut y, params)?;
    store(output, &y)
}
