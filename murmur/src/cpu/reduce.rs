//! CPU map-reduce over the trailing axis
//!
//! Narrow inputs (f16, bf16) are widened to f32 per element and every kind
//! accumulates in f32, which bounds rounding drift over vocabulary-sized
//! axes. Output is always f32 with the trailing axis collapsed to 1.

use bytemuck::Pod;
use half::{bf16, f16};

use crate::cpu::accessor::RowGroups;
use crate::error::{Error, Result};
use crate::reduce::ReduceOp;
use crate::tensor::Tensor;

pub(crate) fn reduce_f32(input: &Tensor, op: ReduceOp) -> Result<Tensor> {
    reduce_rows::<f32>(input, op, |v| v)
}

pub(crate) fn reduce_f16(input: &Tensor, op: ReduceOp) -> Result<Tensor> {
    reduce_rows::<f16>(input, op, f16::to_f32)
}

pub(crate) fn reduce_bf16(input: &Tensor, op: ReduceOp) -> Result<Tensor> {
    reduce_rows::<bf16>(input, op, bf16::to_f32)
}

fn reduce_rows<T: Pod>(
    input: &Tensor,
    op: ReduceOp,
    widen: impl Fn(T) -> f32,
) -> Result<Tensor> {
    if input.rank() == 0 {
        return Err(Error::InvalidShape(
            "reduce requires a tensor of rank >= 1".to_string(),
        ));
    }
    let groups = RowGroups::<T>::new(input)?;
    let num_rows = groups.num_rows();
    let mut out = Vec::with_capacity(num_rows);

    for g in 0..num_rows {
        let row = groups.row(g);
        let value = match op {
            ReduceOp::Sum => {
                let mut acc = 0.0f32;
                for i in 0..row.len() {
                    acc += widen(row.get(i));
                }
                acc
            }
            ReduceOp::SumSquare => {
                let mut acc = 0.0f32;
                for i in 0..row.len() {
                    let v = widen(row.get(i));
                    acc += v * v;
                }
                acc
            }
            ReduceOp::SumExp => {
                let mut acc = 0.0f32;
                for i in 0..row.len() {
                    acc += widen(row.get(i)).exp();
                }
                acc
            }
            ReduceOp::Max => {
                // NaN elements are skipped; an all-NaN (or empty) row
                // reduces to NaN.
                let mut best = f32::NAN;
                for i in 0..row.len() {
                    let v = widen(row.get(i));
                    if v.is_nan() {
                        continue;
                    }
                    best = if best.is_nan() { v } else { best.max(v) };
                }
                best
            }
        };
        out.push(value);
    }

    let mut out_shape = input.shape().to_vec();
    *out_shape.last_mut().unwrap() = 1;
    Ok(Tensor::from_f32(&out_shape, &out))
}
