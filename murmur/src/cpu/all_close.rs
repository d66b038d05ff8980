//! Elementwise approximate-equality comparison
//!
//! Used by the test suites to assert that CPU and CUDA kernel ports agree
//! within tolerance.

use crate::cpu::accessor::RowGroups;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Whether every element of `a` is close to the corresponding element of
/// `b`: `|a - b| <= atol + rtol * |b|`, with both elements finite.
///
/// The tolerance term is evaluated against `b`, so the comparison is not
/// symmetric when `rtol > 0`. A single non-finite element anywhere makes
/// the result false; the scan still visits every element, so the function
/// is deterministic and total.
///
/// # Errors
/// Returns `ShapeMismatch` when the shapes differ (never `false`), and
/// `InvalidShape` for rank-0 tensors.
pub(crate) fn all_close_f32(a: &Tensor, b: &Tensor, rtol: f32, atol: f32) -> Result<bool> {
    a.check_shape_eq(b)?;
    if a.rank() == 0 {
        return Err(Error::InvalidShape(
            "all_close requires a tensor of rank >= 1".to_string(),
        ));
    }

    let va = RowGroups::<f32>::new(a)?;
    let vb = RowGroups::<f32>::new(b)?;

    let mut ok = true;
    for g in 0..va.num_rows() {
        let ra = va.row(g);
        let rb = vb.row(g);
        for i in 0..ra.len() {
            let x = ra.get(i);
            let y = rb.get(i);
            if !(x.is_finite() && y.is_finite()) {
                ok = false;
            }
            if (x - y).abs() > atol + rtol * y.abs() {
                ok = false;
            }
        }
    }
    Ok(ok)
}
