//! Kernel dispatch by (operation, device, dtype)
//!
//! A single logical operation has independent per-device, per-dtype
//! implementations; the entry points here resolve the concrete kernel with
//! a `match` at every call. Resolution is never cached across calls, since
//! consecutive tensors may live on different devices. Unknown combinations
//! fail with a descriptive `NotImplemented` instead of silently falling
//! back to a default device, which would mask both performance regressions
//! and correctness gaps between backends.

use crate::cpu;
use crate::device::Device;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::reduce::ReduceOp;
use crate::tensor::Tensor;

/// Reduce the trailing axis of `input` to length 1 per leading-index group.
///
/// CPU accepts any rank >= 1 and any float dtype. CUDA (with the `cuda`
/// feature) accepts f32 and f16; other-rank inputs are regrouped to the 3-D
/// form its kernels expect.
///
/// # Errors
/// `NotImplemented` for unsupported (device, dtype) pairs, including every
/// CUDA pair in a binary built without the `cuda` feature, and
/// `InvalidShape` for rank-0 input.
pub fn reduce(input: &Tensor, op: ReduceOp) -> Result<Tensor> {
    match (input.device(), input.dtype()) {
        (Device::Cpu, DType::F32) => cpu::reduce::reduce_f32(input, op),
        (Device::Cpu, DType::F16) => cpu::reduce::reduce_f16(input, op),
        (Device::Cpu, DType::BF16) => cpu::reduce::reduce_bf16(input, op),
        #[cfg(feature = "cuda")]
        (Device::Cuda, DType::F32 | DType::F16) => crate::cuda::ops::reduce(input, op),
        (device, dtype) => Err(Error::NotImplemented(format!(
            "reduce[{op}] is not implemented for {device}/{dtype}"
        ))),
    }
}

/// Elementwise approximate equality: `|a - b| <= atol + rtol * |b|` with
/// both elements finite. See the notes on asymmetry and NaN handling in
/// the kernel documentation.
///
/// Only the widest supported float dtype (f32) on CPU has a kernel; every
/// other combination is `NotImplemented`, never an approximation. Compare
/// CUDA results by copying them to the host first.
///
/// # Errors
/// `ShapeMismatch` when shapes differ, `NotImplemented` for any pair that
/// is not (cpu/f32, cpu/f32).
pub fn all_close(a: &Tensor, b: &Tensor, rtol: f32, atol: f32) -> Result<bool> {
    match (a.device(), b.device(), a.dtype(), b.dtype()) {
        (Device::Cpu, Device::Cpu, DType::F32, DType::F32) => {
            cpu::all_close::all_close_f32(a, b, rtol, atol)
        }
        (da, db, ta, tb) => Err(Error::NotImplemented(format!(
            "all_close is not implemented for {da}/{ta} vs {db}/{tb}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_reduce_dispatches_cpu_dtypes() {
        let f = Tensor::from_f32(&[3], &[1.0, 2.0, 3.0]);
        assert_eq!(
            reduce(&f, ReduceOp::Sum).unwrap().to_f32_vec().unwrap(),
            vec![6.0]
        );

        let h: Vec<f16> = [1.0f32, 2.0, 3.0].iter().map(|&v| f16::from_f32(v)).collect();
        let t = Tensor::from_f16(&[3], &h);
        assert_eq!(
            reduce(&t, ReduceOp::Sum).unwrap().to_f32_vec().unwrap(),
            vec![6.0]
        );
    }

    #[test]
    fn test_reduce_u32_not_implemented() {
        let t = Tensor::from_u32(&[3], &[1, 2, 3]);
        let err = reduce(&t, ReduceOp::Sum).unwrap_err();
        match err {
            Error::NotImplemented(msg) => {
                assert!(msg.contains("cpu/u32"), "message was: {msg}");
                assert!(msg.contains("sum"), "message was: {msg}");
            }
            other => panic!("expected NotImplemented, got {other:?}"),
        }
    }

    #[test]
    fn test_all_close_f16_not_implemented() {
        let h: Vec<f16> = vec![f16::from_f32(1.0); 2];
        let a = Tensor::from_f16(&[2], &h);
        let b = Tensor::from_f16(&[2], &h);
        assert!(matches!(
            all_close(&a, &b, 1e-3, 1e-5),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_all_close_mixed_dtype_not_implemented() {
        let a = Tensor::from_f32(&[2], &[1.0, 2.0]);
        let h: Vec<f16> = vec![f16::from_f32(1.0); 2];
        let b = Tensor::from_f16(&[2], &h);
        assert!(matches!(
            all_close(&a, &b, 1e-3, 1e-5),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_all_close_f32_dispatches() {
        let a = Tensor::from_f32(&[2], &[1.0, 2.0]);
        let b = Tensor::from_f32(&[2], &[1.0, 2.0]);
        assert!(all_close(&a, &b, 0.0, 0.0).unwrap());
    }
}
