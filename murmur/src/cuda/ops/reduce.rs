//! Map-reduce over the trailing axis on CUDA
//!
//! The kernels are 3-D-specific: one block per (leading, middle) index
//! pair, a shared-memory tree reduction over the trailing axis inside the
//! block. [`reduce`] regroups contiguous tensors of other ranks into that
//! form; [`reduce3d`] is the strict entry point.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::missing_panics_doc
)]

use cudarc::driver::{LaunchAsync, LaunchConfig};

use crate::cuda::{CudaContext, CudaStorage};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::reduce::ReduceOp;
use crate::tensor::Tensor;

const PTX: &str = include_str!(concat!(env!("OUT_DIR"), "/kernels/reduce.ptx"));

const MODULE_NAME: &str = "reduce";

const KERNELS: &[&str] = &[
    "reduce_sum_f32",
    "reduce_sum_square_f32",
    "reduce_sum_exp_f32",
    "reduce_max_f32",
    "reduce_sum_f16f32",
    "reduce_sum_square_f16f32",
    "reduce_sum_exp_f16f32",
    "reduce_max_f16",
];

/// Map a (dtype, op) pair to its kernel name and output dtype.
fn kernel_for(dtype: DType, op: ReduceOp) -> Result<(&'static str, DType)> {
    match (dtype, op) {
        (DType::F32, ReduceOp::Sum) => Ok(("reduce_sum_f32", DType::F32)),
        (DType::F32, ReduceOp::SumSquare) => Ok(("reduce_sum_square_f32", DType::F32)),
        (DType::F32, ReduceOp::SumExp) => Ok(("reduce_sum_exp_f32", DType::F32)),
        (DType::F32, ReduceOp::Max) => Ok(("reduce_max_f32", DType::F32)),
        (DType::F16, ReduceOp::Sum) => Ok(("reduce_sum_f16f32", DType::F32)),
        (DType::F16, ReduceOp::SumSquare) => Ok(("reduce_sum_square_f16f32", DType::F32)),
        (DType::F16, ReduceOp::SumExp) => Ok(("reduce_sum_exp_f16f32", DType::F32)),
        (DType::F16, ReduceOp::Max) => Ok(("reduce_max_f16", DType::F16)),
        (dtype, op) => Err(Error::NotImplemented(format!(
            "cuda reduce[{op}] is not implemented for {dtype}"
        ))),
    }
}

/// Ensure the reduce PTX module is loaded on the device.
fn ensure_kernel_loaded(ctx: &CudaContext) -> Result<()> {
    let device = ctx.device();
    if !device.has_func(MODULE_NAME, KERNELS[0]) {
        device.load_ptx(cudarc::nvrtc::Ptx::from_src(PTX), MODULE_NAME, KERNELS)?;
    }
    Ok(())
}

/// Reduce the trailing axis of a CUDA tensor of any rank >= 1.
///
/// Rank-3 inputs go straight to the kernels (strided views included).
/// Other ranks are viewed as `(1, groups, axis)` first, which requires a
/// contiguous layout.
///
/// # Errors
/// `InvalidShape` for rank 0, empty tensors or non-contiguous non-3-D
/// views; `NotImplemented` for unsupported dtypes.
pub fn reduce(input: &Tensor, op: ReduceOp) -> Result<Tensor> {
    if input.rank() == 0 {
        return Err(Error::InvalidShape(
            "reduce requires a tensor of rank >= 1".to_string(),
        ));
    }
    if input.numel() == 0 {
        return Err(Error::InvalidShape(
            "cuda reduce requires a non-empty tensor".to_string(),
        ));
    }
    if input.rank() == 3 {
        return reduce3d(input, op);
    }
    let grouped = input.reshape(&[1, input.numel() / input.axis_len(), input.axis_len()])?;
    let reduced = reduce3d(&grouped, op)?;
    let mut out_shape = input.shape().to_vec();
    *out_shape.last_mut().unwrap() = 1;
    reduced.reshape(&out_shape)
}

/// Reduce the trailing axis of a 3-D CUDA tensor.
///
/// Strides are passed to the kernel, so strided views reduce correctly.
///
/// # Errors
/// `InvalidShape` for any rank other than 3; `NotImplemented` for
/// unsupported dtypes.
pub fn reduce3d(input: &Tensor, op: ReduceOp) -> Result<Tensor> {
    if input.rank() != 3 {
        return Err(Error::InvalidShape(format!(
            "cuda reduce3d expects a 3-D tensor, got shape {:?}",
            input.shape()
        )));
    }

    let (kernel, out_dtype) = kernel_for(input.dtype(), op)?;

    let storage = input.cuda_storage()?;
    let ctx = storage.context().clone();
    ensure_kernel_loaded(&ctx)?;
    let func = ctx.device().get_func(MODULE_NAME, kernel).unwrap();

    let d0 = input.shape()[0];
    let d1 = input.shape()[1];
    let axis_len = input.shape()[2];
    let strides = input.strides();

    // The in-block tree reduction needs a power-of-two block.
    let block_size = 1024.min(axis_len.next_power_of_two().max(32));
    let shared_mem = block_size * std::mem::size_of::<f32>();

    let mut out = ctx
        .device()
        .alloc_zeros::<u8>(d0 * d1 * out_dtype.size_in_bytes())?;

    let in_view = storage.byte_view(input.offset() * input.dtype().size_in_bytes());

    let cfg = LaunchConfig {
        grid_dim: (d1 as u32, d0 as u32, 1),
        block_dim: (block_size as u32, 1, 1),
        shared_mem_bytes: shared_mem as u32,
    };

    unsafe {
        func.launch(
            cfg,
            (
                &mut out,
                &in_view,
                axis_len as i32,
                strides[0] as i64,
                strides[1] as i64,
                strides[2] as i64,
            ),
        )?;
    }

    Ok(Tensor::from_cuda(
        CudaStorage::wrap(&ctx, out),
        &[d0, d1, 1],
        out_dtype,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use half::f16;

    fn ctx() -> CudaContext {
        CudaContext::new(0).expect("Failed to create CUDA context")
    }

    fn parity_check(host: &Tensor, op: ReduceOp) {
        let cpu = dispatch::reduce(host, op).unwrap();
        let gpu = reduce(&host.to_device(&ctx()).unwrap(), op)
            .unwrap()
            .to_host()
            .unwrap();
        assert_eq!(cpu.shape(), gpu.shape());
        assert!(
            dispatch::all_close(&cpu, &gpu, 1e-3, 1e-5).unwrap(),
            "cpu/cuda mismatch for {op}: {:?} vs {:?}",
            cpu.to_f32_vec().unwrap(),
            gpu.to_f32_vec().unwrap()
        );
    }

    #[test]
    fn test_sum_constant_matches_n_times_c() {
        let n = 4096;
        let t = Tensor::from_f32(&[1, 1, n], &vec![0.5f32; n]);
        let r = reduce(&t.to_device(&ctx()).unwrap(), ReduceOp::Sum)
            .unwrap()
            .to_host()
            .unwrap();
        assert!((r.to_f32_vec().unwrap()[0] - 2048.0).abs() < 1e-2);
    }

    #[test]
    fn test_all_kinds_match_cpu_f32() {
        let data: Vec<f32> = (0..2 * 3 * 500)
            .map(|i| ((i * 37 % 101) as f32 - 50.0) * 0.05)
            .collect();
        let t = Tensor::from_f32(&[2, 3, 500], &data);
        for op in [
            ReduceOp::Sum,
            ReduceOp::SumSquare,
            ReduceOp::SumExp,
            ReduceOp::Max,
        ] {
            parity_check(&t, op);
        }
    }

    #[test]
    fn test_f16_input_reduces_to_f32() {
        let data: Vec<f16> = (0..256).map(|i| f16::from_f32((i % 17) as f32 * 0.1)).collect();
        let t = Tensor::from_f16(&[1, 2, 128], &data);
        let gpu = reduce(&t.to_device(&ctx()).unwrap(), ReduceOp::Sum).unwrap();
        assert_eq!(gpu.dtype(), DType::F32);
        let cpu = dispatch::reduce(&t, ReduceOp::Sum).unwrap();
        let gpu_host = gpu.to_host().unwrap();
        assert!(dispatch::all_close(&cpu, &gpu_host, 1e-3, 1e-5).unwrap());
    }

    #[test]
    fn test_f16_max_keeps_f16() {
        let data: Vec<f16> = (0..64).map(|i| f16::from_f32(-(i as f32))).collect();
        let t = Tensor::from_f16(&[1, 1, 64], &data);
        let gpu = reduce(&t.to_device(&ctx()).unwrap(), ReduceOp::Max).unwrap();
        assert_eq!(gpu.dtype(), DType::F16);
        assert_eq!(gpu.to_host().unwrap().to_f32_vec().unwrap()[0], 0.0);
    }

    #[test]
    fn test_max_boundary_positions() {
        let n = 1000;
        for pos in [0, n / 2, n - 1] {
            let mut data = vec![-1.0f32; n];
            data[pos] = 7.0;
            let t = Tensor::from_f32(&[1, 1, n], &data).to_device(&ctx()).unwrap();
            let r = reduce(&t, ReduceOp::Max).unwrap().to_host().unwrap();
            assert_eq!(r.to_f32_vec().unwrap()[0], 7.0, "position {pos}");
        }
    }

    #[test]
    fn test_2d_input_is_regrouped() {
        let data: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let t = Tensor::from_f32(&[4, 3], &data).to_device(&ctx()).unwrap();
        let r = reduce(&t, ReduceOp::Sum).unwrap();
        assert_eq!(r.shape(), &[4, 1]);
        assert_eq!(
            r.to_host().unwrap().to_f32_vec().unwrap(),
            vec![3.0, 12.0, 21.0, 30.0]
        );
    }

    #[test]
    fn test_reduce3d_rejects_2d() {
        let t = Tensor::from_f32(&[2, 3], &[0.0; 6]).to_device(&ctx()).unwrap();
        assert!(matches!(
            reduce3d(&t, ReduceOp::Sum),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn test_strided_3d_view() {
        let data: Vec<f32> = (0..2 * 2 * 8).map(|i| i as f32).collect();
        let full = Tensor::from_f32(&[2, 2, 8], &data).to_device(&ctx()).unwrap();
        let narrowed = full.narrow(2, 2, 4).unwrap();
        let gpu = reduce3d(&narrowed, ReduceOp::Sum).unwrap().to_host().unwrap();

        let host_narrowed = Tensor::from_f32(&[2, 2, 8], &data).narrow(2, 2, 4).unwrap();
        let cpu = dispatch::reduce(&host_narrowed, ReduceOp::Sum).unwrap();
        assert!(dispatch::all_close(&cpu, &gpu, 1e-3, 1e-5).unwrap());
    }
}
