//! Cross-module properties of the public kernel API.

use half::{bf16, f16};
use murmur::{all_close, reduce, DType, Error, ReduceOp, Tensor};

#[test]
fn test_all_close_is_reflexive_for_any_tolerance() {
    let a = Tensor::from_f32(&[3, 4], &(0..12).map(|i| i as f32 * 0.3 - 1.0).collect::<Vec<_>>());
    for (rtol, atol) in [(0.0, 0.0), (1e-5, 0.0), (0.0, 1e-5), (0.1, 0.1)] {
        assert!(all_close(&a, &a, rtol, atol).unwrap());
    }
}

#[test]
fn test_all_close_nan_anywhere_fails_for_any_tolerance() {
    let mut data = vec![1.0f32; 8];
    data[5] = f32::NAN;
    let a = Tensor::from_f32(&[8], &vec![1.0f32; 8]);
    let b = Tensor::from_f32(&[8], &data);
    assert!(!all_close(&a, &b, f32::MAX, f32::MAX).unwrap());
}

#[test]
fn test_sum_of_constant_is_n_times_c_for_every_cpu_dtype() {
    let n = 5000;
    let c = 0.125f32;

    let f = Tensor::from_f32(&[n], &vec![c; n]);
    let sum = reduce(&f, ReduceOp::Sum).unwrap().to_f32_vec().unwrap()[0];
    assert!((sum - c * n as f32).abs() < 1e-2);

    let h = Tensor::from_f16(&[n], &vec![f16::from_f32(c); n]);
    let sum = reduce(&h, ReduceOp::Sum).unwrap().to_f32_vec().unwrap()[0];
    assert!((sum - c * n as f32).abs() < 1e-2);

    let b = Tensor::from_bf16(&[n], &vec![bf16::from_f32(c); n]);
    let sum = reduce(&b, ReduceOp::Sum).unwrap().to_f32_vec().unwrap()[0];
    assert!((sum - c * n as f32).abs() < 1e-2);
}

#[test]
fn test_max_finds_distinguished_element_at_every_position() {
    let n = 257;
    for pos in [0, n / 2, n - 1] {
        let mut data = vec![0.0f32; n];
        data[pos] = 3.5;
        let t = Tensor::from_f32(&[n], &data);
        let max = reduce(&t, ReduceOp::Max).unwrap().to_f32_vec().unwrap()[0];
        assert_eq!(max, 3.5, "failed for position {pos}");
    }
}

#[test]
fn test_softmax_from_reductions_sums_to_one() {
    // The session's normalization recipe: max for stability, then a plain
    // exponential sum over the shifted values.
    let logits = Tensor::from_f32(&[6], &[1.0, -2.0, 0.5, 3.0, 3.0, -0.5]);
    let max = reduce(&logits, ReduceOp::Max).unwrap().to_f32_vec().unwrap()[0];
    let shifted: Vec<f32> = logits.to_f32_vec().unwrap().iter().map(|x| x - max).collect();
    let shifted_t = Tensor::from_f32(&[6], &shifted);
    let z = reduce(&shifted_t, ReduceOp::SumExp).unwrap().to_f32_vec().unwrap()[0];

    let total: f32 = shifted.iter().map(|s| s.exp() / z).sum();
    assert!((total - 1.0).abs() < 1e-5);
}

#[test]
fn test_sum_square_matches_norm_identity() {
    let data = [3.0f32, 4.0];
    let t = Tensor::from_f32(&[2], &data);
    let ss = reduce(&t, ReduceOp::SumSquare).unwrap().to_f32_vec().unwrap()[0];
    assert_eq!(ss, 25.0);
}

#[test]
fn test_reduction_of_strided_view_matches_copy() {
    let data: Vec<f32> = (0..3 * 10).map(|i| (i as f32).sin()).collect();
    let full = Tensor::from_f32(&[3, 10], &data);
    let view = full.narrow(1, 2, 5).unwrap();
    assert!(!view.is_contiguous());

    let copied: Vec<f32> = view.to_f32_vec().unwrap();
    let compact = Tensor::from_f32(&[3, 5], &copied);

    for op in [ReduceOp::Sum, ReduceOp::SumSquare, ReduceOp::SumExp, ReduceOp::Max] {
        let a = reduce(&view, op).unwrap();
        let b = reduce(&compact, op).unwrap();
        assert!(all_close(&a, &b, 1e-6, 1e-6).unwrap(), "mismatch for {op}");
    }
}

#[test]
fn test_unsupported_combinations_fail_loudly() {
    let u = Tensor::from_u32(&[4], &[1, 2, 3, 4]);
    assert!(matches!(
        reduce(&u, ReduceOp::Max),
        Err(Error::NotImplemented(_))
    ));

    let h = Tensor::from_f16(&[2], &[f16::from_f32(1.0); 2]);
    assert!(matches!(
        all_close(&h, &h, 1e-3, 1e-5),
        Err(Error::NotImplemented(_))
    ));
    assert_eq!(h.dtype(), DType::F16);
}

#[test]
fn test_reduce_output_collapses_trailing_axis() {
    let t = Tensor::from_f32(&[2, 3, 4], &vec![1.0; 24]);
    let r = reduce(&t, ReduceOp::Sum).unwrap();
    assert_eq!(r.shape(), &[2, 3, 1]);
    assert_eq!(r.to_f32_vec().unwrap(), vec![4.0; 6]);
}
