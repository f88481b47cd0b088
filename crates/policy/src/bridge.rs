//! Tensor bridge: host `Vec<f32>` values to and from burn tensors.
//!
//! Rewards, baselines and sampled actions live on the host; logits and
//! log-probabilities live on the device. Everything crossing that boundary
//! goes through here.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Build a 1D tensor from host values.
pub fn values_to_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), device)
}

/// Flatten a tensor of any rank into row-major `f32` values.
///
/// # Panics
/// Panics if the tensor's element type is not `f32`.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_else(|e| panic!("tensor data is not f32: {e:?}"))
}

/// Extract a single f64 scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_values_round_trip() {
        let device = Default::default();
        let t = values_to_tensor::<TestBackend>(&[1.0, -2.5, 3.0], &device);
        assert_eq!(t.dims(), [3]);
        assert_eq!(tensor_to_vec(t), vec![1.0, -2.5, 3.0]);
    }

    #[test]
    fn test_tensor_to_vec_slice() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]),
            &device,
        );
        assert_eq!(tensor_to_vec(t.slice([1..2, 0..3])), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_scalar() {
        let device = Default::default();
        let t = values_to_tensor::<TestBackend>(&[42.0], &device);
        assert!((tensor_to_f64(t) - 42.0).abs() < 1e-9);
    }
}
