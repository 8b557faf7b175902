//! ndarray features → burn tensors.

use burn::tensor::{Tensor, TensorData, backend::Backend};
use chortle_core::{Label, one_hot_encode};
use ndarray::ArrayView4;

/// `(n, bands, frames, channels)` → NCHW `[n, channels, bands, frames]`.
pub fn features_to_tensor<B: Backend>(features: ArrayView4<'_, f32>, device: &B::Device) -> Tensor<B, 4> {
    let (n, bands, frames, channels) = features.dim();
    let values: Vec<f32> = features.permuted_axes([0, 3, 1, 2]).iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [n, channels, bands, frames]), device)
}

/// One-hot targets, `[n, NUM_LABELS]`.
pub fn one_hot_targets<B: Backend>(labels: &[Label], device: &B::Device) -> Tensor<B, 2> {
    let encoded = one_hot_encode(labels);
    let shape = [encoded.nrows(), encoded.ncols()];
    let values: Vec<f32> = encoded.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use ndarray::Array4;

    type B = NdArray;

    #[test]
    fn channels_move_ahead_of_bands() {
        let features = Array4::from_shape_fn((2, 3, 4, 2), |(n, b, f, c)| {
            (n * 1000 + c * 100 + b * 10 + f) as f32
        });
        let tensor = features_to_tensor::<B>(features.view(), &Default::default());
        assert_eq!(tensor.dims(), [2, 2, 3, 4]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        // [n=1, c=1, b=2, f=3]
        let idx = (3 * 3 + 2) * 4 + 3;
        assert_eq!(values[idx], 1123.0);
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn one_hot_targets_shape() {
        let labels = [Label::ALL[2], Label::ALL[0], Label::ALL[4]];
        let targets = one_hot_targets::<B>(&labels, &Default::default());
        assert_eq!(targets.dims(), [3, 5]);
        let values = targets.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[0..5], &[0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(values.iter().sum::<f32>(), 3.0);
    }
}
