use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Float mask `[Batch]`: 1.0 where a continuous index lies inside the image
/// buffer, 0.0 elsewhere.
///
/// A pixel covers half a sample to each side of its centre, so the buffer
/// spans `[-0.5, size - 0.5)` along every axis.
pub fn inside_buffer_mask<B: Backend, const D: usize>(indices: Tensor<B, 2>, size: [usize; D]) -> Tensor<B, 1> {
    let batch_size = indices.dims()[0];
    let mut mask = Tensor::<B, 1>::ones([batch_size], &indices.device());
    for (axis, &len) in size.iter().enumerate() {
        let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        let above = coord.clone().greater_equal_elem(-0.5).float();
        let below = coord.lower_elem(len as f64 - 0.5).float();
        mask = mask * above * below;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_inside_buffer_mask() {
        let device = Default::default();
        let indices = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0], [-0.5, 2.4], [-0.6, 1.0], [3.0, 2.5], [3.49, 0.0]],
            &device,
        );
        let mask: Vec<f32> = inside_buffer_mask(indices, [4, 3]).to_data().iter::<f32>().collect();
        assert_eq!(mask, vec![1.0, 1.0, 0.0, 0.0, 1.0]);
    }
}
