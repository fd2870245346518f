//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// Interpolators are used to sample image values at non-integer coordinates,
/// which is essential for image registration and resampling. Implementations
/// must stay differentiable with respect to `indices` so metric gradients
/// reach the transform parameters.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values from a tensor at given continuous indices.
    ///
    /// # Arguments
    /// * `data` - The source tensor (`[Z, Y, X]` volume or `[Y, X]` image)
    /// * `indices` - The indices at which to interpolate `[Batch, D]`, columns `(x, y, z)`
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
