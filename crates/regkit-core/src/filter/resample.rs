//! Resample image filter.
//!
//! This module provides ResampleImageFilter which resamples an image
//! into a new coordinate system using a transform and an interpolator.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::image::{index_grid, index_to_physical_tensor, Image, ImageGeometry, PixelType};
use crate::interpolation::{inside_buffer_mask, Interpolator};
use crate::transform::Transform;

/// Number of output points pushed through the transform at once.
pub const CHUNK_SIZE: usize = 32768;

/// Resample image filter.
///
/// Resamples an image by applying a transform to map points from the
/// output image space to the input image space, and then interpolating values.
///
/// The transform maps from Output Physical Space -> Input Physical Space.
/// Output points whose source lies outside the input buffer receive the
/// default pixel value. Integer inputs are rounded and clamped back to their
/// pixel type.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
/// * `D` - The dimensionality (2 or 3)
pub struct ResampleImageFilter<B, T, I, const D: usize>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    geometry: ImageGeometry<D>,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    _phantom: PhantomData<B>,
}

impl<B, T, I, const D: usize> ResampleImageFilter<B, T, I, D>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `geometry` - Output grid (size, origin, spacing, direction)
    /// * `transform` - Transform from output space to input space
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(geometry: ImageGeometry<D>, transform: T, interpolator: I) -> Self {
        Self {
            geometry,
            transform,
            interpolator,
            default_pixel_value: 0.0,
            _phantom: PhantomData,
        }
    }

    /// Set default pixel value for outside the field of view.
    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    /// Create from a reference image.
    ///
    /// Uses the geometry of the reference image as the output grid.
    pub fn new_from_reference(reference: &Image<B, D>, transform: T, interpolator: I) -> Self {
        Self::new(*reference.geometry(), transform, interpolator)
    }

    /// Apply filter to an input image. The input is left untouched.
    pub fn apply(&self, input: &Image<B, D>) -> Image<B, D> {
        let device = input.device();
        let num_points = self.geometry.num_voxels();
        tracing::debug!(
            output_size = ?self.geometry.size(),
            pixel_type = ?input.pixel_type(),
            "Resampling {} points",
            num_points
        );

        let mut chunks = Vec::with_capacity(num_points.div_ceil(CHUNK_SIZE));
        let mut start = 0;
        while start < num_points {
            let end = usize::min(start + CHUNK_SIZE, num_points);
            chunks.push(self.resample_chunk(input, start..end, &device));
            start = end;
        }

        let values = Tensor::cat(chunks, 0);
        let values = quantize(values, input.pixel_type());

        Image::from_parts(
            values.reshape(self.geometry.tensor_shape()),
            self.geometry,
            input.pixel_type(),
        )
    }

    fn resample_chunk(&self, input: &Image<B, D>, range: std::ops::Range<usize>, device: &B::Device) -> Tensor<B, 1> {
        let output_indices = index_grid::<B, D>(self.geometry.size(), range, device);
        let output_points = index_to_physical_tensor(
            output_indices,
            self.geometry.origin(),
            self.geometry.spacing(),
            self.geometry.direction(),
        );

        // Transform maps Output Space -> Input Space
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);

        let inside = inside_buffer_mask(input_indices.clone(), input.size());
        let values = self.interpolator.interpolate(input.data(), input_indices);

        let outside = inside.clone().neg().add_scalar(1.0);
        values * inside + outside * self.default_pixel_value
    }
}

/// Round and clamp values to the range of an integer pixel type.
fn quantize<B: Backend>(values: Tensor<B, 1>, pixel_type: PixelType) -> Tensor<B, 1> {
    match pixel_type.integer_range() {
        Some((min, max)) => values.round().clamp(min, max),
        None => values,
    }
}
