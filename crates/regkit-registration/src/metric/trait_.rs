//! Metric trait for image similarity measurement.
//!
//! Metrics compare a fixed set of reference samples with the moving image
//! seen through a candidate transform. Lower values indicate better
//! alignment.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Shape, Tensor, TensorData};
use regkit_core::filter::CHUNK_SIZE;
use regkit_core::image::sample_grid;
use regkit_core::interpolation::inside_buffer_mask;
use regkit_core::{Image, Interpolator, LinearInterpolator, Transform};

use crate::error::Result;
use crate::sampling::SampleSet;

/// Metric trait for measuring similarity between images.
///
/// # Type Parameters
/// * `B` - The tensor backend
/// * `D` - The spatial dimensionality (2 or 3)
pub trait Metric<B: Backend, const D: usize> {
    /// Dissimilarity between the reference samples and the moving image.
    ///
    /// # Arguments
    /// * `fixed` - Reference sample points (physical) and intensities
    /// * `moving` - The moving image
    /// * `transform` - Maps reference physical points into moving space
    ///
    /// Fails when every sample maps outside the moving image.
    fn evaluate(
        &self,
        fixed: &FixedSamples<B>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Result<MetricEvaluation<B>>;

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}

/// Scalar metric value together with the number of samples it used.
#[derive(Debug, Clone)]
pub struct MetricEvaluation<B: Backend> {
    /// Tensor of shape `[1]`; keeps the autodiff graph of the evaluation.
    pub value: Tensor<B, 1>,
    /// Samples whose mapped position fell inside the moving image.
    pub valid_samples: usize,
}

impl<B: Backend> MetricEvaluation<B> {
    pub fn value_f64(&self) -> f64 {
        self.value.clone().into_scalar().elem::<f64>()
    }
}

/// Reference samples: physical positions `[N, D]` and intensities `[N]`.
#[derive(Debug, Clone)]
pub struct FixedSamples<B: Backend> {
    points: Tensor<B, 2>,
    values: Tensor<B, 1>,
}

impl<B: Backend> FixedSamples<B> {
    pub fn new(points: Tensor<B, 2>, values: Tensor<B, 1>) -> Self {
        Self { points, values }
    }

    /// Gather the voxels of `samples` from the reference image.
    pub fn from_image<const D: usize>(reference: &Image<B, D>, samples: &SampleSet) -> Self {
        let device = reference.device();
        let indices = sample_grid::<B, D>(reference.size(), samples.indices(), &device);
        let points = reference.index_to_world_tensor(indices);

        let linear: Vec<i64> = samples.indices().iter().map(|&i| i as i64).collect();
        let linear = Tensor::<B, 1, Int>::from_data(TensorData::new(linear, Shape::new([samples.len()])), &device);
        let values = reference
            .data()
            .clone()
            .reshape([reference.geometry().num_voxels()])
            .select(0, linear);

        Self { points, values }
    }

    pub fn points(&self) -> &Tensor<B, 2> {
        &self.points
    }

    pub fn values(&self) -> &Tensor<B, 1> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Moving-image intensities at transformed sample positions.
#[derive(Debug, Clone)]
pub struct MovingSamples<B: Backend> {
    /// Interpolated intensities `[N]`.
    pub values: Tensor<B, 1>,
    /// 1.0 where the mapped point lies inside the moving buffer `[N]`.
    pub inside: Tensor<B, 1>,
}

impl<B: Backend> MovingSamples<B> {
    /// Number of samples that mapped inside the moving image.
    pub fn valid_count(&self) -> usize {
        self.inside.clone().sum().into_scalar().elem::<f64>().round() as usize
    }
}

/// Map reference points through `transform` and interpolate the moving image.
pub fn sample_moving<B: Backend, const D: usize>(
    points: &Tensor<B, 2>,
    moving: &Image<B, D>,
    transform: &impl Transform<B, D>,
    interpolator: &LinearInterpolator,
) -> MovingSamples<B> {
    let [n, _] = points.dims();
    let mut values = Vec::with_capacity(n.div_ceil(CHUNK_SIZE));
    let mut inside = Vec::with_capacity(n.div_ceil(CHUNK_SIZE));

    let mut start = 0;
    while start < n {
        let end = usize::min(start + CHUNK_SIZE, n);
        let chunk_points = points.clone().slice([start..end]);
        let moving_points = transform.transform_points(chunk_points);
        let moving_indices = moving.world_to_index_tensor(moving_points);

        inside.push(inside_buffer_mask(moving_indices.clone(), moving.size()));
        values.push(interpolator.interpolate(moving.data(), moving_indices));
        start = end;
    }

    MovingSamples {
        values: Tensor::cat(values, 0),
        inside: Tensor::cat(inside, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use regkit_core::spatial::{Point2, Vector2};
    use regkit_core::{AffineTransform, ImageGeometry};

    type B = NdArray<f32>;

    #[test]
    fn test_fixed_samples_from_image() {
        let device = Default::default();
        let geometry = ImageGeometry::new(
            [4, 3],
            Point2::new(10.0, 20.0),
            regkit_core::spatial::Spacing2::new(2.0, 1.0),
            regkit_core::Direction::identity(),
        );
        let pixels: Vec<f32> = (0..12).map(|v| v as f32 * 10.0).collect();
        let image = Image::<B, 2>::from_pixels(&pixels, &geometry, &device).unwrap();

        let samples = FixedSamples::from_image(&image, &SampleSet::new(vec![9, 1]));
        let values: Vec<f32> = samples.values().to_data().iter::<f32>().collect();
        let points: Vec<f32> = samples.points().to_data().iter::<f32>().collect();

        // Sorted: linear 1 is (1, 0), linear 9 is (1, 2)
        assert_eq!(values, vec![10.0, 90.0]);
        assert_eq!(points, vec![12.0, 20.0, 12.0, 22.0]);
    }

    #[test]
    fn test_sample_moving_marks_outside_points() {
        let device = Default::default();
        let geometry = ImageGeometry::<2>::with_size([4, 4]);
        let pixels: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let image = Image::<B, 2>::from_pixels(&pixels, &geometry, &device).unwrap();
        let transform = AffineTransform::<B, 2>::from_translation(Vector2::new(3.0, 0.0), Point2::origin(), &device);

        let points = Tensor::<B, 2>::from_floats([[0.0, 0.0], [1.0, 1.0]], &device);
        let sampled = sample_moving(&points, &image, &transform, &LinearInterpolator::new());

        let inside: Vec<f32> = sampled.inside.clone().to_data().iter::<f32>().collect();
        assert_eq!(inside, vec![1.0, 0.0]);
        assert_eq!(sampled.valid_count(), 1);
        let values: Vec<f32> = sampled.values.to_data().iter::<f32>().collect();
        assert_eq!(values[0], 3.0);
    }
}
