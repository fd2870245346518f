//! Random metric sampling.
//!
//! The metric is evaluated on a subset of reference voxels drawn without
//! replacement. A mask restricts the draw to voxels where it is nonzero and
//! the percentage is taken of those eligible voxels.

use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regkit_core::{Image, ImageGeometry};

use crate::config::SamplingConfig;
use crate::error::{RegistrationError, Result};
use crate::validation;

/// Linear indices (x fastest) of the reference voxels used by the metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSet {
    indices: Vec<usize>,
}

impl SampleSet {
    /// Sample set from explicit linear indices.
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        Self { indices }
    }

    /// Every voxel of a grid.
    pub fn full<const D: usize>(geometry: &ImageGeometry<D>) -> Self {
        Self {
            indices: (0..geometry.num_voxels()).collect(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Draws [`SampleSet`]s from the eligible voxels of a reference grid.
#[derive(Debug, Clone)]
pub struct MetricSampler {
    eligible: Vec<usize>,
    sample_count: usize,
    resample_each_iteration: bool,
    rng: StdRng,
}

impl MetricSampler {
    /// Prepare a sampler over `reference`, optionally restricted by `mask`.
    ///
    /// The mask must share the reference grid and select at least one voxel.
    pub fn new<B: Backend, const D: usize>(
        reference: &ImageGeometry<D>,
        mask: Option<&Image<B, D>>,
        config: &SamplingConfig,
    ) -> Result<Self> {
        config.validate()?;

        let eligible: Vec<usize> = match mask {
            Some(mask) => {
                validation::validate_mask(reference, mask)?;
                mask.to_vec()
                    .into_iter()
                    .enumerate()
                    .filter(|(_, value)| *value != 0.0)
                    .map(|(index, _)| index)
                    .collect()
            }
            None => (0..reference.num_voxels()).collect(),
        };

        if eligible.is_empty() {
            return Err(RegistrationError::invalid_mask("mask selects no voxels"));
        }

        let sample_count = ((eligible.len() as f64 * config.percentage).floor() as usize).clamp(1, eligible.len());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        tracing::debug!(
            eligible = eligible.len(),
            samples = sample_count,
            masked = mask.is_some(),
            "Prepared metric sampler"
        );

        Ok(Self {
            eligible,
            sample_count,
            resample_each_iteration: config.resample_each_iteration,
            rng,
        })
    }

    /// Number of voxels the sampler draws from.
    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }

    /// Number of voxels in each drawn sample set.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Whether the cost should draw a new sample set per evaluation.
    pub fn resample_each_iteration(&self) -> bool {
        self.resample_each_iteration
    }

    /// Draw a sample set without replacement.
    pub fn draw(&mut self) -> SampleSet {
        if self.sample_count == self.eligible.len() {
            return SampleSet::new(self.eligible.clone());
        }
        let picked = rand::seq::index::sample(&mut self.rng, self.eligible.len(), self.sample_count);
        SampleSet::new(picked.into_iter().map(|i| self.eligible[i]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, Tensor, TensorData};
    use burn_ndarray::NdArray;
    use regkit_core::{Direction, Point, Spacing};

    type B = NdArray<f32>;

    fn mask_image(values: Vec<f32>, size: [usize; 2]) -> Image<B, 2> {
        let device = Default::default();
        let tensor = Tensor::from_data(TensorData::new(values, Shape::new([size[1], size[0]])), &device);
        Image::new(tensor, Point::origin(), Spacing::repeat(1.0), Direction::identity())
    }

    #[test]
    fn test_sample_count_and_uniqueness() {
        let geometry = ImageGeometry::<2>::with_size([20, 10]);
        let config = SamplingConfig::new().with_percentage(0.25);
        let mut sampler = MetricSampler::new::<B, 2>(&geometry, None, &config).unwrap();
        assert_eq!(sampler.eligible_count(), 200);
        assert_eq!(sampler.sample_count(), 50);

        let samples = sampler.draw();
        assert_eq!(samples.len(), 50);
        let mut unique = samples.indices().to_vec();
        unique.dedup();
        assert_eq!(unique.len(), 50);
        assert!(samples.indices().iter().all(|&i| i < 200));
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let geometry = ImageGeometry::<2>::with_size([32, 32]);
        let config = SamplingConfig::new().with_percentage(0.1);
        let a = MetricSampler::new::<B, 2>(&geometry, None, &config).unwrap().draw();
        let b = MetricSampler::new::<B, 2>(&geometry, None, &config).unwrap().draw();
        assert_eq!(a, b);

        let other = SamplingConfig::new().with_percentage(0.1).with_seed(Some(7));
        let c = MetricSampler::new::<B, 2>(&geometry, None, &other).unwrap().draw();
        assert_ne!(a, c);
    }

    #[test]
    fn test_small_percentage_keeps_one_sample() {
        let geometry = ImageGeometry::<2>::with_size([4, 4]);
        let mut sampler = MetricSampler::new::<B, 2>(&geometry, None, &SamplingConfig::new()).unwrap();
        assert_eq!(sampler.draw().len(), 1);
    }

    #[test]
    fn test_mask_restricts_samples() {
        // Only the right half (x >= 4) of an 8x4 grid is eligible.
        let values: Vec<f32> = (0..32).map(|i| if i % 8 >= 4 { 1.0 } else { 0.0 }).collect();
        let mask = mask_image(values, [8, 4]);
        let geometry = *mask.geometry();
        let config = SamplingConfig::new().with_percentage(0.5);
        let mut sampler = MetricSampler::new(&geometry, Some(&mask), &config).unwrap();

        assert_eq!(sampler.eligible_count(), 16);
        assert_eq!(sampler.sample_count(), 8);
        for _ in 0..5 {
            assert!(sampler.draw().indices().iter().all(|&i| i % 8 >= 4));
        }
    }

    #[test]
    fn test_empty_mask_is_rejected() {
        let mask = mask_image(vec![0.0; 16], [4, 4]);
        let geometry = *mask.geometry();
        let result = MetricSampler::new(&geometry, Some(&mask), &SamplingConfig::new());
        assert!(matches!(result, Err(RegistrationError::InvalidMask(_))));
    }

    #[test]
    fn test_mismatched_mask_is_rejected() {
        let mask = mask_image(vec![1.0; 16], [4, 4]);
        let geometry = ImageGeometry::<2>::with_size([5, 4]);
        let result = MetricSampler::new(&geometry, Some(&mask), &SamplingConfig::new());
        assert!(matches!(result, Err(RegistrationError::InvalidMask(_))));
    }
}
