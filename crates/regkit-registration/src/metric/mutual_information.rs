//! Mutual Information metric implementation.

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use regkit_core::{Image, LinearInterpolator, Transform};

use super::histogram::{IntensityRange, ParzenJointHistogram};
use super::trait_::{sample_moving, FixedSamples, Metric, MetricEvaluation};
use crate::config::MutualInformationConfig;
use crate::error::{RegistrationError, Result};

/// Mutual Information metric using Parzen window estimation.
///
/// MI(F, M) = H(F) + H(M) - H(F, M); the metric value is `-MI` so that
/// lower is better. The fixed axis of the histogram spans the range of the
/// sampled reference intensities, the moving axis the range of the whole
/// moving image.
#[derive(Debug, Clone)]
pub struct MutualInformation {
    interpolator: LinearInterpolator,
    histogram: ParzenJointHistogram,
    moving_range: Option<IntensityRange>,
}

impl MutualInformation {
    /// Create a new Mutual Information metric.
    ///
    /// # Arguments
    /// * `num_bins` - Number of histogram bins per axis (default: 50)
    /// * `parzen_sigma` - Width of the Parzen window in bins (default: 1.0)
    pub fn new(num_bins: usize, parzen_sigma: f64) -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
            histogram: ParzenJointHistogram::new(num_bins, parzen_sigma),
            moving_range: None,
        }
    }

    pub fn from_config(config: &MutualInformationConfig) -> Self {
        Self::new(config.number_of_histogram_bins, config.parzen_sigma)
    }

    /// Fix the moving intensity range instead of scanning the moving image
    /// on every evaluation.
    pub fn with_moving_range(mut self, range: IntensityRange) -> Self {
        self.moving_range = Some(range);
        self
    }

    pub fn num_bins(&self) -> usize {
        self.histogram.num_bins
    }
}

impl Default for MutualInformation {
    fn default() -> Self {
        Self::from_config(&MutualInformationConfig::new())
    }
}

impl<B: Backend, const D: usize> Metric<B, D> for MutualInformation {
    fn evaluate(
        &self,
        fixed: &FixedSamples<B>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Result<MetricEvaluation<B>> {
        let sampled = sample_moving(fixed.points(), moving, transform, &self.interpolator);
        let valid_samples = sampled.valid_count();
        if valid_samples == 0 {
            return Err(RegistrationError::metric(
                "all metric samples map outside the moving image",
            ));
        }

        let fixed_values = fixed.values().clone();
        let fixed_range = IntensityRange::new(
            fixed_values.clone().min().into_scalar().elem::<f64>(),
            fixed_values.clone().max().into_scalar().elem::<f64>(),
        );
        let moving_range = self.moving_range.unwrap_or_else(|| {
            let (min, max) = moving.min_max();
            IntensityRange::new(min, max)
        });

        let joint = self.histogram.joint_histogram(
            self.histogram.bin_coordinates(fixed_values, fixed_range),
            self.histogram.bin_coordinates(sampled.values, moving_range),
            sampled.inside,
        );
        let value = self.histogram.negative_mutual_information(joint);

        Ok(MetricEvaluation { value, valid_samples })
    }

    fn name(&self) -> &'static str {
        "MutualInformation"
    }
}
