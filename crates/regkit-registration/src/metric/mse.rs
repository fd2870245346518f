//! Mean squares metric implementation.

use burn::tensor::backend::Backend;
use regkit_core::{Image, LinearInterpolator, Transform};

use super::trait_::{sample_moving, FixedSamples, Metric, MetricEvaluation};
use crate::error::{RegistrationError, Result};

/// Mean Squares Metric.
///
/// Mean squared intensity difference over the samples that map inside the
/// moving image:
/// MSE = (1/|V|) * sum_{x in V} (Fixed(x) - Moving(T(x)))^2
#[derive(Debug, Clone, Default)]
pub struct MeanSquares {
    interpolator: LinearInterpolator,
}

impl MeanSquares {
    /// Create a new mean squares metric.
    pub fn new() -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
        }
    }
}

impl<B: Backend, const D: usize> Metric<B, D> for MeanSquares {
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

        let diff = sampled.values - fixed.values().clone();
        let value = (diff.powf_scalar(2.0) * sampled.inside).sum().div_scalar(valid_samples as f64);

        Ok(MetricEvaluation { value, valid_samples })
    }

    fn name(&self) -> &'static str {
        "MeanSquares"
    }
}
