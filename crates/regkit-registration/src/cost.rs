//! Bridge between flat-parameter optimizers and autodiff metrics.

use burn::tensor::backend::AutodiffBackend;
use regkit_core::transform::parameter_tensor;
use regkit_core::{Image, ParametricTransform};

use crate::error::Result;
use crate::metric::{FixedSamples, Metric};
use crate::optimizer::CostFunction;
use crate::sampling::MetricSampler;

/// Metric value of a template transform as a function of its parameters.
///
/// Each evaluation builds a candidate transform from the parameter vector,
/// evaluates the metric on the reference samples and backpropagates to get
/// the gradient. The template itself is never modified.
pub struct RegistrationCost<'a, B, T, M, const D: usize>
where
    B: AutodiffBackend,
    T: ParametricTransform<B, D>,
    M: Metric<B, D>,
{
    reference: &'a Image<B, D>,
    moving: &'a Image<B, D>,
    template: &'a T,
    metric: &'a M,
    sampler: MetricSampler,
    fixed: FixedSamples<B>,
    evaluations: usize,
    last_valid_samples: usize,
}

impl<'a, B, T, M, const D: usize> RegistrationCost<'a, B, T, M, D>
where
    B: AutodiffBackend,
    T: ParametricTransform<B, D>,
    M: Metric<B, D>,
{
    /// Draws the first sample set from `sampler`.
    pub fn new(
        reference: &'a Image<B, D>,
        moving: &'a Image<B, D>,
        template: &'a T,
        metric: &'a M,
        mut sampler: MetricSampler,
    ) -> Self {
        let fixed = FixedSamples::from_image(reference, &sampler.draw());
        Self {
            reference,
            moving,
            template,
            metric,
            sampler,
            fixed,
            evaluations: 0,
            last_valid_samples: 0,
        }
    }

    /// Number of reference samples per evaluation.
    pub fn num_samples(&self) -> usize {
        self.fixed.len()
    }

    /// Samples that mapped inside the moving image at the last evaluation.
    pub fn last_valid_samples(&self) -> usize {
        self.last_valid_samples
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl<B, T, M, const D: usize> CostFunction for RegistrationCost<'_, B, T, M, D>
where
    B: AutodiffBackend,
    T: ParametricTransform<B, D>,
    M: Metric<B, D>,
{
    fn num_parameters(&self) -> usize {
        self.template.num_parameters()
    }

    fn evaluate(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        self.evaluations += 1;

        let device = self.reference.device();
        let tensor = parameter_tensor::<B>(parameters, &device).require_grad();
        let candidate = self.template.with_parameters(tensor.clone());

        let evaluation = self.metric.evaluate(&self.fixed, self.moving, &candidate)?;
        self.last_valid_samples = evaluation.valid_samples;
        let value = evaluation.value_f64();

        let grads = evaluation.value.backward();
        let gradient = match tensor.grad(&grads) {
            Some(grad) => grad.into_data().iter::<f64>().collect(),
            None => vec![0.0; parameters.len()],
        };
        Ok((value, gradient))
    }

    fn next_iteration(&mut self) -> bool {
        if !self.sampler.resample_each_iteration() {
            return false;
        }
        self.fixed = FixedSamples::from_image(self.reference, &self.sampler.draw());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use regkit_core::{AffineTransform, ImageGeometry};

    use crate::config::SamplingConfig;
    use crate::metric::MeanSquares;

    type B = Autodiff<NdArray<f32>>;

    fn ramp(offset: f32) -> Image<B, 2> {
        let device = Default::default();
        let values: Vec<f32> = (0..12 * 12)
            .map(|i| ((i % 12) as f32 + offset) * 2.0 + (i / 12) as f32)
            .collect();
        Image::from_pixels(&values, &ImageGeometry::with_size([12, 12]), &device).unwrap()
    }

    #[test]
    fn test_cost_value_and_gradient() {
        let device = Default::default();
        let reference = ramp(0.0);
        let moving = ramp(0.0);
        let template = AffineTransform::<B, 2>::identity(reference.physical_center(), &device);
        let metric = MeanSquares::new();
        let sampler =
            MetricSampler::new::<B, 2>(reference.geometry(), None, &SamplingConfig::new().with_percentage(1.0))
                .unwrap();
        let mut cost = RegistrationCost::new(&reference, &moving, &template, &metric, sampler);

        assert_eq!(cost.num_parameters(), 6);
        assert_eq!(cost.num_samples(), 144);

        let identity = template.parameter_values();
        let (value, gradient) = cost.evaluate(&identity).unwrap();
        assert!(value.abs() < 1e-6);
        assert_eq!(gradient.len(), 6);
        assert!(gradient.iter().all(|g| g.abs() < 1e-3));

        // Shifting by +0.5 in x raises every moving sample by 1.
        let mut shifted = identity.clone();
        shifted[4] = 0.5;
        let (value, gradient) = cost.evaluate(&shifted).unwrap();
        assert!(value > 0.5);
        assert!(gradient[4] > 0.0);
        assert!(cost.last_valid_samples() < 144);
        assert_eq!(cost.evaluations(), 2);

        // Template untouched.
        assert_eq!(template.parameter_values(), identity);
    }

    #[test]
    fn test_samples_change_only_between_iterations() {
        let device = Default::default();
        let reference = ramp(0.0);
        let pattern: Vec<f32> = (0..12 * 12).map(|i| ((i * 7) % 13) as f32).collect();
        let moving = Image::<B, 2>::from_pixels(&pattern, &ImageGeometry::with_size([12, 12]), &device).unwrap();
        let template = AffineTransform::<B, 2>::identity(reference.physical_center(), &device);
        let metric = MeanSquares::new();
        let config = SamplingConfig::new().with_percentage(0.2).with_resample_each_iteration(true);
        let sampler = MetricSampler::new::<B, 2>(reference.geometry(), None, &config).unwrap();
        let mut cost = RegistrationCost::new(&reference, &moving, &template, &metric, sampler);

        let mut shifted = template.parameter_values();
        shifted[4] = 0.25;
        let (first, _) = cost.evaluate(&shifted).unwrap();
        let (second, _) = cost.evaluate(&shifted).unwrap();
        assert_eq!(first, second);

        assert!(cost.next_iteration());
        let values: Vec<f64> = (0..4)
            .map(|_| {
                cost.next_iteration();
                cost.evaluate(&shifted).unwrap().0
            })
            .collect();
        assert!(values.iter().any(|&v| v != first), "{:?}", values);
    }

    #[test]
    fn test_fixed_samples_never_redrawn() {
        let device = Default::default();
        let reference = ramp(0.0);
        let template = AffineTransform::<B, 2>::identity(reference.physical_center(), &device);
        let metric = MeanSquares::new();
        let sampler =
            MetricSampler::new::<B, 2>(reference.geometry(), None, &SamplingConfig::new().with_percentage(0.2))
                .unwrap();
        let mut cost = RegistrationCost::new(&reference, &reference, &template, &metric, sampler);
        assert!(!cost.next_iteration());
    }
}
