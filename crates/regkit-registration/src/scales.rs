//! Physical-shift parameter scales.
//!
//! Relates parameter changes to how far they move points of the reference
//! domain, so that gradient components of very different magnitude (matrix
//! entries versus translations) can be balanced and the first step size can
//! be chosen in millimetres rather than in parameter units.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use regkit_core::transform::parameter_tensor;
use regkit_core::{ImageGeometry, ParametricTransform};

use crate::optimizer::StepEstimator;

/// Parameter perturbation used when estimating scales.
pub const SMALL_PARAMETER_VARIATION: f64 = 0.01;

/// Measures point displacements caused by parameter changes of a template
/// transform, evaluated at a fixed set of physical probe points.
///
/// With the domain corners as probes this bounds the displacement of every
/// point of the domain for affine transforms.
pub struct PhysicalShiftEstimator<B: Backend, T, const D: usize> {
    template: T,
    points: Tensor<B, 2>,
    _phantom: PhantomData<B>,
}

impl<B, T, const D: usize> PhysicalShiftEstimator<B, T, D>
where
    B: Backend,
    T: ParametricTransform<B, D>,
{
    /// Probe the corners of `domain`.
    pub fn new(template: T, domain: &ImageGeometry<D>, device: &B::Device) -> Self {
        let corners = domain.corners();
        let flat: Vec<f32> = corners
            .iter()
            .flat_map(|corner| (0..D).map(move |axis| corner[axis] as f32))
            .collect();
        let points = Tensor::<B, 2>::from_data(TensorData::new(flat, Shape::new([corners.len(), D])), device);
        Self::with_points(template, points)
    }

    /// Probe arbitrary physical points `[N, D]`.
    pub fn with_points(template: T, points: Tensor<B, 2>) -> Self {
        Self {
            template,
            points,
            _phantom: PhantomData,
        }
    }

    /// Probe points mapped through the template with `parameters`.
    fn mapped(&self, parameters: &[f64]) -> Vec<f64> {
        let device = self.points.device();
        self.template
            .with_parameters(parameter_tensor(parameters, &device))
            .transform_points(self.points.clone())
            .into_data()
            .iter::<f64>()
            .collect()
    }

    fn largest_distance(a: &[f64], b: &[f64]) -> f64 {
        a.chunks_exact(D)
            .zip(b.chunks_exact(D))
            .map(|(p, q)| p.iter().zip(q).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt())
            .fold(0.0, f64::max)
    }

    /// Squared physical shift per unit change of each parameter.
    ///
    /// Parameters that move no probe point get a unit scale.
    pub fn estimate_scales(&self, parameters: &[f64]) -> Vec<f64> {
        let reference = self.mapped(parameters);
        let mut perturbed = parameters.to_vec();
        let scales: Vec<f64> = (0..parameters.len())
            .map(|i| {
                perturbed[i] += SMALL_PARAMETER_VARIATION;
                let shift = Self::largest_distance(&reference, &self.mapped(&perturbed));
                perturbed[i] = parameters[i];
                let scale = (shift / SMALL_PARAMETER_VARIATION).powi(2);
                if scale.is_finite() && scale > f64::EPSILON {
                    scale
                } else {
                    1.0
                }
            })
            .collect();
        tracing::debug!(?scales, "Estimated parameter scales");
        scales
    }
}

impl<B, T, const D: usize> StepEstimator for PhysicalShiftEstimator<B, T, D>
where
    B: Backend,
    T: ParametricTransform<B, D>,
{
    fn maximum_shift(&self, parameters: &[f64], step: &[f64]) -> f64 {
        let moved: Vec<f64> = parameters.iter().zip(step).map(|(p, s)| p + s).collect();
        Self::largest_distance(&self.mapped(parameters), &self.mapped(&moved))
    }
}
