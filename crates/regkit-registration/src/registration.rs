//! Registration entry points.
//!
//! Two independent pipelines: *estimate* a transform that maps reference
//! physical points onto the moving image, then *apply* it to resample an
//! image. Estimation never modifies its inputs and always returns a fresh
//! transform built from the best parameters the optimizer saw.

use burn::tensor::backend::{AutodiffBackend, Backend};
use regkit_core::transform::{bspline_mesh_size, parameter_tensor};
use regkit_core::{
    AffineTransform, BSplineTransform, Image, ImageGeometry, LinearInterpolator, ParametricTransform,
    ResampleImageFilter, Transform,
};

use crate::config::{
    AffineRegistrationConfig, DeformableRegistrationConfig, LearningRateMode, ParameterScales, RegistrationOptions,
    SamplingConfig,
};
use crate::cost::RegistrationCost;
use crate::error::Result;
use crate::metric::{IntensityRange, MeanSquares, Metric, MutualInformation};
use crate::optimizer::{GradientDescent, Lbfgsb, OptimizationReport, Optimizer};
use crate::sampling::MetricSampler;
use crate::scales::PhysicalShiftEstimator;
use crate::validation;

/// Estimated transform together with the optimizer diagnostics.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome<T> {
    pub transform: T,
    /// Initial and final metric values, stop reason and iteration count.
    pub report: OptimizationReport,
    /// Reference samples used per metric evaluation.
    pub num_samples: usize,
}

impl<T> RegistrationOutcome<T> {
    /// Replace the transform, keeping the diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RegistrationOutcome<U> {
        RegistrationOutcome {
            transform: f(self.transform),
            report: self.report,
            num_samples: self.num_samples,
        }
    }
}

/// Estimate an affine transform aligning `moving` to `reference`.
///
/// The initial transform is the identity about the reference centre,
/// translated so the reference centre lands on the moving centre. Mean
/// squared differences over a random subset of reference voxels (restricted
/// to non-zero `mask` voxels when given) are minimized by gradient descent.
///
/// Running out of iterations is not an error; inspect
/// [`RegistrationOutcome::report`].
pub fn estimate_affine<B: AutodiffBackend, const D: usize>(
    reference: &Image<B, D>,
    moving: &Image<B, D>,
    mask: Option<&Image<B, D>>,
    config: &AffineRegistrationConfig,
    options: &RegistrationOptions,
) -> Result<RegistrationOutcome<AffineTransform<B, D>>> {
    validate_inputs(reference, moving)?;
    config.validate()?;

    let device = reference.device();
    let initial = AffineTransform::<B, D>::centered_on(reference.geometry(), moving.geometry(), &device);
    let initial_parameters = initial.parameter_values();

    let estimator = PhysicalShiftEstimator::new(initial.clone(), reference.geometry(), &device);
    let mut optimizer = GradientDescent::new(config.optimizer.clone())
        .with_default_maximum_step_size(smallest_spacing(reference.geometry()));
    if config.optimizer.scales == ParameterScales::PhysicalShift {
        optimizer = optimizer.with_scales(estimator.estimate_scales(&initial_parameters));
    }
    if config.optimizer.learning_rate_mode == LearningRateMode::EstimateOnce {
        optimizer = optimizer.with_step_estimator(&estimator);
    }

    let outcome = run(
        reference,
        moving,
        mask,
        &config.sampling,
        &initial,
        &MeanSquares::new(),
        &optimizer,
        options,
    )?;
    log_outcome("affine", &outcome, options);
    Ok(outcome)
}

/// Estimate a cubic B-spline deformation aligning `moving` to `reference`.
///
/// The control grid spans the bounding box of the reference voxel centres
/// with roughly `grid_physical_spacing` between nodes and starts as the
/// identity. Negative Parzen-window mutual information is minimized with
/// L-BFGS-B; the moving intensity range is taken from the whole moving image.
pub fn estimate_deformation<B: AutodiffBackend, const D: usize>(
    reference: &Image<B, D>,
    moving: &Image<B, D>,
    mask: Option<&Image<B, D>>,
    config: &DeformableRegistrationConfig,
    options: &RegistrationOptions,
) -> Result<RegistrationOutcome<BSplineTransform<B, D>>> {
    validate_inputs(reference, moving)?;
    config.validate()?;

    let device = reference.device();
    let mesh_size = bspline_mesh_size(
        reference.geometry(),
        config.grid.grid_physical_spacing,
        config.grid.minimum_grid_cells,
    );
    let initial = BSplineTransform::<B, D>::over_domain(reference.geometry(), mesh_size, &device)?;
    tracing::debug!(?mesh_size, parameters = initial.num_parameters(), "Initialized deformation grid");

    let (min, max) = moving.min_max();
    let metric = MutualInformation::from_config(&config.metric).with_moving_range(IntensityRange::new(min, max));
    let optimizer = Lbfgsb::new(config.optimizer.clone());

    let outcome = run(
        reference,
        moving,
        mask,
        &config.sampling,
        &initial,
        &metric,
        &optimizer,
        options,
    )?;
    log_outcome("deformation", &outcome, options);
    Ok(outcome)
}

/// Resample `image` through an affine transform onto its own grid.
///
/// The output keeps the grid of `image` rather than the registration
/// reference; use [`resample_onto`] to choose the target grid. Points mapping
/// outside `image` are filled with 0.
pub fn apply_affine<B: Backend, const D: usize>(image: &Image<B, D>, transform: &AffineTransform<B, D>) -> Image<B, D> {
    resample(image, transform, *image.geometry(), 0.0)
}

/// Resample `image` through a B-spline deformation onto its own grid.
///
/// Same grid and fill behaviour as [`apply_affine`].
pub fn apply_deformation<B: Backend, const D: usize>(
    image: &Image<B, D>,
    transform: &BSplineTransform<B, D>,
) -> Image<B, D> {
    resample(image, transform, *image.geometry(), 0.0)
}

/// Resample `image` onto `target` through `transform`, which maps target
/// physical points into `image` space.
pub fn resample_onto<B, T, const D: usize>(
    image: &Image<B, D>,
    transform: &T,
    target: &ImageGeometry<D>,
    default_value: f64,
) -> Result<Image<B, D>>
where
    B: Backend,
    T: Transform<B, D> + Clone,
{
    validation::validate_image(image)?;
    target.validate()?;
    Ok(resample(image, transform, *target, default_value))
}

fn resample<B, T, const D: usize>(
    image: &Image<B, D>,
    transform: &T,
    target: ImageGeometry<D>,
    fill: f64,
) -> Image<B, D>
where
    B: Backend,
    T: Transform<B, D> + Clone,
{
    ResampleImageFilter::new(target, transform.clone(), LinearInterpolator::new())
        .with_default_pixel_value(fill)
        .apply(image)
}

fn validate_inputs<B: Backend, const D: usize>(reference: &Image<B, D>, moving: &Image<B, D>) -> Result<()> {
    validation::validate_image(reference)?;
    validation::validate_image(moving)
}

fn smallest_spacing<const D: usize>(geometry: &ImageGeometry<D>) -> f64 {
    geometry.spacing().iter().copied().fold(f64::INFINITY, f64::min)
}

/// Shared optimization loop of both estimators.
#[allow(clippy::too_many_arguments)]
fn run<B, T, M, O, const D: usize>(
    reference: &Image<B, D>,
    moving: &Image<B, D>,
    mask: Option<&Image<B, D>>,
    sampling: &SamplingConfig,
    initial: &T,
    metric: &M,
    optimizer: &O,
    options: &RegistrationOptions,
) -> Result<RegistrationOutcome<T>>
where
    B: AutodiffBackend,
    T: ParametricTransform<B, D>,
    M: Metric<B, D>,
    O: Optimizer,
{
    let sampler = MetricSampler::new(reference.geometry(), mask, sampling)?;
    let mut cost = RegistrationCost::new(reference, moving, initial, metric, sampler);
    let num_samples = cost.num_samples();
    tracing::debug!(
        metric = metric.name(),
        optimizer = optimizer.name(),
        samples = num_samples,
        "Starting registration"
    );

    let report = match optimizer.minimize(&mut cost, &initial.parameter_values(), &options.progress) {
        Ok(report) => report,
        Err(error) => {
            options.progress.error(&error.to_string());
            return Err(error);
        }
    };

    let transform = initial.with_parameters(parameter_tensor(&report.parameters, &reference.device()));
    Ok(RegistrationOutcome {
        transform,
        report,
        num_samples,
    })
}

fn log_outcome<T>(kind: &str, outcome: &RegistrationOutcome<T>, options: &RegistrationOptions) {
    let report = &outcome.report;
    if options.verbose {
        tracing::info!(
            initial_value = report.initial_value,
            final_value = report.final_value,
            iterations = report.iterations,
            evaluations = report.evaluations,
            "Estimated {} transform: {}",
            kind,
            report.stop_reason
        );
    } else {
        tracing::debug!(
            final_value = report.final_value,
            iterations = report.iterations,
            "Estimated {} transform: {}",
            kind,
            report.stop_reason
        );
    }
}
