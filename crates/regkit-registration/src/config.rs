//! Registration configuration.
//!
//! Every tunable of the estimation pipeline lives in a `burn` [`Config`] with
//! a documented default, so configurations serialize to JSON and can be
//! rebuilt field by field with the generated `with_*` setters.

use burn::config::Config;
use serde::{Deserialize, Serialize};

// `validate` spells out `crate::error::Result`: the `Config` derive expands an
// unqualified two-parameter `Result`.
use crate::error::RegistrationError;
use crate::progress::ProgressTracker;
use crate::validation;

/// Seed used for metric sampling unless the caller overrides it.
pub const DEFAULT_SAMPLING_SEED: u64 = 0x5eed_1234;

/// How gradient descent weights the parameters of the gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterScales {
    /// Every parameter weighted equally.
    Unit,
    /// Weights estimated from the physical displacement each parameter causes.
    PhysicalShift,
}

/// How gradient descent chooses its learning rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningRateMode {
    /// Use `learning_rate` as is.
    Fixed,
    /// Estimate once, before the first step, from `maximum_step_size`.
    EstimateOnce,
}

/// Metric sample selection.
#[derive(Config, Debug, PartialEq)]
pub struct SamplingConfig {
    /// Fraction of eligible reference voxels used by the metric, in `(0, 1]`.
    #[config(default = 0.01)]
    pub percentage: f64,
    /// Seed of the sample generator; `None` seeds from OS entropy.
    #[config(default = "Some(DEFAULT_SAMPLING_SEED)")]
    pub seed: Option<u64>,
    /// Draw a new sample set after every accepted optimizer iteration.
    #[config(default = "false")]
    pub resample_each_iteration: bool,
}

impl SamplingConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_sampling_percentage(self.percentage)
    }
}

/// Gradient descent settings.
#[derive(Config, Debug, PartialEq)]
pub struct GradientDescentConfig {
    #[config(default = 1.0)]
    pub learning_rate: f64,
    #[config(default = 100)]
    pub number_of_iterations: usize,
    /// Stop once the windowed convergence value drops below this.
    #[config(default = 1e-6)]
    pub convergence_minimum_value: f64,
    /// Number of recent cost values the convergence monitor looks at.
    #[config(default = 10)]
    pub convergence_window_size: usize,
    #[config(default = "ParameterScales::Unit")]
    pub scales: ParameterScales,
    #[config(default = "LearningRateMode::EstimateOnce")]
    pub learning_rate_mode: LearningRateMode,
    /// Largest physical displacement of the first step when the learning
    /// rate is estimated; defaults to the smallest reference spacing.
    pub maximum_step_size: Option<f64>,
}

impl GradientDescentConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_learning_rate(self.learning_rate)?;
        validation::validate_iterations(self.number_of_iterations)?;
        validation::validate_tolerance("convergence_minimum_value", self.convergence_minimum_value)?;
        validation::validate_window_size(self.convergence_window_size)?;
        if let Some(step) = self.maximum_step_size {
            if !(step.is_finite() && step > 0.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "maximum_step_size must be positive, got {}",
                    step
                )));
            }
        }
        Ok(())
    }
}

/// Bounded limited-memory quasi-Newton settings.
#[derive(Config, Debug, PartialEq)]
pub struct LbfgsbConfig {
    /// Stop when the largest projected gradient component drops below this.
    #[config(default = 1e-5)]
    pub gradient_convergence_tolerance: f64,
    #[config(default = 50)]
    pub number_of_iterations: usize,
    /// Number of correction pairs kept for the Hessian approximation.
    #[config(default = 5)]
    pub maximum_number_of_corrections: usize,
    #[config(default = 500)]
    pub maximum_number_of_function_evaluations: usize,
    /// Relative cost reduction stop, in units of machine epsilon.
    #[config(default = 1e7)]
    pub cost_function_convergence_factor: f64,
    /// Lower bound applied to every parameter.
    pub lower_bound: Option<f64>,
    /// Upper bound applied to every parameter.
    pub upper_bound: Option<f64>,
}

impl LbfgsbConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_tolerance("gradient_convergence_tolerance", self.gradient_convergence_tolerance)?;
        validation::validate_iterations(self.number_of_iterations)?;
        validation::validate_lbfgs_history_size(self.maximum_number_of_corrections)?;
        validation::validate_iterations(self.maximum_number_of_function_evaluations)?;
        validation::validate_tolerance("cost_function_convergence_factor", self.cost_function_convergence_factor)?;
        validation::validate_bounds(self.lower_bound, self.upper_bound)
    }
}

/// Parzen-window mutual information settings.
#[derive(Config, Debug, PartialEq)]
pub struct MutualInformationConfig {
    #[config(default = 50)]
    pub number_of_histogram_bins: usize,
    /// Gaussian window width in bins.
    #[config(default = 1.0)]
    pub parzen_sigma: f64,
}

impl MutualInformationConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_histogram_bins(self.number_of_histogram_bins)?;
        validation::validate_parzen_sigma(self.parzen_sigma)
    }
}

/// B-spline control lattice sizing.
#[derive(Config, Debug, PartialEq)]
pub struct DeformationGridConfig {
    /// Target physical distance between control points.
    #[config(default = 50.0)]
    pub grid_physical_spacing: f64,
    /// Lower bound on grid cells along each axis before the mesh is derived.
    #[config(default = 3)]
    pub minimum_grid_cells: usize,
}

impl DeformationGridConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.grid_physical_spacing.is_finite() && self.grid_physical_spacing > 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "grid_physical_spacing must be positive, got {}",
                self.grid_physical_spacing
            )));
        }
        Ok(())
    }
}

/// Affine estimation: mean squares metric driven by gradient descent.
#[derive(Config, Debug, PartialEq)]
pub struct AffineRegistrationConfig {
    #[config(default = "SamplingConfig::new()")]
    pub sampling: SamplingConfig,
    #[config(default = "GradientDescentConfig::new()")]
    pub optimizer: GradientDescentConfig,
}

impl AffineRegistrationConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.sampling.validate()?;
        self.optimizer.validate()
    }
}

/// Deformable estimation: mutual information driven by L-BFGS-B.
#[derive(Config, Debug, PartialEq)]
pub struct DeformableRegistrationConfig {
    #[config(default = "SamplingConfig::new()")]
    pub sampling: SamplingConfig,
    #[config(default = "MutualInformationConfig::new()")]
    pub metric: MutualInformationConfig,
    #[config(default = "LbfgsbConfig::new()")]
    pub optimizer: LbfgsbConfig,
    #[config(default = "DeformationGridConfig::new()")]
    pub grid: DeformationGridConfig,
}

impl DeformableRegistrationConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.sampling.validate()?;
        self.metric.validate()?;
        self.optimizer.validate()?;
        self.grid.validate()
    }
}

/// Preset parameter sets for both estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterProfile {
    /// Short runs with unit scales and a learning rate estimated once.
    #[default]
    Baseline,
    /// Longer runs with physical-shift scales and an estimated learning rate.
    Refined,
}

impl ParameterProfile {
    pub fn affine(self) -> AffineRegistrationConfig {
        match self {
            Self::Baseline => AffineRegistrationConfig::new(),
            Self::Refined => AffineRegistrationConfig::new().with_optimizer(
                GradientDescentConfig::new()
                    .with_number_of_iterations(500)
                    .with_convergence_window_size(20)
                    .with_convergence_minimum_value(1e-3)
                    .with_scales(ParameterScales::PhysicalShift)
                    .with_learning_rate_mode(LearningRateMode::EstimateOnce),
            ),
        }
    }

    pub fn deformable(self) -> DeformableRegistrationConfig {
        match self {
            Self::Baseline => DeformableRegistrationConfig::new(),
            Self::Refined => DeformableRegistrationConfig::new()
                .with_optimizer(LbfgsbConfig::new().with_number_of_iterations(500)),
        }
    }
}

/// Per-call options shared by both estimators.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    /// Log the final metric value, stop condition and iteration count at
    /// `info` level instead of `debug`.
    pub verbose: bool,
    /// Callbacks notified on every optimizer iteration.
    pub progress: ProgressTracker,
}

impl RegistrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }
}
