//! Optimizer trait for parameter optimization.
//!
//! Optimizers minimize a [`CostFunction`] over a flat parameter vector. They
//! never touch transforms directly: the cost function turns a parameter
//! vector into a candidate transform, so the caller's template transform is
//! never modified.

use std::fmt;

use crate::error::{RegistrationError, Result};
use crate::progress::ProgressTracker;

/// Objective minimized by an [`Optimizer`].
pub trait CostFunction {
    /// Length of the parameter vector.
    fn num_parameters(&self) -> usize;

    /// Cost value and gradient at `parameters`.
    fn evaluate(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)>;

    /// Called by optimizers once an iteration has been accepted.
    ///
    /// Returns `true` when the objective itself changed (for example a new
    /// sample set was drawn), so values cached by the optimizer are stale.
    fn next_iteration(&mut self) -> bool {
        false
    }
}

/// Why an optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The windowed convergence value fell below its threshold.
    Converged,
    /// The projected gradient fell below its tolerance.
    GradientTolerance,
    /// The relative cost reduction fell below `factr * machine epsilon`.
    CostReduction,
    /// The iteration budget was exhausted.
    MaximumIterations,
    /// The cost evaluation budget was exhausted.
    MaximumEvaluations,
    /// No step along the search direction decreased the cost.
    LineSearchFailed,
    /// A step mapped every sample outside the moving image.
    NoOverlap,
    /// A step produced a non-finite cost or gradient.
    Diverged,
}

impl StopReason {
    /// Whether the optimizer reached one of its convergence criteria.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged | Self::GradientTolerance | Self::CostReduction)
    }

    /// Stop reason for a failed trial evaluation the run can end on, keeping
    /// its best parameters. `None` for errors that must abort the run.
    pub(crate) fn from_trial_error(error: &RegistrationError) -> Option<Self> {
        match error {
            RegistrationError::Metric(_) => Some(Self::NoOverlap),
            RegistrationError::NumericalInstability(_) => Some(Self::Diverged),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Converged => "convergence value below minimum",
            Self::GradientTolerance => "projected gradient below tolerance",
            Self::CostReduction => "relative cost reduction below factor",
            Self::MaximumIterations => "maximum number of iterations reached",
            Self::MaximumEvaluations => "maximum number of cost evaluations reached",
            Self::LineSearchFailed => "line search failed to decrease the cost",
            Self::NoOverlap => "step left no overlap with the moving image",
            Self::Diverged => "cost or gradient became non-finite",
        };
        f.write_str(text)
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    /// Parameters with the lowest cost seen.
    pub parameters: Vec<f64>,
    /// Cost at the initial parameters.
    pub initial_value: f64,
    /// Cost at `parameters`.
    pub final_value: f64,
    pub stop_reason: StopReason,
    /// Completed iterations.
    pub iterations: usize,
    /// Cost function evaluations, including the initial one.
    pub evaluations: usize,
}

/// Optimizer trait.
pub trait Optimizer {
    /// Minimize `cost` starting from `initial`.
    ///
    /// Failing to converge is not an error; see
    /// [`OptimizationReport::stop_reason`].
    fn minimize<C: CostFunction>(
        &self,
        cost: &mut C,
        initial: &[f64],
        progress: &ProgressTracker,
    ) -> Result<OptimizationReport>;

    /// Get the name of this optimizer.
    fn name(&self) -> &'static str;
}

/// Lowest cost seen during a run.
#[derive(Debug, Clone)]
pub(crate) struct BestSoFar {
    pub parameters: Vec<f64>,
    pub value: f64,
}

impl BestSoFar {
    pub fn new(parameters: &[f64], value: f64) -> Self {
        Self {
            parameters: parameters.to_vec(),
            value,
        }
    }

    pub fn offer(&mut self, parameters: &[f64], value: f64) {
        if value < self.value {
            self.value = value;
            self.parameters.clear();
            self.parameters.extend_from_slice(parameters);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_convergence() {
        assert!(StopReason::Converged.is_converged());
        assert!(StopReason::GradientTolerance.is_converged());
        assert!(!StopReason::MaximumIterations.is_converged());
        assert!(!StopReason::LineSearchFailed.is_converged());
        assert_eq!(
            StopReason::MaximumIterations.to_string(),
            "maximum number of iterations reached"
        );
    }

    #[test]
    fn test_trial_errors_map_to_stop_reasons() {
        assert_eq!(
            StopReason::from_trial_error(&RegistrationError::metric("no samples")),
            Some(StopReason::NoOverlap)
        );
        assert_eq!(
            StopReason::from_trial_error(&RegistrationError::numerical_instability("nan")),
            Some(StopReason::Diverged)
        );
        assert_eq!(
            StopReason::from_trial_error(&RegistrationError::invalid_configuration("bad")),
            None
        );
        assert!(!StopReason::NoOverlap.is_converged());
    }

    #[test]
    fn test_best_so_far_keeps_minimum() {
        let mut best = BestSoFar::new(&[0.0], 5.0);
        best.offer(&[1.0], 3.0);
        best.offer(&[2.0], 4.0);
        assert_eq!(best.value, 3.0);
        assert_eq!(best.parameters, vec![1.0]);
    }
}
