//! Gradient descent optimizer.
//!
//! Update rule: `p <- p - lr * g / scales`, with an optional one-off learning
//! rate estimate and windowed convergence monitoring.

use super::convergence::ConvergenceMonitor;
use super::trait_::{BestSoFar, CostFunction, OptimizationReport, Optimizer, StopReason};
use crate::config::{GradientDescentConfig, LearningRateMode};
use crate::error::{RegistrationError, Result};
use crate::progress::ProgressTracker;
use crate::validation;

/// Measures how far a parameter step moves points in physical space.
pub trait StepEstimator {
    /// Largest physical displacement caused by moving from `parameters` to
    /// `parameters + step`.
    fn maximum_shift(&self, parameters: &[f64], step: &[f64]) -> f64;
}

/// Gradient descent with per-parameter scales.
pub struct GradientDescent<'a> {
    config: GradientDescentConfig,
    scales: Option<Vec<f64>>,
    maximum_step_size: f64,
    estimator: Option<&'a dyn StepEstimator>,
}

impl<'a> GradientDescent<'a> {
    pub fn new(config: GradientDescentConfig) -> Self {
        let maximum_step_size = config.maximum_step_size.unwrap_or(1.0);
        Self {
            config,
            scales: None,
            maximum_step_size,
            estimator: None,
        }
    }

    /// Divide each gradient component by the matching scale.
    pub fn with_scales(mut self, scales: Vec<f64>) -> Self {
        self.scales = Some(scales);
        self
    }

    /// Step estimator used when the learning rate is estimated.
    pub fn with_step_estimator(mut self, estimator: &'a dyn StepEstimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Target displacement of the first step when the learning rate is
    /// estimated. A value in the configuration takes precedence.
    pub fn with_default_maximum_step_size(mut self, step: f64) -> Self {
        self.maximum_step_size = self.config.maximum_step_size.unwrap_or(step);
        self
    }

    pub fn config(&self) -> &GradientDescentConfig {
        &self.config
    }

    fn scales_for(&self, n: usize) -> Result<Vec<f64>> {
        match &self.scales {
            Some(scales) if scales.len() != n => Err(RegistrationError::invalid_configuration(format!(
                "expected {} parameter scales, got {}",
                n,
                scales.len()
            ))),
            Some(scales) => {
                if scales.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                    return Err(RegistrationError::invalid_configuration(
                        "parameter scales must be positive and finite",
                    ));
                }
                Ok(scales.clone())
            }
            None => Ok(vec![1.0; n]),
        }
    }

    /// Learning rate that moves no point further than the maximum step size
    /// on the first step.
    fn estimate_learning_rate(&self, parameters: &[f64], gradient: &[f64], scales: &[f64]) -> Result<f64> {
        let estimator = self.estimator.ok_or_else(|| {
            RegistrationError::invalid_configuration("learning rate estimation requires a step estimator")
        })?;
        let step: Vec<f64> = gradient.iter().zip(scales).map(|(g, s)| g / s).collect();
        let shift = estimator.maximum_shift(parameters, &step);
        if shift.is_finite() && shift > f64::EPSILON {
            Ok(self.maximum_step_size / shift)
        } else {
            Ok(self.config.learning_rate)
        }
    }
}

impl Optimizer for GradientDescent<'_> {
    fn minimize<C: CostFunction>(
        &self,
        cost: &mut C,
        initial: &[f64],
        progress: &ProgressTracker,
    ) -> Result<OptimizationReport> {
        self.config.validate()?;
        let n = cost.num_parameters();
        if initial.len() != n {
            return Err(RegistrationError::optimizer(format!(
                "expected {} initial parameters, got {}",
                n,
                initial.len()
            )));
        }
        let scales = self.scales_for(n)?;
        let total = self.config.number_of_iterations;

        let mut parameters = initial.to_vec();
        let (initial_value, mut gradient) = cost.evaluate(&parameters)?;
        validation::validate_finite("cost", &[initial_value])?;
        validation::validate_finite("gradient", &gradient)?;
        let mut evaluations = 1;
        let mut best = BestSoFar::new(&parameters, initial_value);
        let mut monitor = ConvergenceMonitor::new(
            self.config.convergence_window_size,
            self.config.convergence_minimum_value,
        );

        let learning_rate = match self.config.learning_rate_mode {
            LearningRateMode::Fixed => self.config.learning_rate,
            LearningRateMode::EstimateOnce => self.estimate_learning_rate(&parameters, &gradient, &scales)?,
        };
        tracing::debug!(learning_rate, parameters = n, "Gradient descent started");

        let run = progress.start();
        let mut stop_reason = StopReason::MaximumIterations;
        let mut iterations = 0;
        for iteration in 1..=total {
            for ((p, g), s) in parameters.iter_mut().zip(&gradient).zip(&scales) {
                *p -= learning_rate * g / s;
            }

            evaluations += 1;
            let (value, next_gradient) = match cost.evaluate(&parameters) {
                Ok(evaluation) => evaluation,
                Err(error) => match StopReason::from_trial_error(&error) {
                    Some(reason) => {
                        tracing::warn!(iteration, %error, "Gradient descent stopped on a failed step");
                        stop_reason = reason;
                        break;
                    }
                    None => return Err(error),
                },
            };
            if !value.is_finite() || next_gradient.iter().any(|g| !g.is_finite()) {
                tracing::warn!(iteration, value, "Gradient descent diverged");
                stop_reason = StopReason::Diverged;
                break;
            }
            iterations = iteration;
            gradient = next_gradient;

            best.offer(&parameters, value);
            monitor.add(value);
            run.update(iteration, Some(total), value, learning_rate);
            tracing::debug!(iteration, value, "Gradient descent iteration");

            if monitor.has_converged() {
                stop_reason = StopReason::Converged;
                break;
            }
            cost.next_iteration();
        }
        run.complete(iterations, best.value, stop_reason);

        Ok(OptimizationReport {
            parameters: best.parameters,
            initial_value,
            final_value: best.value,
            stop_reason,
            iterations,
            evaluations,
        })
    }

    fn name(&self) -> &'static str {
        "GradientDescent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::trait_::test_costs::{Quadratic, Walled};

    fn fixed_rate(learning_rate: f64) -> GradientDescentConfig {
        GradientDescentConfig::new()
            .with_learning_rate_mode(LearningRateMode::Fixed)
            .with_learning_rate(learning_rate)
    }

    struct EuclideanShift;

    impl StepEstimator for EuclideanShift {
        fn maximum_shift(&self, _parameters: &[f64], step: &[f64]) -> f64 {
            step.iter().map(|s| s * s).sum::<f64>().sqrt()
        }
    }

    #[test]
    fn test_gradient_descent_quadratic() {
        let mut cost = Quadratic::new(vec![3.0, -2.0], vec![1.0, 1.0]);
        let optimizer = GradientDescent::new(
            fixed_rate(0.1)
                .with_number_of_iterations(200),
        );
        let report = optimizer.minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new()).unwrap();

        assert!((report.parameters[0] - 3.0).abs() < 1e-3);
        assert!((report.parameters[1] + 2.0).abs() < 1e-3);
        assert_eq!(report.initial_value, 13.0);
        assert!(report.final_value < 1e-6);
        assert_eq!(report.evaluations, report.iterations + 1);
        assert_eq!(report.evaluations, cost.evaluations);
    }

    #[test]
    fn test_gradient_descent_converges_before_budget() {
        let mut cost = Quadratic::new(vec![1.0], vec![1.0]).with_offset(1.0);
        let optimizer = GradientDescent::new(
            fixed_rate(0.25)
                .with_number_of_iterations(1000)
                .with_convergence_window_size(5),
        );
        let report = optimizer.minimize(&mut cost, &[0.0], &ProgressTracker::new()).unwrap();
        assert_eq!(report.stop_reason, StopReason::Converged);
        assert!(report.iterations < 1000);
    }

    #[test]
    fn test_scales_equalize_anisotropic_quadratic() {
        // Without scales the stiff axis would diverge at lr = 0.4.
        let mut cost = Quadratic::new(vec![1.0, 1.0], vec![1.0, 100.0]);
        let optimizer = GradientDescent::new(
            fixed_rate(0.4)
                .with_number_of_iterations(100),
        )
        .with_scales(vec![1.0, 100.0]);
        let report = optimizer.minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new()).unwrap();
        assert!((report.parameters[0] - 1.0).abs() < 1e-4);
        assert!((report.parameters[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_returns_best_parameters_when_diverging() {
        let mut cost = Quadratic::new(vec![1.0], vec![1.0]);
        let optimizer = GradientDescent::new(
            fixed_rate(1.5)
                .with_number_of_iterations(5),
        );
        let report = optimizer.minimize(&mut cost, &[0.0], &ProgressTracker::new()).unwrap();
        // Every step overshoots further; the start is the best point seen.
        assert_eq!(report.parameters, vec![0.0]);
        assert_eq!(report.final_value, report.initial_value);
        assert_eq!(report.stop_reason, StopReason::MaximumIterations);
    }

    #[test]
    fn test_estimated_learning_rate_limits_first_step() {
        let mut cost = Quadratic::new(vec![100.0], vec![1.0]);
        let estimator = EuclideanShift;
        let optimizer = GradientDescent::new(
            GradientDescentConfig::new().with_number_of_iterations(1),
        )
        .with_step_estimator(&estimator)
        .with_default_maximum_step_size(2.0);
        let report = optimizer.minimize(&mut cost, &[0.0], &ProgressTracker::new()).unwrap();
        assert!((report.parameters[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimation_without_estimator_fails() {
        let mut cost = Quadratic::new(vec![1.0], vec![1.0]);
        let optimizer = GradientDescent::new(GradientDescentConfig::new());
        let result = optimizer.minimize(&mut cost, &[0.0], &ProgressTracker::new());
        assert!(matches!(result, Err(RegistrationError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_wrong_scale_count_is_rejected() {
        let mut cost = Quadratic::new(vec![1.0, 1.0], vec![1.0, 1.0]);
        let optimizer = GradientDescent::new(fixed_rate(1.0)).with_scales(vec![1.0]);
        assert!(optimizer.minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new()).is_err());
    }

    #[test]
    fn test_step_without_overlap_keeps_best_parameters() {
        // lr = 1.1 on (x - 5)^2 flips and grows the offset by 1.2 each step:
        // x = 11, -2.2, 13.64, -5.37, 17.44, -9.93, then 22.9 hits the wall.
        let mut cost = Walled::new(Quadratic::new(vec![5.0], vec![1.0]), 20.0);
        let optimizer = GradientDescent::new(fixed_rate(1.1).with_number_of_iterations(50));
        let report = optimizer.minimize(&mut cost, &[0.0], &ProgressTracker::new()).unwrap();

        assert_eq!(report.stop_reason, StopReason::NoOverlap);
        assert_eq!(report.iterations, 6);
        assert_eq!(report.evaluations, 8);
        assert_eq!(report.evaluations, cost.inner.evaluations);
        assert_eq!(report.parameters, vec![0.0]);
        assert_eq!(report.final_value, 25.0);
        assert_eq!(cost.iterations_seen, 6);
    }
}
