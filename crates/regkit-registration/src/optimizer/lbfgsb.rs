//! L-BFGS-B Optimizer Implementation
//!
//! Limited-memory BFGS with simple box constraints. Search directions come
//! from the standard two-loop recursion; bounds are enforced by projecting
//! the direction onto the free variables and every trial point onto the box,
//! followed by a backtracking line search on the projected path.

use std::collections::VecDeque;

use nalgebra::DVector;

use super::trait_::{BestSoFar, CostFunction, OptimizationReport, Optimizer, StopReason};
use crate::config::LbfgsbConfig;
use crate::error::{RegistrationError, Result};
use crate::progress::ProgressTracker;
use crate::validation;

/// Sufficient decrease constant of the Armijo condition.
const ARMIJO_C1: f64 = 1e-4;
/// Step reduction factor of the backtracking line search.
const BACKTRACK_FACTOR: f64 = 0.5;
/// Trial steps per line search.
const MAX_LINE_SEARCH_STEPS: usize = 20;
/// Curvature pairs with `s.y` below this (relative to `y.y`) are skipped.
const CURVATURE_EPSILON: f64 = 2.2e-16;

/// Per-parameter box `[lower_i, upper_i]`; infinite entries are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
        }
    }

    /// Same bounds for every parameter.
    pub fn uniform(n: usize, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            lower: DVector::from_element(n, lower.unwrap_or(f64::NEG_INFINITY)),
            upper: DVector::from_element(n, upper.unwrap_or(f64::INFINITY)),
        }
    }

    /// Individual bounds per parameter.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(RegistrationError::invalid_configuration(format!(
                "lower ({}) and upper ({}) bounds differ in length",
                lower.len(),
                upper.len()
            )));
        }
        for (l, u) in lower.iter().zip(&upper) {
            validation::validate_bounds(Some(*l), Some(*u))?;
        }
        Ok(Self {
            lower: DVector::from_vec(lower),
            upper: DVector::from_vec(upper),
        })
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    fn project(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(x.len(), |i, _| x[i].clamp(self.lower[i], self.upper[i]))
    }

    /// Infinity norm of the projected gradient `P(x - g) - x`.
    fn projected_gradient_norm(&self, x: &DVector<f64>, g: &DVector<f64>) -> f64 {
        (0..x.len())
            .map(|i| ((x[i] - g[i]).clamp(self.lower[i], self.upper[i]) - x[i]).abs())
            .fold(0.0, f64::max)
    }

    /// Zero direction components that would push an active variable out of
    /// the box.
    fn restrict_direction(&self, x: &DVector<f64>, direction: &mut DVector<f64>) {
        for i in 0..x.len() {
            let at_lower = x[i] <= self.lower[i] && direction[i] < 0.0;
            let at_upper = x[i] >= self.upper[i] && direction[i] > 0.0;
            if at_lower || at_upper {
                direction[i] = 0.0;
            }
        }
    }
}

/// Correction pairs of the limited-memory Hessian approximation.
#[derive(Debug, Clone)]
struct CorrectionHistory {
    capacity: usize,
    pairs: VecDeque<(DVector<f64>, DVector<f64>, f64)>,
}

impl CorrectionHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pairs: VecDeque::with_capacity(capacity),
        }
    }

    /// Store `(s, y)` if it satisfies the curvature condition.
    fn push(&mut self, s: DVector<f64>, y: DVector<f64>) {
        let sy = s.dot(&y);
        if sy <= CURVATURE_EPSILON * y.norm_squared() {
            return;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((s, y, 1.0 / sy));
    }

    fn clear(&mut self) {
        self.pairs.clear();
    }

    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Two-loop recursion: approximate `H^{-1} g`.
    fn apply_inverse_hessian(&self, g: &DVector<f64>) -> DVector<f64> {
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(self.pairs.len());

        for (s, y, rho) in self.pairs.iter().rev() {
            let alpha = rho * s.dot(&q);
            q.axpy(-alpha, y, 1.0);
            alphas.push(alpha);
        }

        // gamma = (s_{k-1}^T y_{k-1}) / (y_{k-1}^T y_{k-1})
        if let Some((s, y, _)) = self.pairs.back() {
            q *= s.dot(y) / y.norm_squared();
        }

        for ((s, y, rho), alpha) in self.pairs.iter().zip(alphas.iter().rev()) {
            let beta = rho * y.dot(&q);
            q.axpy(alpha - beta, s, 1.0);
        }
        q
    }
}

/// Bounded limited-memory quasi-Newton optimizer.
#[derive(Debug, Clone)]
pub struct Lbfgsb {
    config: LbfgsbConfig,
    bounds: Option<Bounds>,
}

impl Lbfgsb {
    pub fn new(config: LbfgsbConfig) -> Self {
        Self { config, bounds: None }
    }

    /// Per-parameter bounds; overrides the uniform bounds of the config.
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn config(&self) -> &LbfgsbConfig {
        &self.config
    }

    fn bounds_for(&self, n: usize) -> Result<Bounds> {
        match &self.bounds {
            Some(bounds) if bounds.len() != n => Err(RegistrationError::invalid_configuration(format!(
                "expected bounds for {} parameters, got {}",
                n,
                bounds.len()
            ))),
            Some(bounds) => Ok(bounds.clone()),
            None => Ok(Bounds::uniform(n, self.config.lower_bound, self.config.upper_bound)),
        }
    }
}

/// Evaluate `cost`, converting to nalgebra vectors and counting evaluations.
fn evaluate<C: CostFunction>(cost: &mut C, x: &DVector<f64>, evaluations: &mut usize) -> Result<(f64, DVector<f64>)> {
    *evaluations += 1;
    let (value, gradient) = cost.evaluate(x.as_slice())?;
    validation::validate_finite("cost", &[value])?;
    validation::validate_finite("gradient", &gradient)?;
    if gradient.len() != x.len() {
        return Err(RegistrationError::optimizer(format!(
            "cost returned {} gradient components for {} parameters",
            gradient.len(),
            x.len()
        )));
    }
    Ok((value, DVector::from_vec(gradient)))
}

/// Like [`evaluate`], but recoverable failures come back as a stop reason.
fn evaluate_trial<C: CostFunction>(
    cost: &mut C,
    x: &DVector<f64>,
    evaluations: &mut usize,
) -> Result<std::result::Result<(f64, DVector<f64>), StopReason>> {
    match evaluate(cost, x, evaluations) {
        Ok(evaluation) => Ok(Ok(evaluation)),
        Err(error) => match StopReason::from_trial_error(&error) {
            Some(reason) => {
                tracing::debug!(%error, "L-BFGS-B trial rejected");
                Ok(Err(reason))
            }
            None => Err(error),
        },
    }
}

impl Optimizer for Lbfgsb {
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
        let bounds = self.bounds_for(n)?;
        let total = self.config.number_of_iterations;
        let max_evaluations = self.config.maximum_number_of_function_evaluations;
        let factr_tolerance = self.config.cost_function_convergence_factor * f64::EPSILON;

        let mut evaluations = 0;
        let mut x = bounds.project(&DVector::from_column_slice(initial));
        let (initial_value, mut g) = evaluate(cost, &x, &mut evaluations)?;
        let mut f = initial_value;
        let mut best = BestSoFar::new(x.as_slice(), f);
        let mut history = CorrectionHistory::new(self.config.maximum_number_of_corrections);

        let run = progress.start();
        let mut iterations = 0;
        let mut stop_reason = if bounds.projected_gradient_norm(&x, &g) <= self.config.gradient_convergence_tolerance {
            Some(StopReason::GradientTolerance)
        } else {
            None
        };

        while stop_reason.is_none() {
            if iterations >= total {
                stop_reason = Some(StopReason::MaximumIterations);
                break;
            }

            let mut direction = -history.apply_inverse_hessian(&g);
            bounds.restrict_direction(&x, &mut direction);
            let mut slope = g.dot(&direction);
            if slope >= 0.0 || history.is_empty() {
                // Steepest descent restart, scaled to a unit first step.
                history.clear();
                direction = -g.clone();
                bounds.restrict_direction(&x, &mut direction);
                slope = g.dot(&direction);
                let norm = direction.norm();
                if norm > 0.0 {
                    direction /= norm.max(1.0);
                    slope = g.dot(&direction);
                }
            }
            if slope >= 0.0 {
                stop_reason = Some(StopReason::GradientTolerance);
                break;
            }

            // Backtracking line search along the projected path.
            let mut step = 1.0;
            let mut accepted = None;
            let mut trial_failure = None;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                if evaluations >= max_evaluations {
                    break;
                }
                let trial = bounds.project(&(&x + &direction * step));
                match evaluate_trial(cost, &trial, &mut evaluations)? {
                    Ok((trial_f, trial_g)) => {
                        best.offer(trial.as_slice(), trial_f);
                        if trial_f <= f + ARMIJO_C1 * g.dot(&(&trial - &x)) {
                            accepted = Some((trial, trial_f, trial_g, step));
                            break;
                        }
                        trial_failure = None;
                    }
                    Err(reason) => trial_failure = Some(reason),
                }
                step *= BACKTRACK_FACTOR;
            }

            let Some((x_new, f_new, g_new, step)) = accepted else {
                stop_reason = Some(if evaluations >= max_evaluations {
                    StopReason::MaximumEvaluations
                } else {
                    trial_failure.unwrap_or(StopReason::LineSearchFailed)
                });
                break;
            };

            iterations += 1;
            history.push(&x_new - &x, &g_new - &g);
            let reduction = (f - f_new) / f.abs().max(f_new.abs()).max(1.0);
            x = x_new;
            f = f_new;
            g = g_new;

            run.update(iterations, Some(total), f, step);
            tracing::debug!(iteration = iterations, value = f, step, "L-BFGS-B iteration");

            // Values from different objectives are not comparable: restart
            // f, g and the best point. Stored pairs each span one objective.
            if cost.next_iteration() {
                match evaluate_trial(cost, &x, &mut evaluations)? {
                    Ok((value, gradient)) => {
                        f = value;
                        g = gradient;
                        best = BestSoFar::new(x.as_slice(), f);
                    }
                    Err(reason) => {
                        stop_reason = Some(reason);
                        break;
                    }
                }
            }

            if bounds.projected_gradient_norm(&x, &g) <= self.config.gradient_convergence_tolerance {
                stop_reason = Some(StopReason::GradientTolerance);
            } else if reduction <= factr_tolerance {
                stop_reason = Some(StopReason::CostReduction);
            } else if evaluations >= max_evaluations {
                stop_reason = Some(StopReason::MaximumEvaluations);
            }
        }

        let stop_reason = stop_reason.unwrap_or(StopReason::MaximumIterations);
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
        "LBFGSB"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::trait_::test_costs::{Quadratic, Rosenbrock, Walled};

    /// Quadratic whose constant term grows every iteration, like a cost that
    /// redraws its samples.
    struct Drifting {
        inner: Quadratic,
        redraws: usize,
    }

    impl CostFunction for Drifting {
        fn num_parameters(&self) -> usize {
            self.inner.num_parameters()
        }

        fn evaluate(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
            self.inner.evaluate(parameters)
        }

        fn next_iteration(&mut self) -> bool {
            self.redraws += 1;
            self.inner.offset += 10.0;
            true
        }
    }

    #[test]
    fn test_lbfgsb_quadratic() {
        let mut cost = Quadratic::new(vec![1.0, -2.0, 3.0], vec![1.0, 10.0, 0.5]);
        let optimizer = Lbfgsb::new(LbfgsbConfig::new().with_number_of_iterations(100));
        let report = optimizer.minimize(&mut cost, &[0.0; 3], &ProgressTracker::new()).unwrap();

        for (p, c) in report.parameters.iter().zip([1.0, -2.0, 3.0]) {
            assert!((p - c).abs() < 1e-3, "{:?}", report.parameters);
        }
        assert!(report.stop_reason.is_converged(), "{:?}", report.stop_reason);
        assert!(report.evaluations <= 500);
    }

    #[test]
    fn test_lbfgsb_rosenbrock() {
        let mut cost = Rosenbrock;
        let optimizer = Lbfgsb::new(
            LbfgsbConfig::new()
                .with_number_of_iterations(500)
                .with_maximum_number_of_function_evaluations(5000)
                .with_cost_function_convergence_factor(0.0),
        );
        let report = optimizer.minimize(&mut cost, &[-1.2, 1.0], &ProgressTracker::new()).unwrap();
        assert!((report.parameters[0] - 1.0).abs() < 1e-2, "{:?}", report);
        assert!((report.parameters[1] - 1.0).abs() < 2e-2, "{:?}", report);
        assert!(report.final_value < report.initial_value);
    }

    #[test]
    fn test_lbfgsb_respects_bounds() {
        // Unconstrained minimum at (3, -2); box caps x at 1 and y at -1.
        let mut cost = Quadratic::new(vec![3.0, -2.0], vec![1.0, 1.0]);
        let optimizer = Lbfgsb::new(LbfgsbConfig::new().with_number_of_iterations(100))
            .with_bounds(Bounds::new(vec![-5.0, -1.0], vec![1.0, 5.0]).unwrap());
        let report = optimizer.minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new()).unwrap();

        assert!((report.parameters[0] - 1.0).abs() < 1e-8);
        assert!((report.parameters[1] + 1.0).abs() < 1e-8);
        assert_eq!(report.stop_reason, StopReason::GradientTolerance);
    }

    #[test]
    fn test_lbfgsb_uniform_bounds_from_config() {
        let mut cost = Quadratic::new(vec![3.0, 3.0], vec![1.0, 1.0]);
        let optimizer = Lbfgsb::new(LbfgsbConfig::new().with_upper_bound(Some(2.0)));
        let report = optimizer.minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new()).unwrap();
        assert!(report.parameters.iter().all(|&p| (p - 2.0).abs() < 1e-8));
    }

    #[test]
    fn test_lbfgsb_stationary_start() {
        let mut cost = Quadratic::new(vec![0.5], vec![1.0]);
        let report = Lbfgsb::new(LbfgsbConfig::new())
            .minimize(&mut cost, &[0.5], &ProgressTracker::new())
            .unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.evaluations, 1);
        assert_eq!(report.stop_reason, StopReason::GradientTolerance);
    }

    #[test]
    fn test_lbfgsb_evaluation_budget() {
        let mut cost = Rosenbrock;
        let optimizer = Lbfgsb::new(
            LbfgsbConfig::new()
                .with_number_of_iterations(1000)
                .with_maximum_number_of_function_evaluations(10),
        );
        let report = optimizer.minimize(&mut cost, &[-1.2, 1.0], &ProgressTracker::new()).unwrap();
        assert!(report.evaluations <= 10);
        assert_eq!(report.stop_reason, StopReason::MaximumEvaluations);
    }

    #[test]
    fn test_bounds_length_mismatch() {
        assert!(Bounds::new(vec![0.0], vec![1.0, 2.0]).is_err());
        let mut cost = Quadratic::new(vec![1.0, 1.0], vec![1.0, 1.0]);
        let optimizer = Lbfgsb::new(LbfgsbConfig::new()).with_bounds(Bounds::unbounded(3));
        assert!(optimizer.minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new()).is_err());
    }

    #[test]
    fn test_lbfgsb_backtracks_from_failed_trials() {
        // Minimum at 3 lies beyond the valid region |x| <= 2.5. Full steps
        // land on 3 and fail; halved steps reach 2, then 2.5, after which
        // every trial is outside.
        let mut cost = Walled::new(Quadratic::new(vec![3.0], vec![1.0]), 2.5);
        let report = Lbfgsb::new(LbfgsbConfig::new())
            .minimize(&mut cost, &[0.0], &ProgressTracker::new())
            .unwrap();

        assert_eq!(report.stop_reason, StopReason::NoOverlap);
        assert_eq!(report.parameters, vec![2.5]);
        assert_eq!(report.final_value, 0.25);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.evaluations, 1 + 1 + 2 + 2 + MAX_LINE_SEARCH_STEPS);
        assert_eq!(cost.iterations_seen, 3);
    }

    #[test]
    fn test_lbfgsb_reevaluates_after_objective_change() {
        let mut cost = Drifting {
            inner: Quadratic::new(vec![3.0, -2.0], vec![1.0, 1.0]),
            redraws: 0,
        };
        let report = Lbfgsb::new(LbfgsbConfig::new())
            .minimize(&mut cost, &[0.0, 0.0], &ProgressTracker::new())
            .unwrap();

        assert!((report.parameters[0] - 3.0).abs() < 1e-3, "{:?}", report);
        assert!((report.parameters[1] + 2.0).abs() < 1e-3, "{:?}", report);
        assert!(cost.redraws >= 1);
        assert_eq!(report.evaluations, cost.inner.evaluations);
        // One extra evaluation per redraw.
        assert!(report.evaluations >= report.iterations + cost.redraws + 1);
    }
}
