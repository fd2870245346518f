//! Optimizer module.
//!
//! Optimizers work on flat `f64` parameter vectors through the
//! [`CostFunction`] trait, so the same implementations drive affine and
//! B-spline estimation.

pub mod convergence;
pub mod gradient_descent;
pub mod lbfgsb;
pub mod trait_;

pub use convergence::ConvergenceMonitor;
pub use gradient_descent::{GradientDescent, StepEstimator};
pub use lbfgsb::{Bounds, Lbfgsb};
pub use trait_::{CostFunction, OptimizationReport, Optimizer, StopReason};
