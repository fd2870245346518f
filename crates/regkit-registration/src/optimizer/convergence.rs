//! Windowed convergence monitoring.

use std::collections::VecDeque;

const EPSILON: f64 = 1e-12;

/// Tracks the running minimum of the cost over the last `window_size`
/// iterations.
///
/// Once the window is full, the convergence value is the relative drop of the
/// running minimum across the window:
/// `(best_at_window_start - best_now) / |best_now|`.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    window_size: usize,
    minimum_value: f64,
    running_minimum: VecDeque<f64>,
}

impl ConvergenceMonitor {
    pub fn new(window_size: usize, minimum_value: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            minimum_value,
            running_minimum: VecDeque::with_capacity(window_size + 1),
        }
    }

    /// Record the cost of the latest iteration.
    pub fn add(&mut self, value: f64) {
        let best = match self.running_minimum.back() {
            Some(&previous) if previous <= value => previous,
            _ => value,
        };
        self.running_minimum.push_back(best);
        while self.running_minimum.len() > self.window_size {
            self.running_minimum.pop_front();
        }
    }

    /// Relative improvement across the window, once it is full.
    pub fn convergence_value(&self) -> Option<f64> {
        if self.running_minimum.len() < self.window_size {
            return None;
        }
        let first = *self.running_minimum.front()?;
        let last = *self.running_minimum.back()?;
        Some((first - last).abs() / last.abs().max(EPSILON))
    }

    pub fn has_converged(&self) -> bool {
        self.convergence_value()
            .map(|value| value < self.minimum_value)
            .unwrap_or(false)
    }

    pub fn reset(&mut self) {
        self.running_minimum.clear();
    }
}
