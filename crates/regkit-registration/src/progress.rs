//! Progress tracking and callbacks for registration workflows.
//!
//! Optimizers report every iteration to a [`ProgressTracker`], which fans the
//! information out to the registered [`ProgressCallback`]s.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::optimizer::StopReason;

/// Progress information for one optimizer iteration.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current iteration number (1-based).
    pub iteration: usize,
    /// Iteration budget of the optimizer.
    pub total_iterations: Option<usize>,
    /// Cost value after this iteration.
    pub value: f64,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time.
    pub estimated_remaining: Option<Duration>,
    /// Step length taken in this iteration.
    pub step_size: f64,
    /// Why the optimizer stopped; only set on completion.
    pub stop_reason: Option<StopReason>,
}

impl ProgressInfo {
    /// Create new progress information.
    pub fn new(
        iteration: usize,
        total_iterations: Option<usize>,
        value: f64,
        elapsed: Duration,
        step_size: f64,
    ) -> Self {
        Self {
            iteration,
            total_iterations,
            value,
            elapsed,
            estimated_remaining: None,
            step_size,
            stop_reason: None,
        }
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> Option<f64> {
        self.total_iterations
            .filter(|&total| total > 0)
            .map(|total| (self.iteration as f64 / total as f64) * 100.0)
    }

    /// Calculate estimated remaining time.
    pub fn calculate_remaining(&mut self) {
        if let Some(total) = self.total_iterations {
            if self.iteration > 0 {
                let avg_time_per_iter = self.elapsed.as_secs_f64() / self.iteration as f64;
                let remaining_iters = total.saturating_sub(self.iteration);
                self.estimated_remaining = Some(Duration::from_secs_f64(avg_time_per_iter * remaining_iters as f64));
            }
        }
    }
}

/// Progress callback trait for monitoring registration progress.
pub trait ProgressCallback: Send + Sync {
    /// Called at each iteration with progress information.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when the optimizer starts.
    fn on_start(&self) {}

    /// Called when the optimizer stops, converged or not.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when registration fails.
    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (iterations).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval == 0 || info.total_iterations == Some(info.iteration) {
            let progress = info.progress_percent().unwrap_or(0.0);
            let remaining = info
                .estimated_remaining
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());

            tracing::info!(
                "Iter {}/{} ({:.1}%) | Value: {:.6} | Step: {:.2e} | Elapsed: {:.2}s | ETA: {}",
                info.iteration,
                info.total_iterations.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
                progress,
                info.value,
                info.step_size,
                info.elapsed.as_secs_f64(),
                remaining
            );
        }
    }

    fn on_start(&self) {
        tracing::info!("Optimization started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Optimization stopped after {} iterations in {:.2}s with value {:.6} ({})",
            info.iteration,
            info.elapsed.as_secs_f64(),
            info.value,
            info.stop_reason.map(|r| r.to_string()).unwrap_or_else(|| "unknown".to_string())
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Registration failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
    completed: Arc<Mutex<Option<ProgressInfo>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded per-iteration history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    /// Information passed to `on_complete`, if the optimizer has finished.
    pub fn completion(&self) -> Option<ProgressInfo> {
        lock(&self.completed).clone()
    }

    /// Clear the history.
    pub fn clear(&self) {
        lock(&self.history).clear();
        *lock(&self.completed) = None;
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }

    fn on_complete(&self, info: &ProgressInfo) {
        *lock(&self.completed) = Some(info.clone());
    }
}

/// Progress tracker that manages multiple callbacks.
///
/// Clones share the callbacks but not the timing: each optimizer run gets its
/// own [`ProgressRun`] from [`start`](Self::start).
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Builder form of [`add_callback`](Self::add_callback).
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Start tracking one run.
    pub fn start(&self) -> ProgressRun<'_> {
        for callback in &self.callbacks {
            callback.on_start();
        }
        ProgressRun {
            tracker: self,
            started: Instant::now(),
        }
    }

    /// Report error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

/// A single optimizer run reporting to a [`ProgressTracker`].
#[derive(Debug)]
pub struct ProgressRun<'a> {
    tracker: &'a ProgressTracker,
    started: Instant,
}

impl ProgressRun<'_> {
    /// Time since [`ProgressTracker::start`].
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Update progress.
    pub fn update(&self, iteration: usize, total_iterations: Option<usize>, value: f64, step_size: f64) {
        if self.tracker.callbacks.is_empty() {
            return;
        }
        let mut info = ProgressInfo::new(iteration, total_iterations, value, self.elapsed(), step_size);
        info.calculate_remaining();

        for callback in &self.tracker.callbacks {
            callback.on_progress(&info);
        }
    }

    /// Complete tracking.
    pub fn complete(self, iterations: usize, final_value: f64, stop_reason: StopReason) {
        let mut info = ProgressInfo::new(iterations, Some(iterations), final_value, self.elapsed(), 0.0);
        info.stop_reason = Some(stop_reason);

        for callback in &self.tracker.callbacks {
            callback.on_complete(&info);
        }
    }
}

/// Lock a callback mutex; a panicking callback does not poison the history.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_info() {
        let info = ProgressInfo::new(10, Some(100), 0.5, Duration::from_secs(10), 0.01);
        assert_eq!(info.iteration, 10);
        assert_eq!(info.value, 0.5);
        assert_eq!(info.progress_percent(), Some(10.0));
    }

    #[test]
    fn test_progress_info_remaining() {
        let mut info = ProgressInfo::new(10, Some(100), 0.5, Duration::from_secs(10), 0.01);
        info.calculate_remaining();
        let remaining = info.estimated_remaining.unwrap();
        assert!((remaining.as_secs_f64() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_history_callback() {
        let callback = HistoryCallback::new();
        callback.on_progress(&ProgressInfo::new(1, Some(10), 0.5, Duration::ZERO, 0.01));
        callback.on_progress(&ProgressInfo::new(2, Some(10), 0.4, Duration::ZERO, 0.01));

        let history = callback.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].iteration, 1);
        assert_eq!(history[1].iteration, 2);

        callback.clear();
        assert!(callback.get_history().is_empty());
    }

    #[test]
    fn test_progress_tracker() {
        let history = Arc::new(HistoryCallback::new());
        let tracker = ProgressTracker::new()
            .with_callback(history.clone())
            .with_callback(Arc::new(ConsoleProgressCallback::new(1)));
        let run = tracker.start();
        run.update(1, Some(10), 0.5, 0.01);
        run.update(2, Some(10), 0.4, 0.01);
        run.complete(2, 0.4, StopReason::MaximumIterations);

        assert_eq!(history.get_history().len(), 2);
        let done = history.completion().unwrap();
        assert_eq!(done.iteration, 2);
        assert_eq!(done.stop_reason, Some(StopReason::MaximumIterations));
    }

    #[test]
    fn test_cloned_trackers_time_runs_independently() {
        let history = Arc::new(HistoryCallback::new());
        let tracker = ProgressTracker::new().with_callback(history.clone());
        let clone = tracker.clone();

        let early = tracker.start();
        std::thread::sleep(Duration::from_millis(30));
        let late = clone.start();

        // Starting a run on the clone must not reset the first run's clock.
        assert!(early.elapsed() >= Duration::from_millis(30));
        assert!(late.elapsed() < early.elapsed());

        late.update(1, Some(2), 1.0, 0.1);
        early.update(1, Some(2), 2.0, 0.1);
        let history = history.get_history();
        assert_eq!(history.len(), 2);
        assert!(history[1].elapsed >= Duration::from_millis(30));
    }
}
