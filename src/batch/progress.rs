//! Progress reporting for batch runs.
//!
//! Holds the running-mean duration estimator and the [`BatchProgress`]
//! snapshot handed to progress subscribers, together with the helpers that
//! compute percentages, estimate remaining time and format progress lines.

use std::time::Duration;

use super::task::TaskDescriptor;

/// Running mean of completed-task durations.
///
/// `mean_n = mean_{n-1} + (x_n - mean_{n-1}) / n`, O(1) memory and stable for
/// any number of samples.
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    samples: u64,
    mean_secs: f64,
}

impl ProgressEstimator {
    /// Create an estimator with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one task duration into the mean.
    pub fn record(&mut self, duration: Duration) {
        self.samples = self.samples.saturating_add(1);
        let x = duration.as_secs_f64();
        self.mean_secs += (x - self.mean_secs) / self.samples as f64;
    }

    /// Number of recorded samples.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Current mean, `None` before the first sample.
    pub fn mean(&self) -> Option<Duration> {
        if self.samples == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(self.mean_secs.max(0.0)))
    }

    /// Mean multiplied by `remaining`, `None` before the first sample.
    pub fn estimate(&self, remaining: usize) -> Option<Duration> {
        let mean = self.mean()?;
        Some(Duration::from_secs_f64(
            mean.as_secs_f64() * remaining as f64,
        ))
    }
}

/// Snapshot emitted to progress subscribers.
///
/// One snapshot is emitted immediately before each task starts (reflecting
/// the state before that task) and one when the run drains.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress<A, B> {
    /// Tasks that reached a terminal outcome
    pub completed: usize,
    /// Tasks in the batch
    pub total: usize,
    /// `completed / total` rounded to a whole percent (100 for empty batches)
    pub percentage: u8,
    /// Task about to start; `None` on the final snapshot of a run
    pub current: Option<TaskDescriptor<A, B>>,
    /// Tasks that succeeded so far
    pub success_count: usize,
    /// Tasks that failed so far
    pub failure_count: usize,
    /// Mean task duration times remaining tasks, once a task has completed
    pub estimated_remaining: Option<Duration>,
}

impl<A, B> BatchProgress<A, B> {
    /// Whole-percent completion, clamped to 0..=100.
    pub fn percentage_of(completed: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        let pct = (completed as f64 / total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Tasks not yet completed.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

impl<A: std::fmt::Display, B: std::fmt::Display> BatchProgress<A, B> {
    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} tasks - {}% complete",
            self.completed, self.total, self.percentage
        )];

        parts.push(format!(
            "({} ok, {} failed)",
            self.success_count, self.failure_count
        ));

        if let Some(task) = &self.current {
            parts.push(format!("- starting {task}"));
        }

        if let Some(remaining) = self.estimated_remaining {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// Compact duration label (`42s`, `7m`, `1.5h`).
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
