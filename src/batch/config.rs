//! Batch configuration

use crate::retry::ConfigError;

/// Default number of concurrently executing tasks.
pub const DEFAULT_PARALLEL_LIMIT: usize = 5;

/// Upper bound accepted by the CLI to avoid self-inflicted rate limiting.
pub const MAX_PARALLEL_LIMIT: usize = 32;

/// Everything needed to expand and schedule one batch.
///
/// Created by the caller before a run and never mutated during it.
#[derive(Debug, Clone)]
pub struct BatchConfig<A, B, O> {
    /// Outer dimension (e.g. categories)
    pub dimensions_a: Vec<A>,
    /// Inner dimension (e.g. topics)
    pub dimensions_b: Vec<B>,
    /// Maximum number of tasks executing at once
    pub parallel_limit: usize,
    /// Opaque options handed to the collaborator for every task
    pub options: O,
}

impl<A, B, O> BatchConfig<A, B, O> {
    /// Create a config with the default parallel limit.
    pub fn new(dimensions_a: Vec<A>, dimensions_b: Vec<B>, options: O) -> Self {
        Self {
            dimensions_a,
            dimensions_b,
            parallel_limit: DEFAULT_PARALLEL_LIMIT,
            options,
        }
    }

    /// Override the parallel limit
    pub fn with_parallel_limit(mut self, parallel_limit: usize) -> Self {
        self.parallel_limit = parallel_limit;
        self
    }

    /// Number of tasks the config expands to.
    pub fn task_count(&self) -> usize {
        self.dimensions_a.len() * self.dimensions_b.len()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_limit < 1 {
            return Err(ConfigError::InvalidParallelLimit(self.parallel_limit));
        }
        Ok(())
    }
}
