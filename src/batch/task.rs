//! Task descriptors and deterministic batch expansion

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::BatchConfig;
use crate::Dimension;

/// One unit of work. Immutable once created by [`TaskSource`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDescriptor<A, B> {
    /// Stable zero-based position in the expanded batch
    pub index: usize,
    /// Value from the outer dimension
    pub dimension_a: A,
    /// Value from the inner dimension
    pub dimension_b: B,
}

impl<A: fmt::Display, B: fmt::Display> fmt::Display for TaskDescriptor<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task #{} {}/{}", self.index, self.dimension_a, self.dimension_b)
    }
}

/// Successful task result, carrying its descriptor for index correlation.
#[derive(Debug, Clone)]
pub struct TaskOutput<A, B, T> {
    /// Task that produced the value
    pub task: TaskDescriptor<A, B>,
    /// Value returned by the collaborator
    pub value: T,
    /// Wall-clock time spent on the task, retries included
    pub elapsed: Duration,
}

/// Expands batch dimensions into an ordered task list.
pub struct TaskSource;

impl TaskSource {
    /// Cross product of the config's dimensions: A outer, B inner,
    /// contiguous indices from zero.
    pub fn expand<A: Dimension, B: Dimension, O>(
        config: &BatchConfig<A, B, O>,
    ) -> Vec<TaskDescriptor<A, B>> {
        Self::expand_dimensions(&config.dimensions_a, &config.dimensions_b)
    }

    /// Cross product of two dimension slices.
    pub fn expand_dimensions<A: Clone, B: Clone>(
        dimensions_a: &[A],
        dimensions_b: &[B],
    ) -> Vec<TaskDescriptor<A, B>> {
        dimensions_a
            .iter()
            .flat_map(|a| dimensions_b.iter().map(move |b| (a, b)))
            .enumerate()
            .map(|(index, (a, b))| TaskDescriptor {
                index,
                dimension_a: a.clone(),
                dimension_b: b.clone(),
            })
            .collect()
    }
}
