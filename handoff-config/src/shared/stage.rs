use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration of a single pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StageConfig {
    /// Name of the stage, used to name its workers and to pair it with a transform.
    pub name: String,
    /// Number of worker tasks consuming the stage's input queue.
    #[serde(default = "default_worker_count")]
    pub worker_count: u16,
    /// Capacity of the stage's input queue, `0` means unbounded.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl StageConfig {
    /// Default number of workers per stage.
    pub const DEFAULT_WORKER_COUNT: u16 = 1;

    /// Default input queue capacity (unbounded).
    pub const DEFAULT_QUEUE_CAPACITY: usize = 0;

    /// Default name of the terminal aggregating stage.
    pub const DEFAULT_AGGREGATOR_NAME: &'static str = "aggregator";

    /// Creates a stage configuration with an unbounded input queue.
    pub fn new(name: impl Into<String>, worker_count: u16) -> Self {
        Self {
            name: name.into(),
            worker_count,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Bounds the stage's input queue to `capacity` messages.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Default configuration of the terminal aggregating stage: a single worker.
    pub fn aggregator() -> Self {
        Self::new(Self::DEFAULT_AGGREGATOR_NAME, Self::DEFAULT_WORKER_COUNT)
    }

    /// Returns whether the stage's input queue is unbounded.
    pub fn is_unbounded(&self) -> bool {
        self.queue_capacity == 0
    }

    /// Checks that the stage is named and has at least one worker.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyStageName);
        }

        if self.worker_count == 0 {
            return Err(ValidationError::WorkerCountZero {
                stage: self.name.clone(),
            });
        }

        Ok(())
    }
}

/// Configuration of the terminal aggregating stage. It shares the shape of any other stage.
pub type AggregatorConfig = StageConfig;

fn default_worker_count() -> u16 {
    StageConfig::DEFAULT_WORKER_COUNT
}

fn default_queue_capacity() -> usize {
    StageConfig::DEFAULT_QUEUE_CAPACITY
}
