use std::time::Duration;

use crate::workers::base::{WorkerId, WorkerStats};

/// Statistics of a stage's worker pool, collected when the pool is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStats {
    stage: String,
    workers: Vec<WorkerStats>,
    lost_workers: Vec<WorkerId>,
    duration: Duration,
}

impl StageStats {
    pub(crate) fn new(
        stage: String,
        mut workers: Vec<WorkerStats>,
        mut lost_workers: Vec<WorkerId>,
        duration: Duration,
    ) -> Self {
        workers.sort_by_key(|stats| stats.worker.index());
        lost_workers.sort_by_key(WorkerId::index);

        Self {
            stage,
            workers,
            lost_workers,
            duration,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Statistics of the workers that exited normally, ordered by worker index.
    pub fn workers(&self) -> &[WorkerStats] {
        &self.workers
    }

    /// Workers that did not exit normally, e.g. because they panicked.
    pub fn lost_workers(&self) -> &[WorkerId] {
        &self.lost_workers
    }

    /// Time between spawning the pool and joining its last worker.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Total number of items handled by the stage.
    pub fn items(&self) -> usize {
        self.workers.iter().map(|stats| stats.items).sum()
    }

    /// Total number of items the stage failed.
    pub fn failures(&self) -> usize {
        self.workers.iter().map(|stats| stats.failures).sum()
    }

    /// Total number of items the stage dropped because their handling panicked.
    pub fn dropped(&self) -> usize {
        self.workers.iter().map(|stats| stats.dropped).sum()
    }

    /// Total number of shutdown messages consumed by the stage's workers.
    pub fn sentinels(&self) -> usize {
        self.workers.iter().map(|stats| stats.sentinels).sum()
    }
}
