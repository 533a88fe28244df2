use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::{HandoffError, HandoffResult};
use crate::metrics::{HANDOFF_STAGE_DURATION_SECONDS, STAGE_LABEL};
use crate::stats::StageStats;
use crate::workers::base::{WorkerId, WorkerStats};

/// Pool owning the worker tasks of a single stage.
///
/// Every worker is spawned on the multi-threaded runtime as its own task. The pool remembers
/// which workers it spawned, so a worker that panics is still identified when joined.
#[derive(Debug)]
pub struct StageWorkerPool {
    stage: Arc<str>,
    spawned: Vec<WorkerId>,
    join_set: JoinSet<(WorkerId, HandoffResult<WorkerStats>)>,
    started_at: Instant,
}

impl StageWorkerPool {
    pub fn new(stage: Arc<str>) -> Self {
        Self {
            stage,
            spawned: Vec::new(),
            join_set: JoinSet::new(),
            started_at: Instant::now(),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the id the next spawned worker will get.
    pub fn next_worker_id(&self) -> WorkerId {
        WorkerId::new(self.stage.clone(), self.spawned.len() as u16 + 1)
    }

    /// Spawns a worker future in the pool.
    pub fn spawn<F>(&mut self, id: WorkerId, future: F)
    where
        F: Future<Output = HandoffResult<WorkerStats>> + Send + 'static,
    {
        let worker = id.clone();
        self.join_set.spawn(async move {
            let result = future.await;
            (worker, result)
        });

        debug!(worker = %id, "spawned worker in pool");
        self.spawned.push(id);
    }

    /// Returns the number of workers spawned in the pool.
    pub fn worker_count(&self) -> usize {
        self.spawned.len()
    }

    /// Waits for every worker of the pool to exit.
    ///
    /// Returns the statistics of the stage together with the errors of the workers that failed or
    /// died. A worker that panicked is reported as [`crate::error::ErrorKind::StageWorkerPanic`]
    /// and listed in [`StageStats::lost_workers`].
    pub async fn wait_all(mut self) -> (StageStats, Vec<HandoffError>) {
        let mut finished = Vec::with_capacity(self.spawned.len());
        let mut joined = HashSet::with_capacity(self.spawned.len());
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok((worker, Ok(stats))) => {
                    joined.insert(worker);
                    finished.push(stats);
                }
                Ok((worker, Err(err))) => {
                    error!(%worker, error = %err, "worker completed with error");
                    joined.insert(worker);
                    errors.push(err);
                }
                Err(join_err) => {
                    error!(stage = %self.stage, error = %join_err, "worker task died");
                    errors.push(HandoffError::from(join_err));
                }
            }
        }

        // Every worker that died was already reported through its join error.
        let lost = self
            .spawned
            .into_iter()
            .filter(|worker| !joined.contains(worker))
            .collect::<Vec<_>>();
        if !lost.is_empty() {
            let names = lost
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(stage = %self.stage, lost = %names, "some workers did not exit normally");
        }

        let duration = self.started_at.elapsed();
        histogram!(
            HANDOFF_STAGE_DURATION_SECONDS,
            STAGE_LABEL => self.stage.to_string(),
        )
        .record(duration.as_secs_f64());

        let stats = StageStats::new(self.stage.to_string(), finished, lost, duration);
        (stats, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    async fn explode() -> HandoffResult<WorkerStats> {
        panic!("worker blew up")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn collects_stats_of_every_worker() {
        let mut pool = StageWorkerPool::new(Arc::from("copy"));
        for _ in 0..3 {
            let id = pool.next_worker_id();
            let stats = WorkerStats {
                items: id.index() as usize,
                sentinels: 1,
                ..WorkerStats::new(id.clone())
            };
            pool.spawn(id, async move { Ok(stats) });
        }
        assert_eq!(pool.worker_count(), 3);

        let (stats, errors) = pool.wait_all().await;
        assert!(errors.is_empty());
        assert_eq!(stats.workers().len(), 3);
        assert_eq!(stats.workers()[0].worker.to_string(), "copy-1");
        assert_eq!(stats.items(), 6);
        assert_eq!(stats.sentinels(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_worker_is_reported_as_lost() {
        let mut pool = StageWorkerPool::new(Arc::from("copy"));
        let first = pool.next_worker_id();
        pool.spawn(first.clone(), async move {
            Ok(WorkerStats {
                sentinels: 1,
                ..WorkerStats::new(first)
            })
        });
        let second = pool.next_worker_id();
        pool.spawn(second, explode());

        let (stats, errors) = pool.wait_all().await;
        assert_eq!(stats.workers().len(), 1);
        assert_eq!(stats.lost_workers().len(), 1);
        assert_eq!(stats.lost_workers()[0].to_string(), "copy-2");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::StageWorkerPanic);
        assert_eq!(errors[0].description(), Some("Worker task panicked"));
    }
}
