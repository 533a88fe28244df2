use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use handoff_config::shared::{AggregatorConfig, DispatchConfig, PipelineConfig, StageConfig};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::bail;
use crate::concurrency::queue::BoundedQueue;
use crate::error::{ErrorKind, HandoffError, HandoffResult};
use crate::handoff_error;
use crate::result::{ResultAccumulator, StageResult};
use crate::stats::StageStats;
use crate::transform::Transform;
use crate::types::{PipelineItem, StageMessage, StageQueue};
use crate::workers::aggregator::AggregatorWorker;
use crate::workers::dispatcher::Dispatcher;
use crate::workers::pool::StageWorkerPool;
use crate::workers::stage::StageWorker;

#[derive(Debug)]
enum PipelineState<I> {
    NotStarted,
    Started {
        dispatcher: JoinHandle<HandoffResult<usize>>,
        dispatched: Arc<AtomicUsize>,
        /// One pool per stage, the aggregator's pool last.
        pools: Vec<StageWorkerPool>,
        accumulator: ResultAccumulator<I>,
    },
    Finished,
}

/// A transforming stage: its configuration and the transform its workers apply.
struct Stage<I> {
    config: StageConfig,
    transform: Arc<dyn Transform<I>>,
}

/// Linear multi-stage pipeline terminated by an aggregator.
///
/// Items produced by the source are dispatched into the first stage, transformed by each stage in
/// order and folded into a [`StageResult`] by the aggregator. Every stage reads from its own input
/// queue, bounded by the stage's `queue_capacity`, which the previous stage (or the dispatcher)
/// writes into.
///
/// Shutdown is driven by [`Pipeline::wait`]: once the dispatcher finished, each stage in turn
/// receives one [`StageMessage::Shutdown`] per worker and is joined before the next stage is
/// told to shut down, so a stage is only stopped after everything upstream stopped producing.
///
/// A pipeline runs exactly once.
pub struct Pipeline<I> {
    stages: Vec<Stage<I>>,
    aggregator: AggregatorConfig,
    dispatch: DispatchConfig,
    /// Input queue of every stage, the aggregator's input queue last.
    queues: Vec<StageQueue<I>>,
    state: PipelineState<I>,
    stats: Vec<StageStats>,
}

impl<I> Pipeline<I>
where
    I: PipelineItem,
{
    /// Returns a builder for a pipeline.
    pub fn builder() -> PipelineBuilder<I> {
        PipelineBuilder::new()
    }

    /// Builds a pipeline from a configuration, pairing each configured stage with the transform
    /// registered under its name.
    ///
    /// Fails with [`ErrorKind::ConfigError`] if a configured stage has no transform.
    pub fn from_config(
        config: PipelineConfig,
        mut transforms: HashMap<String, Arc<dyn Transform<I>>>,
    ) -> HandoffResult<Self> {
        let mut builder = PipelineBuilder::new()
            .aggregator(config.aggregator)
            .dispatch(config.dispatch);

        for stage in config.stages {
            let Some(transform) = transforms.remove(&stage.name) else {
                bail!(
                    ErrorKind::ConfigError,
                    "Missing transform for configured stage",
                    format!("No transform was registered for stage '{}'", stage.name)
                );
            };

            builder = builder.stage_arc(stage, transform);
        }

        for name in transforms.keys() {
            warn!(stage = %name, "transform registered for a stage that is not configured");
        }

        builder.build()
    }

    /// Stage configurations in order, the aggregator excluded.
    pub fn stage_configs(&self) -> impl Iterator<Item = &StageConfig> {
        self.stages.iter().map(|stage| &stage.config)
    }

    pub fn aggregator_config(&self) -> &AggregatorConfig {
        &self.aggregator
    }

    /// Current number of messages in each stage's input queue, the aggregator's last.
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.iter().map(|queue| queue.len()).collect()
    }

    /// Statistics of every stage joined so far, in stage order with the aggregator last.
    pub fn stats(&self) -> &[StageStats] {
        &self.stats
    }

    /// Spawns every stage's workers and the dispatcher feeding them from `source`.
    ///
    /// Fails with [`ErrorKind::InvalidState`] if the pipeline was already started.
    pub async fn start<S>(&mut self, source: S) -> HandoffResult<()>
    where
        S: IntoIterator<Item = I>,
        S::IntoIter: Send + 'static,
    {
        if !matches!(self.state, PipelineState::NotStarted) {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline can only be started once",
                "The pipeline was already started"
            );
        }

        info!(
            stages = self.stages.len(),
            aggregator = %self.aggregator.name,
            "starting pipeline"
        );

        let mut pools = Vec::with_capacity(self.stages.len() + 1);

        // We spawn every stage before the dispatcher, so that the first items find workers ready.
        for (index, stage) in self.stages.iter().enumerate() {
            let mut pool = StageWorkerPool::new(Arc::from(stage.config.name.as_str()));
            for _ in 0..stage.config.worker_count {
                let id = pool.next_worker_id();
                let worker = StageWorker::new(
                    id.clone(),
                    stage.transform.clone(),
                    self.queues[index].clone(),
                    self.queues[index + 1].clone(),
                );
                pool.spawn(id, worker.run());
            }

            pools.push(pool);
        }

        let accumulator = ResultAccumulator::new();
        let mut aggregator_pool = StageWorkerPool::new(Arc::from(self.aggregator.name.as_str()));
        for _ in 0..self.aggregator.worker_count {
            let id = aggregator_pool.next_worker_id();
            let worker = AggregatorWorker::new(
                id.clone(),
                self.aggregator_queue().clone(),
                accumulator.clone(),
            );
            aggregator_pool.spawn(id, worker.run());
        }
        pools.push(aggregator_pool);

        let dispatched = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            source.into_iter(),
            self.queues[0].clone(),
            self.dispatch.clone(),
            dispatched.clone(),
        );
        let dispatcher = tokio::spawn(dispatcher.run());

        self.state = PipelineState::Started {
            dispatcher,
            dispatched,
            pools,
            accumulator,
        };

        Ok(())
    }

    /// Shuts the pipeline down in stage order and returns the aggregated result.
    ///
    /// Waits for the dispatcher, then for each stage in order sends one shutdown message per
    /// worker and joins all of its workers. After each join the stage is checked: each worker
    /// must have consumed exactly one shutdown message and the stage's input queue must be empty.
    /// A check failing is reported as [`ErrorKind::ProtocolViolation`], a dead worker as
    /// [`ErrorKind::StageWorkerPanic`] and an item dropped by a stage as
    /// [`ErrorKind::ItemPanic`]; the remaining stages are still shut down and every error is
    /// returned together.
    ///
    /// Fails with [`ErrorKind::InvalidState`] if the pipeline is not running.
    pub async fn wait(&mut self) -> HandoffResult<StageResult<I>> {
        let (dispatcher, dispatched, pools, accumulator) =
            match mem::replace(&mut self.state, PipelineState::Finished) {
                PipelineState::Started {
                    dispatcher,
                    dispatched,
                    pools,
                    accumulator,
                } => (dispatcher, dispatched, pools, accumulator),
                state => {
                    // We leave a pipeline that was never started untouched, it can still be
                    // started.
                    self.state = state;

                    bail!(
                        ErrorKind::InvalidState,
                        "Pipeline is not running",
                        "The pipeline must be started before waiting, and can only be waited once"
                    );
                }
            };

        let mut errors = Vec::new();

        info!("waiting for dispatcher to complete");
        match dispatcher.await {
            Ok(Ok(count)) => info!(dispatched = count, "dispatcher completed"),
            Ok(Err(err)) => {
                error!(error = %err, "dispatcher completed with an error");
                errors.push(err);
            }
            Err(join_err) => {
                error!(error = %join_err, "dispatcher task died");
                errors.push(handoff_error!(
                    ErrorKind::DispatcherPanic,
                    "Dispatcher task died",
                    join_err.to_string(),
                    source: join_err
                ));
            }
        }
        let expected = dispatched.load(Ordering::SeqCst);

        for (pool, queue) in pools.into_iter().zip(self.queues.iter()) {
            let span = info_span!("stage_shutdown", stage = %pool.stage());
            let (stats, stage_errors) = shutdown_stage(pool, queue).instrument(span).await;

            errors.extend(stage_errors);
            self.stats.push(stats);
        }

        let result = match accumulator.finalize(expected) {
            Ok(result) => result,
            Err(err) => {
                errors.push(err);
                return Err(errors.into());
            }
        };

        if !errors.is_empty() {
            error!(errors = errors.len(), "pipeline completed with errors");
            return Err(errors.into());
        }

        info!(
            expected = result.expected(),
            processed = result.processed(),
            succeeded = result.succeeded(),
            failed = result.failed(),
            "pipeline completed"
        );

        Ok(result)
    }

    /// Runs the pipeline over `source` to completion, see [`Pipeline::start`] and
    /// [`Pipeline::wait`].
    pub async fn run<S>(&mut self, source: S) -> HandoffResult<StageResult<I>>
    where
        S: IntoIterator<Item = I>,
        S::IntoIter: Send + 'static,
    {
        self.start(source).await?;
        self.wait().await
    }

    fn aggregator_queue(&self) -> &StageQueue<I> {
        &self.queues[self.stages.len()]
    }
}

/// Sends one shutdown message per worker of `pool` on `queue`, joins the pool and checks that the
/// shutdown went as expected.
async fn shutdown_stage<I>(
    pool: StageWorkerPool,
    queue: &StageQueue<I>,
) -> (StageStats, Vec<HandoffError>) {
    let worker_count = pool.worker_count();

    info!(workers = worker_count, "sending shutdown messages to stage");
    for _ in 0..worker_count {
        queue.put(StageMessage::Shutdown).await;
    }

    let (stats, mut errors) = pool.wait_all().await;
    let clean_exit = errors.is_empty();

    // A worker that died never consumed its shutdown message, which the queue check below reports,
    // so the count is only meaningful when every worker exited normally.
    if clean_exit && stats.sentinels() != worker_count {
        errors.push(handoff_error!(
            ErrorKind::ProtocolViolation,
            "Shutdown messages consumed do not match the stage's workers",
            format!(
                "Stage '{}' has {worker_count} workers but consumed {} shutdown messages",
                stats.stage(),
                stats.sentinels()
            )
        ));
    }

    if stats.dropped() > 0 {
        errors.push(handoff_error!(
            ErrorKind::ItemPanic,
            "Items were dropped after their handling panicked",
            format!(
                "Stage '{}' dropped {} items that could not be marked as failed",
                stats.stage(),
                stats.dropped()
            )
        ));
    }

    let (items, sentinels) = drain(queue);
    if items > 0 || sentinels > 0 {
        errors.push(handoff_error!(
            ErrorKind::ProtocolViolation,
            "Messages left in a stage's input queue after shutdown",
            format!(
                "Stage '{}' left {items} items and {sentinels} shutdown messages in its input queue",
                stats.stage()
            )
        ));
    }

    if errors.is_empty() {
        info!(
            items = stats.items(),
            failures = stats.failures(),
            duration_ms = stats.duration().as_millis() as u64,
            "stage shut down"
        );
    } else {
        error!(errors = errors.len(), "stage shut down with errors");
    }

    (stats, errors)
}

/// Empties `queue`, returning how many items and shutdown messages it held.
fn drain<I>(queue: &BoundedQueue<StageMessage<I>>) -> (usize, usize) {
    let mut items = 0;
    let mut sentinels = 0;

    while let Some(message) = queue.try_get() {
        match message {
            StageMessage::Item(_) => items += 1,
            StageMessage::Shutdown => sentinels += 1,
        }
    }

    (items, sentinels)
}

/// Builder of a [`Pipeline`].
///
/// ```
/// use handoff::pipeline::Pipeline;
/// use handoff::transform::transform_fn;
/// use handoff::types::WorkItem;
/// use handoff_config::shared::StageConfig;
///
/// let pipeline = Pipeline::<WorkItem>::builder()
///     .stage(StageConfig::new("copy", 3), transform_fn(|_: &mut WorkItem| Ok(())))
///     .stage(StageConfig::new("upload", 2), transform_fn(|_: &mut WorkItem| Ok(())))
///     .aggregator(StageConfig::new("verifier", 1))
///     .build()
///     .unwrap();
/// # let _ = pipeline;
/// ```
pub struct PipelineBuilder<I> {
    stages: Vec<Stage<I>>,
    aggregator: AggregatorConfig,
    dispatch: DispatchConfig,
}

impl<I> PipelineBuilder<I>
where
    I: PipelineItem,
{
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            aggregator: StageConfig::aggregator(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Appends a transforming stage.
    pub fn stage<T>(self, config: StageConfig, transform: T) -> Self
    where
        T: Transform<I> + 'static,
    {
        self.stage_arc(config, Arc::new(transform))
    }

    /// Appends a transforming stage sharing an existing transform.
    pub fn stage_arc(mut self, config: StageConfig, transform: Arc<dyn Transform<I>>) -> Self {
        self.stages.push(Stage { config, transform });
        self
    }

    /// Sets the terminal stage. Defaults to [`StageConfig::aggregator`].
    pub fn aggregator(mut self, config: AggregatorConfig) -> Self {
        self.aggregator = config;
        self
    }

    pub fn dispatch(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    /// Validates the topology and builds the pipeline with its queues.
    pub fn build(self) -> HandoffResult<Pipeline<I>> {
        let config = PipelineConfig {
            stages: self
                .stages
                .iter()
                .map(|stage| stage.config.clone())
                .collect(),
            aggregator: self.aggregator,
            dispatch: self.dispatch,
        };
        config.validate()?;

        let queues = config
            .stages
            .iter()
            .chain(std::iter::once(&config.aggregator))
            .map(|stage| Arc::new(BoundedQueue::new(stage.queue_capacity)))
            .collect();

        Ok(Pipeline {
            stages: self.stages,
            aggregator: config.aggregator,
            dispatch: config.dispatch,
            queues,
            state: PipelineState::NotStarted,
            stats: Vec::new(),
        })
    }
}

impl<I> Default for PipelineBuilder<I>
where
    I: PipelineItem,
{
    fn default() -> Self {
        Self::new()
    }
}
