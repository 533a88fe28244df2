//! Tasks moving items through a pipeline.
//!
//! The [`dispatcher::Dispatcher`] feeds the first queue from the source. Every transforming stage
//! runs a pool of [`stage::StageWorker`]s and the terminal stage a pool of
//! [`aggregator::AggregatorWorker`]s. All workers of a stage live in a [`pool::StageWorkerPool`],
//! which the pipeline joins during shutdown.

pub mod aggregator;
pub mod base;
pub mod dispatcher;
pub mod pool;
pub mod stage;
