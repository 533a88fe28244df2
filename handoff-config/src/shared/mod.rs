//! Shared configuration types for handoff pipelines.

mod base;
mod dispatch;
mod pipeline;
mod stage;

pub use base::ValidationError;
pub use dispatch::DispatchConfig;
pub use pipeline::PipelineConfig;
pub use stage::{AggregatorConfig, StageConfig};
