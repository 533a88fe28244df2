//! Values flowing through a pipeline.

mod item;
mod message;

pub use item::{ItemFailure, ItemId, PipelineItem, WorkItem, WorkStatus};
pub use message::{StageMessage, StageQueue};
