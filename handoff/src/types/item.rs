use std::collections::BTreeMap;
use std::fmt;

use crate::error::HandoffError;

/// Identifier of an item, unique within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Record of the stage at which an item failed and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub stage: String,
    pub reason: String,
}

impl ItemFailure {
    /// Builds a failure for `stage` out of the error that caused it.
    pub fn new(stage: &str, error: &HandoffError) -> Self {
        let reason = match error.detail() {
            Some(detail) => format!("{}: {detail}", error.description().unwrap_or("error")),
            None => error.description().unwrap_or("error").to_string(),
        };

        Self {
            stage: stage.to_string(),
            reason,
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed in stage `{}`: {}", self.stage, self.reason)
    }
}

/// Contract between the pipeline and the items it moves.
///
/// Failures are encoded on the item itself: when a transform fails the stage worker calls
/// [`PipelineItem::mark_failed`] and keeps going, and later stages forward failed items without
/// transforming them. This keeps every worker alive until it receives its shutdown message.
pub trait PipelineItem: Send + 'static {
    /// Returns the item's identifier.
    fn id(&self) -> ItemId;

    /// Returns whether a previous stage marked the item as failed.
    fn is_failed(&self) -> bool;

    /// Marks the item as failed at `stage` because of `error`.
    fn mark_failed(&mut self, stage: &str, error: &HandoffError);

    /// Called after `stage` transformed the item successfully.
    fn record_stage(&mut self, _stage: &str) {}

    /// Returns whether the aggregator counts the item as succeeded.
    fn is_successful(&self) -> bool {
        !self.is_failed()
    }
}

/// Status tag of a [`WorkItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkStatus {
    /// Dispatched, not yet transformed by any stage.
    Ready,
    /// Last transformed successfully by the named stage.
    Processed { stage: String },
    /// Failed in a stage, see [`ItemFailure`].
    Failed(ItemFailure),
}

/// General purpose pipeline item: an identifier, a name, a status tag and string attributes that
/// stages fill in as the item moves along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    id: ItemId,
    name: String,
    status: WorkStatus,
    attributes: BTreeMap<String, String>,
    stages: Vec<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: WorkStatus::Ready,
            attributes: BTreeMap::new(),
            stages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &WorkStatus {
        &self.status
    }

    /// Returns the failure recorded on the item, if any.
    pub fn failure(&self) -> Option<&ItemFailure> {
        match &self.status {
            WorkStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Names of the stages that transformed the item, in order.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }
}

impl PipelineItem for WorkItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn is_failed(&self) -> bool {
        matches!(self.status, WorkStatus::Failed(_))
    }

    fn mark_failed(&mut self, stage: &str, error: &HandoffError) {
        self.status = WorkStatus::Failed(ItemFailure::new(stage, error));
    }

    fn record_stage(&mut self, stage: &str) {
        self.status = WorkStatus::Processed {
            stage: stage.to_string(),
        };
        self.stages.push(stage.to_string());
    }
}
