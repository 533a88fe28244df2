use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tokio::time::timeout;

use crate::bail;
use crate::error::{ErrorKind, HandoffResult};
use crate::test_utils::notify::{DEFAULT_NOTIFY_TIMEOUT, TimedNotify};
use crate::transform::Transform;
use crate::types::{ItemId, PipelineItem, WorkItem};

/// Transform recording the id of every item it processes, in processing order.
///
/// It also sets the `visited_<stage>` attribute of [`WorkItem`]s to `true`.
#[derive(Debug, Clone)]
pub struct RecordingTransform {
    stage: String,
    delay: Option<Duration>,
    processed: Arc<Mutex<Vec<ItemId>>>,
}

impl RecordingTransform {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            delay: None,
            processed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleeps for `delay` before processing each item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ids processed so far, in processing order.
    pub fn processed(&self) -> Vec<ItemId> {
        self.processed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transform<WorkItem> for RecordingTransform {
    async fn process(&self, item: &mut WorkItem) -> HandoffResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        item.set_attribute(format!("visited_{}", self.stage), "true");
        self.processed.lock().unwrap().push(item.id());

        Ok(())
    }
}

/// Transform failing with [`ErrorKind::TransformFailed`] for the given ids.
#[derive(Debug, Clone)]
pub struct FailingTransform {
    failing: HashSet<ItemId>,
}

impl FailingTransform {
    pub fn on_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            failing: ids.into_iter().map(ItemId).collect(),
        }
    }
}

#[async_trait]
impl<I> Transform<I> for FailingTransform
where
    I: PipelineItem + Send,
{
    async fn process(&self, item: &mut I) -> HandoffResult<()> {
        if self.failing.contains(&item.id()) {
            bail!(
                ErrorKind::TransformFailed,
                "Test transform failed",
                format!("Item {} is configured to fail", item.id())
            );
        }

        Ok(())
    }
}

/// Transform panicking for the given ids.
#[derive(Debug, Clone)]
pub struct PanickingTransform {
    panicking: HashSet<ItemId>,
}

impl PanickingTransform {
    pub fn on_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            panicking: ids.into_iter().map(ItemId).collect(),
        }
    }
}

#[async_trait]
impl<I> Transform<I> for PanickingTransform
where
    I: PipelineItem + Send,
{
    async fn process(&self, item: &mut I) -> HandoffResult<()> {
        if self.panicking.contains(&item.id()) {
            panic!("test transform panicked on item {}", item.id());
        }

        Ok(())
    }
}

/// Transform holding every item until [`GatedTransform::open`] is called.
///
/// Each time an item reaches the gate, [`GatedTransform::entered`] is notified, which lets tests
/// wait until a worker is busy before inspecting queues.
#[derive(Debug, Clone)]
pub struct GatedTransform {
    gate_tx: Arc<watch::Sender<bool>>,
    gate_rx: watch::Receiver<bool>,
    entered: TimedNotify,
}

impl GatedTransform {
    pub fn new() -> Self {
        let (gate_tx, gate_rx) = watch::channel(false);

        Self {
            gate_tx: Arc::new(gate_tx),
            gate_rx,
            entered: TimedNotify::new(Arc::new(Notify::new())),
        }
    }

    /// Lets every waiting and future item through.
    pub fn open(&self) {
        self.gate_tx.send_replace(true);
    }

    /// Notified once per item reaching the gate.
    pub fn entered(&self) -> &TimedNotify {
        &self.entered
    }
}

impl Default for GatedTransform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I> Transform<I> for GatedTransform
where
    I: PipelineItem + Send,
{
    async fn process(&self, _item: &mut I) -> HandoffResult<()> {
        self.entered.inner().notify_one();

        let mut gate_rx = self.gate_rx.clone();
        match timeout(DEFAULT_NOTIFY_TIMEOUT, gate_rx.wait_for(|open| *open)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => bail!(ErrorKind::InvalidState, "Test gate was dropped"),
            Err(_) => panic!("test gate was never opened within {DEFAULT_NOTIFY_TIMEOUT:?}"),
        }
    }
}
