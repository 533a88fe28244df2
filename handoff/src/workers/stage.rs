use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{ErrorKind, HandoffError, HandoffResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{STAGE_WORKER__BEFORE_TRANSFORM, handoff_fail_point};
use crate::handoff_error;
use crate::metrics::{
    HANDOFF_ITEMS_FAILED_TOTAL, HANDOFF_ITEMS_PROCESSED_TOTAL, HANDOFF_TRANSFORM_DURATION_SECONDS,
    STAGE_LABEL,
};
use crate::transform::Transform;
use crate::types::{PipelineItem, StageMessage, StageQueue};
use crate::workers::base::{WorkerId, WorkerStats, panic_message};

/// Worker of a transforming stage.
///
/// Repeatedly takes a message from the stage's input queue. An item is transformed in place and
/// put on the output queue; the shutdown message stops the worker without being forwarded.
///
/// Transform errors and panics are recorded on the item with [`PipelineItem::mark_failed`] and
/// the item is forwarded anyway. Items that arrive already failed are forwarded untouched.
pub struct StageWorker<I> {
    id: WorkerId,
    transform: Arc<dyn Transform<I>>,
    input: StageQueue<I>,
    output: StageQueue<I>,
}

impl<I> StageWorker<I>
where
    I: PipelineItem,
{
    pub fn new(
        id: WorkerId,
        transform: Arc<dyn Transform<I>>,
        input: StageQueue<I>,
        output: StageQueue<I>,
    ) -> Self {
        Self {
            id,
            transform,
            input,
            output,
        }
    }

    /// Runs the worker until it consumes a shutdown message.
    pub async fn run(self) -> HandoffResult<WorkerStats> {
        let span = info_span!("stage_worker", stage = %self.id.stage(), worker = %self.id);
        self.run_loop().instrument(span).await
    }

    async fn run_loop(self) -> HandoffResult<WorkerStats> {
        let mut stats = WorkerStats::new(self.id.clone());

        loop {
            let mut item = match self.input.get().await {
                StageMessage::Item(item) => item,
                StageMessage::Shutdown => {
                    stats.sentinels += 1;
                    break;
                }
            };

            stats.items += 1;

            // Every call into item code happens inside this boundary, so the worker outlives any
            // item and keeps draining its input queue.
            let handled = AssertUnwindSafe(self.handle_item(&mut item, &mut stats))
                .catch_unwind()
                .await;

            if let Err(panic) = handled {
                let err = handoff_error!(
                    ErrorKind::ItemPanic,
                    "Item handling panicked",
                    panic_message(panic)
                );

                if !self.mark_item_failed(&mut item, &err) {
                    error!(error = %err, "item could not be marked as failed, dropping it");
                    stats.dropped += 1;
                    continue;
                }

                warn!(error = %err, "item handling panicked, marking item as failed");
                stats.failures += 1;
                self.count_failure();
            }

            self.output.put(StageMessage::Item(item)).await;
        }

        info!(
            items = stats.items,
            failures = stats.failures,
            dropped = stats.dropped,
            "received shutdown message, worker exiting"
        );

        Ok(stats)
    }

    /// Transforms `item` unless an earlier stage failed it, recording a transform failure on the
    /// item itself.
    async fn handle_item(&self, item: &mut I, stats: &mut WorkerStats) {
        let item_id = item.id();

        if item.is_failed() {
            debug!(%item_id, "forwarding item that failed in an earlier stage");
        } else if let Err(err) = self.transform_item(item).await {
            warn!(%item_id, error = %err, "transform failed, marking item as failed");
            item.mark_failed(self.id.stage(), &err);
            stats.failures += 1;
            self.count_failure();
        } else {
            item.record_stage(self.id.stage());
            debug!(%item_id, "item transformed");
        }

        counter!(
            HANDOFF_ITEMS_PROCESSED_TOTAL,
            STAGE_LABEL => self.id.stage().to_string(),
        )
        .increment(1);
    }

    /// Applies the transform, converting a panic into an [`ErrorKind::TransformPanic`] error.
    async fn transform_item(&self, item: &mut I) -> HandoffResult<()> {
        #[cfg(feature = "failpoints")]
        handoff_fail_point(STAGE_WORKER__BEFORE_TRANSFORM)?;

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.transform.process(item))
            .catch_unwind()
            .await;

        histogram!(
            HANDOFF_TRANSFORM_DURATION_SECONDS,
            STAGE_LABEL => self.id.stage().to_string(),
        )
        .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(handoff_error!(
                ErrorKind::TransformPanic,
                "Transform panicked",
                panic_message(panic)
            )),
        }
    }

    /// Marks `item` as failed after its handling panicked. Returns `false` if marking panicked as
    /// well, in which case the item cannot be forwarded.
    fn mark_item_failed(&self, item: &mut I, err: &HandoffError) -> bool {
        let stage = self.id.stage();
        panic::catch_unwind(AssertUnwindSafe(|| item.mark_failed(stage, err))).is_ok()
    }

    fn count_failure(&self) {
        counter!(
            HANDOFF_ITEMS_FAILED_TOTAL,
            STAGE_LABEL => self.id.stage().to_string(),
        )
        .increment(1);
    }
}
