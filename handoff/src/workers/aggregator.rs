use std::panic::{self, AssertUnwindSafe};

use metrics::counter;
use tracing::{Instrument, debug, error, info, info_span};

use crate::error::HandoffResult;
use crate::metrics::{HANDOFF_ITEMS_AGGREGATED_TOTAL, OUTCOME_LABEL, STAGE_LABEL};
use crate::result::ResultAccumulator;
use crate::types::{PipelineItem, StageMessage, StageQueue};
use crate::workers::base::{WorkerId, WorkerStats, panic_message};

/// Worker of the terminal stage, folding every item it receives into the shared result.
pub struct AggregatorWorker<I> {
    id: WorkerId,
    input: StageQueue<I>,
    accumulator: ResultAccumulator<I>,
}

impl<I> AggregatorWorker<I>
where
    I: PipelineItem,
{
    pub fn new(id: WorkerId, input: StageQueue<I>, accumulator: ResultAccumulator<I>) -> Self {
        Self {
            id,
            input,
            accumulator,
        }
    }

    /// Runs the worker until it consumes a shutdown message.
    pub async fn run(self) -> HandoffResult<WorkerStats> {
        let span = info_span!("aggregator_worker", stage = %self.id.stage(), worker = %self.id);
        self.run_loop().instrument(span).await
    }

    async fn run_loop(self) -> HandoffResult<WorkerStats> {
        let mut stats = WorkerStats::new(self.id.clone());

        while let StageMessage::Item(item) = self.input.get().await {
            stats.items += 1;

            match panic::catch_unwind(AssertUnwindSafe(|| self.fold_item(item))) {
                Ok(true) => {}
                Ok(false) => stats.failures += 1,
                Err(panic) => {
                    error!(
                        panic = %panic_message(panic),
                        "item handling panicked, dropping it"
                    );
                    stats.dropped += 1;
                }
            }
        }
        stats.sentinels += 1;

        info!(
            items = stats.items,
            failures = stats.failures,
            dropped = stats.dropped,
            "received shutdown message, aggregator exiting"
        );

        Ok(stats)
    }

    /// Records `item` in the result and returns whether it succeeded.
    fn fold_item(&self, item: I) -> bool {
        let item_id = item.id();
        let succeeded = self.accumulator.record(item);

        debug!(%item_id, succeeded, "item aggregated");
        counter!(
            HANDOFF_ITEMS_AGGREGATED_TOTAL,
            STAGE_LABEL => self.id.stage().to_string(),
            OUTCOME_LABEL => if succeeded { "succeeded" } else { "failed" },
        )
        .increment(1);

        succeeded
    }
}
