use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use handoff_config::shared::DispatchConfig;
use metrics::counter;
use rand::Rng;
use tracing::{Instrument, debug, info, info_span};

use crate::error::HandoffResult;
#[cfg(feature = "failpoints")]
use crate::failpoints::{DISPATCHER__BEFORE_PUT, handoff_fail_point};
use crate::metrics::HANDOFF_ITEMS_DISPATCHED_TOTAL;
use crate::types::{PipelineItem, StageMessage, StageQueue};

/// Producer feeding the first queue of a pipeline from a finite source.
///
/// The dispatcher never sends shutdown messages. The number of items it dispatched is published
/// through a shared counter, so it stays available even if the source panics mid-way.
pub struct Dispatcher<S, I> {
    source: S,
    output: StageQueue<I>,
    config: DispatchConfig,
    dispatched: Arc<AtomicUsize>,
}

impl<S, I> Dispatcher<S, I>
where
    S: Iterator<Item = I> + Send + 'static,
    I: PipelineItem,
{
    pub fn new(
        source: S,
        output: StageQueue<I>,
        config: DispatchConfig,
        dispatched: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            source,
            output,
            config,
            dispatched,
        }
    }

    /// Puts every item of the source on the output queue and returns how many were dispatched.
    pub async fn run(self) -> HandoffResult<usize> {
        let span = info_span!("dispatcher");
        self.run_loop().instrument(span).await
    }

    async fn run_loop(self) -> HandoffResult<usize> {
        info!("dispatching items");

        for item in self.source {
            if let Some(delay) = next_delay(&self.config) {
                tokio::time::sleep(delay).await;
            }

            #[cfg(feature = "failpoints")]
            handoff_fail_point(DISPATCHER__BEFORE_PUT)?;

            let item_id = item.id();
            self.output.put(StageMessage::Item(item)).await;
            self.dispatched.fetch_add(1, Ordering::SeqCst);

            debug!(%item_id, "item dispatched");
            counter!(HANDOFF_ITEMS_DISPATCHED_TOTAL).increment(1);
        }

        let dispatched = self.dispatched.load(Ordering::SeqCst);
        info!(dispatched, "all items dispatched");

        Ok(dispatched)
    }
}

/// Draws the delay before the next item, or `None` when dispatching back to back.
fn next_delay(config: &DispatchConfig) -> Option<Duration> {
    if config.is_immediate() {
        return None;
    }

    let millis = rand::thread_rng().gen_range(config.min_delay_ms..=config.max_delay_ms);
    Some(Duration::from_millis(millis))
}
