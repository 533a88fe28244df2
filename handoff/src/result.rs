//! Aggregation of the items reaching the end of a pipeline.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bail;
use crate::error::{ErrorKind, HandoffResult};
use crate::types::PipelineItem;

/// Final outcome of a pipeline run.
///
/// Always satisfies `processed == succeeded + failed` and `processed <= expected`.
#[derive(Clone, PartialEq, Eq)]
pub struct StageResult<I> {
    expected: usize,
    processed: usize,
    succeeded: usize,
    failed: usize,
    items: Vec<I>,
}

impl<I> StageResult<I> {
    /// Number of items dispatched into the pipeline.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of items that reached the aggregator.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Number of dispatched items that never reached the aggregator.
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.processed)
    }

    /// Returns whether every dispatched item reached the aggregator and succeeded.
    pub fn is_complete(&self) -> bool {
        self.missing() == 0 && self.failed == 0
    }

    /// Items in the order the aggregator received them.
    pub fn items(&self) -> &[I] {
        &self.items
    }
}

impl<I> fmt::Debug for StageResult<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageResult")
            .field("expected", &self.expected)
            .field("processed", &self.processed)
            .field("succeeded", &self.succeeded)
            .field("failed", &self.failed)
            .finish()
    }
}

#[derive(Debug)]
struct Tally<I> {
    succeeded: usize,
    failed: usize,
    items: Vec<I>,
}

/// Shared accumulator the aggregator workers fold items into.
///
/// The lock is held only to update the counters and store the item.
#[derive(Debug)]
pub struct ResultAccumulator<I> {
    inner: Arc<Mutex<Tally<I>>>,
}

impl<I> Clone for ResultAccumulator<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I> ResultAccumulator<I>
where
    I: PipelineItem,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tally {
                succeeded: 0,
                failed: 0,
                items: Vec::new(),
            })),
        }
    }

    /// Folds one item into the result and returns whether it counted as succeeded.
    pub fn record(&self, item: I) -> bool {
        // Item code runs before locking, a panicking item never poisons the tally.
        let succeeded = item.is_successful();

        let mut tally = self.lock();
        if succeeded {
            tally.succeeded += 1;
        } else {
            tally.failed += 1;
        }
        tally.items.push(item);

        succeeded
    }

    /// Number of items recorded so far.
    pub fn processed(&self) -> usize {
        self.lock().items.len()
    }

    /// Turns the tally into the final [`StageResult`] once every aggregator worker joined.
    ///
    /// Fails with [`ErrorKind::ProtocolViolation`] if more items were recorded than dispatched,
    /// which can only happen if an item was delivered twice.
    pub fn finalize(self, expected: usize) -> HandoffResult<StageResult<I>> {
        let tally = match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(_) => bail!(
                ErrorKind::InvalidState,
                "Result finalized while aggregator workers still hold it"
            ),
        };

        let processed = tally.items.len();
        if processed > expected {
            bail!(
                ErrorKind::ProtocolViolation,
                "Aggregator received more items than dispatched",
                format!("expected {expected} items, received {processed}")
            );
        }

        Ok(StageResult {
            expected,
            processed,
            succeeded: tally.succeeded,
            failed: tally.failed,
            items: tally.items,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Tally<I>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<I> Default for ResultAccumulator<I>
where
    I: PipelineItem,
{
    fn default() -> Self {
        Self::new()
    }
}
