use std::sync::Arc;

use crate::concurrency::queue::BoundedQueue;

/// Message exchanged on the queue feeding a stage.
///
/// Shutdown is a variant of its own rather than a special item value, so consumers must handle it
/// explicitly. A queue consumed by `n` workers receives exactly `n` [`StageMessage::Shutdown`]s,
/// each one stopping exactly one worker. Workers never forward them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageMessage<I> {
    /// A unit of work handed to the next free worker.
    Item(I),
    /// Tells the worker receiving it that no more work will arrive.
    Shutdown,
}

impl<I> StageMessage<I> {
    /// Returns whether the message is a shutdown message.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, StageMessage::Shutdown)
    }

    /// Returns the carried item, if any.
    pub fn into_item(self) -> Option<I> {
        match self {
            StageMessage::Item(item) => Some(item),
            StageMessage::Shutdown => None,
        }
    }
}

/// Queue shared between the producers of a stage and its workers.
pub type StageQueue<I> = Arc<BoundedQueue<StageMessage<I>>>;
