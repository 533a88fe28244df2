use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandoffResult;

/// Per-item unit of work applied by every worker of a stage.
///
/// The transform receives exclusive access to the item it works on and enriches it in place. It
/// may await arbitrary latency (timers, I/O) but must not synchronize with other stages.
///
/// Returning an error does not stop the worker: the error is recorded on the item with
/// [`crate::types::PipelineItem::mark_failed`] and the item moves on to the next stage. Panics
/// raised while processing are recorded the same way.
#[async_trait]
pub trait Transform<I>: Send + Sync {
    /// Processes a single item.
    async fn process(&self, item: &mut I) -> HandoffResult<()>;
}

#[async_trait]
impl<I, T> Transform<I> for Arc<T>
where
    I: Send,
    T: Transform<I> + ?Sized,
{
    async fn process(&self, item: &mut I) -> HandoffResult<()> {
        self.as_ref().process(item).await
    }
}

/// Transform built from a synchronous closure, see [`transform_fn`].
pub struct FnTransform<F> {
    f: F,
}

impl<F> fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform").finish_non_exhaustive()
    }
}

#[async_trait]
impl<I, F> Transform<I> for FnTransform<F>
where
    I: Send,
    F: Fn(&mut I) -> HandoffResult<()> + Send + Sync,
{
    async fn process(&self, item: &mut I) -> HandoffResult<()> {
        (self.f)(item)
    }
}

/// Wraps a synchronous closure into a [`Transform`].
///
/// ```
/// use handoff::transform::transform_fn;
/// use handoff::types::WorkItem;
///
/// let enrich = transform_fn(|item: &mut WorkItem| {
///     item.set_attribute("dest_bucket", "dest-bucket-proj");
///     Ok(())
/// });
/// # let _ = enrich;
/// ```
pub fn transform_fn<I, F>(f: F) -> FnTransform<F>
where
    F: Fn(&mut I) -> HandoffResult<()> + Send + Sync,
{
    FnTransform { f }
}
