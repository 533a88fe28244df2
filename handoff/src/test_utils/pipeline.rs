use tokio::time::timeout;

use crate::error::HandoffResult;
use crate::pipeline::Pipeline;
use crate::result::StageResult;
use crate::test_utils::notify::DEFAULT_NOTIFY_TIMEOUT;
use crate::types::PipelineItem;

/// Runs `pipeline` over `source`.
///
/// # Panics
///
/// Panics if the run does not complete within [`DEFAULT_NOTIFY_TIMEOUT`], which means the
/// shutdown sequence deadlocked.
pub async fn run_with_timeout<I, S>(
    pipeline: &mut Pipeline<I>,
    source: S,
) -> HandoffResult<StageResult<I>>
where
    I: PipelineItem,
    S: IntoIterator<Item = I>,
    S::IntoIter: Send + 'static,
{
    pipeline.start(source).await?;
    wait_with_timeout(pipeline).await
}

/// Waits for a started `pipeline`, panicking after [`DEFAULT_NOTIFY_TIMEOUT`].
pub async fn wait_with_timeout<I>(pipeline: &mut Pipeline<I>) -> HandoffResult<StageResult<I>>
where
    I: PipelineItem,
{
    match timeout(DEFAULT_NOTIFY_TIMEOUT, pipeline.wait()).await {
        Ok(result) => result,
        Err(_) => panic!(
            "Pipeline did not shut down within {DEFAULT_NOTIFY_TIMEOUT:?}, a stage is likely \
             blocked on a queue"
        ),
    }
}
