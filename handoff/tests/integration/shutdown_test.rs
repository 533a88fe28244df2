use handoff::error::{ErrorKind, HandoffError, HandoffResult};
use handoff::pipeline::Pipeline;
use handoff::test_utils::items::work_items;
use handoff::test_utils::pipeline::{run_with_timeout, wait_with_timeout};
use handoff::test_utils::transforms::RecordingTransform;
use handoff::transform::transform_fn;
use handoff::types::{ItemId, PipelineItem, WorkItem};
use handoff_config::shared::StageConfig;
use handoff_telemetry::tracing::init_test_tracing;

/// Which of its bookkeeping methods a [`PoisonedItem`] panics in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Poison {
    Healthy,
    RecordStage,
    RecordStageAndFailure,
    Verdict,
}

/// Item whose own methods panic, outside of any transform.
#[derive(Debug)]
struct PoisonedItem {
    id: ItemId,
    poison: Poison,
    failed: bool,
}

impl PoisonedItem {
    fn batch(count: u64, poisoned: u64, poison: Poison) -> Vec<PoisonedItem> {
        (1..=count)
            .map(|id| PoisonedItem {
                id: ItemId(id),
                poison: if id == poisoned { poison } else { Poison::Healthy },
                failed: false,
            })
            .collect()
    }
}

impl PipelineItem for PoisonedItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn is_failed(&self) -> bool {
        self.failed
    }

    fn mark_failed(&mut self, stage: &str, _error: &HandoffError) {
        if self.poison == Poison::RecordStageAndFailure {
            panic!("item {} cannot be failed in stage {stage}", self.id);
        }
        self.failed = true;
    }

    fn record_stage(&mut self, stage: &str) {
        if matches!(
            self.poison,
            Poison::RecordStage | Poison::RecordStageAndFailure
        ) {
            panic!("item {} poisoned stage {stage}", self.id);
        }
    }

    fn is_successful(&self) -> bool {
        if self.poison == Poison::Verdict {
            panic!("item {} has no verdict", self.id);
        }
        !self.failed
    }
}

fn noop() -> impl Fn(&mut PoisonedItem) -> HandoffResult<()> + Send + Sync {
    |_: &mut PoisonedItem| Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn every_worker_consumes_exactly_one_shutdown_message_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 3), RecordingTransform::new("a"))
        .stage(StageConfig::new("b", 2), RecordingTransform::new("b"))
        .aggregator(StageConfig::new("c", 2))
        .build()
        .unwrap();

    run_with_timeout(&mut pipeline, work_items(30)).await.unwrap();

    let stats = pipeline.stats();
    assert_eq!(stats.len(), 3);

    for (stage, (name, workers)) in stats.iter().zip([("a", 3), ("b", 2), ("c", 2)]) {
        assert_eq!(stage.stage(), name);
        assert_eq!(stage.workers().len(), workers);
        assert_eq!(stage.sentinels(), workers);
        assert_eq!(stage.items(), 30);
        assert!(stage.lost_workers().is_empty());

        for (index, worker) in stage.workers().iter().enumerate() {
            assert_eq!(worker.sentinels, 1);
            assert_eq!(worker.worker.to_string(), format!("{name}-{}", index + 1));
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn poisoned_item_on_bounded_stage_does_not_hang_shutdown_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<PoisonedItem>::builder()
        .stage(
            StageConfig::new("copy", 1).with_queue_capacity(1),
            transform_fn(noop()),
        )
        .build()
        .unwrap();

    pipeline
        .start(PoisonedItem::batch(5, 1, Poison::RecordStage))
        .await
        .unwrap();
    let result = wait_with_timeout(&mut pipeline).await.unwrap();

    // The only worker survived the panic, failed the item and kept draining its queue.
    assert_eq!(result.expected(), 5);
    assert_eq!(result.processed(), 5);
    assert_eq!(result.succeeded(), 4);
    assert_eq!(result.failed(), 1);

    let failed = result
        .items()
        .iter()
        .find(|item| item.is_failed())
        .unwrap();
    assert_eq!(failed.id(), ItemId(1));

    let stats = pipeline.stats();
    assert!(stats[0].lost_workers().is_empty());
    assert_eq!(stats[0].sentinels(), 1);
    assert_eq!(stats[0].failures(), 1);
    assert_eq!(stats[0].dropped(), 0);
    assert_eq!(pipeline.queue_lengths(), vec![0, 0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn item_that_cannot_be_failed_is_dropped_and_reported_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<PoisonedItem>::builder()
        .stage(
            StageConfig::new("copy", 2).with_queue_capacity(1),
            transform_fn(noop()),
        )
        .stage(StageConfig::new("upload", 1), transform_fn(noop()))
        .build()
        .unwrap();

    let err = run_with_timeout(
        &mut pipeline,
        PoisonedItem::batch(8, 3, Poison::RecordStageAndFailure),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kinds(), vec![ErrorKind::ItemPanic]);
    assert_eq!(
        err.detail(),
        Some("Stage 'copy' dropped 1 items that could not be marked as failed")
    );

    // Both workers of the poisoned stage survived, and downstream saw the remaining items.
    let stats = pipeline.stats();
    assert_eq!(stats.len(), 3);
    assert!(stats[0].lost_workers().is_empty());
    assert_eq!(stats[0].sentinels(), 2);
    assert_eq!(stats[0].items(), 8);
    assert_eq!(stats[0].dropped(), 1);
    assert_eq!(stats[1].items(), 7);
    assert_eq!(stats[2].items(), 7);
    assert_eq!(pipeline.queue_lengths(), vec![0, 0, 0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_verdict_is_dropped_by_the_aggregator_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<PoisonedItem>::builder()
        .aggregator(StageConfig::new("verifier", 1).with_queue_capacity(1))
        .build()
        .unwrap();

    let err = run_with_timeout(&mut pipeline, PoisonedItem::batch(5, 2, Poison::Verdict))
        .await
        .unwrap_err();

    assert_eq!(err.kinds(), vec![ErrorKind::ItemPanic]);

    let stats = pipeline.stats();
    assert!(stats[0].lost_workers().is_empty());
    assert_eq!(stats[0].sentinels(), 1);
    assert_eq!(stats[0].items(), 5);
    assert_eq!(stats[0].dropped(), 1);
    assert_eq!(pipeline.queue_lengths(), vec![0]);
}
