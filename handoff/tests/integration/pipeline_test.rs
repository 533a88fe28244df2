use std::collections::BTreeSet;
use std::time::Duration;

use handoff::error::ErrorKind;
use handoff::pipeline::Pipeline;
use handoff::test_utils::items::work_items;
use handoff::test_utils::pipeline::{run_with_timeout, wait_with_timeout};
use handoff::test_utils::transforms::{
    FailingTransform, GatedTransform, PanickingTransform, RecordingTransform,
};
use handoff::types::{ItemId, PipelineItem, WorkItem, WorkStatus};
use handoff_config::shared::StageConfig;
use handoff_telemetry::tracing::init_test_tracing;

fn ids(items: &[WorkItem]) -> Vec<u64> {
    items.iter().map(|item| item.id().0).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn eight_items_flow_through_every_stage_test() {
    init_test_tracing();

    let copy = RecordingTransform::new("a");
    let upload = RecordingTransform::new("b");
    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 3), copy.clone())
        .stage(StageConfig::new("b", 2), upload.clone())
        .aggregator(StageConfig::new("c", 1))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(8)).await.unwrap();

    assert_eq!(result.expected(), 8);
    assert_eq!(result.processed(), 8);
    assert_eq!(result.succeeded(), 8);
    assert_eq!(result.failed(), 0);
    assert_eq!(result.missing(), 0);
    assert!(result.is_complete());

    // Every queue was drained by the shutdown sequence.
    assert_eq!(pipeline.queue_lengths(), vec![0, 0, 0]);

    for item in result.items() {
        assert_eq!(item.stages(), ["a", "b"]);
        assert_eq!(item.attribute("visited_a"), Some("true"));
        assert_eq!(item.attribute("visited_b"), Some("true"));
    }
    assert_eq!(copy.processed().len(), 8);
    assert_eq!(upload.processed().len(), 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_item_is_delivered_exactly_once_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(
            StageConfig::new("copy", 4).with_queue_capacity(3),
            RecordingTransform::new("copy").with_delay(Duration::from_millis(1)),
        )
        .stage(
            StageConfig::new("upload", 3).with_queue_capacity(2),
            RecordingTransform::new("upload"),
        )
        .aggregator(StageConfig::new("verifier", 2).with_queue_capacity(1))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(200)).await.unwrap();

    assert_eq!(result.expected(), 200);
    assert_eq!(result.processed(), 200);
    assert_eq!(result.succeeded() + result.failed(), result.processed());

    let delivered = ids(result.items());
    let unique = delivered.iter().copied().collect::<BTreeSet<_>>();
    assert_eq!(delivered.len(), unique.len());
    assert_eq!(unique, (1..=200).collect::<BTreeSet<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_stages_preserve_order_test() {
    init_test_tracing();

    let transform = RecordingTransform::new("copy");
    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("copy", 1), transform.clone())
        .aggregator(StageConfig::new("verifier", 1))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(50)).await.unwrap();

    let expected = (1..=50).collect::<Vec<_>>();
    assert_eq!(ids(result.items()), expected);
    assert_eq!(
        transform.processed(),
        expected.into_iter().map(ItemId).collect::<Vec<_>>()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_failure_is_counted_not_raised_test() {
    init_test_tracing();

    let upload = RecordingTransform::new("b");
    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 3), FailingTransform::on_ids([5]))
        .stage(StageConfig::new("b", 2), upload.clone())
        .aggregator(StageConfig::new("c", 1))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(8)).await.unwrap();

    assert_eq!(result.expected(), 8);
    assert_eq!(result.processed(), 8);
    assert_eq!(result.succeeded(), 7);
    assert_eq!(result.failed(), 1);
    assert!(!result.is_complete());

    let failed = result
        .items()
        .iter()
        .find(|item| item.is_failed())
        .unwrap();
    assert_eq!(failed.id(), ItemId(5));
    let failure = failed.failure().unwrap();
    assert_eq!(failure.stage, "a");
    assert_eq!(
        failure.reason,
        "Test transform failed: Item 5 is configured to fail"
    );

    // The failed item skipped the following stage.
    assert_eq!(failed.attribute("visited_b"), None);
    assert!(!upload.processed().contains(&ItemId(5)));
    assert_eq!(upload.processed().len(), 7);

    assert_eq!(pipeline.stats()[0].failures(), 1);
    assert_eq!(pipeline.stats()[1].failures(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_panic_is_counted_not_raised_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 2), PanickingTransform::on_ids([2, 7]))
        .stage(StageConfig::new("b", 2), RecordingTransform::new("b"))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(8)).await.unwrap();

    assert_eq!(result.processed(), 8);
    assert_eq!(result.succeeded(), 6);
    assert_eq!(result.failed(), 2);

    for item in result.items().iter().filter(|item| item.is_failed()) {
        let failure = item.failure().unwrap();
        assert_eq!(failure.stage, "a");
        assert!(failure.reason.starts_with("Transform panicked: test transform panicked"));
    }

    // Both workers of the panicking stage survived and consumed their shutdown message.
    assert!(pipeline.stats()[0].lost_workers().is_empty());
    assert_eq!(pipeline.stats()[0].sentinels(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn full_queue_blocks_the_dispatcher_test() {
    init_test_tracing();

    let gate = GatedTransform::new();
    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("slow", 1).with_queue_capacity(1), gate.clone())
        .build()
        .unwrap();

    pipeline.start(work_items(6)).await.unwrap();

    // The only worker holds the first item at the gate.
    gate.entered().notified().await;

    // The dispatcher fills the single slot of the queue and then blocks.
    let mut waited = Duration::ZERO;
    while pipeline.queue_lengths()[0] < 1 {
        assert!(waited < Duration::from_secs(5), "queue never filled up");
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += Duration::from_millis(5);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.queue_lengths()[0], 1);
    assert_eq!(pipeline.queue_lengths()[1], 0);

    gate.open();

    let result = wait_with_timeout(&mut pipeline).await.unwrap();
    assert_eq!(result.expected(), 6);
    assert_eq!(result.processed(), 6);
    assert!(result.is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_completes_immediately_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 3), RecordingTransform::new("a"))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, Vec::<WorkItem>::new())
        .await
        .unwrap();

    assert_eq!(result.expected(), 0);
    assert_eq!(result.processed(), 0);
    assert!(result.is_complete());
    assert!(result.items().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn aggregator_only_pipeline_collects_items_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .aggregator(StageConfig::new("verifier", 3))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(10)).await.unwrap();

    assert_eq!(result.processed(), 10);
    assert!(
        result
            .items()
            .iter()
            .all(|item| item.status() == &WorkStatus::Ready)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_runs_only_once_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 2), RecordingTransform::new("a"))
        .build()
        .unwrap();

    // Waiting before starting is rejected, and does not prevent a later run.
    let err = pipeline.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let result = run_with_timeout(&mut pipeline, work_items(4)).await.unwrap();
    assert_eq!(result.processed(), 4);

    let err = pipeline.run(work_items(4)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = pipeline.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn starting_twice_is_rejected_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("a", 1), RecordingTransform::new("a"))
        .build()
        .unwrap();

    pipeline.start(work_items(3)).await.unwrap();
    let err = pipeline.start(work_items(3)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // The first run is unaffected.
    let result = wait_with_timeout(&mut pipeline).await.unwrap();
    assert_eq!(result.expected(), 3);
    assert_eq!(result.processed(), 3);
}
