use handoff::error::ErrorKind;
use handoff::failpoints::{DISPATCHER__BEFORE_PUT, STAGE_WORKER__BEFORE_TRANSFORM};
use handoff::pipeline::Pipeline;
use handoff::test_utils::failpoints::ArmedFailpoints;
use handoff::test_utils::items::work_items;
use handoff::test_utils::pipeline::run_with_timeout;
use handoff::test_utils::transforms::RecordingTransform;
use handoff::types::{PipelineItem, WorkItem};
use handoff_config::shared::StageConfig;
use handoff_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn injected_transform_failures_are_status_encoded_test() {
    init_test_tracing();
    let failpoints = ArmedFailpoints::failing_transforms(2);
    assert_eq!(failpoints.armed(), [STAGE_WORKER__BEFORE_TRANSFORM]);

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("copy", 1), RecordingTransform::new("copy"))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(8)).await.unwrap();

    assert_eq!(result.processed(), 8);
    assert_eq!(result.succeeded(), 6);
    assert_eq!(result.failed(), 2);

    // With a single worker the first two items hit the fail point.
    let failed = result
        .items()
        .iter()
        .filter(|item| item.is_failed())
        .map(|item| item.id().0)
        .collect::<Vec<_>>();
    assert_eq!(failed, vec![1, 2]);
    assert_eq!(
        result.items()[0].failure().unwrap().reason,
        "An error occurred in a fail point: The failpoint 'stage_worker.before_transform' returned an error"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatcher_failure_still_shuts_every_stage_down_test() {
    init_test_tracing();
    let failpoints = ArmedFailpoints::failing_dispatch_after(3);
    assert_eq!(failpoints.armed(), [DISPATCHER__BEFORE_PUT]);

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("copy", 2), RecordingTransform::new("copy"))
        .stage(StageConfig::new("upload", 2), RecordingTransform::new("upload"))
        .build()
        .unwrap();

    let err = run_with_timeout(&mut pipeline, work_items(8))
        .await
        .unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::TransformFailed]);

    // The three items dispatched before the failure went through the whole pipeline.
    let stats = pipeline.stats();
    assert_eq!(stats.len(), 3);
    assert!(stats.iter().all(|stage| stage.items() == 3));
    assert!(stats.iter().all(|stage| stage.lost_workers().is_empty()));
    assert_eq!(pipeline.queue_lengths(), vec![0, 0, 0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn disarmed_failpoints_no_longer_fail_items_test() {
    init_test_tracing();

    let failpoints = ArmedFailpoints::arm(&[(STAGE_WORKER__BEFORE_TRANSFORM, "return")]);
    drop(failpoints);

    let _failpoints = ArmedFailpoints::arm(&[]);
    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("copy", 2), RecordingTransform::new("copy"))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(4)).await.unwrap();
    assert_eq!(result.failed(), 0);
    assert!(result.is_complete());
}
