use std::collections::HashMap;
use std::sync::Arc;

use handoff::error::ErrorKind;
use handoff::pipeline::Pipeline;
use handoff::test_utils::items::work_items;
use handoff::test_utils::pipeline::run_with_timeout;
use handoff::test_utils::transforms::RecordingTransform;
use handoff::transform::Transform;
use handoff::types::WorkItem;
use handoff_config::shared::{DispatchConfig, PipelineConfig, StageConfig};
use handoff_telemetry::tracing::init_test_tracing;

fn transforms(names: &[&str]) -> HashMap<String, Arc<dyn Transform<WorkItem>>> {
    names
        .iter()
        .map(|name| {
            let transform: Arc<dyn Transform<WorkItem>> = Arc::new(RecordingTransform::new(*name));
            (name.to_string(), transform)
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_is_built_from_configuration_test() {
    init_test_tracing();

    let config = PipelineConfig {
        stages: vec![
            StageConfig::new("s3-uploader", 3).with_queue_capacity(4),
            StageConfig::new("api-uploader", 2),
        ],
        aggregator: StageConfig::new("verifier", 1),
        dispatch: DispatchConfig::with_delay(0, 2),
    };

    let mut pipeline =
        Pipeline::from_config(config, transforms(&["s3-uploader", "api-uploader"])).unwrap();
    assert_eq!(
        pipeline
            .stage_configs()
            .map(|stage| stage.name.as_str())
            .collect::<Vec<_>>(),
        vec!["s3-uploader", "api-uploader"]
    );
    assert_eq!(pipeline.aggregator_config().name, "verifier");

    let result = run_with_timeout(&mut pipeline, work_items(8)).await.unwrap();
    assert!(result.is_complete());
    for item in result.items() {
        assert_eq!(item.stages(), ["s3-uploader", "api-uploader"]);
    }
}

#[test]
fn stage_without_transform_is_rejected() {
    let config = PipelineConfig {
        stages: vec![StageConfig::new("copy", 1), StageConfig::new("upload", 1)],
        ..PipelineConfig::default()
    };

    let err = Pipeline::from_config(config, transforms(&["copy"]))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(
        err.detail(),
        Some("No transform was registered for stage 'upload'")
    );
}

#[test]
fn invalid_topologies_are_rejected() {
    let zero_workers = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("copy", 0), RecordingTransform::new("copy"))
        .build()
        .err()
        .unwrap();
    assert_eq!(zero_workers.kind(), ErrorKind::ValidationError);

    let duplicate = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("copy", 1), RecordingTransform::new("copy"))
        .stage(StageConfig::new("copy", 1), RecordingTransform::new("copy"))
        .build()
        .err()
        .unwrap();
    assert_eq!(duplicate.kind(), ErrorKind::ValidationError);

    let zero_aggregators = Pipeline::<WorkItem>::builder()
        .aggregator(StageConfig::new("verifier", 0))
        .build()
        .err()
        .unwrap();
    assert_eq!(zero_aggregators.kind(), ErrorKind::ValidationError);
}

#[tokio::test(flavor = "multi_thread")]
async fn huge_queue_capacity_builds_and_runs_test() {
    init_test_tracing();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(
            StageConfig::new("copy", 2).with_queue_capacity(usize::MAX),
            RecordingTransform::new("copy"),
        )
        .aggregator(StageConfig::new("verifier", 1).with_queue_capacity(usize::MAX))
        .build()
        .unwrap();

    let result = run_with_timeout(&mut pipeline, work_items(6)).await.unwrap();
    assert_eq!(result.processed(), 6);
    assert!(result.is_complete());
}
