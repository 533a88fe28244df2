use handoff::pipeline::Pipeline;
use handoff::test_utils::items::work_items;
use handoff::test_utils::pipeline::run_with_timeout;
use handoff::test_utils::transforms::FailingTransform;
use handoff::types::WorkItem;
use handoff_config::shared::StageConfig;
use handoff_telemetry::metrics::init_metrics_handle;
use handoff_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn stage_counters_are_recorded_test() {
    init_test_tracing();
    let handle = init_metrics_handle().unwrap();

    let mut pipeline = Pipeline::<WorkItem>::builder()
        .stage(StageConfig::new("metered", 2), FailingTransform::on_ids([3]))
        .aggregator(StageConfig::new("metered-verifier", 1))
        .build()
        .unwrap();

    run_with_timeout(&mut pipeline, work_items(5)).await.unwrap();

    let rendered = handle.render();
    assert!(rendered.contains(r#"handoff_items_processed_total{stage="metered"} 5"#));
    assert!(rendered.contains(r#"handoff_items_failed_total{stage="metered"} 1"#));
    assert!(rendered.lines().any(|line| {
        line.starts_with("handoff_items_aggregated_total{")
            && line.contains(r#"stage="metered-verifier""#)
            && line.contains(r#"outcome="failed""#)
            && line.ends_with(" 1")
    }));
}
