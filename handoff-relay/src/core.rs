use std::collections::HashMap;
use std::sync::Arc;

use handoff::pipeline::Pipeline;
use handoff::transform::Transform;
use tracing::info;

use crate::config::{API_UPLOADER_STAGE, RelayConfig, S3_UPLOADER_STAGE};
use crate::error::RelayResult;
use crate::files::{FileRecord, demo_files};
use crate::report::VerificationReport;
use crate::transforms::{ApiUploader, S3Copier};

/// Relays the demo files through the configured pipeline and returns the verification report.
pub async fn start_relay_with_config(config: RelayConfig) -> RelayResult<VerificationReport> {
    info!(
        stages = config.pipeline.stages.len(),
        workers = config.pipeline.total_workers(),
        destination_bucket = %config.destination_bucket,
        "starting relay"
    );

    let files = demo_files(&config.destination_bucket);
    let transforms = transforms(&config);
    let mut pipeline = Pipeline::from_config(config.pipeline, transforms)?;

    let result = pipeline.run(files).await?;

    let report = VerificationReport::new(&result);
    report.log(&result);

    Ok(report)
}

fn transforms(config: &RelayConfig) -> HashMap<String, Arc<dyn Transform<FileRecord>>> {
    let s3_copier: Arc<dyn Transform<FileRecord>> =
        Arc::new(S3Copier::new(config.simulation.s3_copy));
    let api_uploader: Arc<dyn Transform<FileRecord>> =
        Arc::new(ApiUploader::new(config.simulation.api_upload));

    HashMap::from([
        (S3_UPLOADER_STAGE.to_string(), s3_copier),
        (API_UPLOADER_STAGE.to_string(), api_uploader),
    ])
}
