use async_trait::async_trait;
use chrono::Utc;
use handoff::bail;
use handoff::error::{ErrorKind, HandoffResult};
use handoff::transform::Transform;
use tracing::info;
use uuid::Uuid;

use crate::config::LatencyRange;
use crate::files::{FileRecord, FileStatus};

/// Layout of the timestamp prefix of destination keys.
const DEST_KEY_TIMESTAMP_FORMAT: &str = "%Y/%m/%d/%H/%M/%S";

/// Builds a destination key `YYYY/MM/DD/HH/MM/SS/<uuid v4>` for a copy made now.
pub fn destination_key() -> String {
    format!(
        "{}/{}",
        Utc::now().format(DEST_KEY_TIMESTAMP_FORMAT),
        Uuid::new_v4()
    )
}

/// Extracts the uuid ending a destination key.
pub fn upload_id_from_key(dest_key: &str) -> HandoffResult<Uuid> {
    let candidate = dest_key.rsplit('/').next().unwrap_or_default();

    match Uuid::parse_str(candidate) {
        Ok(upload_id) => Ok(upload_id),
        Err(err) => bail!(
            ErrorKind::InvalidData,
            "Destination key does not end with a uuid",
            format!("Key '{dest_key}' cannot be mapped to an upload id"),
            source: err
        ),
    }
}

/// Simulated copy of a file from the source bucket to the destination bucket.
#[derive(Debug, Clone)]
pub struct S3Copier {
    latency: LatencyRange,
}

impl S3Copier {
    pub fn new(latency: LatencyRange) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Transform<FileRecord> for S3Copier {
    async fn process(&self, file: &mut FileRecord) -> HandoffResult<()> {
        if file.status != FileStatus::Ready {
            bail!(
                ErrorKind::InvalidData,
                "Only ready files can be copied",
                format!("File '{}' has status {}", file.name, file.status)
            );
        }

        if let Some(latency) = self.latency.sample() {
            tokio::time::sleep(latency).await;
        }

        let dest_key = destination_key();
        info!(
            file = %file.name,
            src_bucket = %file.src_bucket,
            src_key = %file.src_key,
            dest_bucket = %file.dest_bucket,
            %dest_key,
            "file copied"
        );

        file.dest_key = Some(dest_key);
        file.status = FileStatus::S3Copied;

        Ok(())
    }
}

/// Simulated upload of a file's metadata to the REST API.
///
/// The API is assumed to return the uuid of the destination key, so the file has the same id in
/// the bucket and in the API.
#[derive(Debug, Clone)]
pub struct ApiUploader {
    latency: LatencyRange,
}

impl ApiUploader {
    pub fn new(latency: LatencyRange) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Transform<FileRecord> for ApiUploader {
    async fn process(&self, file: &mut FileRecord) -> HandoffResult<()> {
        let Some(dest_key) = file.dest_key.as_deref() else {
            bail!(
                ErrorKind::InvalidData,
                "File was not copied before the upload",
                format!("File '{}' has no destination key", file.name)
            );
        };
        let upload_id = upload_id_from_key(dest_key)?;

        if let Some(latency) = self.latency.sample() {
            tokio::time::sleep(latency).await;
        }

        info!(file = %file.name, %upload_id, "file metadata uploaded");

        file.upload_id = Some(upload_id);
        file.status = FileStatus::ApiUploaded;

        Ok(())
    }
}
