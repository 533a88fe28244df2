use std::collections::BTreeMap;
use std::fmt;

use handoff::error::HandoffError;
use handoff::types::{ItemFailure, ItemId, PipelineItem};
use uuid::Uuid;

/// Bucket the demo files are copied from.
pub const SOURCE_BUCKET: &str = "src-bucket-proj";

/// Processing status of a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Ready,
    S3Copied,
    ApiUploaded,
    Failed(ItemFailure),
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Ready => f.write_str("READY"),
            FileStatus::S3Copied => f.write_str("S3_COPIED"),
            FileStatus::ApiUploaded => f.write_str("API_UPLOADED"),
            FileStatus::Failed(failure) => write!(f, "FAILED ({}: {})", failure.stage, failure.reason),
        }
    }
}

/// A file relayed from the source bucket to the destination bucket and registered in the API.
///
/// `dest_key` is filled by the S3 copy and `upload_id` by the API upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
    pub src_bucket: String,
    pub src_key: String,
    pub dest_bucket: String,
    pub dest_key: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub upload_id: Option<Uuid>,
    pub status: FileStatus,
}

impl FileRecord {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        src_key: impl Into<String>,
        dest_bucket: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            src_bucket: SOURCE_BUCKET.to_string(),
            src_key: src_key.into(),
            dest_bucket: dest_bucket.into(),
            dest_key: None,
            meta: BTreeMap::new(),
            upload_id: None,
            status: FileStatus::Ready,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

impl PipelineItem for FileRecord {
    fn id(&self) -> ItemId {
        ItemId(self.id)
    }

    fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed(_))
    }

    fn mark_failed(&mut self, stage: &str, error: &HandoffError) {
        self.status = FileStatus::Failed(ItemFailure::new(stage, error));
    }

    fn is_successful(&self) -> bool {
        self.status == FileStatus::ApiUploaded
    }
}

/// The eight demo files relayed into `dest_bucket`.
pub fn demo_files(dest_bucket: &str) -> Vec<FileRecord> {
    let projects = [
        "project1", "project1", "project1", "project2", "project2", "project3", "project3",
        "project3",
    ];

    projects
        .into_iter()
        .zip(1u64..)
        .map(|(project, id)| {
            let file_id = 99 + id;
            FileRecord::new(
                id,
                format!("file_{file_id}.pdf"),
                format!("{project}/uuid{id}"),
                dest_bucket,
            )
            .with_meta("fileId", file_id.to_string())
            .with_meta("type", project)
        })
        .collect()
}
