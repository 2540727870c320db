pub mod local;

use crate::error::Result;
use crate::storage::{FileRecord, UploadStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use local::LocalUploader;

/// Object storage capability. `Ok(false)` means the backend declined the
/// request; both that and `Err` are treated as a failed upload.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_file(&self, path: &Path, bucket: &str, object_id: &str) -> Result<bool>;

    async fn upload_metadata(&self, metadata_json: &str, bucket: &str, key: &str) -> Result<bool>;

    async fn get_uploaded_data(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Descriptive metadata stored next to each uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub file_name: String,
    pub file_path: String,
    pub size: u64,
    pub last_modified: i64,
    pub permissions: String,
}

/// Self-contained description of one upload unit. This is also the wire
/// format handed to worker processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: String,
    pub file_path: PathBuf,
    pub bucket: String,
    pub object_id: String,
    pub size: u64,
    pub metadata: FileMetadata,
}

impl UploadTask {
    pub fn from_record(record: &FileRecord, bucket: &str) -> Self {
        UploadTask {
            id: record.id.clone(),
            file_path: PathBuf::from(&record.file_path),
            bucket: bucket.to_string(),
            object_id: record.id.clone(),
            size: record.size,
            metadata: FileMetadata {
                id: record.id.clone(),
                file_name: record.file_name.clone(),
                file_path: record.file_path.clone(),
                size: record.size,
                last_modified: record.last_modified,
                permissions: record.permissions.clone(),
            },
        }
    }

    pub fn metadata_key(&self) -> String {
        metadata_key(&self.object_id)
    }
}

pub fn metadata_key(object_id: &str) -> String {
    format!("metadata-{}", object_id)
}

/// Upload the file, then its metadata. Completed only if both succeed;
/// every failure is folded into `Failed`.
pub async fn perform_upload(uploader: &dyn Uploader, task: &UploadTask) -> UploadStatus {
    debug!("Uploading {} ({} bytes)", task.file_path.display(), task.size);

    match uploader
        .upload_file(&task.file_path, &task.bucket, &task.object_id)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!("Upload of {} was rejected", task.file_path.display());
            return UploadStatus::Failed;
        }
        Err(e) => {
            warn!("Upload of {} failed: {}", task.file_path.display(), e);
            return UploadStatus::Failed;
        }
    }

    let metadata_json = match serde_json::to_string(&task.metadata) {
        Ok(json) => json,
        Err(e) => {
            warn!("Cannot serialize metadata for {}: {}", task.id, e);
            return UploadStatus::Failed;
        }
    };

    match uploader
        .upload_metadata(&metadata_json, &task.bucket, &task.metadata_key())
        .await
    {
        Ok(true) => UploadStatus::Completed,
        Ok(false) => {
            warn!("Metadata upload for {} was rejected", task.id);
            UploadStatus::Failed
        }
        Err(e) => {
            warn!("Metadata upload for {} failed: {}", task.id, e);
            UploadStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedUploader {
        file_result: Option<bool>,
        metadata_result: Option<bool>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Uploader for ScriptedUploader {
        async fn upload_file(&self, _path: &Path, _bucket: &str, object_id: &str) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("file:{}", object_id));
            self.file_result
                .ok_or_else(|| Error::Upload("connection reset".to_string()))
        }

        async fn upload_metadata(&self, metadata_json: &str, _bucket: &str, key: &str) -> Result<bool> {
            let parsed: FileMetadata = serde_json::from_str(metadata_json).unwrap();
            assert_eq!(parsed.file_name, "a.txt");
            self.calls.lock().unwrap().push(format!("meta:{}", key));
            self.metadata_result
                .ok_or_else(|| Error::Upload("connection reset".to_string()))
        }

        async fn get_uploaded_data(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn task() -> UploadTask {
        let record = FileRecord {
            id: "rec-1".to_string(),
            batch_id: "batch".to_string(),
            size: 3,
            last_modified: 1_700_000_000,
            permissions: "644".to_string(),
            file_name: "a.txt".to_string(),
            file_path: "/root/a.txt".to_string(),
            status: UploadStatus::Pending,
        };
        UploadTask::from_record(&record, "bucket")
    }

    #[tokio::test]
    async fn test_completed_only_when_both_uploads_succeed() {
        let uploader = ScriptedUploader {
            file_result: Some(true),
            metadata_result: Some(true),
            ..Default::default()
        };
        assert_eq!(perform_upload(&uploader, &task()).await, UploadStatus::Completed);
        assert_eq!(
            *uploader.calls.lock().unwrap(),
            vec!["file:rec-1".to_string(), "meta:metadata-rec-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_file_skips_metadata() {
        let uploader = ScriptedUploader {
            file_result: Some(false),
            metadata_result: Some(true),
            ..Default::default()
        };
        assert_eq!(perform_upload(&uploader, &task()).await, UploadStatus::Failed);
        assert_eq!(uploader.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_errors_become_failed() {
        let file_error = ScriptedUploader::default();
        assert_eq!(perform_upload(&file_error, &task()).await, UploadStatus::Failed);

        let metadata_error = ScriptedUploader {
            file_result: Some(true),
            ..Default::default()
        };
        assert_eq!(perform_upload(&metadata_error, &task()).await, UploadStatus::Failed);

        let metadata_rejected = ScriptedUploader {
            file_result: Some(true),
            metadata_result: Some(false),
            ..Default::default()
        };
        assert_eq!(perform_upload(&metadata_rejected, &task()).await, UploadStatus::Failed);
    }

    #[test]
    fn test_task_wire_format() {
        let task = task();
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"object_id\":\"rec-1\""));
        let back: UploadTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
