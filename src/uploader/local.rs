use super::Uploader;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Object store backed by a local directory: `<base>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    base_path: PathBuf,
}

impl LocalUploader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Buckets and keys are single path components; anything that could
    /// escape the base directory is rejected.
    fn validate_component(value: &str) -> Result<()> {
        if value.is_empty()
            || value == "."
            || value.contains("..")
            || value.contains('/')
            || value.contains('\\')
        {
            return Err(Error::InvalidKey(value.to_string()));
        }
        Ok(())
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        Self::validate_component(bucket)?;
        Self::validate_component(key)?;
        Ok(self.base_path.join(bucket).join(key))
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        fs::create_dir_all(self.base_path.join(bucket)).await?;
        Ok(())
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload_file(&self, path: &Path, bucket: &str, object_id: &str) -> Result<bool> {
        let target = self.object_path(bucket, object_id)?;
        self.ensure_bucket(bucket).await?;
        let bytes = fs::copy(path, &target).await?;
        debug!("Stored {} as {} ({} bytes)", path.display(), target.display(), bytes);
        Ok(true)
    }

    async fn upload_metadata(&self, metadata_json: &str, bucket: &str, key: &str) -> Result<bool> {
        let target = self.object_path(bucket, key)?;
        self.ensure_bucket(bucket).await?;
        fs::write(&target, metadata_json.as_bytes()).await?;
        Ok(true)
    }

    async fn get_uploaded_data(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let target = self.object_path(bucket, key)?;
        Ok(fs::read(&target).await?)
    }
}
