//! Local filesystem storage backend, for development and tests.
//!
//! The multipart protocol is emulated on disk: parts are staged under
//! `{key}.parts/` as numbered files and concatenated into the final object
//! on completion. Abort removes the staging directory.

use async_trait::async_trait;
use bytes::Bytes;
use picpack_core::StorageBackend;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::traits::{ObjectStorage, StorageError, StorageResult, UploadPart};

const UPLOAD_ID_MARKER: &str = ".upload_id";

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for object storage (e.g., "/var/lib/picpack/objects")
    /// * `base_url` - Base URL for serving objects (e.g., "http://localhost:8080/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys containing path traversal sequences that could escape
    /// the base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        Ok(self.base_path.join(storage_key))
    }

    /// Staging directory for an in-progress multipart upload of `key`.
    fn staging_dir(&self, storage_key: &str) -> StorageResult<PathBuf> {
        Ok(self
            .key_to_path(storage_key)?
            .with_extension("zip.parts"))
    }

    fn part_path(staging: &Path, part_number: i32) -> PathBuf {
        staging.join(format!("{}.part", part_number))
    }

    /// Generate public URL for an object
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Verify the staging directory belongs to `upload_id`.
    async fn check_upload_id(&self, staging: &Path, upload_id: &str) -> StorageResult<()> {
        let marker = staging.join(UPLOAD_ID_MARKER);
        let recorded = fs::read_to_string(&marker)
            .await
            .map_err(|_| StorageError::UnknownUpload(upload_id.to_string()))?;
        if recorded.trim() != upload_id {
            return Err(StorageError::UnknownUpload(upload_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        let staging = self.staging_dir(key)?;
        fs::create_dir_all(&staging).await?;

        let upload_id = Uuid::new_v4().to_string();
        fs::write(staging.join(UPLOAD_ID_MARKER), &upload_id).await?;

        tracing::info!(
            key = %key,
            upload_id = %upload_id,
            staging = %staging.display(),
            "Local multipart upload created"
        );

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String> {
        let staging = self.staging_dir(key)?;
        self.check_upload_id(&staging, upload_id).await?;

        let path = Self::part_path(&staging, part_number);
        let size = data.len();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create part {}: {}", path.display(), e))
        })?;
        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write part {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync part {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            key = %key,
            part_number,
            size_bytes = size,
            "Local part staged"
        );

        // Opaque token standing in for the service-issued etag.
        Ok(format!("{}-{}", Uuid::new_v4().simple(), part_number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadPart],
    ) -> StorageResult<()> {
        let staging = self.staging_dir(key)?;
        self.check_upload_id(&staging, upload_id).await?;

        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;

        let mut out = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;

        let mut total = 0u64;
        for part in parts {
            let part_file = Self::part_path(&staging, part.part_number);
            let data = fs::read(&part_file).await.map_err(|e| {
                StorageError::InvalidParts(format!(
                    "missing staged part {}: {}",
                    part.part_number, e
                ))
            })?;
            total += data.len() as u64;
            out.write_all(&data).await?;
        }
        out.sync_all().await?;

        fs::remove_dir_all(&staging).await?;

        tracing::info!(
            key = %key,
            parts = parts.len(),
            size_bytes = total,
            path = %path.display(),
            "Local multipart upload completed"
        );

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let staging = self.staging_dir(key)?;
        self.check_upload_id(&staging, upload_id).await?;

        fs::remove_dir_all(&staging).await?;

        tracing::info!(key = %key, "Local multipart upload aborted");

        Ok(())
    }

    async fn presigned_get_url(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        self.key_to_path(key)?;
        Ok(self.generate_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        self.generate_url(key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
