//! Storage abstraction trait
//!
//! This module defines the ObjectStorage trait that all storage backends
//! must implement. The surface is multipart-first: the worker streams every
//! archive through the multipart protocol, so backends only need the four
//! multipart operations plus download-link generation.

use async_trait::async_trait;
use bytes::Bytes;
use picpack_core::StorageBackend;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Part {part_number} failed after {attempts} attempts: {reason}")]
    PartFailed {
        part_number: i32,
        attempts: u32,
        reason: String,
    },

    #[error("Upload aborted: {0}")]
    Aborted(String),

    #[error("Invalid part list: {0}")]
    InvalidParts(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Unknown upload id: {0}")]
    UnknownUpload(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One uploaded part of a multipart upload.
///
/// Part numbers are 1-based and assigned in strict byte-stream order.
/// Completion is order-sensitive: parts must be sorted by `part_number`
/// before the upload is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub part_number: i32,
    pub etag: String,
    pub size: u64,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait so
/// the upload coordinator can run against any of them.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Begin a multipart upload and return its upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str)
        -> StorageResult<String>;

    /// Upload one part and return its completion token (etag).
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Finalize the object from its uploaded parts. `parts` must be sorted
    /// by part number and contiguous from 1.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadPart],
    ) -> StorageResult<()>;

    /// Abort an in-progress upload, releasing server-side storage held by
    /// already-uploaded parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Generate a presigned/temporary URL for direct access (GET)
    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Public (unsigned) URL for the object.
    fn public_url(&self, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
