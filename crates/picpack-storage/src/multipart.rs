//! Multipart upload coordinator.
//!
//! Consumes the archive builder's outgoing byte stream in fixed-size chunks
//! and uploads each chunk as a part, concurrently with archive production.
//! Part numbers are assigned at buffer-flush time in strict production
//! sequence; completion sorts by part number before finalizing, since the
//! storage service rejects out-of-order or duplicate part numbers.
//!
//! State machine: `NotStarted → InProgress → Completing → Completed`, or
//! `InProgress → Aborting → Aborted` on unrecoverable part failure or
//! producer cancellation. A coordinator value is single-use; `run` consumes
//! it.

use bytes::{Bytes, BytesMut};
use picpack_core::constants::DEFAULT_PART_SIZE_BYTES;
use picpack_core::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::traits::{ObjectStorage, StorageError, StorageResult, UploadPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    NotStarted,
    InProgress,
    Completing,
    Completed,
    Aborting,
    Aborted,
}

#[derive(Clone)]
pub struct MultipartConfig {
    /// Size at which a buffered part is flushed. The final remainder is
    /// always flushed regardless of size.
    pub part_size: usize,
    /// Per-part retry policy.
    pub retry: RetryPolicy,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE_BYTES,
            retry: RetryPolicy::bounded(3, Duration::from_millis(500)),
        }
    }
}

/// Result of a finished multipart upload.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub key: String,
    pub total_bytes: u64,
    pub parts: Vec<UploadPart>,
}

pub struct MultipartUploader {
    storage: Arc<dyn ObjectStorage>,
    key: String,
    content_type: String,
    config: MultipartConfig,
    state: UploadState,
}

impl MultipartUploader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        key: impl Into<String>,
        content_type: impl Into<String>,
        config: MultipartConfig,
    ) -> Self {
        Self {
            storage,
            key: key.into(),
            content_type: content_type.into(),
            config,
            state: UploadState::NotStarted,
        }
    }

    fn set_state(&mut self, next: UploadState) {
        tracing::debug!(key = %self.key, from = ?self.state, to = ?next, "Upload state transition");
        self.state = next;
    }

    /// Consume `reader` to EOF, uploading parts as they fill, then finalize
    /// the object. Cancelling `cancel` aborts the upload server-side; so
    /// does a part failure that exhausts its retries.
    #[tracing::instrument(skip(self, reader, cancel), fields(key = %self.key))]
    pub async fn run<R>(
        mut self,
        reader: R,
        cancel: CancellationToken,
    ) -> StorageResult<CompletedUpload>
    where
        R: AsyncRead + Unpin + Send,
    {
        let upload_id = self
            .storage
            .create_multipart_upload(&self.key, &self.content_type)
            .await?;
        self.set_state(UploadState::InProgress);

        match self.consume(reader, &upload_id, &cancel).await {
            Ok(parts) => {
                self.set_state(UploadState::Completing);
                let sorted = sort_and_validate(parts)?;
                self.storage
                    .complete_multipart_upload(&self.key, &upload_id, &sorted)
                    .await?;
                self.set_state(UploadState::Completed);

                let total_bytes: u64 = sorted.iter().map(|p| p.size).sum();
                tracing::info!(
                    key = %self.key,
                    parts = sorted.len(),
                    total_bytes,
                    "Multipart upload completed"
                );
                Ok(CompletedUpload {
                    key: self.key,
                    total_bytes,
                    parts: sorted,
                })
            }
            Err(e) => {
                self.set_state(UploadState::Aborting);
                if let Err(abort_err) = self
                    .storage
                    .abort_multipart_upload(&self.key, &upload_id)
                    .await
                {
                    tracing::error!(
                        key = %self.key,
                        error = %abort_err,
                        "Failed to abort multipart upload; incomplete parts may remain"
                    );
                }
                self.set_state(UploadState::Aborted);
                Err(e)
            }
        }
    }

    /// Read the stream to EOF, flushing a part whenever the buffer reaches
    /// the configured part size. The final remainder always goes out as the
    /// last part, whatever its size.
    async fn consume<R>(
        &self,
        mut reader: R,
        upload_id: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<UploadPart>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let part_size = self.config.part_size;
        let mut buffer = BytesMut::with_capacity(part_size);
        let mut chunk = vec![0u8; 64 * 1024];
        let mut parts: Vec<UploadPart> = Vec::new();
        let mut next_part_number = 1i32;

        loop {
            let want = (part_size - buffer.len()).min(chunk.len());
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StorageError::Aborted(
                        "producer cancelled the upload".to_string(),
                    ));
                }
                r = reader.read(&mut chunk[..want]) => r,
            };
            let n = read
                .map_err(|e| StorageError::UploadFailed(format!("archive stream error: {}", e)))?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);

            if buffer.len() == part_size {
                let data = buffer.split().freeze();
                let part = self
                    .upload_part_with_retry(upload_id, next_part_number, data)
                    .await?;
                parts.push(part);
                next_part_number += 1;
            }
        }

        // Remainder (possibly empty if the stream ended exactly on a part
        // boundary; an empty stream still yields one zero-byte part so the
        // completion call has something to finalize).
        if !buffer.is_empty() || parts.is_empty() {
            let data = buffer.split().freeze();
            let part = self
                .upload_part_with_retry(upload_id, next_part_number, data)
                .await?;
            parts.push(part);
        }

        Ok(parts)
    }

    async fn upload_part_with_retry(
        &self,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<UploadPart> {
        let size = data.len() as u64;
        let mut failures = 0u32;
        loop {
            match self
                .storage
                .upload_part(&self.key, upload_id, part_number, data.clone())
                .await
            {
                Ok(etag) => {
                    tracing::debug!(key = %self.key, part_number, size, "Part uploaded");
                    return Ok(UploadPart {
                        part_number,
                        etag,
                        size,
                    });
                }
                Err(e) => {
                    failures += 1;
                    if self.config.retry.should_retry(failures) {
                        let delay = self.config.retry.delay_for(failures);
                        tracing::warn!(
                            key = %self.key,
                            part_number,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Part upload failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(
                            key = %self.key,
                            part_number,
                            attempts = failures,
                            error = %e,
                            "Part upload failed after retries"
                        );
                        return Err(StorageError::PartFailed {
                            part_number,
                            attempts: failures,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Sort parts by part number and reject gaps or duplicates. Completion is
/// order-sensitive on the storage side; this catches coordinator bugs
/// before they turn into opaque service errors.
fn sort_and_validate(mut parts: Vec<UploadPart>) -> StorageResult<Vec<UploadPart>> {
    parts.sort_by_key(|p| p.part_number);
    for (i, part) in parts.iter().enumerate() {
        let expected = (i + 1) as i32;
        if part.part_number != expected {
            return Err(StorageError::InvalidParts(format!(
                "expected part {} at position {}, found {}",
                expected, i, part.part_number
            )));
        }
    }
    Ok(parts)
}
