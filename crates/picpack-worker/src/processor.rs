//! Per-job processing pipeline.
//!
//! One job at a time: items are fetched and appended to the streaming
//! archive while the multipart coordinator consumes the archive's bytes
//! from the other end of a bounded duplex pipe. The pipe's capacity is the
//! memory backpressure point: the builder blocks writing once it is full
//! until the uploader drains it, so peak memory stays a small constant
//! multiple of the part size no matter how large the collection is.

use picpack_core::constants::ARCHIVE_CONTENT_TYPE;
use picpack_core::models::{Job, JobOutcome, JobStatus};
use picpack_core::{JobError, RetryPolicy, WorkerConfig};
use picpack_services::{bundle_items, MediaFetcher};
use picpack_storage::{archive_key, MultipartConfig, MultipartUploader, ObjectStorage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct ProcessorConfig {
    pub part_size: usize,
    pub part_retry: RetryPolicy,
    pub compression_level: u32,
    pub pipe_capacity: usize,
    pub download_url_expiry: Duration,
}

impl ProcessorConfig {
    pub fn from_worker(config: &WorkerConfig) -> Self {
        Self {
            part_size: config.part_size_bytes,
            part_retry: RetryPolicy::bounded(
                config.part_upload_max_attempts,
                Duration::from_millis(500),
            ),
            compression_level: config.compression_level,
            pipe_capacity: config.pipe_capacity_bytes,
            download_url_expiry: config.download_url_expiry(),
        }
    }
}

pub struct JobProcessor {
    fetcher: Arc<dyn MediaFetcher>,
    storage: Arc<dyn ObjectStorage>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        storage: Arc<dyn ObjectStorage>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            fetcher,
            storage,
            config,
        }
    }

    /// Run one job to a terminal outcome. All failures are folded into the
    /// returned [`JobOutcome`]; the caller decides what to do with it.
    #[tracing::instrument(skip(self, job), fields(event_id = %job.event_id, request_id = %job.request_id, items = job.items.len()))]
    pub async fn process(&self, job: &Job) -> JobOutcome {
        let start = Instant::now();

        if job.items.is_empty() {
            tracing::warn!("Job carries no items, failing without an upload");
            return self.failure(job, start, Vec::new(), 0, "job contains no media items");
        }

        let key = archive_key(&job.event_id);
        let uploader = MultipartUploader::new(
            self.storage.clone(),
            key.clone(),
            ARCHIVE_CONTENT_TYPE,
            MultipartConfig {
                part_size: self.config.part_size,
                retry: self.config.part_retry,
            },
        );

        let (mut writer, reader) = tokio::io::duplex(self.config.pipe_capacity);
        let cancel = CancellationToken::new();
        let upload_task = tokio::spawn(uploader.run(reader, cancel.clone()));

        let bundle_result = bundle_items(
            self.fetcher.as_ref(),
            &job.items,
            &mut writer,
            self.config.compression_level,
            self.config.part_size,
        )
        .await;

        match bundle_result {
            Ok(summary) if summary.succeeded_count() > 0 => {
                // The archive was finalized and the pipe shut down; EOF lets
                // the uploader flush its final part and complete.
                drop(writer);
                match upload_task.await {
                    Ok(Ok(completed)) => {
                        let download_url = self.download_url(&completed.key).await;
                        let elapsed = start.elapsed().as_secs_f64();
                        tracing::info!(
                            key = %completed.key,
                            archive_bytes = summary.archive_bytes,
                            parts = completed.parts.len(),
                            succeeded = summary.succeeded_count(),
                            failed = summary.failed_items().len(),
                            elapsed_secs = elapsed,
                            "Job completed"
                        );
                        JobOutcome {
                            status: JobStatus::Completed,
                            event_id: job.event_id.clone(),
                            recipient_email: job.recipient_email.clone(),
                            request_id: job.request_id.clone(),
                            download_url: Some(download_url),
                            succeeded_count: summary.succeeded_count(),
                            failed_items: summary.failed_items(),
                            archive_bytes: summary.archive_bytes,
                            processing_time_seconds: elapsed,
                            error: None,
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Upload failed after archive completed");
                        self.failure(
                            job,
                            start,
                            summary.failed_items(),
                            summary.succeeded_count(),
                            &e.to_string(),
                        )
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Upload task panicked");
                        self.failure(
                            job,
                            start,
                            summary.failed_items(),
                            summary.succeeded_count(),
                            "upload task failed unexpectedly",
                        )
                    }
                }
            }
            Ok(summary) => {
                // Nothing could be bundled: cancel the uploader so the
                // incomplete multipart object is released server-side.
                cancel.cancel();
                let _ = upload_task.await;
                drop(writer);
                tracing::error!(
                    failed = summary.results.len(),
                    "All items failed, job is terminal"
                );
                self.failure(
                    job,
                    start,
                    summary.failed_items(),
                    0,
                    &JobError::AllItemsFailed.to_string(),
                )
            }
            Err(e) => {
                // The archive sink broke, usually because the upload side of
                // the pipe died first; prefer the uploader's error as cause.
                cancel.cancel();
                let reason = match upload_task.await {
                    Ok(Err(upload_err)) => upload_err.to_string(),
                    _ => e.to_string(),
                };
                drop(writer);
                tracing::error!(error = %reason, "Archive/upload pipeline failed");
                self.failure(job, start, Vec::new(), 0, &reason)
            }
        }
    }

    async fn download_url(&self, key: &str) -> String {
        match self
            .storage
            .presigned_get_url(key, self.config.download_url_expiry)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Presigning failed, falling back to public URL");
                self.storage.public_url(key)
            }
        }
    }

    fn failure(
        &self,
        job: &Job,
        start: Instant,
        failed_items: Vec<picpack_core::models::ArchiveEntryResult>,
        succeeded_count: usize,
        reason: &str,
    ) -> JobOutcome {
        JobOutcome {
            status: JobStatus::Failed,
            event_id: job.event_id.clone(),
            recipient_email: job.recipient_email.clone(),
            request_id: job.request_id.clone(),
            download_url: None,
            succeeded_count,
            failed_items,
            archive_bytes: 0,
            processing_time_seconds: start.elapsed().as_secs_f64(),
            error: Some(reason.to_string()),
        }
    }
}
