//! Job error taxonomy
//!
//! Failures while processing a bundle job fall into two classes: per-item
//! failures (a single photo could not be fetched or written), which are
//! absorbed into the job outcome, and job-fatal failures, which abort the
//! archive/upload pipeline. The orchestrator uses [`JobError::is_job_fatal`]
//! to decide between the two.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// A single item's download failed (network error, timeout, non-2xx).
    /// Recoverable: the item is skipped and the job continues.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// A single item's source stream broke while its archive entry was
    /// being written. Recoverable: the entry is dropped and the job continues.
    #[error("archive write failed for {file_name}: {reason}")]
    ArchiveWriteFailed { file_name: String, reason: String },

    /// Not a single item could be bundled. Terminal for the job.
    #[error("no items could be fetched")]
    AllItemsFailed,

    /// A part upload exhausted its retries. Terminal for the job; the
    /// multipart upload is aborted server-side.
    #[error("upload of part {part_number} failed after {attempts} attempts: {reason}")]
    PartUploadFailed {
        part_number: i32,
        attempts: u32,
        reason: String,
    },

    /// Every notification endpoint rejected the outcome payload. Logged and
    /// surfaced, but never fails the job itself.
    #[error("notification delivery failed: {reason}")]
    NotificationFailed { reason: String },

    /// The queue message body could not be parsed into a job. Terminal:
    /// redelivery would fail the same way.
    #[error("invalid job message: {0}")]
    InvalidMessage(String),
}

impl JobError {
    /// Whether this error terminates the whole job (as opposed to a
    /// single-item failure that is absorbed into the outcome).
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            JobError::AllItemsFailed
                | JobError::PartUploadFailed { .. }
                | JobError::InvalidMessage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_item_errors_are_not_fatal() {
        let e = JobError::FetchFailed {
            url: "https://example.com/a.jpg".into(),
            reason: "404".into(),
        };
        assert!(!e.is_job_fatal());

        let e = JobError::ArchiveWriteFailed {
            file_name: "a.jpg".into(),
            reason: "connection reset".into(),
        };
        assert!(!e.is_job_fatal());
    }

    #[test]
    fn pipeline_errors_are_fatal() {
        assert!(JobError::AllItemsFailed.is_job_fatal());
        assert!(JobError::PartUploadFailed {
            part_number: 3,
            attempts: 3,
            reason: "500".into()
        }
        .is_job_fatal());
        assert!(JobError::InvalidMessage("not json".into()).is_job_fatal());
    }

    #[test]
    fn notification_failure_is_not_fatal() {
        let e = JobError::NotificationFailed {
            reason: "all endpoints unreachable".into(),
        };
        assert!(!e.is_job_fatal());
    }
}
