use std::fmt::{Display, Formatter, Result as FmtResult};

/// Outcome of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntryResult {
    Succeeded { file_name: String, bytes_written: u64 },
    Failed { file_name: String, reason: String },
}

impl ArchiveEntryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ArchiveEntryResult::Succeeded { .. })
    }

    pub fn file_name(&self) -> &str {
        match self {
            ArchiveEntryResult::Succeeded { file_name, .. } => file_name,
            ArchiveEntryResult::Failed { file_name, .. } => file_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal result of one job, handed to the notification dispatcher.
/// Not persisted beyond the notification call.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub event_id: String,
    pub recipient_email: String,
    pub request_id: String,
    pub download_url: Option<String>,
    pub succeeded_count: usize,
    pub failed_items: Vec<ArchiveEntryResult>,
    pub archive_bytes: u64,
    pub processing_time_seconds: f64,
    /// Human-readable reason, set only when `status` is `Failed`.
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Names of the items that were skipped, in job order.
    pub fn skipped_file_names(&self) -> Vec<&str> {
        self.failed_items.iter().map(|r| r.file_name()).collect()
    }
}
