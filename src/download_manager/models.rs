//! Data models for the download job queue.
//!
//! Defines jobs, statuses, progress checkpoints and the job-level error.

use crate::source_validator::SourceType;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Status of a download job.
///
/// Stages only move forward: `pending → downloading → processing →
/// uploading → completed`. `failed` is reachable from any non-terminal
/// status, `cancelled` only from `pending` and `downloading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Processing,
    Uploading,
    Completed, // terminal
    Failed,    // terminal
    Cancelled, // terminal
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "downloading" => Some(JobStatus::Downloading),
            "processing" => Some(JobStatus::Processing),
            "uploading" => Some(JobStatus::Uploading),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Downloading)
    }

    fn stage_index(&self) -> Option<u8> {
        match self {
            JobStatus::Pending => Some(0),
            JobStatus::Downloading => Some(1),
            JobStatus::Processing => Some(2),
            JobStatus::Uploading => Some(3),
            JobStatus::Completed => Some(4),
            JobStatus::Failed | JobStatus::Cancelled => None,
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed => true,
            JobStatus::Cancelled => self.is_cancellable(),
            _ => match (self.stage_index(), next.stage_index()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }

    /// Statuses a job still being worked on can be in.
    pub const ACTIVE: [JobStatus; 3] = [
        JobStatus::Downloading,
        JobStatus::Processing,
        JobStatus::Uploading,
    ];
}

/// Progress checkpoints persisted at each stage boundary.
pub mod checkpoints {
    pub const ENQUEUED: u8 = 0;
    pub const DOWNLOAD_STARTED: u8 = 5;
    pub const DOWNLOADED: u8 = 25;
    pub const TRACK_CREATED: u8 = 50;
    pub const MATCHED: u8 = 75;
    pub const ATTACHED: u8 = 90;
    pub const DONE: u8 = 100;
}

/// Error codes stored on failed jobs that do not come from the extractor.
pub mod job_error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const JOB_TIMEOUT: &str = "JOB_TIMEOUT";
    pub const INTERRUPTED: &str = "INTERRUPTED";
    pub const CANCELLED: &str = "CANCELLED";
}

/// A job failure: a short machine-readable code plus a human message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == job_error_codes::CANCELLED
    }
}

/// One user request to ingest a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    /// UUID v7, so ids sort by creation time.
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub source_type: SourceType,
    pub canonical_url: String,
    pub media_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Recording chosen by the user at submission time.
    pub mb_recording_id: Option<String>,
    pub page_title: Option<String>,
    pub page_thumbnail: Option<String>,
    pub track_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Fields supplied at intake.
#[derive(Debug, Clone, Default)]
pub struct NewDownloadJob {
    pub user_id: String,
    pub url: String,
    pub source_type: Option<SourceType>,
    pub canonical_url: String,
    pub media_id: String,
    pub mb_recording_id: Option<String>,
    pub page_title: Option<String>,
    pub page_thumbnail: Option<String>,
}

impl DownloadJob {
    pub fn new(new_job: NewDownloadJob) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: new_job.user_id,
            url: new_job.url,
            source_type: new_job.source_type.unwrap_or(SourceType::Unknown),
            canonical_url: new_job.canonical_url,
            media_id: new_job.media_id,
            status: JobStatus::Pending,
            progress: checkpoints::ENQUEUED,
            error_code: None,
            error_message: None,
            mb_recording_id: new_job.mb_recording_id,
            page_title: new_job.page_title,
            page_thumbnail: new_job.page_thumbnail,
            track_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Job as returned to API clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub url: String,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

fn rfc3339(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

impl From<&DownloadJob> for JobView {
    fn from(job: &DownloadJob) -> Self {
        JobView {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            error: job.error_message.clone(),
            error_code: job.error_code.clone(),
            url: job.url.clone(),
            source_type: job.source_type,
            track_id: job.track_id.clone(),
            created_at: rfc3339(job.created_at),
            started_at: job.started_at.map(rfc3339),
            completed_at: job.completed_at.map(rfc3339),
        }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was cancelled; carries the status it had before.
    Cancelled(JobStatus),
    NotCancellable(JobStatus),
    NotFound,
}
