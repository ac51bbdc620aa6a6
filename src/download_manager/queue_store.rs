//! Download job storage and persistence.
//!
//! Provides SQLite-backed storage for download jobs. Every status change is
//! a single guarded `UPDATE`, so readers never see a partially applied
//! transition and a stale writer cannot move a job backwards.

use super::models::*;
use super::schema::DOWNLOAD_QUEUE_VERSIONED_SCHEMAS;
use crate::source_validator::SourceType;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Trait for download job storage operations.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait DownloadQueueStore: Send + Sync {
    // === Queue Management ===

    /// Add a new job to the queue.
    fn enqueue(&self, job: &DownloadJob) -> Result<()>;

    /// Get a job by ID.
    fn get_job(&self, id: &str) -> Result<Option<DownloadJob>>;

    /// List a user's jobs, newest first.
    fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<DownloadJob>>;

    /// Number of jobs waiting to be claimed.
    fn pending_count(&self) -> Result<usize>;

    // === State Transitions (atomic) ===

    /// Atomically claim the oldest pending job (PENDING → DOWNLOADING).
    fn claim_next(&self) -> Result<Option<DownloadJob>>;

    /// Move a job from `from` to `to`, raising progress to at least
    /// `progress`. Returns false if the job is no longer in `from`.
    fn advance(&self, id: &str, from: JobStatus, to: JobStatus, progress: u8) -> Result<bool>;

    /// Raise progress within the current status. Never lowers it.
    fn update_progress(&self, id: &str, status: JobStatus, progress: u8) -> Result<bool>;

    fn set_track(&self, id: &str, track_id: &str) -> Result<()>;

    /// Mark a job completed at 100%. Returns false if it is not in `from`.
    fn mark_completed(&self, id: &str, from: JobStatus) -> Result<bool>;

    /// Mark a non-terminal job failed. Returns false if it already reached
    /// a terminal status.
    fn mark_failed(&self, id: &str, error: &JobError) -> Result<bool>;

    /// Cancel a pending or downloading job owned by `user_id`.
    fn cancel(&self, id: &str, user_id: &str) -> Result<CancelOutcome>;

    /// Fail every job left mid-pipeline by a previous process.
    fn recover_interrupted(&self) -> Result<usize>;
}

pub struct SqliteDownloadQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDownloadQueueStore {
    /// Opens an existing database or creates a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, DOWNLOAD_QUEUE_VERSIONED_SCHEMAS, "download queue")?;
        Ok(SqliteDownloadQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        DOWNLOAD_QUEUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteDownloadQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<DownloadJob> {
        Ok(DownloadJob {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            url: row.get("url")?,
            source_type: SourceType::from_str(&row.get::<_, String>("source_type")?)
                .unwrap_or(SourceType::Unknown),
            canonical_url: row.get("canonical_url")?,
            media_id: row.get("media_id")?,
            status: JobStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(JobStatus::Failed),
            progress: row.get::<_, i64>("progress")?.clamp(0, 100) as u8,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            mb_recording_id: row.get("mb_recording_id")?,
            page_title: row.get("page_title")?,
            page_thumbnail: row.get("page_thumbnail")?,
            track_id: row.get("track_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn query_job(conn: &Connection, id: &str) -> Result<Option<DownloadJob>> {
        let mut stmt = conn.prepare("SELECT * FROM download_jobs WHERE id = ?1")?;
        Ok(stmt.query_row([id], Self::row_to_job).optional()?)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl DownloadQueueStore for SqliteDownloadQueueStore {
    // === Queue Management ===

    fn enqueue(&self, job: &DownloadJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO download_jobs (
                id, user_id, url, source_type, canonical_url, media_id,
                status, progress, error_code, error_message, mb_recording_id,
                page_title, page_thumbnail, track_id,
                created_at, updated_at, started_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
            )"#,
            params![
                job.id,
                job.user_id,
                job.url,
                job.source_type.as_str(),
                job.canonical_url,
                job.media_id,
                job.status.as_str(),
                job.progress,
                job.error_code,
                job.error_message,
                job.mb_recording_id,
                job.page_title,
                job.page_thumbnail,
                job.track_id,
                job.created_at,
                job.updated_at,
                job.started_at,
                job.completed_at,
            ],
        )?;
        debug!("Enqueued job {} for user {}", job.id, job.user_id);
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<DownloadJob>> {
        let conn = self.conn.lock().unwrap();
        Self::query_job(&conn, id)
    }

    fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<DownloadJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM download_jobs
               WHERE user_id = ?1
               ORDER BY created_at DESC, id DESC
               LIMIT ?2"#,
        )?;
        let jobs = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn pending_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM download_jobs WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // === State Transitions (atomic) ===

    fn claim_next(&self) -> Result<Option<DownloadJob>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let next: Option<String> = tx
            .query_row(
                r#"SELECT id FROM download_jobs
                   WHERE status = 'pending'
                   ORDER BY created_at ASC, id ASC
                   LIMIT 1"#,
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = next else {
            return Ok(None);
        };

        let now = Self::now();
        let claimed = tx.execute(
            r#"UPDATE download_jobs
               SET status = 'downloading', progress = MAX(progress, ?2),
                   started_at = ?3, updated_at = ?3
               WHERE id = ?1 AND status = 'pending'"#,
            params![id, checkpoints::DOWNLOAD_STARTED, now],
        )?;
        let job = if claimed == 1 {
            Self::query_job(&tx, &id)?
        } else {
            None
        };
        tx.commit()?;
        Ok(job)
    }

    fn advance(&self, id: &str, from: JobStatus, to: JobStatus, progress: u8) -> Result<bool> {
        if !from.can_transition_to(to) || to.is_terminal() {
            bail!("Invalid job transition {} -> {}", from.as_str(), to.as_str());
        }
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = ?3, progress = MAX(progress, ?4), updated_at = ?5
               WHERE id = ?1 AND status = ?2"#,
            params![id, from.as_str(), to.as_str(), progress, Self::now()],
        )?;
        Ok(updated == 1)
    }

    fn update_progress(&self, id: &str, status: JobStatus, progress: u8) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET progress = ?3, updated_at = ?4
               WHERE id = ?1 AND status = ?2 AND progress <= ?3"#,
            params![id, status.as_str(), progress.min(checkpoints::DONE), Self::now()],
        )?;
        Ok(updated == 1)
    }

    fn set_track(&self, id: &str, track_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE download_jobs SET track_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, track_id, Self::now()],
        )?;
        Ok(())
    }

    fn mark_completed(&self, id: &str, from: JobStatus) -> Result<bool> {
        if !from.can_transition_to(JobStatus::Completed) {
            bail!("Invalid job transition {} -> completed", from.as_str());
        }
        let conn = self.conn.lock().unwrap();
        let now = Self::now();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'completed', progress = ?3, updated_at = ?4, completed_at = ?4
               WHERE id = ?1 AND status = ?2"#,
            params![id, from.as_str(), checkpoints::DONE, now],
        )?;
        Ok(updated == 1)
    }

    fn mark_failed(&self, id: &str, error: &JobError) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Self::now();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'failed', error_code = ?2, error_message = ?3,
                   updated_at = ?4, completed_at = ?4
               WHERE id = ?1
                 AND status IN ('pending', 'downloading', 'processing', 'uploading')"#,
            params![id, error.code, error.message, now],
        )?;
        Ok(updated == 1)
    }

    fn cancel(&self, id: &str, user_id: &str) -> Result<CancelOutcome> {
        let conn = self.conn.lock().unwrap();
        let current = match Self::query_job(&conn, id)? {
            Some(job) if job.user_id == user_id => job.status,
            _ => return Ok(CancelOutcome::NotFound),
        };
        if !current.is_cancellable() {
            return Ok(CancelOutcome::NotCancellable(current));
        }

        let now = Self::now();
        let updated = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'cancelled', updated_at = ?3, completed_at = ?3
               WHERE id = ?1 AND status = ?2"#,
            params![id, current.as_str(), now],
        )?;
        if updated == 1 {
            Ok(CancelOutcome::Cancelled(current))
        } else {
            Ok(CancelOutcome::NotCancellable(current))
        }
    }

    fn recover_interrupted(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Self::now();
        let recovered = conn.execute(
            r#"UPDATE download_jobs
               SET status = 'failed', error_code = ?1,
                   error_message = 'Interrupted by server restart',
                   updated_at = ?2, completed_at = ?2
               WHERE status IN ('downloading', 'processing', 'uploading')"#,
            params![job_error_codes::INTERRUPTED, now],
        )?;
        if recovered > 0 {
            info!("Marked {} interrupted jobs as failed", recovered);
        }
        Ok(recovered)
    }
}
