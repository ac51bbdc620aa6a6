//! Download job HTTP routes.
//!
//! Provides endpoints for:
//! - Submitting a media URL for ingestion
//! - Polling and listing the caller's jobs
//! - Cancelling a job that has not reached processing yet

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::error::{ApiError, ErrorCode};
use super::owner::Owner;
use super::state::{GuardedQueueStore, GuardedSourceRegistry, ServerState};
use crate::download_manager::{
    CancelOutcome, DownloadJob, JobControl, JobStatus, JobView, NewDownloadJob, ProgressEvent,
    ProgressNotifier,
};
use crate::source_validator::{MediaType, SourceType};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateDownloadBody {
    pub url: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub page_metadata: Option<PageMetadata>,
    /// MusicBrainz recording picked by the user; skips automatic matching.
    #[serde(default)]
    pub mb_recording_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateDownloadResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks the body against the validator and builds the job to enqueue.
fn prepare_job(
    owner: &Owner,
    body: CreateDownloadBody,
    sources: &GuardedSourceRegistry,
) -> Result<DownloadJob, ApiError> {
    let validation = sources.validate(&body.url);
    if validation.is_unsupported_source() {
        return Err(ApiError::new(
            ErrorCode::UnsupportedSource,
            "URL does not belong to a supported source",
        )
        .with_details(json!({ "url": body.url })));
    }
    if !validation.valid {
        let reason = validation
            .reason
            .unwrap_or_else(|| "invalid URL".to_string());
        return Err(ApiError::validation(reason).with_details(json!({ "field": "url" })));
    }

    if validation.media_type != Some(MediaType::Track) {
        let media_type = validation
            .media_type
            .map(|t| serde_json::to_value(t).unwrap_or_default())
            .unwrap_or_default();
        return Err(
            ApiError::validation("Only single tracks can be downloaded")
                .with_details(json!({ "media_type": media_type })),
        );
    }

    if let Some(declared) = non_blank(body.source_type) {
        match SourceType::from_str(&declared.to_lowercase()) {
            Some(source) if source == validation.source => {}
            _ => {
                return Err(ApiError::validation(format!(
                    "source_type '{}' does not match URL source '{}'",
                    declared,
                    validation.source.as_str()
                ))
                .with_details(json!({ "field": "source_type" })))
            }
        }
    }

    let mb_recording_id = non_blank(body.mb_recording_id);
    if let Some(id) = &mb_recording_id {
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(ApiError::validation("mb_recording_id must be a UUID")
                .with_details(json!({ "field": "mb_recording_id" })));
        }
    }

    let page = body.page_metadata.unwrap_or_default();
    let (Some(canonical_url), Some(media_id)) = (validation.canonical_url, validation.media_id)
    else {
        return Err(ApiError::validation("URL could not be resolved"));
    };

    Ok(DownloadJob::new(NewDownloadJob {
        user_id: owner.as_str().to_string(),
        url: body.url.trim().to_string(),
        source_type: Some(validation.source),
        canonical_url,
        media_id,
        mb_recording_id,
        page_title: non_blank(page.title),
        page_thumbnail: non_blank(page.thumbnail),
    }))
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /downloads - Submit a URL for ingestion
async fn create_download(
    owner: Owner,
    State(state): State<ServerState>,
    body: Result<Json<CreateDownloadBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let job = prepare_job(&owner, body, &state.sources)?;

    state.queue.enqueue(&job).map_err(ApiError::database)?;
    state.job_control.job_enqueued();
    state
        .notifier
        .publish(ProgressEvent::new(&job, job.status, job.progress));
    info!(
        "Queued job {} for {} ({} {})",
        job.id,
        owner.as_str(),
        job.source_type.as_str(),
        job.media_id
    );

    let response = CreateDownloadResponse {
        job_id: job.id,
        status: job.status,
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// GET /downloads - The caller's jobs, newest first
async fn list_downloads(
    owner: Owner,
    State(queue): State<GuardedQueueStore>,
    Query(query): Query<ListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = queue
        .list_by_user(owner.as_str(), limit)
        .map_err(ApiError::database)?;
    Ok(Json(JobListResponse {
        jobs: jobs.iter().map(JobView::from).collect(),
    }))
}

fn job_not_found(id: &str) -> ApiError {
    ApiError::new(ErrorCode::JobNotFound, format!("Job {} not found", id))
}

/// GET /downloads/{id} - Current state of one job
async fn get_download(
    owner: Owner,
    State(queue): State<GuardedQueueStore>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    match queue.get_job(&id).map_err(ApiError::database)? {
        Some(job) if job.user_id == owner.as_str() => Ok(Json(JobView::from(&job))),
        _ => Err(job_not_found(&id)),
    }
}

/// DELETE /downloads/{id} - Cancel a pending or downloading job
async fn cancel_download(
    owner: Owner,
    State(queue): State<GuardedQueueStore>,
    State(job_control): State<JobControl>,
    State(notifier): State<ProgressNotifier>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    match queue
        .cancel(&id, owner.as_str())
        .map_err(ApiError::database)?
    {
        CancelOutcome::Cancelled(previous) => {
            if previous == JobStatus::Downloading && !job_control.cancel(&id) {
                debug!("Job {} was downloading but had no running task", id);
            }
            let job = queue
                .get_job(&id)
                .map_err(ApiError::database)?
                .ok_or_else(|| job_not_found(&id))?;
            notifier.publish(ProgressEvent::new(&job, JobStatus::Cancelled, job.progress));
            info!("Job {} cancelled by {} (was {})", id, owner.as_str(), previous.as_str());
            Ok(Json(JobView::from(&job)))
        }
        CancelOutcome::NotCancellable(status) => Err(ApiError::new(
            ErrorCode::JobNotCancellable,
            format!("Job in status '{}' cannot be cancelled", status.as_str()),
        )
        .with_details(json!({ "status": status }))),
        CancelOutcome::NotFound => Err(job_not_found(&id)),
    }
}

pub fn download_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_downloads).post(create_download))
        .route("/{id}", get(get_download).delete(cancel_download))
}
