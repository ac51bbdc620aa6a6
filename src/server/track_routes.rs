//! Track metadata routes.
//!
//! Lets a client read a track with its match suggestions, confirm one of
//! them, or ask for the track to be matched again.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::{ApiError, ErrorCode};
use super::state::{GuardedTrackStore, ServerState};
use crate::matcher::{CandidateMetadata, MatchCandidate, MatchError};
use crate::track_store::{Track, VerifiedMetadata};

#[derive(Debug, Deserialize)]
pub struct ConfirmMatchBody {
    pub recording_id: String,
    #[serde(default)]
    pub artist_id: Option<String>,
    #[serde(default)]
    pub release_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchTrackResponse {
    pub track_id: String,
    pub verified: bool,
    pub best_match: Option<MatchCandidate>,
    pub suggestions: Vec<MatchCandidate>,
}

fn track_not_found(id: &str) -> ApiError {
    ApiError::new(ErrorCode::TrackNotFound, format!("Track {} not found", id))
}

fn load_track(tracks: &GuardedTrackStore, id: &str) -> Result<Track, ApiError> {
    tracks
        .get_track(id)
        .map_err(ApiError::database)?
        .ok_or_else(|| track_not_found(id))
}

/// Trimmed id, rejected unless it parses as a UUID.
fn mbid(field: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if uuid::Uuid::parse_str(&value).is_err() {
        return Err(ApiError::validation(format!("{} must be a UUID", field))
            .with_details(json!({ "field": field })));
    }
    Ok(Some(value))
}

/// Confirming one of the stored suggestions takes its title, artist and
/// album as well; any other recording only sets the ids.
fn confirmed_metadata(track: &Track, body: ConfirmMatchBody) -> Result<VerifiedMetadata, ApiError> {
    let recording_id = mbid("recording_id", Some(body.recording_id))?
        .ok_or_else(|| {
            ApiError::validation("recording_id is required")
                .with_details(json!({ "field": "recording_id" }))
        })?;
    let artist_id = mbid("artist_id", body.artist_id)?;
    let release_id = mbid("release_id", body.release_id)?;

    let suggestion = track
        .mb_suggestions
        .iter()
        .flatten()
        .find(|s| s.recording_id == recording_id);
    let mut metadata = match suggestion {
        Some(candidate) => VerifiedMetadata::from_candidate(candidate),
        None => VerifiedMetadata::recording_only(&recording_id),
    };
    if artist_id.is_some() {
        metadata.artist_id = artist_id;
    }
    if release_id.is_some() {
        metadata.release_id = release_id;
    }
    Ok(metadata)
}

/// GET /tracks/{id}
async fn get_track(
    State(tracks): State<GuardedTrackStore>,
    Path(id): Path<String>,
) -> Result<Json<Track>, ApiError> {
    load_track(&tracks, &id).map(Json)
}

/// POST /tracks/{id}/confirm-match - Accept a recording as the track's match
async fn confirm_match(
    State(tracks): State<GuardedTrackStore>,
    Path(id): Path<String>,
    body: Result<Json<ConfirmMatchBody>, JsonRejection>,
) -> Result<Json<Track>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let track = load_track(&tracks, &id)?;
    let metadata = confirmed_metadata(&track, body)?;

    tracks
        .apply_verified_metadata(&id, &metadata)
        .map_err(ApiError::database)?;
    info!("Track {} confirmed as recording {}", id, metadata.recording_id);
    load_track(&tracks, &id).map(Json)
}

/// POST /tracks/{id}/match - Run metadata matching again
async fn rematch_track(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<MatchTrackResponse>, ApiError> {
    let Some(matcher) = &state.matcher else {
        return Err(ApiError::new(
            ErrorCode::ServiceUnavailable,
            "Metadata matching is disabled",
        ));
    };
    let track = load_track(&state.tracks, &id)?;
    let candidate = CandidateMetadata {
        title: track.title.clone(),
        uploader: Some(track.artist.clone()),
        duration_ms: track.duration_ms,
        description: None,
    };

    // Dropping the request future is what stops a search in flight.
    let outcome = match matcher.match_track(&CancellationToken::new(), &candidate).await {
        Ok(outcome) => outcome,
        Err(MatchError::Cancelled) => {
            return Err(ApiError::new(ErrorCode::MusicbrainzError, "Metadata search cancelled"))
        }
        Err(MatchError::Search(e)) => {
            warn!("Re-matching track {} failed: {}", id, e);
            return Err(ApiError::new(
                ErrorCode::MusicbrainzError,
                "Metadata search failed",
            ));
        }
    };

    state
        .tracks
        .store_match_outcome(&id, &outcome)
        .map_err(ApiError::database)?;
    info!(
        "Track {} re-matched: verified={}, {} suggestions",
        id,
        outcome.verified,
        outcome.suggestions.len()
    );

    Ok(Json(MatchTrackResponse {
        track_id: id,
        verified: outcome.verified,
        best_match: outcome.best_match,
        suggestions: outcome.suggestions,
    }))
}

pub fn track_routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}", get(get_track))
        .route("/{id}/match", post(rematch_track))
        .route("/{id}/confirm-match", post(confirm_match))
}
