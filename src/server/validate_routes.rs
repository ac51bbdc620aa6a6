//! URL validation routes, used by clients before submitting a download.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::{GuardedSourceRegistry, ServerState};
use crate::source_validator::{SupportedSource, ValidationResult};

#[derive(Debug, Deserialize)]
pub struct ValidateUrlBody {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateUrlQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SupportedSourcesResponse {
    pub sources: Vec<SupportedSource>,
}

/// POST /validate/url
async fn post_validate_url(
    State(sources): State<GuardedSourceRegistry>,
    body: Result<Json<ValidateUrlBody>, JsonRejection>,
) -> Result<Json<ValidationResult>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    Ok(Json(sources.validate(&body.url)))
}

/// GET /validate/url?url=
async fn get_validate_url(
    State(sources): State<GuardedSourceRegistry>,
    Query(query): Query<ValidateUrlQuery>,
) -> Result<Json<ValidationResult>, ApiError> {
    let url = query
        .url
        .ok_or_else(|| ApiError::invalid_request("Missing 'url' query parameter"))?;
    Ok(Json(sources.validate(&url)))
}

/// GET /validate/sources
async fn get_supported_sources(
    State(sources): State<GuardedSourceRegistry>,
) -> Json<SupportedSourcesResponse> {
    Json(SupportedSourcesResponse {
        sources: sources.supported_sources(),
    })
}

pub fn validate_routes() -> Router<ServerState> {
    Router::new()
        .route("/url", get(get_validate_url).post(post_validate_url))
        .route("/sources", get(get_supported_sources))
}
