//! Error envelope shared by every HTTP route.
//!
//! Every failure is rendered as
//! `{"error": {"code", "message", "request_id", "details"?}}`. The request id
//! is taken from `X-Request-ID` when the caller sends one and generated
//! otherwise; it is echoed back on every response.

use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

pub const HEADER_REQUEST_ID: &str = "X-Request-ID";

const MAX_REQUEST_ID_LENGTH: usize = 128;

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Client,
    Server,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidRequest,
    UnsupportedSource,
    NotFound,
    TrackNotFound,
    JobNotFound,
    JobNotCancellable,
    RangeNotSatisfiable,
    RateLimited,
    InternalError,
    DatabaseError,
    StorageError,
    ServiceUnavailable,
    DownloadError,
    MusicbrainzError,
    ExternalTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::UnsupportedSource => "UNSUPPORTED_SOURCE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TrackNotFound => "TRACK_NOT_FOUND",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::JobNotCancellable => "JOB_NOT_CANCELLABLE",
            ErrorCode::RangeNotSatisfiable => "RANGE_NOT_SATISFIABLE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::DownloadError => "DOWNLOAD_ERROR",
            ErrorCode::MusicbrainzError => "MUSICBRAINZ_ERROR",
            ErrorCode::ExternalTimeout => "EXTERNAL_TIMEOUT",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::InvalidRequest
            | ErrorCode::UnsupportedSource
            | ErrorCode::NotFound
            | ErrorCode::TrackNotFound
            | ErrorCode::JobNotFound
            | ErrorCode::JobNotCancellable
            | ErrorCode::RangeNotSatisfiable
            | ErrorCode::RateLimited => ErrorCategory::Client,
            ErrorCode::InternalError
            | ErrorCode::DatabaseError
            | ErrorCode::StorageError
            | ErrorCode::ServiceUnavailable => ErrorCategory::Server,
            ErrorCode::DownloadError
            | ErrorCode::MusicbrainzError
            | ErrorCode::ExternalTimeout => ErrorCategory::External,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::InvalidRequest
            | ErrorCode::UnsupportedSource => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound | ErrorCode::TrackNotFound | ErrorCode::JobNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::JobNotCancellable => StatusCode::CONFLICT,
            ErrorCode::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError | ErrorCode::DatabaseError | ErrorCode::StorageError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DownloadError | ErrorCode::MusicbrainzError => StatusCode::BAD_GATEWAY,
            ErrorCode::ExternalTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Logs the cause and hides it from the client.
    pub fn database(err: anyhow::Error) -> Self {
        error!("Database error: {:#}", err);
        Self::new(ErrorCode::DatabaseError, "A database error occurred")
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        error!("Storage error: {}", err);
        Self::new(ErrorCode::StorageError, "A storage error occurred")
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            request_id: current_request_id().unwrap_or_default(),
            details: self.details.as_ref(),
        };
        (self.code.status(), Json(json!({ "error": body }))).into_response()
    }
}

/// Request id of the request being handled, if called inside
/// [`request_id`] middleware.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

fn incoming_request_id(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LENGTH)
        .map(str::to_string)
}

/// Assigns a request id and echoes it in the `X-Request-ID` response header.
pub async fn request_id(request: Request<Body>, next: Next) -> Response {
    let id = incoming_request_id(&request).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut response = REQUEST_ID.scope(id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(HEADER_REQUEST_ID, value);
    }
    response
}

pub async fn not_found() -> ApiError {
    ApiError::new(ErrorCode::NotFound, "Resource not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_status_and_category() {
        assert_eq!(ErrorCode::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::JobNotCancellable.status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::RangeNotSatisfiable.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(ErrorCode::MusicbrainzError.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::ExternalTimeout.status(), StatusCode::GATEWAY_TIMEOUT);

        assert_eq!(ErrorCode::UnsupportedSource.category(), ErrorCategory::Client);
        assert_eq!(ErrorCode::StorageError.category(), ErrorCategory::Server);
        assert_eq!(ErrorCode::DownloadError.category(), ErrorCategory::External);
    }

    #[test]
    fn test_serialized_code_matches_as_str() {
        for code in [
            ErrorCode::ValidationError,
            ErrorCode::JobNotFound,
            ErrorCode::MusicbrainzError,
            ErrorCode::RangeNotSatisfiable,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }

    #[tokio::test]
    async fn test_envelope_carries_scoped_request_id() {
        let response = REQUEST_ID
            .scope("req-42".to_string(), async {
                ApiError::validation("bad url")
                    .with_details(json!({"field": "url"}))
                    .into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "bad url");
        assert_eq!(body["error"]["request_id"], "req-42");
        assert_eq!(body["error"]["details"]["field"], "url");
    }

    #[tokio::test]
    async fn test_envelope_omits_missing_details() {
        let response = ApiError::new(ErrorCode::JobNotFound, "no such job").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].get("details").is_none());
        assert_eq!(body["error"]["request_id"], "");
    }
}
