//! Audio streaming functionality

use super::error::{ApiError, ErrorCode};
use super::state::{GuardedAudioStore, GuardedTrackStore};
use super::ServerConfig;
use crate::object_store::content_type_for_path;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

const STREAM_CHUNK_SIZE: usize = 4096 * 16;
const FALLBACK_CONTENT_TYPE: &str = "audio/mpeg";

/// A single `Range: bytes=` range, before it is checked against the object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `start-end`
    Bounded { start: u64, end: u64 },
    /// `start-`
    From { start: u64 },
    /// `-suffix`, the last `suffix` bytes.
    Suffix { length: u64 },
}

impl ByteRange {
    /// Parses a `Range` header value. Only the first of several
    /// comma-separated ranges is considered.
    pub fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let ranges = s.as_ref().trim().strip_prefix("bytes=")?;
        let first = ranges.split(',').next()?.trim();
        let (start, end) = first.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        let number = |v: &str| -> Option<u64> {
            if v.bytes().all(|b| b.is_ascii_digit()) {
                v.parse().ok()
            } else {
                None
            }
        };

        match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (true, false) => Some(ByteRange::Suffix {
                length: number(end)?,
            }),
            (false, true) => Some(ByteRange::From {
                start: number(start)?,
            }),
            (false, false) => Some(ByteRange::Bounded {
                start: number(start)?,
                end: number(end)?,
            }),
        }
    }

    /// Inclusive `(start, end)` within an object of `total` bytes, or `None`
    /// when the range cannot be satisfied. An `end` past the object is
    /// clamped to the last byte.
    pub fn resolve(&self, total: u64) -> Option<(u64, u64)> {
        if total == 0 {
            return None;
        }
        let last = total - 1;
        let (start, end) = match *self {
            ByteRange::Bounded { start, end } => (start, end.min(last)),
            ByteRange::From { start } => (start, last),
            ByteRange::Suffix { length } => (total.saturating_sub(length), last),
        };
        if start > last || start > end {
            return None;
        }
        Some((start, end))
    }
}

/// Stored content type unless it is missing or generic, else a guess from
/// the key's extension.
fn resolve_content_type(key: &str, stored: Option<&str>) -> String {
    match stored {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => content_type_for_path(key)
            .filter(|ct| ct.starts_with("audio/"))
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string(),
    }
}

fn range_not_satisfiable(total: u64) -> Response {
    let mut response = ApiError::new(ErrorCode::RangeNotSatisfiable, "Invalid range")
        .with_details(serde_json::json!({ "size": total }))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

pub async fn stream_track(
    State(tracks): State<GuardedTrackStore>,
    State(audio_store): State<GuardedAudioStore>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let track = tracks
        .get_track(&id)
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::new(ErrorCode::TrackNotFound, "Track not found"))?;

    let key = track.storage_key.clone().ok_or_else(|| {
        debug!("Track {} audio not available", track.id);
        ApiError::new(ErrorCode::TrackNotFound, "Track audio not available")
    })?;

    let store = audio_store.object_store();
    let info = store
        .stat(&key)
        .await
        .map_err(ApiError::storage)?
        .ok_or_else(|| {
            error!("Track {} points at missing object {}", track.id, key);
            ApiError::new(ErrorCode::NotFound, "Audio file not found in storage")
        })?;
    let total = info.size;
    let content_type = resolve_content_type(
        &key,
        info.content_type.as_deref().or(track.content_type.as_deref()),
    );

    let range = match headers.get(header::RANGE) {
        None => None,
        Some(value) => {
            let parsed = value.to_str().ok().and_then(ByteRange::parse);
            match parsed.and_then(|r| r.resolve(total)) {
                Some(span) => Some(span),
                None => {
                    debug!("Unsatisfiable range {:?} for {} bytes", value, total);
                    return Ok(range_not_satisfiable(total));
                }
            }
        }
    };

    let (status, start, length) = match range {
        Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
        None => (StatusCode::OK, 0, total),
    };
    debug!(
        "Streaming track {} from {} ({} bytes at {})",
        track.id, key, length, start
    );

    let reader = store
        .get_range(&key, start, length)
        .await
        .map_err(ApiError::storage)?;
    let body = Body::from_stream(ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CACHE_CONTROL,
            format!("public, max-age={}", config.stream_cache_age_sec),
        );
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, start + length - 1, total),
        );
    }
    builder.body(body).map_err(|e| {
        error!("Failed to build stream response: {}", e);
        ApiError::new(ErrorCode::InternalError, "Failed to build response")
    })
}
