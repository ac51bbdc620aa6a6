//! Request logging middleware

use super::super::error::current_request_id;
use super::super::metrics::record_http_request;
use super::super::owner::HEADER_USER_ID;
use super::super::state::ServerState;
use axum::extract::{MatchedPath, State};
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

const MAX_LOGGABLE_BODY_LENGTH: usize = 1024;

/// Route template used to label request metrics, so ids in the path do not
/// create a series each.
fn route_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Declared body size, or why it can't be known.
fn declared_length(headers: &HeaderMap) -> Result<usize, &'static str> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or("Content-length not set.")?;
    let value = value
        .to_str()
        .map_err(|_| "Could not get Content-length string value.")?;
    value
        .parse::<usize>()
        .map_err(|_| "Could not parse Content-length numeric value.")
}

/// Audio streams and WebSocket upgrades must reach the client untouched.
fn is_passthrough(headers: &HeaderMap) -> bool {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    content_type.starts_with("audio/") || headers.contains_key(header::UPGRADE)
}

fn log_headers(label: &str, headers: &HeaderMap) {
    info!("  {} Headers:", label);
    for (name, value) in headers.iter() {
        info!("    {:?}: {:?}", name, value);
    }
}

/// Logs a small body and hands back an equivalent one. `Err` means the body
/// could not be read and the exchange should be aborted.
async fn log_body(label: &str, headers: &HeaderMap, body: Body) -> Result<Body, ()> {
    let size = match declared_length(headers) {
        Ok(size) => size,
        Err(reason) => {
            info!("  {} Body: {}", label, reason);
            return Ok(body);
        }
    };
    if size >= MAX_LOGGABLE_BODY_LENGTH {
        info!(
            "  {} Body: Too big to log ({:#})",
            label,
            byte_unit::Byte::from(size)
        );
        return Ok(body);
    }

    let bytes: Bytes = axum::body::to_bytes(body, size).await.map_err(|err| {
        error!("Failed to read {} body: {:?}", label.to_lowercase(), err);
    })?;
    info!("  {} Body:\n{}", label, String::from_utf8_lossy(&bytes));
    Ok(Body::from(bytes))
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let method = request.method().to_string();
    let route = route_label(&request);
    let start = Instant::now();

    let level = state.config.requests_logging_level.clone();
    if level == RequestsLoggingLevel::None {
        let response = next.run(request).await;
        record_http_request(&method, &route, response.status().as_u16(), start.elapsed());
        return response;
    }

    let request_id = current_request_id().unwrap_or_default();
    let owner = request
        .headers()
        .get(HEADER_USER_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    info!(
        ">>> {} {} [{} as {}]",
        request.method(),
        request.uri(),
        request_id,
        owner
    );

    let request = if level >= RequestsLoggingLevel::Headers {
        log_headers("Req", request.headers());
        if level >= RequestsLoggingLevel::Body && !is_passthrough(request.headers()) {
            let (parts, body) = request.into_parts();
            match log_body("Req", &parts.headers, body).await {
                Ok(body) => Request::from_parts(parts, body),
                Err(()) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        } else {
            request
        }
    } else {
        request
    };

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", response.headers());
        if level >= RequestsLoggingLevel::Body && !is_passthrough(response.headers()) {
            let (parts, body) = response.into_parts();
            response = match log_body("Resp", &parts.headers, body).await {
                Ok(body) => Response::from_parts(parts, body),
                Err(()) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            };
        }
    }

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    record_http_request(&method, &route, status, elapsed);
    info!("<<< {} ({}ms) [{}]", status, elapsed.as_millis(), request_id);

    response
}
