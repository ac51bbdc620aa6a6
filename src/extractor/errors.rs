use crate::retry::{is_retryable_message, Retryable};
use thiserror::Error;

/// Errors that can occur while running the extraction tool.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("media is unavailable")]
    Unavailable,

    #[error("media is private")]
    Private,

    #[error("media is age-restricted")]
    AgeRestricted,

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported source")]
    UnsupportedSource,

    #[error("extraction tool not found: {0}")]
    ToolMissing(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("invalid tool output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractorError {
    /// Short machine-readable code stored on the job record.
    pub fn code(&self) -> &'static str {
        match self {
            ExtractorError::Unavailable => "MEDIA_UNAVAILABLE",
            ExtractorError::Private => "MEDIA_PRIVATE",
            ExtractorError::AgeRestricted => "AGE_RESTRICTED",
            ExtractorError::Network(_) => "NETWORK_ERROR",
            ExtractorError::UnsupportedSource => "UNSUPPORTED_SOURCE",
            ExtractorError::ToolMissing(_) => "TOOL_MISSING",
            ExtractorError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            ExtractorError::InvalidOutput(_) => "INVALID_OUTPUT",
            ExtractorError::Io(_) => "IO_ERROR",
            ExtractorError::Cancelled => "CANCELLED",
        }
    }
}

impl Retryable for ExtractorError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractorError::Network(_) => true,
            ExtractorError::DownloadFailed(stderr) => is_retryable_message(stderr),
            _ => false,
        }
    }
}

const MAX_STDERR_IN_ERROR: usize = 2000;

/// Maps the tool's buffered stderr to a typed error.
///
/// Patterns are matched case-insensitively, first match wins.
pub fn classify_failure(stderr: &str) -> ExtractorError {
    let lower = stderr.to_lowercase();
    let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if has(&["video unavailable", "this video is unavailable"]) {
        ExtractorError::Unavailable
    } else if has(&["private video", "is private"]) {
        ExtractorError::Private
    } else if has(&["age-restricted", "sign in to confirm your age"]) {
        ExtractorError::AgeRestricted
    } else if has(&["unable to download", "connection", "network"]) {
        ExtractorError::Network(tail(stderr.trim(), MAX_STDERR_IN_ERROR))
    } else if has(&["unsupported url", "no suitable extractor"]) {
        ExtractorError::UnsupportedSource
    } else {
        ExtractorError::DownloadFailed(tail(stderr.trim(), MAX_STDERR_IN_ERROR))
    }
}

/// Last `max` characters of `s`.
fn tail(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.to_string();
    }
    s.chars().skip(count - max).collect()
}
