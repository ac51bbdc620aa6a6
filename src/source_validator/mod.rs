//! Source validator.
//!
//! Classifies an incoming URL into a (source, media id, canonical URL)
//! triple before any expensive work happens. Recognizers are a closed set
//! of variants tried in registration order; the first whose host list
//! matches decides the outcome.

mod soundcloud;
mod youtube;

use serde::{Deserialize, Serialize};
use url::Url;

/// Reason given when no recognizer handles the URL's host.
pub const UNSUPPORTED_SOURCE_REASON: &str = "unsupported URL format";

/// Platform a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Youtube,
    Soundcloud,
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Youtube => "youtube",
            SourceType::Soundcloud => "soundcloud",
            SourceType::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(SourceType::Youtube),
            "soundcloud" => Some(SourceType::Soundcloud),
            "unknown" => Some(SourceType::Unknown),
            _ => None,
        }
    }
}

/// Kind of media a recognized URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Track,
    Playlist,
    Artist,
    Channel,
}

/// Outcome of validating one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub source: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn valid(
        source: SourceType,
        media_type: MediaType,
        media_id: impl Into<String>,
        canonical_url: impl Into<String>,
    ) -> Self {
        Self {
            valid: true,
            source,
            media_id: Some(media_id.into()),
            media_type: Some(media_type),
            canonical_url: Some(canonical_url.into()),
            reason: None,
        }
    }

    /// True when the URL parsed but belongs to no supported platform.
    pub fn is_unsupported_source(&self) -> bool {
        !self.valid && self.reason.as_deref() == Some(UNSUPPORTED_SOURCE_REASON)
    }

    pub fn invalid(source: SourceType, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            source,
            media_id: None,
            media_type: None,
            canonical_url: None,
            reason: Some(reason.into()),
        }
    }
}

/// A supported platform. Each variant owns its host allow-list and parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRecognizer {
    YouTube,
    SoundCloud,
}

impl SourceRecognizer {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceRecognizer::YouTube => SourceType::Youtube,
            SourceRecognizer::SoundCloud => SourceType::Soundcloud,
        }
    }

    pub fn hosts(&self) -> &'static [&'static str] {
        match self {
            SourceRecognizer::YouTube => youtube::HOSTS,
            SourceRecognizer::SoundCloud => soundcloud::HOSTS,
        }
    }

    fn handles_host(&self, host: &str) -> bool {
        self.hosts().contains(&host)
    }

    fn recognize(&self, url: &Url, host: &str) -> ValidationResult {
        match self {
            SourceRecognizer::YouTube => youtube::recognize(url, host),
            SourceRecognizer::SoundCloud => soundcloud::recognize(url, host),
        }
    }
}

/// Description of a supported source, as exposed by the validation API.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedSource {
    pub source: SourceType,
    pub hosts: Vec<&'static str>,
}

/// Immutable, ordered list of recognizers.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    recognizers: Vec<SourceRecognizer>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(vec![SourceRecognizer::YouTube, SourceRecognizer::SoundCloud])
    }
}

impl SourceRegistry {
    pub fn new(recognizers: Vec<SourceRecognizer>) -> Self {
        Self { recognizers }
    }

    pub fn recognizers(&self) -> &[SourceRecognizer] {
        &self.recognizers
    }

    pub fn supported_sources(&self) -> Vec<SupportedSource> {
        self.recognizers
            .iter()
            .map(|r| SupportedSource {
                source: r.source_type(),
                hosts: r.hosts().to_vec(),
            })
            .collect()
    }

    pub fn validate(&self, raw: &str) -> ValidationResult {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ValidationResult::invalid(SourceType::Unknown, "URL is required");
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let url = match Url::parse(&with_scheme) {
            Ok(url) => url,
            Err(e) => {
                return ValidationResult::invalid(
                    SourceType::Unknown,
                    format!("malformed URL: {}", e),
                )
            }
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            return ValidationResult::invalid(
                SourceType::Unknown,
                format!("unsupported URL scheme: {}", url.scheme()),
            );
        }

        let Some(host) = url.host_str().map(normalize_host) else {
            return ValidationResult::invalid(SourceType::Unknown, "URL has no host");
        };

        self.recognizers
            .iter()
            .find(|r| r.handles_host(&host))
            .map(|r| r.recognize(&url, &host))
            .unwrap_or_else(|| {
                ValidationResult::invalid(SourceType::Unknown, UNSUPPORTED_SOURCE_REASON)
            })
    }
}

/// Lowercases and strips `www.` / `m.` prefixes.
fn normalize_host(host: &str) -> String {
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    host.strip_prefix("m.").unwrap_or(host).to_string()
}

/// Non-empty path segments of `url`.
fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
