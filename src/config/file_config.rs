use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub media_path: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub temp_dir: Option<String>,
    pub ytdlp_path: Option<String>,
    pub musicbrainz_user_agent: Option<String>,
    pub musicbrainz_base_url: Option<String>,

    // Feature configs
    pub workers: Option<WorkersConfig>,
    pub matcher: Option<MatcherConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkersConfig {
    pub worker_count: Option<usize>,
    pub job_timeout_secs: Option<u64>,
    pub dequeue_poll_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MatcherConfig {
    pub enabled: Option<bool>,
    /// Confidence (0-100) at or above which a match is auto-verified.
    pub auto_match_threshold: Option<f64>,
    pub search_limit: Option<usize>,
    pub max_suggestions: Option<usize>,
    pub max_music_duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub metadata: Option<RetryPolicyConfig>,
    pub storage: Option<RetryPolicyConfig>,
    pub extractor: Option<RetryPolicyConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub jitter: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
