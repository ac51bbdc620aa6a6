mod file_config;

pub use file_config::{
    FileConfig, MatcherConfig, RetryConfig, RetryPolicyConfig, WorkersConfig,
};

use crate::matcher::MUSICBRAINZ_API_BASE;
use crate::retry::RetryPolicy;
use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// Values collected from the command line. Anything also present in the
/// TOML file is overridden by it.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub temp_dir: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
    pub musicbrainz_user_agent: Option<String>,
    pub musicbrainz_base_url: Option<String>,
}

/// Fully resolved settings the server starts with.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// Root of the filesystem object store.
    pub media_path: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// Scratch space for yt-dlp output before upload.
    pub temp_dir: PathBuf,
    pub ytdlp_path: Option<PathBuf>,
    pub musicbrainz_user_agent: String,
    pub musicbrainz_base_url: String,

    pub workers: WorkerSettings,
    pub matcher: MatcherSettings,
    pub retry: RetrySettings,
}

fn check_db_dir(db_dir: &Path) -> Result<()> {
    if !db_dir.exists() {
        bail!("Database directory does not exist: {:?}", db_dir);
    }
    if !db_dir.is_dir() {
        bail!("db_dir is not a directory: {:?}", db_dir);
    }
    Ok(())
}

impl AppConfig {
    /// Merges the CLI values with the optional TOML file (TOML wins) and
    /// fills in defaults.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;
        check_db_dir(&db_dir)?;

        let path_setting = |from_file: Option<String>, from_cli: &Option<PathBuf>| {
            from_file.map(PathBuf::from).or_else(|| from_cli.clone())
        };

        let media_path =
            path_setting(file.media_path, &cli.media_path).unwrap_or_else(|| db_dir.join("media"));
        let temp_dir = path_setting(file.temp_dir, &cli.temp_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("ingest-downloads"));
        let ytdlp_path = path_setting(file.ytdlp_path, &cli.ytdlp_path);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let musicbrainz_user_agent = file
            .musicbrainz_user_agent
            .or_else(|| cli.musicbrainz_user_agent.clone())
            .unwrap_or_else(default_user_agent);
        let musicbrainz_base_url = file
            .musicbrainz_base_url
            .or_else(|| cli.musicbrainz_base_url.clone())
            .unwrap_or_else(|| MUSICBRAINZ_API_BASE.to_string());

        let workers = WorkerSettings::default().overridden_by(file.workers.unwrap_or_default())?;
        let matcher = MatcherSettings::default().overridden_by(file.matcher.unwrap_or_default())?;
        let retry = RetrySettings::default().overridden_by(file.retry.unwrap_or_default());

        Ok(Self {
            port: file.port.unwrap_or(cli.port),
            db_dir,
            media_path,
            logging_level,
            temp_dir,
            ytdlp_path,
            musicbrainz_user_agent,
            musicbrainz_base_url,
            workers,
            matcher,
            retry,
        })
    }

    pub fn download_queue_db_path(&self) -> PathBuf {
        self.db_dir.join("download_queue.db")
    }

    pub fn tracks_db_path(&self) -> PathBuf {
        self.db_dir.join("tracks.db")
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_count: usize,
    /// Hard limit for a single job, download included.
    pub job_timeout_secs: u64,
    /// How long an idle worker sleeps before checking the queue again.
    pub dequeue_poll_ms: u64,
    /// How long shutdown waits for in-flight jobs before cancelling them.
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_count: 3,
            job_timeout_secs: 600,
            dequeue_poll_ms: 500,
            shutdown_grace_secs: 30,
        }
    }
}

impl WorkerSettings {
    fn overridden_by(self, section: WorkersConfig) -> Result<Self> {
        let settings = Self {
            worker_count: section.worker_count.unwrap_or(self.worker_count),
            job_timeout_secs: section.job_timeout_secs.unwrap_or(self.job_timeout_secs),
            dequeue_poll_ms: section.dequeue_poll_ms.unwrap_or(self.dequeue_poll_ms),
            shutdown_grace_secs: section
                .shutdown_grace_secs
                .unwrap_or(self.shutdown_grace_secs),
        };
        if settings.worker_count == 0 {
            bail!("workers.worker_count must be at least 1");
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone)]
pub struct MatcherSettings {
    pub enabled: bool,
    pub auto_match_threshold: f64,
    pub search_limit: usize,
    pub max_suggestions: usize,
    /// Anything longer is treated as non-music and never matched.
    pub max_music_duration_secs: u64,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_match_threshold: 85.0,
            search_limit: 10,
            max_suggestions: 3,
            max_music_duration_secs: 1200,
        }
    }
}

impl MatcherSettings {
    fn overridden_by(self, section: MatcherConfig) -> Result<Self> {
        let settings = Self {
            enabled: section.enabled.unwrap_or(self.enabled),
            auto_match_threshold: section
                .auto_match_threshold
                .unwrap_or(self.auto_match_threshold),
            search_limit: section.search_limit.unwrap_or(self.search_limit),
            max_suggestions: section.max_suggestions.unwrap_or(self.max_suggestions),
            max_music_duration_secs: section
                .max_music_duration_secs
                .unwrap_or(self.max_music_duration_secs),
        };
        if !(0.0..=100.0).contains(&settings.auto_match_threshold) {
            bail!(
                "matcher.auto_match_threshold must be within 0-100, got {}",
                settings.auto_match_threshold
            );
        }
        Ok(settings)
    }
}

/// One policy per external dependency.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub metadata: RetryPolicy,
    pub storage: RetryPolicy,
    pub extractor: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            metadata: RetryPolicy::metadata_service(),
            storage: RetryPolicy::object_store(),
            extractor: RetryPolicy::extractor(),
        }
    }
}

impl RetrySettings {
    fn overridden_by(self, section: RetryConfig) -> Self {
        Self {
            metadata: apply_retry_overrides(self.metadata, section.metadata),
            storage: apply_retry_overrides(self.storage, section.storage),
            extractor: apply_retry_overrides(self.extractor, section.extractor),
        }
    }
}

fn apply_retry_overrides(base: RetryPolicy, overrides: Option<RetryPolicyConfig>) -> RetryPolicy {
    let Some(o) = overrides else {
        return base;
    };
    RetryPolicy {
        max_attempts: o.max_attempts.unwrap_or(base.max_attempts),
        initial_backoff_ms: o.initial_backoff_ms.unwrap_or(base.initial_backoff_ms),
        max_backoff_ms: o.max_backoff_ms.unwrap_or(base.max_backoff_ms),
        backoff_multiplier: o.backoff_multiplier.unwrap_or(base.backoff_multiplier),
        jitter: o.jitter.unwrap_or(base.jitter),
    }
}

fn default_user_agent() -> String {
    format!(
        "pezzottify-ingest-server/{} ( https://github.com/lelloman/pezzottify )",
        env!("CARGO_PKG_VERSION")
    )
}

/// Case-insensitive, through clap's `ValueEnum`.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
