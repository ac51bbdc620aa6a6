use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pezzottify_ingest_server::config::{AppConfig, CliConfig, FileConfig};
use pezzottify_ingest_server::download_manager::{
    DownloadQueueStore, JobControl, JobPipeline, ProgressNotifier, SqliteDownloadQueueStore,
    WorkerPool,
};
use pezzottify_ingest_server::extractor::{YtDlpExtractor, YtDlpSettings};
use pezzottify_ingest_server::matcher::{MetadataMatcher, MusicBrainzClient};
use pezzottify_ingest_server::object_store::{ContentAddressedStore, FsObjectStore};
use pezzottify_ingest_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use pezzottify_ingest_server::source_validator::SourceRegistry;
use pezzottify_ingest_server::track_store::SqliteTrackStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the SQLite databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Root of the audio object store. Defaults to `<db-dir>/media`.
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3002)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Scratch directory for downloads before upload.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// Explicit path of the yt-dlp binary. Looked up on PATH otherwise.
    #[clap(long)]
    pub ytdlp_path: Option<PathBuf>,

    /// User agent sent to MusicBrainz (they require a contact).
    #[clap(long)]
    pub musicbrainz_user_agent: Option<String>,

    /// Base URL of the MusicBrainz web service.
    #[clap(long)]
    pub musicbrainz_base_url: Option<String>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            db_dir: args.db_dir.clone(),
            media_path: args.media_path.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            temp_dir: args.temp_dir.clone(),
            ytdlp_path: args.ytdlp_path.clone(),
            musicbrainz_user_agent: args.musicbrainz_user_agent.clone(),
            musicbrainz_base_url: args.musicbrainz_base_url.clone(),
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;

    info!(
        "Opening download queue database at {:?}...",
        config.download_queue_db_path()
    );
    let queue = Arc::new(SqliteDownloadQueueStore::new(
        config.download_queue_db_path(),
    )?);
    let recovered = queue.recover_interrupted()?;
    if recovered > 0 {
        info!("{} jobs were interrupted by the previous shutdown", recovered);
    }

    info!("Opening tracks database at {:?}...", config.tracks_db_path());
    let tracks = Arc::new(SqliteTrackStore::new(config.tracks_db_path())?);

    info!("Using object store at {:?}", config.media_path);
    let objects = Arc::new(FsObjectStore::new(&config.media_path)?);
    let audio_store = Arc::new(
        ContentAddressedStore::new(objects, "mp3").with_retry_policy(config.retry.storage.clone()),
    );

    let mut extractor_settings = YtDlpSettings::new(config.temp_dir.clone());
    extractor_settings.binary = config.ytdlp_path.clone();
    let extractor = Arc::new(YtDlpExtractor::new(extractor_settings)?);

    let matcher = if config.matcher.enabled {
        info!(
            "Metadata matching enabled against {}",
            config.musicbrainz_base_url
        );
        let client =
            MusicBrainzClient::new(&config.musicbrainz_user_agent, &config.musicbrainz_base_url)?;
        Some(Arc::new(
            MetadataMatcher::new(Arc::new(client), config.matcher.clone())
                .with_retry_policy(config.retry.metadata.clone()),
        ))
    } else {
        info!("Metadata matching disabled");
        None
    };

    let sources = Arc::new(SourceRegistry::default());
    let notifier = ProgressNotifier::new();
    let job_control = JobControl::new();

    let pipeline = Arc::new(JobPipeline {
        queue: queue.clone(),
        tracks: tracks.clone(),
        library: tracks.clone(),
        extractor,
        matcher: matcher.clone(),
        storage: audio_store.clone(),
        sources: sources.clone(),
        notifier: notifier.clone(),
        download_retry: config.retry.extractor.clone(),
    });
    let pool = Arc::new(WorkerPool::new(
        pipeline,
        config.workers.clone(),
        job_control.clone(),
    ));

    let shutdown = CancellationToken::new();
    let workers = tokio::spawn(pool.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown requested");
        signal_token.cancel();
    });

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
            ..Default::default()
        },
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        queue,
        tracks,
        audio_store,
        sources,
        matcher,
        notifier,
        job_control,
    };

    info!("Ready to serve at port {}!", config.port);
    let served = run_server(state, shutdown.clone()).await;
    shutdown.cancel();

    if let Err(e) = workers.await {
        error!("Worker pool task failed: {}", e);
    }
    info!("Bye");
    served
}
