//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases, object store
//! and worker pool. yt-dlp and MusicBrainz are replaced by the scripted
//! fakes in `fixtures`.

use super::constants::*;
use super::fixtures::{ScriptedExtractor, ScriptedSearch};
use pezzottify_ingest_server::config::{MatcherSettings, WorkerSettings};
use pezzottify_ingest_server::download_manager::{
    JobControl, JobPipeline, ProgressNotifier, SqliteDownloadQueueStore, WorkerPool,
};
use pezzottify_ingest_server::matcher::MetadataMatcher;
use pezzottify_ingest_server::object_store::{ContentAddressedStore, FsObjectStore};
use pezzottify_ingest_server::retry::RetryPolicy;
use pezzottify_ingest_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use pezzottify_ingest_server::source_validator::SourceRegistry;
use pezzottify_ingest_server::track_store::SqliteTrackStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Knobs for the few tests that need a non-default server
#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub matcher_enabled: bool,
    pub worker_count: usize,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            matcher_enabled: true,
            worker_count: 2,
        }
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Test server instance with isolated storage
///
/// When dropped, the server and its workers shut down and temp resources
/// are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Scripted extractor, to steer downloads from tests
    pub extractor: Arc<ScriptedExtractor>,

    /// Scripted metadata search
    pub search: Arc<ScriptedSearch>,

    /// Root of the filesystem object store
    pub media_path: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port with default options
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if any store cannot be opened, the port cannot be bound or
    /// the server doesn't become ready within timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let media_path = temp_dir.path().join("media");
        let downloads_path = temp_dir.path().join("downloads");
        std::fs::create_dir_all(&downloads_path).expect("Failed to create downloads dir");

        let queue = Arc::new(
            SqliteDownloadQueueStore::new(temp_dir.path().join("download_queue.db"))
                .expect("Failed to open download queue"),
        );
        let tracks = Arc::new(
            SqliteTrackStore::new(temp_dir.path().join("tracks.db"))
                .expect("Failed to open track store"),
        );
        let objects =
            Arc::new(FsObjectStore::new(&media_path).expect("Failed to open object store"));
        let audio_store =
            Arc::new(ContentAddressedStore::new(objects, "mp3").with_retry_policy(fast_retry()));

        let extractor = Arc::new(ScriptedExtractor::new(downloads_path));
        let search = Arc::new(ScriptedSearch::default());
        let matcher = options.matcher_enabled.then(|| {
            Arc::new(
                MetadataMatcher::new(search.clone(), MatcherSettings::default())
                    .with_retry_policy(fast_retry()),
            )
        });

        let sources = Arc::new(SourceRegistry::default());
        let notifier = ProgressNotifier::new();
        let job_control = JobControl::new();

        let pipeline = Arc::new(JobPipeline {
            queue: queue.clone(),
            tracks: tracks.clone(),
            library: tracks.clone(),
            extractor: extractor.clone(),
            matcher: matcher.clone(),
            storage: audio_store.clone(),
            sources: sources.clone(),
            notifier: notifier.clone(),
            download_retry: fast_retry(),
        });
        let workers = WorkerSettings {
            worker_count: options.worker_count,
            job_timeout_secs: 30,
            dequeue_poll_ms: WORKER_POLL_MS,
            shutdown_grace_secs: 1,
        };
        let pool = Arc::new(WorkerPool::new(pipeline, workers, job_control.clone()));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState {
            config: ServerConfig {
                port,
                requests_logging_level: RequestsLoggingLevel::None,
                stream_cache_age_sec: 0,
            },
            start_time: Instant::now(),
            hash: "test".to_string(),
            queue,
            tracks,
            audio_store,
            sources,
            matcher,
            notifier,
            job_control,
        };
        let app = make_app(state);

        let shutdown = CancellationToken::new();
        tokio::spawn(pool.run(shutdown.clone()));

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            extractor,
            search,
            media_path,
            _temp_dir: temp_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the /health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        // TempDir will be cleaned up automatically
    }
}
