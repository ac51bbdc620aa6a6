use super::errors::{classify_failure, ExtractorError};
use super::models::{ExtractedAudio, MediaMetadata};
use super::progress::parse_progress_line;
use super::{MediaExtractor, ProgressCallback};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_BINARY: &str = "yt-dlp";

#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    /// Explicit binary location. When `None`, `yt-dlp` is looked up on PATH.
    pub binary: Option<PathBuf>,
    /// Parent of the per-download scratch directories.
    pub temp_dir: PathBuf,
    pub audio_format: String,
    /// Target bitrate passed as `--audio-quality`.
    pub audio_quality: String,
}

impl YtDlpSettings {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self {
            binary: None,
            temp_dir,
            audio_format: "mp3".to_string(),
            audio_quality: "320k".to_string(),
        }
    }
}

/// [`MediaExtractor`] backed by the yt-dlp command line tool.
pub struct YtDlpExtractor {
    binary: PathBuf,
    settings: YtDlpSettings,
}

impl YtDlpExtractor {
    /// Resolves the binary and makes sure the temp directory exists.
    pub fn new(settings: YtDlpSettings) -> Result<Self, ExtractorError> {
        let binary = match &settings.binary {
            Some(path) if path.exists() => path.clone(),
            Some(path) => which::which(path)
                .map_err(|_| ExtractorError::ToolMissing(path.display().to_string()))?,
            None => which::which(DEFAULT_BINARY)
                .map_err(|_| ExtractorError::ToolMissing(DEFAULT_BINARY.to_string()))?,
        };
        std::fs::create_dir_all(&settings.temp_dir)?;
        info!(
            "Using extractor binary {:?}, temp dir {:?}",
            binary, settings.temp_dir
        );
        Ok(Self { binary, settings })
    }

    fn metadata_args(url: &str) -> Vec<String> {
        vec![
            "--dump-json".to_string(),
            "--no-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ]
    }

    fn download_args(&self, url: &str, output_dir: &Path) -> Vec<String> {
        let template = output_dir.join("%(id)s.%(ext)s");
        vec![
            "-f".to_string(),
            "bestaudio".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            self.settings.audio_format.clone(),
            "--audio-quality".to_string(),
            self.settings.audio_quality.clone(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ]
    }

    fn command(&self, args: Vec<String>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> ExtractorError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ExtractorError::ToolMissing(self.binary.display().to_string())
        } else {
            ExtractorError::Io(err)
        }
    }

    async fn run_download(
        &self,
        cancel: &CancellationToken,
        url: &str,
        output_dir: &Path,
        on_progress: ProgressCallback,
    ) -> Result<(), ExtractorError> {
        let mut child = self
            .command(self.download_args(url, output_dir))
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::InvalidOutput("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractorError::InvalidOutput("stderr not captured".to_string()))?;

        // Both pipes are drained concurrently so a full stderr buffer can't
        // stall the child while we read stdout.
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parse_progress_line(&line) {
                    on_progress(progress);
                }
            }
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
            buf
        });

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            debug!("Download of {} cancelled, killing extractor", url);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill extractor process: {}", e);
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(ExtractorError::Cancelled);
        };
        let status = status?;

        let _ = stdout_task.await;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            debug!(
                "Extractor exited with {:?} for {}: {}",
                status.code(),
                url,
                stderr_text.trim()
            );
            return Err(classify_failure(&stderr_text));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn get_metadata(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<MediaMetadata, ExtractorError> {
        let output = self.command(Self::metadata_args(url)).output();

        // Dropping the output future drops the child, which is killed.
        let output = tokio::select! {
            output = output => output.map_err(|e| self.spawn_error(e))?,
            _ = cancel.cancelled() => return Err(ExtractorError::Cancelled),
        };

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        MediaMetadata::from_tool_json(&output.stdout)
    }

    async fn download(
        &self,
        cancel: &CancellationToken,
        url: &str,
        on_progress: ProgressCallback,
    ) -> Result<ExtractedAudio, ExtractorError> {
        let metadata = self.get_metadata(cancel, url).await?;

        // Dropped on every early return, which removes partial output.
        let workdir = tempfile::Builder::new()
            .prefix("dl-")
            .tempdir_in(&self.settings.temp_dir)?;
        self.run_download(cancel, url, workdir.path(), on_progress)
            .await?;

        let file_name = format!("{}.{}", metadata.id, self.settings.audio_format);
        let audio = ExtractedAudio::in_workdir(workdir, &file_name, metadata);
        if !tokio::fs::try_exists(&audio.path).await.unwrap_or(false) {
            return Err(ExtractorError::InvalidOutput(format!(
                "output file not found: {}",
                audio.path.display()
            )));
        }

        info!("Downloaded {} to {:?}", url, audio.path);
        Ok(audio)
    }
}
