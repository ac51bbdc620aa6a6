//! Extractor: wraps the external media-extraction binary (yt-dlp).
//!
//! The binary runs as a subprocess; its stdout is scanned for progress
//! lines while stderr is buffered for failure classification.

mod errors;
mod models;
mod progress;
mod title;
mod ytdlp;

pub use errors::{classify_failure, ExtractorError};
pub use models::{ExtractedAudio, MediaMetadata};
pub use progress::{parse_progress_line, ExtractorProgress, ExtractorStage};
pub use title::{clean_track_name, parse_artist_track};
pub use ytdlp::{YtDlpExtractor, YtDlpSettings};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receives progress updates while a download runs. Must not block.
pub type ProgressCallback = Arc<dyn Fn(ExtractorProgress) + Send + Sync>;

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Downloads the audio for `url` into the local temp directory.
    async fn download(
        &self,
        cancel: &CancellationToken,
        url: &str,
        on_progress: ProgressCallback,
    ) -> Result<ExtractedAudio, ExtractorError>;

    /// Fetches metadata only, without downloading media.
    async fn get_metadata(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<MediaMetadata, ExtractorError>;
}
