use super::errors::ExtractorError;
use super::title::{clean_track_name, parse_artist_track};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::warn;

/// Subset of the tool's `--dump-json` output that we use.
#[derive(Debug, Deserialize)]
struct ToolInfo {
    id: String,
    #[serde(default)]
    title: String,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<ToolThumbnail>,
    webpage_url: Option<String>,
    extractor: Option<String>,
    description: Option<String>,
    artist: Option<String>,
    track: Option<String>,
    album: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolThumbnail {
    url: Option<String>,
}

/// Metadata describing a remote media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub duration_ms: Option<i64>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
    pub description: Option<String>,
}

impl MediaMetadata {
    /// Parses one JSON document as printed by `--dump-json`.
    ///
    /// Only the first non-empty line is read; playlists print one document
    /// per entry.
    pub fn from_tool_json(stdout: &[u8]) -> Result<Self, ExtractorError> {
        let text = String::from_utf8_lossy(stdout);
        let first = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| ExtractorError::InvalidOutput("empty metadata output".to_string()))?;
        let info: ToolInfo = serde_json::from_str(first)
            .map_err(|e| ExtractorError::InvalidOutput(format!("metadata JSON: {}", e)))?;
        Ok(info.into())
    }
}

impl From<ToolInfo> for MediaMetadata {
    fn from(info: ToolInfo) -> Self {
        let thumbnail = info
            .thumbnail
            .filter(|t| !t.is_empty())
            .or_else(|| info.thumbnails.iter().rev().find_map(|t| t.url.clone()));

        let (artist, track) = match info.artist.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(artist) => {
                let track = info
                    .track
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(&info.title);
                (artist.trim().to_string(), clean_track_name(track))
            }
            None => parse_artist_track(
                &info.title,
                info.uploader.as_deref(),
                info.channel.as_deref(),
            ),
        };

        MediaMetadata {
            id: info.id,
            title: info.title,
            artist,
            track,
            album: info.album.filter(|a| !a.is_empty()),
            uploader: info.uploader,
            channel: info.channel,
            duration_ms: info
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| (d * 1000.0).round() as i64),
            thumbnail,
            webpage_url: info.webpage_url,
            extractor: info.extractor,
            description: info.description,
        }
    }
}

/// A finished download sitting in the extractor's temp directory.
///
/// Each download gets its own scratch directory, owned here, so two jobs
/// for the same media id never touch each other's files.
#[derive(Debug)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    pub metadata: MediaMetadata,
    workdir: TempDir,
}

impl ExtractedAudio {
    /// Audio written as `file_name` inside a per-download scratch directory.
    pub fn in_workdir(workdir: TempDir, file_name: &str, metadata: MediaMetadata) -> Self {
        Self {
            path: workdir.path().join(file_name),
            metadata,
            workdir,
        }
    }

    /// Removes the scratch directory and everything in it.
    pub fn discard(self) {
        let dir = self.workdir.path().to_path_buf();
        if let Err(e) = self.workdir.close() {
            warn!("Failed to remove scratch dir {:?}: {}", dir, e);
        }
    }
}
