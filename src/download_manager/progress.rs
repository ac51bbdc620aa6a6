//! Progress events for download jobs.
//!
//! Events are broadcast to every live subscriber (the WebSocket layer
//! filters them per user). Nothing is buffered for clients that are not
//! connected; polling `GET /downloads/{id}` covers those.

use super::models::{DownloadJob, JobStatus};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

pub const PROGRESS_EVENT_TYPE: &str = "download_progress";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub job_id: String,
    #[serde(skip)]
    pub user_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(job: &DownloadJob, status: JobStatus, progress: u8) -> Self {
        Self {
            event_type: PROGRESS_EVENT_TYPE,
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            status,
            progress,
            track_title: None,
            artist_name: None,
            error: None,
        }
    }

    pub fn with_track(mut self, title: &str, artist: &str) -> Self {
        self.track_title = Some(title.to_string());
        self.artist_name = Some(artist.to_string());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Fan-out of progress events to live subscribers.
#[derive(Clone)]
pub struct ProgressNotifier {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Never blocks; an event with no subscribers is dropped.
    pub fn publish(&self, event: ProgressEvent) {
        trace!(
            "Progress {} {} {}%",
            event.job_id,
            event.status.as_str(),
            event.progress
        );
        let _ = self.sender.send(event);
    }
}
