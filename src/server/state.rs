use axum::extract::FromRef;

use crate::download_manager::{DownloadQueueStore, JobControl, ProgressNotifier};
use crate::matcher::MetadataMatcher;
use crate::object_store::ContentAddressedStore;
use crate::source_validator::SourceRegistry;
use crate::track_store::TrackStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedQueueStore = Arc<dyn DownloadQueueStore>;
pub type GuardedTrackStore = Arc<dyn TrackStore>;
pub type GuardedAudioStore = Arc<ContentAddressedStore>;
pub type GuardedSourceRegistry = Arc<SourceRegistry>;
/// `None` when matching is disabled.
pub type GuardedMatcher = Option<Arc<MetadataMatcher>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub queue: GuardedQueueStore,
    pub tracks: GuardedTrackStore,
    pub audio_store: GuardedAudioStore,
    pub sources: GuardedSourceRegistry,
    pub matcher: GuardedMatcher,
    pub notifier: ProgressNotifier,
    pub job_control: JobControl,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedQueueStore {
    fn from_ref(input: &ServerState) -> Self {
        input.queue.clone()
    }
}

impl FromRef<ServerState> for GuardedTrackStore {
    fn from_ref(input: &ServerState) -> Self {
        input.tracks.clone()
    }
}

impl FromRef<ServerState> for GuardedAudioStore {
    fn from_ref(input: &ServerState) -> Self {
        input.audio_store.clone()
    }
}

impl FromRef<ServerState> for GuardedSourceRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.sources.clone()
    }
}

impl FromRef<ServerState> for ProgressNotifier {
    fn from_ref(input: &ServerState) -> Self {
        input.notifier.clone()
    }
}

impl FromRef<ServerState> for JobControl {
    fn from_ref(input: &ServerState) -> Self {
        input.job_control.clone()
    }
}
