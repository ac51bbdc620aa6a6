//! Download Manager module
//!
//! Durable job queue plus a bounded worker pool that drives each job
//! through extraction, matching, storage and library attach.

mod models;
mod pipeline;
mod progress;
mod queue_store;
mod schema;
#[cfg(test)]
pub(crate) mod testing;
mod worker_pool;

pub use models::*;
pub use pipeline::JobPipeline;
pub use progress::{ProgressEvent, ProgressNotifier, PROGRESS_EVENT_TYPE};
pub use queue_store::{DownloadQueueStore, SqliteDownloadQueueStore};
pub use schema::DOWNLOAD_QUEUE_VERSIONED_SCHEMAS;
pub use worker_pool::{JobControl, WorkerPool};
