//! Fixed-size pool of workers pulling jobs from the download queue.
//!
//! Each worker loops: claim the oldest pending job, run it through the
//! pipeline under a per-job timeout, repeat. When the queue is empty the
//! worker sleeps until woken by a new job or the poll interval elapses.

use super::models::{job_error_codes, DownloadJob, JobError, JobStatus};
use super::pipeline::JobPipeline;
use super::queue_store::DownloadQueueStore;
use crate::config::WorkerSettings;
use crate::server::metrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cancellation handles of the jobs currently running, plus the wake-up
/// signal for idle workers. Cloned into the HTTP layer.
#[derive(Clone, Default)]
pub struct JobControl {
    running: Arc<Mutex<HashMap<String, CancellationToken>>>,
    wakeup: Arc<Notify>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes one idle worker.
    pub fn job_enqueued(&self) {
        self.wakeup.notify_one();
    }

    /// Cancels a running job. Returns false if it is not running here.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.running.lock().unwrap().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.running
            .lock()
            .unwrap()
            .insert(job_id.to_string(), token.clone());
        token
    }

    fn remove(&self, job_id: &str) {
        self.running.lock().unwrap().remove(job_id);
    }

    fn cancel_all(&self) {
        for token in self.running.lock().unwrap().values() {
            token.cancel();
        }
    }
}

pub struct WorkerPool {
    pipeline: Arc<JobPipeline>,
    queue: Arc<dyn DownloadQueueStore>,
    settings: WorkerSettings,
    control: JobControl,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<JobPipeline>, settings: WorkerSettings, control: JobControl) -> Self {
        Self {
            queue: pipeline.queue.clone(),
            pipeline,
            settings,
            control,
        }
    }

    pub fn control(&self) -> &JobControl {
        &self.control
    }

    /// Runs the workers until `shutdown` fires, then drains.
    ///
    /// In-flight jobs get `shutdown_grace_secs` to finish. After that their
    /// tokens are cancelled, which stops downloads and any pending retries.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let worker_count = self.settings.worker_count.max(1);
        info!(
            "Worker pool starting ({} workers, job timeout {}s)",
            worker_count, self.settings.job_timeout_secs
        );

        let mut workers = JoinSet::new();
        for index in 0..worker_count {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { pool.worker_loop(index, shutdown).await });
        }

        shutdown.cancelled().await;
        info!(
            "Worker pool draining {} in-flight jobs",
            self.control.running_count()
        );

        let grace = Duration::from_secs(self.settings.shutdown_grace_secs);
        let drained = tokio::time::timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "Grace period elapsed, cancelling {} jobs",
                self.control.running_count()
            );
            self.control.cancel_all();
            while workers.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    async fn worker_loop(&self, index: usize, shutdown: CancellationToken) {
        debug!("[worker {}] started", index);
        let poll_interval = Duration::from_millis(self.settings.dequeue_poll_ms.max(10));

        while !shutdown.is_cancelled() {
            match self.queue.claim_next() {
                Ok(Some(job)) => self.process(index, job).await,
                Ok(None) => {
                    tokio::select! {
                        _ = self.control.wakeup.notified() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!("[worker {}] failed to claim job: {}", index, e);
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        debug!("[worker {}] stopped", index);
    }

    async fn process(&self, index: usize, job: DownloadJob) {
        info!(
            "[worker {}] job {} started: {}",
            index, job.id, job.canonical_url
        );
        let started = Instant::now();
        let token = self.control.register(&job.id);

        // A cancel that arrived between claim and register.
        if let Ok(Some(current)) = self.queue.get_job(&job.id) {
            if current.status == JobStatus::Cancelled {
                token.cancel();
            }
        }

        // The deadline only cancels the token. The pipeline keeps running
        // until it reaches a point where it can stop cleanly, so an upload
        // in flight is either finished or rolled back.
        let timeout = Duration::from_secs(self.settings.job_timeout_secs);
        let run = self.pipeline.run(&job, &token);
        tokio::pin!(run);
        let mut timed_out = false;
        let result = tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    "[worker {}] job {} exceeded {}s, cancelling",
                    index, job.id, timeout.as_secs()
                );
                timed_out = true;
                token.cancel();
                run.await
            }
        };
        let result = match result {
            Err(e) if timed_out && e.is_cancelled() => Err(JobError::new(
                job_error_codes::JOB_TIMEOUT,
                format!("job exceeded {}s", timeout.as_secs()),
            )),
            other => other,
        };
        self.control.remove(&job.id);
        self.pipeline.finish(&job, &result);

        match self.queue.get_job(&job.id) {
            Ok(Some(current)) if current.status.is_terminal() => metrics::record_job_finished(
                current.status.as_str(),
                current.error_code.as_deref().unwrap_or_default(),
                started.elapsed(),
            ),
            Ok(_) => {}
            Err(e) => warn!("[worker {}] job {}: failed to read outcome: {}", index, job.id, e),
        }

        info!(
            "[worker {}] job {} finished ({})",
            index,
            job.id,
            if result.is_ok() { "ok" } else { "error" }
        );
    }
}
