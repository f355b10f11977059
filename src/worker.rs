//! Long-running worker: claim loop, per-job heartbeat timer, graceful
//! shutdown.
//!
//! The worker never caches mutable job state between heartbeats; Redis is
//! the only source of truth. Exceptions are caught exactly at the
//! claim-loop boundary and recorded on the job via `fail()`; the worker
//! keeps running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RetrievalConfig, WorkerConfig};
use crate::error::{Error, Result};
use crate::files::FileRegistry;
use crate::models::{AnswerRecord, Job, TaskType};
use crate::pipeline::{AnswerOptions, Pipeline};
use crate::queue::JobQueue;
use crate::state::AppState;

pub struct Worker {
    queue: Arc<JobQueue>,
    pipeline: Arc<Pipeline>,
    files: Arc<dyn FileRegistry>,
    config: WorkerConfig,
    retrieval: RetrievalConfig,
    shutting_down: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(state: &AppState) -> Self {
        Self {
            queue: state.queue.clone(),
            pipeline: state.pipeline.clone(),
            files: state.files.clone(),
            config: state.config.worker.clone(),
            retrieval: state.config.retrieval.clone(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutting_down.clone()
    }

    /// Claim-process loop. Returns once the shutdown flag is set and the
    /// in-flight job (if any) has finished.
    pub async fn run(&self) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            worker_type = %self.config.worker_type,
            "worker started"
        );

        let poll = Duration::from_millis(self.config.poll_interval_ms);
        while !self.shutting_down.load(Ordering::SeqCst) {
            match self
                .queue
                .claim(&self.config.worker_type, &self.config.worker_id)
                .await
            {
                Some(job) => self.process(job).await,
                None => tokio::time::sleep(poll).await,
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "worker stopped");
    }

    /// Run one claimed job to a terminal state. Never propagates: errors
    /// become `fail()` records and the loop continues.
    async fn process(&self, job: Job) {
        let job_id = job.job_id.clone();
        let worker_id = self.config.worker_id.clone();

        let heartbeat = self.spawn_heartbeat(&job_id, &worker_id);
        self.queue.update_progress(&job_id, 10, 0).await;

        let outcome = self.dispatch(&job).await;

        match outcome {
            Ok(record) => {
                self.queue
                    .update_progress(&job_id, 90, record.metadata.chunks_retrieved as u64)
                    .await;
                match serde_json::to_value(&record) {
                    Ok(result) => {
                        if let Err(e) = self.queue.complete(&job_id, &worker_id, &result).await {
                            tracing::error!(%job_id, "failed to record completion: {e}");
                        }
                    }
                    Err(e) => {
                        let _ = self
                            .queue
                            .fail(&job_id, &worker_id, &format!("result encoding failed: {e}"))
                            .await;
                    }
                }
            }
            Err(e) => {
                if let Err(record_err) =
                    self.queue.fail(&job_id, &worker_id, &e.to_string()).await
                {
                    tracing::error!(%job_id, "failed to record failure: {record_err}");
                }
            }
        }

        heartbeat.abort();
    }

    async fn dispatch(&self, job: &Job) -> Result<AnswerRecord> {
        let payload = &job.payload;
        let mut opts = AnswerOptions::from_config(&self.retrieval);
        opts.top_k = payload.top_k;
        opts.min_score = payload.min_score;

        match job.task_type {
            TaskType::RagQuery => {
                opts.file_context = Some(self.files.file_names(&payload.user_id).await?);
                self.pipeline
                    .answer(&payload.question, &payload.user_id, &opts)
                    .await
            }
            TaskType::RagQueryFile => {
                let file_id = payload
                    .file_id
                    .as_deref()
                    .ok_or_else(|| Error::InvalidInput("file-scoped job without fileId".into()))?;
                self.pipeline
                    .answer_for_file(&payload.question, file_id, &opts)
                    .await
            }
            // Routed through queue:any by mistake; fail it rather than
            // leaving it claimed forever.
            TaskType::ProcessFile => Err(Error::InvalidInput(
                "PROCESS_FILE is not handled by RAG workers".into(),
            )),
        }
    }

    fn spawn_heartbeat(&self, job_id: &str, worker_id: &str) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let job_id = job_id.to_string();
        let worker_id = worker_id.to_string();
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would duplicate the claim write.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                queue.heartbeat(&job_id, &worker_id).await;
            }
        })
    }
}

/// Run a worker until SIGINT, then give the in-flight job a grace period
/// before exiting.
pub async fn run_until_shutdown(state: AppState) -> anyhow::Result<()> {
    let grace = Duration::from_secs(state.config.worker.shutdown_grace_secs);
    let worker = Arc::new(Worker::new(&state));
    let flag = worker.shutdown_flag();

    let loop_handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining");
    flag.store(true, Ordering::SeqCst);

    if tokio::time::timeout(grace, loop_handle).await.is_err() {
        tracing::warn!("grace period elapsed with a job still in flight, forcing exit");
    }
    Ok(())
}
