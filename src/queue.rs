//! Redis-backed priority job queue shared with the polyglot workers.
//!
//! Key schema (bit-exact across languages):
//! - `job:<uuid>`: hash holding the JSON job envelope under `payload`,
//!   creation metadata under `metadata`, and the mutable execution state
//!   (`status`, `progress`, `chunks_processed`, timestamps, `worker_id`,
//!   `result`, `error`).
//! - `queue:cpu|gpu|rag|any`: sorted sets of job ids scored by
//!   `-priority`; the numerically larger priority is claimed first.
//! - `running:<workerId>`: hash of `jobId → unix_seconds` for jobs held
//!   by that worker.
//!
//! Availability is tracked as a tri-state (`unknown | up | down`) so that
//! a dead Redis degrades to the synchronous fallback instead of erroring
//! every request. While down, a re-probe happens at most every 5 seconds.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::models::{Job, JobSnapshot, JobStatus};

const DOWN_REPROBE_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Unknown,
    Up,
    Down,
}

struct AvailabilityState {
    state: Availability,
    last_probe: Option<Instant>,
}

/// Queue depths per worker class, as reported by `stats()`.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDepths {
    pub cpu: u64,
    pub gpu: u64,
    pub rag: u64,
    pub any: u64,
}

pub struct JobQueue {
    redis_url: String,
    manager: tokio::sync::Mutex<Option<ConnectionManager>>,
    availability: Mutex<AvailabilityState>,
}

impl JobQueue {
    pub fn new(config: &RedisConfig) -> Self {
        Self {
            redis_url: config.url(),
            manager: tokio::sync::Mutex::new(None),
            availability: Mutex::new(AvailabilityState {
                state: Availability::Unknown,
                last_probe: None,
            }),
        }
    }

    /// Enqueue a job. Returns the job id, or `None` when Redis is
    /// unavailable (the caller falls back to synchronous execution).
    pub async fn enqueue(&self, job: &Job) -> Option<String> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(_) => return None,
        };

        let envelope = match serde_json::to_string(job) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("failed to encode job envelope: {e}");
                return None;
            }
        };
        let metadata = serde_json::to_string(&job.metadata).unwrap_or_default();
        let job_key = format!("job:{}", job.job_id);
        let queue_key = format!("queue:{}", job.requires.as_str());

        let fields: Vec<(&str, String)> = vec![
            ("payload", envelope),
            ("metadata", metadata),
            ("status", JobStatus::Queued.as_str().to_string()),
            ("created_at", Utc::now().to_rfc3339()),
            ("progress", "0".to_string()),
            ("chunks_processed", "0".to_string()),
        ];

        let result: redis::RedisResult<()> = async {
            let _: () = conn.hset_multiple(&job_key, &fields).await?;
            let _: () = conn
                .zadd(&queue_key, &job.job_id, -(job.priority as f64))
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(job_id = %job.job_id, queue = %queue_key, "job enqueued");
                Some(job.job_id.clone())
            }
            Err(e) => {
                self.mark_down(&e);
                None
            }
        }
    }

    /// Claim the highest-priority job from the worker's native queue, then
    /// `queue:any`. Returns `None` when both queues are empty or Redis is
    /// unavailable.
    ///
    /// The claim is not transactional across the hash update: a crash
    /// between the pop and the status write leaks the job. Recovery from
    /// `running:<workerId>` is the operator's concern.
    pub async fn claim(&self, worker_type: &str, worker_id: &str) -> Option<Job> {
        let mut conn = self.connection().await.ok()?;

        for queue in [format!("queue:{worker_type}"), "queue:any".to_string()] {
            let popped: redis::RedisResult<Vec<(String, f64)>> = conn.zpopmin(&queue, 1).await;
            let popped = match popped {
                Ok(p) => p,
                Err(e) => {
                    self.mark_down(&e);
                    return None;
                }
            };
            let Some((job_id, _score)) = popped.into_iter().next() else {
                continue;
            };

            let job_key = format!("job:{job_id}");
            let envelope: redis::RedisResult<Option<String>> =
                conn.hget(&job_key, "payload").await;
            let envelope = match envelope {
                Ok(e) => e,
                Err(e) => {
                    self.mark_down(&e);
                    return None;
                }
            };
            // Cancelled/expired jobs leave a dangling queue entry; move on.
            let Some(envelope) = envelope else {
                tracing::warn!(%job_id, "popped job has no payload, skipping");
                continue;
            };

            let job: Job = match serde_json::from_str(&envelope) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(%job_id, "malformed job envelope: {e}");
                    let _ = self
                        .write_failure(&mut conn, &job_id, worker_id, "malformed job envelope")
                        .await;
                    continue;
                }
            };

            let now = Utc::now();
            let fields: Vec<(&str, String)> = vec![
                ("status", JobStatus::Running.as_str().to_string()),
                ("started_at", now.to_rfc3339()),
                ("worker_id", worker_id.to_string()),
                ("last_heartbeat", now.to_rfc3339()),
            ];
            let owned: redis::RedisResult<()> = async {
                let _: () = conn
                    .hset(
                        format!("running:{worker_id}"),
                        &job_id,
                        now.timestamp().to_string(),
                    )
                    .await?;
                let _: () = conn.hset_multiple(&job_key, &fields).await?;
                Ok(())
            }
            .await;
            if let Err(e) = owned {
                self.mark_down(&e);
                return None;
            }

            tracing::info!(%job_id, worker_id, queue = %queue, "job claimed");
            return Some(job);
        }

        None
    }

    /// Refresh `last_heartbeat`. Best-effort: a failed heartbeat is logged,
    /// not propagated (the job keeps running; the reaper sees staleness).
    pub async fn heartbeat(&self, job_id: &str, worker_id: &str) {
        let Ok(mut conn) = self.connection().await else {
            return;
        };
        let result: redis::RedisResult<()> = conn
            .hset(
                format!("job:{job_id}"),
                "last_heartbeat",
                Utc::now().to_rfc3339(),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(%job_id, worker_id, "heartbeat failed: {e}");
            self.mark_down(&e);
        }
    }

    pub async fn update_progress(&self, job_id: &str, progress: u8, chunks_processed: u64) {
        let Ok(mut conn) = self.connection().await else {
            return;
        };
        let fields: Vec<(&str, String)> = vec![
            ("progress", progress.min(100).to_string()),
            ("chunks_processed", chunks_processed.to_string()),
        ];
        let result: redis::RedisResult<()> =
            conn.hset_multiple(format!("job:{job_id}"), &fields).await;
        if let Err(e) = result {
            self.mark_down(&e);
        }
    }

    /// Record a successful result and release the worker's claim.
    pub async fn complete(
        &self,
        job_id: &str,
        worker_id: &str,
        result: &serde_json::Value,
    ) -> Result<()> {
        let mut conn = self.connection().await?;
        let encoded = serde_json::to_string(result)
            .map_err(|e| Error::Internal(format!("failed to encode job result: {e}")))?;
        let fields: Vec<(&str, String)> = vec![
            ("status", JobStatus::Completed.as_str().to_string()),
            ("completed_at", Utc::now().to_rfc3339()),
            ("progress", "100".to_string()),
            ("result", encoded),
        ];

        let outcome: redis::RedisResult<()> = async {
            let _: () = conn
                .hset_multiple(format!("job:{job_id}"), &fields)
                .await?;
            let _: () = conn.hdel(format!("running:{worker_id}"), job_id).await?;
            Ok(())
        }
        .await;
        outcome.map_err(|e| {
            self.mark_down(&e);
            Error::QueueUnavailable
        })?;

        tracing::info!(%job_id, worker_id, "job completed");
        Ok(())
    }

    /// Record a failure and release the worker's claim.
    pub async fn fail(&self, job_id: &str, worker_id: &str, error: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        self.write_failure(&mut conn, job_id, worker_id, error)
            .await
            .map_err(|e| {
                self.mark_down(&e);
                Error::QueueUnavailable
            })?;
        tracing::warn!(%job_id, worker_id, error, "job failed");
        Ok(())
    }

    async fn write_failure(
        &self,
        conn: &mut ConnectionManager,
        job_id: &str,
        worker_id: &str,
        error: &str,
    ) -> redis::RedisResult<()> {
        let fields: Vec<(&str, String)> = vec![
            ("status", JobStatus::Failed.as_str().to_string()),
            ("failed_at", Utc::now().to_rfc3339()),
            ("error", error.to_string()),
        ];
        let _: () = conn
            .hset_multiple(format!("job:{job_id}"), &fields)
            .await?;
        let _: () = conn.hdel(format!("running:{worker_id}"), job_id).await?;
        Ok(())
    }

    /// Snapshot of a job's execution state, or `None` for unknown ids.
    pub async fn status(&self, job_id: &str) -> Result<Option<JobSnapshot>> {
        let mut conn = self.connection().await?;
        let hash: HashMap<String, String> = conn
            .hgetall(format!("job:{job_id}"))
            .await
            .map_err(|e| {
                self.mark_down(&e);
                Error::QueueUnavailable
            })?;

        if hash.is_empty() {
            return Ok(None);
        }

        let status = hash
            .get("status")
            .and_then(|s| JobStatus::parse(s))
            .ok_or_else(|| Error::Internal(format!("job {job_id} has malformed status")))?;

        let field = |name: &str| hash.get(name).cloned();
        Ok(Some(JobSnapshot {
            job_id: job_id.to_string(),
            status,
            progress: field("progress").and_then(|p| p.parse().ok()).unwrap_or(0),
            chunks_processed: field("chunks_processed")
                .and_then(|c| c.parse().ok())
                .unwrap_or(0),
            created_at: field("created_at"),
            started_at: field("started_at"),
            completed_at: field("completed_at"),
            failed_at: field("failed_at"),
            last_heartbeat: field("last_heartbeat"),
            worker_id: field("worker_id"),
            result: field("result").and_then(|r| serde_json::from_str(&r).ok()),
            error: field("error"),
        }))
    }

    /// Depth of each queue class.
    pub async fn stats(&self) -> Result<QueueDepths> {
        let mut conn = self.connection().await?;
        let depths: redis::RedisResult<(u64, u64, u64, u64)> = async {
            Ok((
                conn.zcard("queue:cpu").await?,
                conn.zcard("queue:gpu").await?,
                conn.zcard("queue:rag").await?,
                conn.zcard("queue:any").await?,
            ))
        }
        .await;
        let (cpu, gpu, rag, any) = depths.map_err(|e| {
            self.mark_down(&e);
            Error::QueueUnavailable
        })?;
        Ok(QueueDepths { cpu, gpu, rag, any })
    }

    /// Jobs currently claimed by a worker, with their claim times. Lets
    /// operators reconstruct orphaned claims whose heartbeat went stale.
    pub async fn running_jobs(&self, worker_id: &str) -> Result<Vec<(String, i64)>> {
        let mut conn = self.connection().await?;
        let hash: HashMap<String, String> = conn
            .hgetall(format!("running:{worker_id}"))
            .await
            .map_err(|e| {
                self.mark_down(&e);
                Error::QueueUnavailable
            })?;
        Ok(hash
            .into_iter()
            .map(|(job_id, ts)| {
                let claimed_at = ts.parse().unwrap_or(0);
                (job_id, claimed_at)
            })
            .collect())
    }

    /// PING-based liveness; also the recovery path for the `down` state.
    pub async fn healthy(&self) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => {
                self.mark_up();
                true
            }
            Err(e) => {
                self.mark_down(&e);
                false
            }
        }
    }

    // ─── Connection and availability ─────────────────────

    /// Hand out the shared connection manager, lazily opening it on first
    /// use and probing with PING whenever the last known state is not `up`.
    async fn connection(&self) -> Result<ConnectionManager> {
        {
            let avail = self.availability.lock();
            if avail.state == Availability::Down {
                let recently = avail
                    .last_probe
                    .map(|t| t.elapsed().as_secs() < DOWN_REPROBE_SECS)
                    .unwrap_or(false);
                if recently {
                    return Err(Error::QueueUnavailable);
                }
            }
        }

        let mut guard = self.manager.lock().await;
        if guard.is_none() {
            match self.open().await {
                Ok(manager) => *guard = Some(manager),
                Err(e) => {
                    self.mark_down(&e);
                    return Err(Error::QueueUnavailable);
                }
            }
        }
        let mut conn = guard.clone().expect("manager populated above");
        drop(guard);

        let needs_probe = { self.availability.lock().state != Availability::Up };
        if needs_probe {
            let pong: redis::RedisResult<String> =
                redis::cmd("PING").query_async(&mut conn).await;
            match pong {
                Ok(_) => self.mark_up(),
                Err(e) => {
                    self.mark_down(&e);
                    return Err(Error::QueueUnavailable);
                }
            }
        }

        Ok(conn)
    }

    async fn open(&self) -> redis::RedisResult<ConnectionManager> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        ConnectionManager::new(client).await
    }

    fn mark_up(&self) {
        let mut avail = self.availability.lock();
        if avail.state != Availability::Up {
            tracing::info!("redis connection established");
        }
        avail.state = Availability::Up;
        avail.last_probe = Some(Instant::now());
    }

    fn mark_down(&self, error: &redis::RedisError) {
        let mut avail = self.availability.lock();
        if avail.state != Availability::Down {
            tracing::warn!("redis marked unavailable: {error}");
        }
        avail.state = Availability::Down;
        avail.last_probe = Some(Instant::now());
    }
}
