//! Integration tests for the Redis-backed job queue.
//!
//! These need a live Redis (REDIS_HOST/REDIS_PORT, default 127.0.0.1:6379)
//! and are `#[ignore]`d so the default test run stays hermetic:
//!
//! ```sh
//! cargo test --test queue_test -- --ignored
//! ```

use chrono::Utc;
use uuid::Uuid;

use doc_ask::config::Config;
use doc_ask::models::{Job, JobMetadata, JobStatus, QueueClass, RagPayload, TaskType};
use doc_ask::queue::JobQueue;

fn queue() -> JobQueue {
    JobQueue::new(&Config::from_env().redis)
}

fn job(priority: i64, question: &str) -> Job {
    Job {
        job_id: Uuid::new_v4().to_string(),
        task_type: TaskType::RagQuery,
        requires: QueueClass::Rag,
        priority,
        payload: RagPayload {
            user_id: "test-user".to_string(),
            question: question.to_string(),
            top_k: 5,
            min_score: 0.0,
            file_id: None,
        },
        timeout_ms: 120_000,
        metadata: JobMetadata {
            source: "rag-api".to_string(),
            created_at: Utc::now(),
        },
    }
}

fn worker_id() -> String {
    format!("test-worker-{}", Uuid::new_v4())
}

/// Drain queue:rag so earlier runs don't interfere.
async fn drain(queue: &JobQueue, worker: &str) {
    while let Some(job) = queue.claim("rag", worker).await {
        let _ = queue.fail(&job.job_id, worker, "drained by test setup").await;
    }
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_enqueue_then_status_is_queued() {
    let queue = queue();
    let job = job(5, "status check");

    let id = queue.enqueue(&job).await.expect("redis should be up");
    assert_eq!(id, job.job_id);

    let snapshot = queue.status(&id).await.unwrap().expect("job hash exists");
    assert_eq!(snapshot.status, JobStatus::Queued);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.worker_id.is_none());

    // Cleanup: claim and fail it.
    let w = worker_id();
    drain(&queue, &w).await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_higher_priority_claimed_first() {
    let queue = queue();
    let w = worker_id();
    drain(&queue, &w).await;

    // Enqueue low (3) then high (9); the worker claims 9 first.
    let low = job(3, "low priority");
    let high = job(9, "high priority");
    queue.enqueue(&low).await.expect("enqueue low");
    queue.enqueue(&high).await.expect("enqueue high");

    let first = queue.claim("rag", &w).await.expect("claim first");
    let second = queue.claim("rag", &w).await.expect("claim second");
    assert_eq!(first.job_id, high.job_id);
    assert_eq!(second.job_id, low.job_id);

    let _ = queue.fail(&first.job_id, &w, "test cleanup").await;
    let _ = queue.fail(&second.job_id, &w, "test cleanup").await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_claimed_job_is_exclusive() {
    let queue = queue();
    let w1 = worker_id();
    let w2 = worker_id();
    drain(&queue, &w1).await;

    let j = job(5, "exclusive claim");
    queue.enqueue(&j).await.expect("enqueue");

    let claimed = queue.claim("rag", &w1).await.expect("w1 claims");
    assert_eq!(claimed.job_id, j.job_id);

    // No other worker can claim the same job until it reaches a terminal state.
    let other = queue.claim("rag", &w2).await;
    assert!(other.is_none() || other.unwrap().job_id != j.job_id);

    let snapshot = queue.status(&j.job_id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Running);
    assert_eq!(snapshot.worker_id.as_deref(), Some(w1.as_str()));

    let _ = queue.fail(&j.job_id, &w1, "test cleanup").await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_lifecycle_queued_running_completed() {
    let queue = queue();
    let w = worker_id();
    drain(&queue, &w).await;

    let j = job(5, "full lifecycle");
    queue.enqueue(&j).await.expect("enqueue");
    assert_eq!(
        queue.status(&j.job_id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );

    let claimed = queue.claim("rag", &w).await.expect("claim");
    assert_eq!(
        queue.status(&claimed.job_id).await.unwrap().unwrap().status,
        JobStatus::Running
    );

    queue.update_progress(&claimed.job_id, 90, 7).await;
    queue
        .complete(&claimed.job_id, &w, &serde_json::json!({"answer": "done"}))
        .await
        .expect("complete");

    let snapshot = queue.status(&claimed.job_id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.chunks_processed, 7);
    assert!(snapshot.completed_at.is_some());
    assert_eq!(snapshot.result.unwrap()["answer"], "done");

    // The worker's running set no longer references the job.
    let running = queue.running_jobs(&w).await.unwrap();
    assert!(running.iter().all(|(id, _)| id != &j.job_id));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_orphaned_claim_is_reconstructable() {
    let queue = queue();
    let w = worker_id();
    drain(&queue, &w).await;

    // After a claim with no completion, the job id and claim time are
    // recoverable from running:<workerId> even if the worker dies.
    let j = job(5, "orphan reconstruction");
    queue.enqueue(&j).await.expect("enqueue");
    let claimed = queue.claim("rag", &w).await.expect("claim");

    let running = queue.running_jobs(&w).await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].0, claimed.job_id);
    assert!(running[0].1 > 0, "claim timestamp recorded");

    let snapshot = queue.status(&claimed.job_id).await.unwrap().unwrap();
    assert!(snapshot.last_heartbeat.is_some());

    let _ = queue.fail(&claimed.job_id, &w, "test cleanup").await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_stats_reports_queue_depths() {
    let queue = queue();
    let w = worker_id();
    drain(&queue, &w).await;

    let before = queue.stats().await.expect("stats");
    let j = job(5, "depth check");
    queue.enqueue(&j).await.expect("enqueue");

    let after = queue.stats().await.expect("stats");
    assert_eq!(after.rag, before.rag + 1);

    drain(&queue, &w).await;
}

#[tokio::test]
async fn test_queue_down_returns_unavailable_sentinels() {
    // Port 1 is never a Redis; every operation reports unavailability
    // without hanging.
    let mut config = Config::default();
    config.redis.host = "127.0.0.1".to_string();
    config.redis.port = 1;
    let queue = JobQueue::new(&config.redis);

    assert!(!queue.healthy().await);
    assert!(queue.enqueue(&job(5, "nope")).await.is_none());
    assert!(queue.claim("rag", "w").await.is_none());
    assert!(queue.status("missing").await.is_err());
}
