//! Ask endpoints: queued (`/ask`, `/ask-file/{id}`) and synchronous
//! (`/ask-sync`).
//!
//! Queued endpoints enqueue a job and answer `202 {jobId, statusUrl}`.
//! When Redis is unavailable the same request runs in-process and answers
//! `200 {data}` instead; the client never sees a queue error.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::api::AuthUser;
use crate::error::{Error, Result};
use crate::models::{
    AskRequest, Job, JobMetadata, QueueClass, RagPayload, SearchMode, TaskType,
};
use crate::pipeline::AnswerOptions;
use crate::state::AppState;

/// Upper bound on requested topK; larger values are clamped, not rejected.
const MAX_TOP_K: usize = 50;
const DEFAULT_PRIORITY: i64 = 5;
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

struct ValidatedAsk {
    question: String,
    top_k: usize,
    min_score: f64,
    search_mode: SearchMode,
}

fn validate(state: &AppState, req: &AskRequest) -> Result<ValidatedAsk> {
    let question = req.question.trim().to_string();
    if question.is_empty() {
        return Err(Error::InvalidInput("question is required".to_string()));
    }
    let search_mode = match req.search_mode.as_deref() {
        None => SearchMode::Hybrid,
        Some(s) => SearchMode::parse(s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown search mode: {s}")))?,
    };
    Ok(ValidatedAsk {
        question,
        top_k: req.top_k.unwrap_or(state.config.retrieval.top_k).min(MAX_TOP_K),
        min_score: req.min_score.unwrap_or(state.config.retrieval.min_score),
        search_mode,
    })
}

fn options_for(state: &AppState, ask: &ValidatedAsk) -> AnswerOptions {
    let mut opts = AnswerOptions::from_config(&state.config.retrieval);
    opts.top_k = ask.top_k;
    opts.min_score = ask.min_score;
    opts.search_mode = ask.search_mode;
    opts
}

fn build_job(ask: &ValidatedAsk, user_id: &str, task_type: TaskType, file_id: Option<String>) -> Job {
    Job {
        job_id: Uuid::new_v4().to_string(),
        task_type,
        requires: QueueClass::Rag,
        priority: DEFAULT_PRIORITY,
        payload: RagPayload {
            user_id: user_id.to_string(),
            question: ask.question.clone(),
            top_k: ask.top_k,
            min_score: ask.min_score,
            file_id,
        },
        timeout_ms: DEFAULT_TIMEOUT_MS,
        metadata: JobMetadata {
            source: "rag-api".to_string(),
            created_at: Utc::now(),
        },
    }
}

/// POST /api/rag/ask: enqueue a RAG query, falling back to synchronous
/// execution when the queue is down.
pub async fn ask(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<AskRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let ask = validate(&state, &req)?;

    // The job payload schema carries no search mode, so only the default
    // hybrid mode can ride the queue; other modes run in-process.
    if ask.search_mode == SearchMode::Hybrid {
        let job = build_job(&ask, &user_id, TaskType::RagQuery, None);
        if let Some(job_id) = state.queue.enqueue(&job).await {
            return Ok((
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "success": true,
                    "jobId": job_id,
                    "statusUrl": format!("/api/rag/status/{job_id}"),
                })),
            ));
        }
        tracing::warn!("queue unavailable, answering /ask synchronously");
    }

    let record = run_sync(&state, &user_id, &ask).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "data": record })),
    ))
}

/// POST /api/rag/ask-sync: always run the pipeline in the request handler.
pub async fn ask_sync(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<AskRequest>,
) -> Result<Json<serde_json::Value>> {
    let ask = validate(&state, &req)?;
    let request_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let record = run_sync(&state, &user_id, &ask).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": record,
        "metadata": {
            "requestId": request_id,
            "timing": { "totalMs": started.elapsed().as_millis() as u64 },
        },
    })))
}

/// POST /api/rag/ask-file/{fileId}: file-scoped variant. Ownership is
/// enforced against the file registry before anything is enqueued.
pub async fn ask_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(file_id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let ask = validate(&state, &req)?;

    if !state.files.owns(&file_id, &user_id).await? {
        return Err(Error::NotFound(format!("file {file_id} not found")));
    }

    let job = build_job(&ask, &user_id, TaskType::RagQueryFile, Some(file_id.clone()));
    if let Some(job_id) = state.queue.enqueue(&job).await {
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "success": true,
                "jobId": job_id,
                "statusUrl": format!("/api/rag/status/{job_id}"),
            })),
        ));
    }

    tracing::warn!("queue unavailable, answering /ask-file synchronously");
    let opts = options_for(&state, &ask);
    let record = state
        .pipeline
        .answer_for_file(&ask.question, &file_id, &opts)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "data": record })),
    ))
}

async fn run_sync(
    state: &AppState,
    user_id: &str,
    ask: &ValidatedAsk,
) -> Result<crate::models::AnswerRecord> {
    let mut opts = options_for(state, ask);
    opts.file_context = Some(state.files.file_names(user_id).await?);
    state.pipeline.answer(&ask.question, user_id, &opts).await
}
