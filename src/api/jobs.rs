//! Job status, queue statistics, and liveness endpoints.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::AuthUser;
use crate::error::{Error, Result};
use crate::state::AppState;

/// GET /api/rag/status/{jobId}: proxy the job snapshot from Redis.
pub async fn status(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let snapshot = state
        .queue
        .status(&job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;

    Ok(Json(serde_json::json!({ "success": true, "data": snapshot })))
}

/// GET /api/rag/stats: vector-store cardinality plus the caller's file
/// count.
pub async fn stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>> {
    let total_vectors = state.vectors.count().await?;
    let user_files = state.files.file_count(&user_id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "totalVectors": total_vectors,
            "userFiles": user_files,
            "collectionName": state.vectors.collection_name(),
            "vectorSize": state.vectors.vector_size(),
        },
    })))
}

/// GET /api/rag/health: liveness of the queue and the embedding service.
/// Unauthenticated: probed by orchestration, not by users.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let queue = state.queue.healthy().await;
    let embedding = state.embedder.healthy().await;
    let depths = if queue {
        state.queue.stats().await.ok()
    } else {
        None
    };

    Json(serde_json::json!({
        "success": true,
        "data": {
            "queue": queue,
            "queueDepths": depths,
            "embedding": embedding,
        },
    }))
}
