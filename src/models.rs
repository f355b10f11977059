use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task types routed through the job queue.
///
/// `ProcessFile` belongs to the ingestion side and is never dispatched by
/// the RAG worker; it appears here because the wire format is shared with
/// the other worker classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RagQuery,
    RagQueryFile,
    ProcessFile,
}

/// Worker-capability tag used to pick the queue a job lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueClass {
    Cpu,
    Gpu,
    Rag,
    Any,
}

impl QueueClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Cpu => "cpu",
            QueueClass::Gpu => "gpu",
            QueueClass::Rag => "rag",
            QueueClass::Any => "any",
        }
    }

    pub fn from_worker_type(worker_type: &str) -> Self {
        match worker_type {
            "cpu" => QueueClass::Cpu,
            "gpu" => QueueClass::Gpu,
            "any" => QueueClass::Any,
            _ => QueueClass::Rag,
        }
    }
}

/// Job status lifecycle: `queued → running → (completed | failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Task-specific payload for RAG query jobs.
///
/// Field names are camelCase on the wire: this inner object is produced by
/// the HTTP surface and read back verbatim by polyglot workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagPayload {
    pub user_id: String,
    pub question: String,
    pub top_k: usize,
    pub min_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Job creation metadata, written once at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A unit of deferred work tracked in Redis.
///
/// Serializes to the snake_case JSON envelope shared with the Go workers:
/// `{job_id, task_type, requires, priority, payload, timeout_ms, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub task_type: TaskType,
    pub requires: QueueClass,
    pub priority: i64,
    pub payload: RagPayload,
    pub timeout_ms: u64,
    pub metadata: JobMetadata,
}

/// Mutable job execution state as read back from the `job:<id>` hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub chunks_processed: u64,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub failed_at: Option<String>,
    pub last_heartbeat: Option<String>,
    pub worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A bounded text fragment produced by the ingestion pipeline; the unit of
/// retrieval. Immutable at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub file_id: String,
    pub file_name: String,
    pub user_id: String,
    pub chunk_index: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Which retrieval arm produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Bm25,
    Vector,
    Hybrid,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::Bm25 => "bm25",
            RetrievalSource::Vector => "vector",
            RetrievalSource::Hybrid => "hybrid",
        }
    }
}

/// A scored chunk produced transiently per query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub file_id: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
    pub source: RetrievalSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// A cited source attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSource {
    pub file_name: String,
    pub score: f64,
    pub text: String,
    pub chunk_index: usize,
    pub file_id: String,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion_rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMetadata {
    pub question: String,
    pub chunks_retrieved: usize,
    pub chunks_used: usize,
    pub context_length: usize,
    pub unique_files: usize,
    pub unique_file_names: Vec<String>,
    pub search_mode: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The answer returned to the caller and stored in the cache.
/// Immutable once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub answer: String,
    pub context: String,
    pub sources: Vec<AnswerSource>,
    pub metadata: AnswerMetadata,
}

/// Retrieval mode selector on ask requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Vector,
    Bm25,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Vector => "vector",
            SearchMode::Bm25 => "bm25",
        }
    }

    /// Parse a user-supplied mode; unknown values are an input error, not
    /// a deserialization failure, so they surface as `INVALID_INPUT`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hybrid" => Some(SearchMode::Hybrid),
            "vector" => Some(SearchMode::Vector),
            "bm25" => Some(SearchMode::Bm25),
            _ => None,
        }
    }
}

/// Ask request body (camelCase on the HTTP surface).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    pub top_k: Option<usize>,
    pub min_score: Option<f64>,
    pub search_mode: Option<String>,
}
