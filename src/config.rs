use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Redis connection settings for the job queue
    pub redis: RedisConfig,
    /// External embedding service
    pub embedding: EmbeddingConfig,
    /// External vector store
    pub vector: VectorStoreConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Worker identity and timing
    pub worker: WorkerConfig,
    /// Retrieval defaults applied when the request omits them
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service (`POST /embed`, `POST /embed/batch`, `GET /health`)
    pub base_url: String,
    /// Expected embedding dimension; anything else is a protocol error
    pub dimension: usize,
    /// Single-text request timeout in seconds
    pub timeout_secs: u64,
    /// Batch request timeout in seconds
    pub batch_timeout_secs: u64,
    /// Texts per batch request
    pub batch_size: usize,
    /// How long a health probe result is trusted, in seconds
    pub health_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Base URL of the vector store REST API
    pub base_url: String,
    /// Collection holding document chunks
    pub collection: String,
    /// Dimension of stored vectors (reported by /stats)
    pub vector_size: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Worker class; selects the native queue probed before `queue:any`
    pub worker_type: String,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// How long a shutdown waits for the in-flight job
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f64,
    pub max_context_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            redis: RedisConfig {
                host: "127.0.0.1".to_string(),
                port: 6379,
            },
            embedding: EmbeddingConfig {
                base_url: "http://localhost:8001".to_string(),
                dimension: 1024,
                timeout_secs: 30,
                batch_timeout_secs: 60,
                batch_size: 12,
                health_ttl_secs: 60,
            },
            vector: VectorStoreConfig {
                base_url: "http://localhost:6333".to_string(),
                collection: "documents".to_string(),
                vector_size: 1024,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: "ollama".to_string(),
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.2".to_string(),
                api_key: None,
                temperature: 0.2,
                max_tokens: 500,
                timeout_secs: 60,
            },
            worker: WorkerConfig {
                worker_id: format!("rag-worker-{}", uuid::Uuid::new_v4()),
                worker_type: "rag".to_string(),
                poll_interval_ms: 1000,
                heartbeat_interval_ms: 5000,
                shutdown_grace_secs: 30,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                min_score: 0.0,
                max_context_length: 4000,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(host) = std::env::var("REDIS_HOST") {
            config.redis.host = host;
        }
        if let Ok(port) = std::env::var("REDIS_PORT") {
            if let Ok(p) = port.parse() {
                config.redis.port = p;
            }
        }
        if let Ok(url) = std::env::var("EMBEDDING_API_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(url) = std::env::var("VECTOR_STORE_URL") {
            config.vector.base_url = url;
        }
        if let Ok(name) = std::env::var("VECTOR_COLLECTION") {
            config.vector.collection = name;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(id) = std::env::var("WORKER_ID") {
            config.worker.worker_id = id;
        }
        if let Ok(wt) = std::env::var("WORKER_TYPE") {
            config.worker.worker_type = wt;
        }
        if let Ok(val) = std::env::var("POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                config.worker.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("HEARTBEAT_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                config.worker.heartbeat_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("RAG_TOP_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("RAG_MIN_SCORE") {
            if let Ok(v) = val.parse() {
                config.retrieval.min_score = v;
            }
        }
        if let Ok(val) = std::env::var("RAG_MAX_CONTEXT_LENGTH") {
            if let Ok(v) = val.parse() {
                config.retrieval.max_context_length = v;
            }
        }

        config
    }
}
