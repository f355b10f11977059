use std::sync::Arc;

use crate::cache::AnswerCache;
use crate::config::Config;
use crate::files::{FileRegistry, InMemoryFileRegistry};
use crate::llm::embeddings::EmbeddingClient;
use crate::llm::generate::LlmClient;
use crate::pipeline::Pipeline;
use crate::queue::JobQueue;
use crate::search::bm25::Bm25Index;
use crate::search::vector::VectorClient;

/// Shared application state. Every process-global (queue availability,
/// answer cache, health flags) lives behind one of these components; there
/// is no module-level mutable state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub queue: Arc<JobQueue>,
    pub pipeline: Arc<Pipeline>,
    pub bm25: Arc<Bm25Index>,
    pub vectors: Arc<VectorClient>,
    pub embedder: Arc<EmbeddingClient>,
    pub files: Arc<dyn FileRegistry>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let files: Arc<dyn FileRegistry> = Arc::new(InMemoryFileRegistry::new());
        Self::with_registry(config, http_client, files)
    }

    /// Build the state around an externally provided file registry.
    pub fn with_registry(
        config: Config,
        http_client: reqwest::Client,
        files: Arc<dyn FileRegistry>,
    ) -> anyhow::Result<Self> {
        let queue = Arc::new(JobQueue::new(&config.redis));
        let bm25 = Arc::new(Bm25Index::new());
        let vectors = Arc::new(VectorClient::new(
            http_client.clone(),
            config.vector.clone(),
        ));
        let embedder = Arc::new(EmbeddingClient::new(
            http_client.clone(),
            config.embedding.clone(),
        ));
        let llm = Arc::new(LlmClient::new(http_client.clone(), config.llm.clone()));
        let cache = Arc::new(AnswerCache::default());

        let pipeline = Arc::new(Pipeline::new(
            bm25.clone(),
            vectors.clone(),
            embedder.clone(),
            llm,
            cache,
        ));

        Ok(Self {
            config,
            queue,
            pipeline,
            bm25,
            vectors,
            embedder,
            files,
            http_client,
        })
    }
}
