//! The retrieval-and-answer orchestrator.
//!
//! One `answer()` call runs: validation → cache probe → no-documents
//! short-circuit → retrieval (hybrid, vector, or bm25) → context assembly
//! → LLM synthesis → cache store. BM25 and vector retrieval run
//! concurrently in hybrid mode; fusion and the diversity penalty happen
//! in-process.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::AnswerCache;
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::llm::embeddings::EmbeddingClient;
use crate::llm::generate::{GenerateOptions, LlmClient};
use crate::models::{
    AnswerMetadata, AnswerRecord, AnswerSource, RetrievalResult, SearchMode,
};
use crate::search::bm25::Bm25Index;
use crate::search::fusion::{apply_diversity_penalty, reciprocal_rank_fusion, RRF_K};
use crate::search::vector::{Filter, VectorClient};

/// Canned answer for users with no uploaded documents.
pub const NO_DOCUMENTS: &str =
    "You haven't uploaded any documents yet. Upload a document and ask again once it \
     has finished processing.";

/// Per-request knobs, seeded from `RetrievalConfig` defaults.
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub top_k: usize,
    pub min_score: f64,
    pub search_mode: SearchMode,
    pub max_context_length: usize,
    /// The user's file names, as reported by the file registry. `Some` with
    /// an empty list means "this user has no documents" and short-circuits
    /// retrieval entirely.
    pub file_context: Option<Vec<String>>,
}

impl AnswerOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            search_mode: SearchMode::Hybrid,
            max_context_length: config.max_context_length,
            file_context: None,
        }
    }
}

pub struct Pipeline {
    bm25: Arc<Bm25Index>,
    vectors: Arc<VectorClient>,
    embedder: Arc<EmbeddingClient>,
    llm: Arc<LlmClient>,
    cache: Arc<AnswerCache>,
}

impl Pipeline {
    pub fn new(
        bm25: Arc<Bm25Index>,
        vectors: Arc<VectorClient>,
        embedder: Arc<EmbeddingClient>,
        llm: Arc<LlmClient>,
        cache: Arc<AnswerCache>,
    ) -> Self {
        Self {
            bm25,
            vectors,
            embedder,
            llm,
            cache,
        }
    }

    /// Answer a question over everything the user has indexed.
    pub async fn answer(
        &self,
        question: &str,
        user_id: &str,
        opts: &AnswerOptions,
    ) -> Result<AnswerRecord> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question is required".to_string()));
        }

        let cache_key = AnswerCache::user_key(
            question,
            user_id,
            opts.search_mode,
            opts.top_k,
            opts.min_score,
        );
        if let Some(hit) = self.cache.get(&cache_key) {
            tracing::debug!(user_id, "answer cache hit");
            return Ok(hit);
        }

        // A user with zero documents gets the canned reply without any
        // retrieval or model calls.
        if let Some(files) = &opts.file_context {
            if files.is_empty() {
                return Ok(empty_record(
                    question,
                    NO_DOCUMENTS,
                    opts.search_mode,
                    Some("no_files".to_string()),
                ));
            }
        }

        let results = match opts.search_mode {
            SearchMode::Hybrid => self.hybrid_search(question, user_id, opts.top_k).await?,
            SearchMode::Vector => {
                self.vector_search(question, Filter::by_user(user_id), opts.top_k, opts.min_score)
                    .await?
            }
            SearchMode::Bm25 => self.bm25_search(question, user_id, opts.top_k).await?,
        };

        let record = self.synthesize(question, results, opts).await?;
        self.cache.put(cache_key, record.clone());
        Ok(record)
    }

    /// Answer a question against a single file. Vector-only retrieval; the
    /// file registry ownership check happens at the HTTP surface.
    pub async fn answer_for_file(
        &self,
        question: &str,
        file_id: &str,
        opts: &AnswerOptions,
    ) -> Result<AnswerRecord> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question is required".to_string()));
        }

        let cache_key = AnswerCache::file_key(
            question,
            file_id,
            SearchMode::Vector,
            opts.top_k,
            opts.min_score,
        );
        if let Some(hit) = self.cache.get(&cache_key) {
            tracing::debug!(file_id, "answer cache hit");
            return Ok(hit);
        }

        let results = self
            .vector_search(question, Filter::by_file(file_id), opts.top_k, opts.min_score)
            .await?;

        let record = self.synthesize(question, results, opts).await?;
        self.cache.put(cache_key, record.clone());
        Ok(record)
    }

    /// Concurrent BM25 + vector retrieval over `2·topK`, fused with RRF.
    /// RRF handles relevance, so no per-result `minScore` filtering here.
    async fn hybrid_search(
        &self,
        question: &str,
        user_id: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let fetch = top_k * 2;

        let bm25 = self.bm25.clone();
        let q = question.to_string();
        let uid = user_id.to_string();
        let bm25_task =
            tokio::task::spawn_blocking(move || bm25.search(&uid, &q, fetch));
        let vector_task = self.vector_search(question, Filter::by_user(user_id), fetch, f64::MIN);

        let (bm25_hits, vector_hits) = tokio::join!(bm25_task, vector_task);
        let bm25_hits =
            bm25_hits.map_err(|e| Error::Internal(format!("bm25 task panicked: {e}")))?;
        let vector_hits = vector_hits?;

        let mut fused = reciprocal_rank_fusion(&bm25_hits, &vector_hits, RRF_K);
        apply_diversity_penalty(&mut fused);
        fused.truncate(top_k);
        Ok(fused)
    }

    async fn vector_search(
        &self,
        question: &str,
        filter: Filter,
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<RetrievalResult>> {
        let embedding = self.embedder.embed(question).await?;
        let mut hits = self.vectors.search(&embedding, limit, &filter).await?;
        hits.retain(|h| h.score >= min_score);
        Ok(hits)
    }

    async fn bm25_search(
        &self,
        question: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let bm25 = self.bm25.clone();
        let q = question.to_string();
        let uid = user_id.to_string();
        tokio::task::spawn_blocking(move || bm25.search(&uid, &q, limit))
            .await
            .map_err(|e| Error::Internal(format!("bm25 task panicked: {e}")))
    }

    /// Steps 5-8: canned empty answer, context assembly, LLM call, record.
    async fn synthesize(
        &self,
        question: &str,
        results: Vec<RetrievalResult>,
        opts: &AnswerOptions,
    ) -> Result<AnswerRecord> {
        if results.is_empty() {
            return Ok(empty_record(
                question,
                crate::llm::generate::NO_RELEVANT_INFO,
                opts.search_mode,
                None,
            ));
        }

        let (context, chunks_used) = assemble_context(&results, opts.max_context_length);
        let file_names = unique_file_names(&results[..chunks_used]);

        let answer = self
            .llm
            .generate_answer(
                question,
                &context,
                &GenerateOptions {
                    temperature: None,
                    max_tokens: None,
                    file_names: file_names.clone(),
                },
            )
            .await?;

        let sources: Vec<AnswerSource> = results
            .iter()
            .map(|r| AnswerSource {
                file_name: r.file_name.clone(),
                score: r.score,
                text: r.text.clone(),
                chunk_index: r.chunk_index,
                file_id: r.file_id.clone(),
                sources: r
                    .sources
                    .clone()
                    .unwrap_or_else(|| vec![r.source.as_str().to_string()]),
                fusion_rank: r.fusion_rank,
            })
            .collect();

        Ok(AnswerRecord {
            answer,
            context: context.clone(),
            sources,
            metadata: AnswerMetadata {
                question: question.to_string(),
                chunks_retrieved: results.len(),
                chunks_used,
                context_length: context.len(),
                unique_files: file_names.len(),
                unique_file_names: file_names,
                search_mode: opts.search_mode.as_str().to_string(),
                timestamp: Utc::now(),
                cache_hit: None,
                reason: None,
            },
        })
    }
}

/// Format the ranked chunks as `[Source i: fileName]` blocks, stopping
/// before the first chunk that would push the context past `max_len`.
/// Returns the trimmed context and how many chunks made it in.
fn assemble_context(results: &[RetrievalResult], max_len: usize) -> (String, usize) {
    let mut context = String::new();
    let mut used = 0;
    for (i, result) in results.iter().enumerate() {
        let block = format!("[Source {}: {}]\n{}\n\n", i + 1, result.file_name, result.text);
        if context.len() + block.len() > max_len {
            break;
        }
        context.push_str(&block);
        used += 1;
    }
    (context.trim_end().to_string(), used)
}

/// Unique file names in first-appearance order.
fn unique_file_names(results: &[RetrievalResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|r| seen.insert(r.file_name.clone()))
        .map(|r| r.file_name.clone())
        .collect()
}

fn empty_record(
    question: &str,
    answer: &str,
    mode: SearchMode,
    reason: Option<String>,
) -> AnswerRecord {
    AnswerRecord {
        answer: answer.to_string(),
        context: String::new(),
        sources: Vec::new(),
        metadata: AnswerMetadata {
            question: question.to_string(),
            chunks_retrieved: 0,
            chunks_used: 0,
            context_length: 0,
            unique_files: 0,
            unique_file_names: Vec::new(),
            search_mode: mode.as_str().to_string(),
            timestamp: Utc::now(),
            cache_hit: None,
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievalSource;

    fn result(file: &str, chunk_index: usize, text: &str) -> RetrievalResult {
        RetrievalResult {
            file_id: format!("{file}-id"),
            file_name: file.to_string(),
            chunk_index,
            text: text.to_string(),
            score: 1.0,
            source: RetrievalSource::Hybrid,
            rrf_score: Some(1.0),
            vector_score: None,
            bm25_score: None,
            fusion_rank: Some(chunk_index + 1),
            sources: Some(vec!["bm25".to_string()]),
        }
    }

    #[test]
    fn test_context_blocks_are_numbered_and_labeled() {
        let results = vec![result("a.pdf", 0, "first"), result("b.md", 1, "second")];
        let (context, used) = assemble_context(&results, 4000);

        assert_eq!(used, 2);
        assert!(context.starts_with("[Source 1: a.pdf]\nfirst"));
        assert!(context.contains("[Source 2: b.md]\nsecond"));
        assert!(!context.ends_with('\n'));
    }

    #[test]
    fn test_context_stops_before_overflow() {
        let results = vec![
            result("a.pdf", 0, &"x".repeat(50)),
            result("b.md", 1, &"y".repeat(500)),
            result("c.txt", 2, "short"),
        ];
        // Only the first block fits; assembly stops at the second even
        // though the third would fit.
        let (context, used) = assemble_context(&results, 100);
        assert_eq!(used, 1);
        assert!(context.contains("a.pdf"));
        assert!(!context.contains("c.txt"));
    }

    #[test]
    fn test_context_empty_results() {
        let (context, used) = assemble_context(&[], 4000);
        assert!(context.is_empty());
        assert_eq!(used, 0);
    }

    #[test]
    fn test_unique_file_names_first_appearance_order() {
        let results = vec![
            result("b.md", 0, "x"),
            result("a.pdf", 1, "y"),
            result("b.md", 2, "z"),
        ];
        assert_eq!(unique_file_names(&results), vec!["b.md", "a.pdf"]);
    }

    #[test]
    fn test_empty_record_shape() {
        let record = empty_record("q", NO_DOCUMENTS, SearchMode::Hybrid, Some("no_files".into()));
        assert!(record.answer.starts_with("You haven't uploaded"));
        assert_eq!(record.metadata.chunks_retrieved, 0);
        assert_eq!(record.metadata.reason.as_deref(), Some("no_files"));
        assert_eq!(record.metadata.search_mode, "hybrid");
    }
}
