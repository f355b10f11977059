//! Per-user in-memory Okapi BM25 index over the chunk corpus.
//!
//! The ingestion pipeline owns the persistent corpus; this index holds a
//! process-local snapshot per user and serves lexical retrieval. Rebuilds
//! replace a user's corpus wholesale under the writer lock while reads keep
//! being served from the previous snapshot.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::{Chunk, RetrievalResult, RetrievalSource};
use crate::search::tokenize::tokenize;

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// One indexed chunk plus the metadata echoed back in results.
struct DocEntry {
    file_id: String,
    file_name: String,
    chunk_index: usize,
    text: String,
    /// Token count after normalization
    len: usize,
}

/// A single user's searchable corpus.
#[derive(Default)]
struct UserCorpus {
    docs: Vec<DocEntry>,
    /// term → [(doc index, term frequency)]
    postings: HashMap<String, Vec<(usize, u32)>>,
    total_len: usize,
}

impl UserCorpus {
    fn build(chunks: &[Chunk]) -> Self {
        let mut corpus = UserCorpus::default();
        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            let doc_id = corpus.docs.len();

            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }
            for (term, count) in tf {
                corpus
                    .postings
                    .entry(term.to_string())
                    .or_default()
                    .push((doc_id, count));
            }

            corpus.total_len += tokens.len();
            corpus.docs.push(DocEntry {
                file_id: chunk.file_id.clone(),
                file_name: chunk.file_name.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                len: tokens.len(),
            });
        }
        corpus
    }

    fn avgdl(&self) -> f64 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_len as f64 / self.docs.len() as f64
        }
    }

    fn search(&self, query: &str, limit: usize) -> Vec<RetrievalResult> {
        if self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let avgdl = self.avgdl();
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for term in tokenize(query) {
            let Some(postings) = self.postings.get(&term) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for &(doc_id, tf) in postings {
                let tf = tf as f64;
                let dl = self.docs[doc_id].len as f64;
                let norm = tf + K1 * (1.0 - B + B * dl / avgdl);
                *scores.entry(doc_id).or_insert(0.0) += idf * (tf * (K1 + 1.0)) / norm;
            }
        }

        let mut scored: Vec<(usize, f64)> = scores.into_iter().collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(doc_id, score)| {
                let doc = &self.docs[doc_id];
                RetrievalResult {
                    file_id: doc.file_id.clone(),
                    file_name: doc.file_name.clone(),
                    chunk_index: doc.chunk_index,
                    text: doc.text.clone(),
                    score,
                    source: RetrievalSource::Bm25,
                    rrf_score: None,
                    vector_score: None,
                    bm25_score: Some(score),
                    fusion_rank: None,
                    sources: None,
                }
            })
            .collect()
    }
}

/// Thread-safe BM25 index keyed by user.
pub struct Bm25Index {
    corpora: RwLock<HashMap<String, UserCorpus>>,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    pub fn new() -> Self {
        Self {
            corpora: RwLock::new(HashMap::new()),
        }
    }

    /// Replace a user's corpus with a fresh chunk snapshot.
    ///
    /// The new corpus is built outside the lock; the writer lock is held
    /// only for the map swap.
    pub fn replace_user_corpus(&self, user_id: &str, chunks: &[Chunk]) {
        let corpus = UserCorpus::build(chunks);
        let doc_count = corpus.docs.len();
        self.corpora.write().insert(user_id.to_string(), corpus);
        tracing::debug!(user_id, doc_count, "bm25 corpus replaced");
    }

    pub fn remove_user(&self, user_id: &str) {
        self.corpora.write().remove(user_id);
    }

    /// Top-`limit` chunks for `query` within one user's corpus, ordered by
    /// descending BM25 score. Unknown users and empty corpora return an
    /// empty list without error.
    pub fn search(&self, user_id: &str, query: &str, limit: usize) -> Vec<RetrievalResult> {
        match self.corpora.read().get(user_id) {
            Some(corpus) => corpus.search(query, limit),
            None => Vec::new(),
        }
    }

    pub fn document_count(&self, user_id: &str) -> usize {
        self.corpora
            .read()
            .get(user_id)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(user: &str, file: &str, idx: usize, text: &str) -> Chunk {
        Chunk {
            file_id: format!("{file}-id"),
            file_name: file.to_string(),
            user_id: user.to_string(),
            chunk_index: idx,
            text: text.to_string(),
            embedding: None,
        }
    }

    #[test]
    fn test_empty_corpus_returns_empty() {
        let index = Bm25Index::new();
        assert!(index.search("u1", "anything", 10).is_empty());

        index.replace_user_corpus("u1", &[]);
        assert!(index.search("u1", "anything", 10).is_empty());
    }

    #[test]
    fn test_matching_doc_ranks_first() {
        let index = Bm25Index::new();
        index.replace_user_corpus(
            "u1",
            &[
                chunk("u1", "notes.txt", 0, "shipping address and delivery window"),
                chunk("u1", "invoice.pdf", 0, "invoice total amount due net thirty"),
                chunk("u1", "recipe.md", 0, "flour butter sugar baking instructions"),
            ],
        );

        let results = index.search("u1", "invoice amount", 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].file_name, "invoice.pdf");
        assert_eq!(results[0].source, RetrievalSource::Bm25);
        assert!(results[0].score > 0.0);
        assert_eq!(results[0].bm25_score, Some(results[0].score));
    }

    #[test]
    fn test_scores_descend_and_limit_applies() {
        let index = Bm25Index::new();
        index.replace_user_corpus(
            "u1",
            &[
                chunk("u1", "a.txt", 0, "alpha alpha alpha beta"),
                chunk("u1", "b.txt", 0, "alpha beta gamma delta"),
                chunk("u1", "c.txt", 0, "alpha beta"),
                chunk("u1", "d.txt", 0, "unrelated content entirely"),
            ],
        );

        let results = index.search("u1", "alpha", 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_bm25_formula_single_doc_single_term() {
        // One doc, one query term appearing once in a 2-token doc:
        // idf = ln((1 - 1 + 0.5)/(1 + 0.5) + 1) = ln(4/3)
        // tf component = (1 * 2.5) / (1 + 1.5 * (1 - 0.75 + 0.75 * 2/2)) = 1
        let index = Bm25Index::new();
        index.replace_user_corpus("u1", &[chunk("u1", "a.txt", 0, "quantum widget")]);

        let results = index.search("u1", "quantum", 1);
        assert_eq!(results.len(), 1);
        let expected = (4.0f64 / 3.0).ln();
        assert!((results[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_users_are_isolated() {
        let index = Bm25Index::new();
        index.replace_user_corpus("u1", &[chunk("u1", "a.txt", 0, "secret ledger")]);
        index.replace_user_corpus("u2", &[chunk("u2", "b.txt", 0, "public memo")]);

        let results = index.search("u2", "secret ledger", 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_rebuild_replaces_snapshot() {
        let index = Bm25Index::new();
        index.replace_user_corpus("u1", &[chunk("u1", "old.txt", 0, "obsolete text")]);
        index.replace_user_corpus("u1", &[chunk("u1", "new.txt", 0, "fresh content")]);

        assert!(index.search("u1", "obsolete", 10).is_empty());
        assert_eq!(index.search("u1", "fresh", 10).len(), 1);
        assert_eq!(index.document_count("u1"), 1);
    }
}
