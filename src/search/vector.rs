//! Client for the external vector store (Qdrant-style REST API).
//!
//! The store is populated by the ingestion pipeline; this client only
//! searches and counts. Filters are applied server-side, but results are
//! re-checked here: a point that violates the requested filter is dropped,
//! never returned.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};
use crate::models::{RetrievalResult, RetrievalSource};

/// A server-side payload filter: every condition must match.
#[derive(Debug, Clone, Serialize)]
pub struct Filter {
    pub must: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub key: String,
    pub r#match: MatchValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchValue {
    pub value: String,
}

impl Filter {
    pub fn by_user(user_id: &str) -> Self {
        Self::matching("userId", user_id)
    }

    pub fn by_file(file_id: &str) -> Self {
        Self::matching("fileId", file_id)
    }

    fn matching(key: &str, value: &str) -> Self {
        Filter {
            must: vec![Condition {
                key: key.to_string(),
                r#match: MatchValue {
                    value: value.to_string(),
                },
            }],
        }
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    filter: &'a Filter,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f64,
    payload: PointPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointPayload {
    file_id: String,
    file_name: String,
    user_id: String,
    chunk_index: usize,
    text: String,
}

#[derive(Serialize)]
struct CountRequest {
    exact: bool,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: u64,
}

pub struct VectorClient {
    http: reqwest::Client,
    config: VectorStoreConfig,
}

impl VectorClient {
    pub fn new(http: reqwest::Client, config: VectorStoreConfig) -> Self {
        Self { http, config }
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection
    }

    pub fn vector_size(&self) -> usize {
        self.config.vector_size
    }

    /// k-NN search ordered by descending cosine similarity, constrained by
    /// `filter`. Points that do not satisfy the filter are discarded even
    /// if the server returns them.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: &Filter,
    ) -> Result<Vec<RetrievalResult>> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.config.base_url, self.config.collection
        );
        let request = SearchRequest {
            vector: query_vector,
            limit,
            filter,
            with_payload: true,
        };

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("vector search: {e}"))
                } else {
                    Error::VectorUnavailable(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::VectorUnavailable(format!(
                "vector store returned {status}: {body}"
            )));
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Internal(format!("malformed vector search response: {e}")))?;

        let results = body
            .result
            .into_iter()
            .filter(|point| point_matches(&point.payload, filter))
            .map(|point| RetrievalResult {
                file_id: point.payload.file_id,
                file_name: point.payload.file_name,
                chunk_index: point.payload.chunk_index,
                text: point.payload.text,
                score: point.score,
                source: RetrievalSource::Vector,
                rrf_score: None,
                vector_score: Some(point.score),
                bm25_score: None,
                fusion_rank: None,
                sources: None,
            })
            .collect();

        Ok(results)
    }

    /// Exact point count for the collection, used by `/stats`.
    pub async fn count(&self) -> Result<u64> {
        let url = format!(
            "{}/collections/{}/points/count",
            self.config.base_url, self.config.collection
        );

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&CountRequest { exact: true })
            .send()
            .await
            .map_err(|e| Error::VectorUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::VectorUnavailable(format!(
                "vector store returned {status}"
            )));
        }

        let body: CountResponse = resp
            .json()
            .await
            .map_err(|e| Error::Internal(format!("malformed count response: {e}")))?;
        Ok(body.result.count)
    }
}

/// The core never trusts results that violate the requested filter.
fn point_matches(payload: &PointPayload, filter: &Filter) -> bool {
    filter.must.iter().all(|cond| match cond.key.as_str() {
        "userId" => payload.user_id == cond.r#match.value,
        "fileId" => payload.file_id == cond.r#match.value,
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(user_id: &str, file_id: &str) -> PointPayload {
        PointPayload {
            file_id: file_id.to_string(),
            file_name: "doc.pdf".to_string(),
            user_id: user_id.to_string(),
            chunk_index: 0,
            text: "body".to_string(),
        }
    }

    #[test]
    fn test_filter_serialization_shape() {
        let filter = Filter::by_user("u1");
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["must"][0]["key"], "userId");
        assert_eq!(value["must"][0]["match"]["value"], "u1");
    }

    #[test]
    fn test_point_match_enforces_user_filter() {
        let filter = Filter::by_user("u1");
        assert!(point_matches(&payload("u1", "f1"), &filter));
        assert!(!point_matches(&payload("u2", "f1"), &filter));
    }

    #[test]
    fn test_point_match_enforces_file_filter() {
        let filter = Filter::by_file("f9");
        assert!(point_matches(&payload("u1", "f9"), &filter));
        assert!(!point_matches(&payload("u1", "f1"), &filter));
    }

    #[test]
    fn test_unknown_filter_key_is_permissive() {
        let filter = Filter::matching("language", "en");
        assert!(point_matches(&payload("u1", "f1"), &filter));
    }
}
