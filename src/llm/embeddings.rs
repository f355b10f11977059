//! Client for the external embedding service.
//!
//! `POST /embed {text} → {embedding: [f32; 1024]}`,
//! `POST /embed/batch {texts} → {embeddings: [[f32]]}`, `GET /health`.
//! The health probe result is cached for 60 s; while unhealthy, embed calls
//! short-circuit instead of hitting the service. Timed-out requests are
//! retried once after a 1 s delay.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct EmbedBatchRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedBatchResponse {
    embeddings: Vec<Vec<f32>>,
}

struct HealthCache {
    checked_at: Option<Instant>,
    healthy: bool,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    health: Mutex<HealthCache>,
}

impl EmbeddingClient {
    pub fn new(http: reqwest::Client, config: EmbeddingConfig) -> Self {
        Self {
            http,
            config,
            health: Mutex::new(HealthCache {
                checked_at: None,
                healthy: false,
            }),
        }
    }

    /// Probe `/health`, trusting the previous result for `health_ttl_secs`.
    pub async fn healthy(&self) -> bool {
        let ttl = Duration::from_secs(self.config.health_ttl_secs);
        {
            let cache = self.health.lock();
            if let Some(at) = cache.checked_at {
                if at.elapsed() < ttl {
                    return cache.healthy;
                }
            }
        }

        let url = format!("{}/health", self.config.base_url);
        let healthy = match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!("embedding health probe failed: {e}");
                false
            }
        };

        let mut cache = self.health.lock();
        cache.checked_at = Some(Instant::now());
        cache.healthy = healthy;
        healthy
    }

    /// Embed a single text. Returns exactly `dimension` floats or an error.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.healthy().await {
            return Err(Error::EmbeddingUnavailable(
                "embedding service failed health check".to_string(),
            ));
        }

        let url = format!("{}/embed", self.config.base_url);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let resp: EmbedResponse = self
            .post_with_retry(&url, &EmbedRequest { text }, timeout)
            .await?;

        self.check_dimension(&resp.embedding)?;
        Ok(resp.embedding)
    }

    /// Embed many texts, `batch_size` per request, preserving order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if !self.healthy().await {
            return Err(Error::EmbeddingUnavailable(
                "embedding service failed health check".to_string(),
            ));
        }

        let url = format!("{}/embed/batch", self.config.base_url);
        let timeout = Duration::from_secs(self.config.batch_timeout_secs);
        let mut all = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size) {
            let resp: EmbedBatchResponse = self
                .post_with_retry(&url, &EmbedBatchRequest { texts: batch }, timeout)
                .await?;
            if resp.embeddings.len() != batch.len() {
                return Err(Error::Internal(format!(
                    "embedding batch returned {} vectors for {} texts",
                    resp.embeddings.len(),
                    batch.len()
                )));
            }
            for embedding in &resp.embeddings {
                self.check_dimension(embedding)?;
            }
            all.extend(resp.embeddings);
        }

        Ok(all)
    }

    /// POST once; on timeout wait 1 s and retry once.
    async fn post_with_retry<Req, Resp>(
        &self,
        url: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        match self.post_once(url, request, timeout).await {
            Err(Error::Timeout(_)) => {
                tracing::warn!(url, "embedding request timed out, retrying once");
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.post_once(url, request, timeout).await
            }
            other => other,
        }
    }

    async fn post_once<Req, Resp>(&self, url: &str, request: &Req, timeout: Duration) -> Result<Resp>
    where
        Req: Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("embedding request: {e}"))
                } else {
                    Error::EmbeddingUnavailable(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::EmbeddingUnavailable(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::Internal(format!("malformed embedding response: {e}")))
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.config.dimension {
            return Err(Error::Internal(format!(
                "embedding dimension {} does not match expected {}",
                embedding.len(),
                self.config.dimension
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> EmbeddingClient {
        EmbeddingClient::new(
            reqwest::Client::new(),
            EmbeddingConfig {
                base_url: "http://localhost:1".to_string(),
                dimension: 4,
                timeout_secs: 1,
                batch_timeout_secs: 1,
                batch_size: 2,
                health_ttl_secs: 60,
            },
        )
    }

    #[test]
    fn test_dimension_check() {
        let c = client();
        assert!(c.check_dimension(&[0.0; 4]).is_ok());
        let err = c.check_dimension(&[0.0; 3]).unwrap_err();
        assert_eq!(err.code(), "INTERNAL");
    }

    #[tokio::test]
    async fn test_unreachable_service_reports_unhealthy_and_short_circuits() {
        let c = client();
        assert!(!c.healthy().await);

        // The cached health verdict short-circuits embed without touching
        // the network.
        let err = c.embed("hello").await.unwrap_err();
        assert_eq!(err.code(), "UNAVAILABLE_EMBED");
    }

    #[tokio::test]
    async fn test_empty_batch_skips_health_probe() {
        let c = client();
        let out = c.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
