//! Answer synthesis: retrieved context + question → grounded answer.
//!
//! The prompt includes the retrieved context verbatim, instructs the model
//! to answer strictly from that context, and to cite sources with the
//! `[Source N]` tags as they appear. Empty context never reaches the model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Canned reply when retrieval produced nothing usable.
pub const NO_RELEVANT_INFO: &str =
    "I couldn't find any relevant information in your documents to answer that question. \
     Try rephrasing, or upload documents that cover this topic.";

/// Per-call knobs; fields default from `LlmConfig` when `None`.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Unique source file names, surfaced to the model so it can refer to
    /// documents by name.
    pub file_names: Vec<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(http: reqwest::Client, config: LlmConfig) -> Self {
        Self { http, config }
    }

    /// Generate an answer grounded in `context`. With empty context the
    /// canned "no relevant information" reply is returned without any
    /// model call.
    pub async fn generate_answer(
        &self,
        question: &str,
        context: &str,
        opts: &GenerateOptions,
    ) -> Result<String> {
        if context.trim().is_empty() {
            return Ok(NO_RELEVANT_INFO.to_string());
        }

        let system = build_system_prompt(&opts.file_names);
        let user = format!("Context:\n\n{context}\n\n---\nQuestion: {question}");
        let temperature = opts.temperature.unwrap_or(self.config.temperature);
        let max_tokens = opts.max_tokens.unwrap_or(self.config.max_tokens);

        match self.config.provider.as_str() {
            "ollama" => self.call_ollama(&system, &user, temperature, max_tokens).await,
            "openai" => self.call_openai(&system, &user, temperature, max_tokens).await,
            other => Err(Error::Internal(format!("unknown LLM provider: {other}"))),
        }
    }

    async fn call_ollama(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.config.base_url);
        let req = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&req)
            .send()
            .await
            .map_err(map_llm_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::LlmUnavailable(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Internal(format!("malformed ollama response: {e}")))?;
        Ok(body.message.content)
    }

    async fn call_openai(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let req = OpenAiChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature,
            max_tokens,
        };

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&req)
            .send()
            .await
            .map_err(map_llm_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::LlmUnavailable(format!(
                "openai returned {status}: {body}"
            )));
        }

        let body: OpenAiChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Internal(format!("malformed openai response: {e}")))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

fn map_llm_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("llm request: {e}"))
    } else {
        Error::LlmUnavailable(e.to_string())
    }
}

fn build_system_prompt(file_names: &[String]) -> String {
    let mut prompt = String::from(
        "You are a document assistant. Answer the question using ONLY the provided context.\n\
         Each context block is labeled [Source N: file name]. Cite sources inline using the\n\
         [Source N] tags exactly as they appear. If the context does not contain the answer,\n\
         say so plainly instead of guessing. Never use outside knowledge.",
    );
    if !file_names.is_empty() {
        prompt.push_str("\nThe context was drawn from these documents: ");
        prompt.push_str(&file_names.join(", "));
        prompt.push('.');
    }
    prompt
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_empty_context_returns_canned_reply_without_model_call() {
        // base_url points nowhere; a model call would error.
        let client = LlmClient::new(reqwest::Client::new(), Config::default().llm);
        let answer = client
            .generate_answer("what is this?", "   ", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(answer, NO_RELEVANT_INFO);
    }

    #[test]
    fn test_system_prompt_mentions_source_tags() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("[Source N]"));
        assert!(prompt.contains("ONLY the provided context"));
    }

    #[test]
    fn test_system_prompt_lists_file_names() {
        let prompt = build_system_prompt(&["a.pdf".to_string(), "b.md".to_string()]);
        assert!(prompt.contains("a.pdf, b.md"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_internal_error() {
        let mut config = Config::default().llm;
        config.provider = "mystery".to_string();
        let client = LlmClient::new(reqwest::Client::new(), config);
        let err = client
            .generate_answer("q", "some context", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INTERNAL");
    }
}
