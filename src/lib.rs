//! # doc-ask
//!
//! Grounded question answering over a user's indexed documents, built
//! around two pieces of machinery: a Redis-backed priority job queue
//! shared with polyglot workers, and a hybrid retrieval pipeline fusing
//! lexical and dense-vector search.
//!
//! ## Architecture
//!
//! ```text
//!   POST /ask ──► Queue Client ──► queue:rag (Redis, ZADD -priority)
//!       │              │
//!       │ (redis down) │ claim / heartbeat / complete
//!       ▼              ▼
//!   sync fallback   Worker ──► Pipeline Orchestrator
//!                                    │
//!                       ┌────────────┴────────────┐
//!                       ▼                         ▼
//!                 BM25 Index                Embedding ──► Vector Store
//!                 (per user,                 Client        (filtered kNN)
//!                  in-memory)                  │
//!                       │                      │
//!                       └──────────┬───────────┘
//!                                  ▼
//!                        RRF Fusion (K = 60)
//!                        + diversity penalty
//!                                  │
//!                                  ▼
//!                        Context assembly ──► LLM ──► AnswerRecord
//!                                                        │
//!                                              bounded TTL cache
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for Redis, the external
//!   services, and worker timing
//! - [`models`] - Shared data types: `Job`, `Chunk`, `RetrievalResult`,
//!   `AnswerRecord`, request/response types and wire adapters
//! - [`error`] - Error taxonomy and HTTP envelope translation
//! - [`queue`] - Redis-backed priority job queue with availability tracking
//! - [`search`] - BM25 index, vector-store client, tokenizer, RRF fusion
//! - [`llm`] - Embedding client (health cache, retry, batching) and answer
//!   generation
//! - [`cache`] - Bounded process-local answer cache (200 entries, 5 min TTL)
//! - [`pipeline`] - The orchestrator combining retrieval, fusion, context
//!   assembly, and synthesis
//! - [`files`] - File-registry port (ownership checks, file enumeration)
//! - [`worker`] - Claim loop, heartbeat timer, graceful shutdown
//! - [`api`] - Axum handlers for ask/status/stats
//! - [`state`] - Shared application state owning every component

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod files;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod state;
pub mod worker;
