//! Bounded process-local answer cache.
//!
//! Entries expire 5 minutes after insertion (monotonic clock) and the cache
//! holds at most 200 entries, evicting the oldest by insertion order.
//! Expired entries are removed on access. No cross-process coherence: each
//! API process and worker keeps its own cache.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::{AnswerRecord, SearchMode};

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const CACHE_CAPACITY: usize = 200;

struct Entry {
    record: AnswerRecord,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Insertion order for FIFO eviction.
    order: VecDeque<String>,
}

pub struct AnswerCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
}

impl Default for AnswerCache {
    fn default() -> Self {
        Self::new(CACHE_TTL, CACHE_CAPACITY)
    }
}

impl AnswerCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            capacity,
        }
    }

    /// Cache key for a user-scoped question.
    pub fn user_key(
        question: &str,
        user_id: &str,
        mode: SearchMode,
        top_k: usize,
        min_score: f64,
    ) -> String {
        Self::key(&format!("user:{user_id}"), question, mode, top_k, min_score)
    }

    /// Cache key for a file-scoped question; the file id replaces the user
    /// scope.
    pub fn file_key(
        question: &str,
        file_id: &str,
        mode: SearchMode,
        top_k: usize,
        min_score: f64,
    ) -> String {
        Self::key(&format!("file:{file_id}"), question, mode, top_k, min_score)
    }

    fn key(scope: &str, question: &str, mode: SearchMode, top_k: usize, min_score: f64) -> String {
        format!(
            "{scope}|{}|{top_k}|{min_score}|{}",
            mode.as_str(),
            question.trim().to_lowercase()
        )
    }

    /// Look up a fresh entry. Expired entries are dropped on access. Hits
    /// come back with `metadata.cache_hit = true`.
    pub fn get(&self, key: &str) -> Option<AnswerRecord> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                let mut record = entry.record.clone();
                record.metadata.cache_hit = Some(true);
                Some(record)
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    /// Insert, evicting the oldest entry once past capacity.
    pub fn put(&self, key: String, record: AnswerRecord) {
        let mut inner = self.inner.lock();

        if inner.entries.insert(
            key.clone(),
            Entry {
                record,
                inserted_at: Instant::now(),
            },
        ).is_none()
        {
            inner.order.push_back(key);
        }

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
