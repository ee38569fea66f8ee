//! In-process response cache bounded by capacity and time-to-live.
//!
//! Entries are keyed by a SHA-256 digest of everything that determines a
//! completion. The backing map stays behind a mutex; callers only see clones.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::client::{ChatRequest, ChatResponse};

/// Digest of model, sampling parameters and prompt text.
pub fn cache_key(request: &ChatRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.model.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.temperature.to_bits().to_le_bytes());
    match request.seed {
        Some(seed) => {
            hasher.update([1u8]);
            hasher.update(seed.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(request.max_tokens.to_le_bytes());
    hasher.update([u8::from(request.json_mode)]);
    for message in &request.messages {
        hasher.update(format!("{:?}", message.role).as_bytes());
        hasher.update([0u8]);
        hasher.update(message.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    tick: u64,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Mutex-guarded LRU with per-entry TTL.
#[derive(Debug)]
pub struct ResponseCache<V = ChatResponse> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        let ttl = self.ttl;
        inner.tick += 1;
        let tick = inner.tick;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < ttl => {
                entry.last_used = tick;
                let value = entry.value.clone();
                inner.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        inner.misses += 1;
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut inner = self.lock();
        self.insert_locked(&mut inner, key.into(), value);
    }

    /// Return the cached value or compute, store and return a new one, all
    /// under a single lock acquisition.
    pub fn get_or_insert_with<F>(&self, key: &str, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        inner.tick += 1;
        let tick = inner.tick;
        if let Some(entry) = inner.entries.get_mut(key) {
            if now.duration_since(entry.inserted_at) < self.ttl {
                entry.last_used = tick;
                let value = entry.value.clone();
                inner.hits += 1;
                return value;
            }
        }
        inner.misses += 1;
        let value = f();
        self.insert_locked(inner, key.to_string(), value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_locked(&self, inner: &mut Inner<V>, key: String, value: V) {
        let now = Instant::now();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let ttl = self.ttl;
            inner
                .entries
                .retain(|_, e| now.duration_since(e.inserted_at) < ttl);
            if inner.entries.len() >= self.capacity {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    inner.entries.remove(&oldest);
                }
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: tick,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    fn request(prompt: &str, temperature: f64) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            seed: Some(42),
            max_tokens: 1_000,
            json_mode: true,
        }
    }

    #[test]
    fn test_key_depends_on_sampling_parameters() {
        let a = cache_key(&request("hello", 0.0));
        assert_eq!(a, cache_key(&request("hello", 0.0)));
        assert_ne!(a, cache_key(&request("hello", 0.1)));
        assert_ne!(a, cache_key(&request("hello!", 0.0)));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache: ResponseCache<u32> = ResponseCache::new(4, Duration::from_secs(10));
        cache.insert("k", 1);
        assert_eq!(cache.get("k"), Some(1));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction() {
        let cache: ResponseCache<u32> = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_before_eviction() {
        let cache: ResponseCache<u32> = ResponseCache::new(2, Duration::from_secs(10));
        cache.insert("stale", 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("fresh", 2);
        tokio::time::advance(Duration::from_secs(3)).await;
        // "stale" is now the most recently used entry
        assert_eq!(cache.get("stale"), Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert("new", 3);
        assert_eq!(cache.get("fresh"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache: ResponseCache<String> = ResponseCache::new(8, Duration::from_secs(60));
        let mut calls = 0;
        let first = cache.get_or_insert_with("k", || {
            calls += 1;
            "v".to_string()
        });
        let second = cache.get_or_insert_with("k", || {
            calls += 1;
            "other".to_string()
        });
        assert_eq!(first, "v");
        assert_eq!(second, "v");
        assert_eq!(calls, 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
