//! Response cache
//!
//! Short-lived memoization of extraction results, keyed by a hash of the
//! full turn input. Pure TTL: every insert schedules its own removal, so an
//! entry disappears after `ttl` whether or not it is ever read again.

use crate::conversation::{ConversationTurn, Role};
use crate::spending::SpendingRecord;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

/// Shared TTL map. Cloning shares the underlying storage.
pub struct ResponseCache<V> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
    next_generation: Arc<AtomicU64>,
    default_ttl: Duration,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_generation: Arc::clone(&self.next_generation),
            default_ttl: self.default_ttl,
        }
    }
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch a live entry
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Store with the cache's default TTL
    pub async fn insert(&self, key: String, value: V) {
        self.set(key, value, self.default_ttl).await;
    }

    /// Store and schedule removal after `ttl`.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn set(&self, key: String, value: V, ttl: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + ttl;

        {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.clone(),
                CacheEntry {
                    value,
                    expires_at,
                    generation,
                },
            );
        }

        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut entries = entries.write().await;
            // A later insert under the same key owns its own expiry
            if entries.get(&key).map(|e| e.generation) == Some(generation) {
                entries.remove(&key);
                debug!(key = %key, "Cache entry expired");
            }
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[derive(Serialize)]
struct CacheKeyInput<'a> {
    message: &'a str,
    history: Vec<TurnContent<'a>>,
    accumulated: &'a SpendingRecord,
}

/// The parts of a turn that affect extraction. Timestamps are left out:
/// clients that omit them get one filled in on every request.
#[derive(Serialize)]
struct TurnContent<'a> {
    role: Role,
    content: &'a str,
    spending_data: Option<&'a SpendingRecord>,
    follow_up_question: Option<&'a str>,
}

impl<'a> From<&'a ConversationTurn> for TurnContent<'a> {
    fn from(turn: &'a ConversationTurn) -> Self {
        Self {
            role: turn.role,
            content: &turn.content,
            spending_data: turn.spending_data.as_ref(),
            follow_up_question: turn.follow_up_question.as_deref(),
        }
    }
}

/// Content address of a turn input: SHA-256 over its JSON form.
/// Streams the serialization into the hasher (no intermediate String).
pub fn cache_key(
    message: &str,
    history: &[ConversationTurn],
    accumulated: &SpendingRecord,
) -> String {
    let mut hasher = Sha256::new();
    let input = CacheKeyInput {
        message,
        history: history.iter().map(TurnContent::from).collect(),
        accumulated,
    };

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &input).is_err() {
        // Fall back to hashing the message alone rather than sharing one key
        hasher = Sha256::new();
        hasher.update(message.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spending::SpendingCategory;

    const TTL: Duration = Duration::from_secs(5 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache: ResponseCache<String> = ResponseCache::new(TTL);
        cache.insert("k".to_string(), "v".to_string()).await;

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_entries_are_still_removed() {
        let cache: ResponseCache<u32> = ResponseCache::new(TTL);
        for i in 0..10 {
            cache.insert(format!("key-{}", i), i).await;
        }
        assert_eq!(cache.len().await, 10);

        tokio::time::sleep(TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_is_not_evicted_by_stale_timer() {
        let cache: ResponseCache<u32> = ResponseCache::new(TTL);
        cache.insert("k".to_string(), 1).await;

        tokio::time::sleep(Duration::from_secs(180)).await;
        cache.insert("k".to_string(), 2).await;

        // First timer fires at 300s; second entry lives until 480s
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(cache.get("k").await, Some(2));

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_ttl() {
        let cache: ResponseCache<u32> = ResponseCache::new(TTL);
        cache.set("short".to_string(), 7, Duration::from_secs(1)).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get("short").await, None);
    }

    #[test]
    fn test_cache_key_is_content_addressed() {
        let history = vec![ConversationTurn::user("I pay rent")];
        let accumulated = SpendingRecord::new().with(SpendingCategory::Rent, 20000.0);

        let a = cache_key("20k", &history, &accumulated);
        let b = cache_key("20k", &history, &accumulated);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, cache_key("25k", &history, &accumulated));
        assert_ne!(a, cache_key("20k", &[], &accumulated));
        assert_ne!(a, cache_key("20k", &history, &SpendingRecord::new()));
    }

    #[test]
    fn test_cache_key_ignores_turn_timestamps() {
        let earlier = ConversationTurn::user("I pay rent");
        let mut later = earlier.clone();
        later.timestamp = earlier.timestamp + chrono::Duration::minutes(3);

        let accumulated = SpendingRecord::new();
        assert_eq!(
            cache_key("20k", &[earlier], &accumulated),
            cache_key("20k", &[later], &accumulated)
        );
    }
}
