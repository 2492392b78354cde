use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedName {
    name: String,
    sequence: u64,
    expires_at: DateTime<Utc>,
}

/// Short-lived cache of profile display names, keyed by user id.
///
/// Entries expire after a TTL and are dropped explicitly on sign-in, so a
/// renamed profile shows up at the latest on the next login.
#[derive(Debug, Clone)]
pub struct DisplayNameCache {
    cache: Arc<RwLock<HashMap<String, CachedName>>>,
    next_sequence: Arc<AtomicU64>,
    max_size: usize,
    ttl_minutes: i64,
}

impl DisplayNameCache {
    pub fn new(max_size: usize, ttl_minutes: i64) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: Arc::new(AtomicU64::new(0)),
            max_size,
            ttl_minutes,
        }
    }

    pub async fn put(&self, user_id: &str, name: &str) {
        let now = Utc::now();
        let mut cache = self.cache.write().await;

        cache.retain(|_, cached| cached.expires_at > now);

        if cache.len() >= self.max_size && !cache.contains_key(user_id) {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, cached)| cached.sequence)
                .map(|(key, _)| key.clone())
            {
                cache.remove(&oldest);
                debug!(user_id = %oldest, "Evicted oldest display name");
            }
        }

        cache.insert(
            user_id.to_string(),
            CachedName {
                name: name.to_string(),
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                expires_at: now + Duration::minutes(self.ttl_minutes),
            },
        );
    }

    pub async fn get(&self, user_id: &str) -> Option<String> {
        let mut cache = self.cache.write().await;
        let now = Utc::now();

        match cache.get(user_id) {
            Some(cached) if cached.expires_at > now => Some(cached.name.clone()),
            Some(_) => {
                cache.remove(user_id);
                debug!(user_id = %user_id, "Display name expired");
                None
            }
            None => None,
        }
    }

    pub async fn invalidate(&self, user_id: &str) {
        if self.cache.write().await.remove(user_id).is_some() {
            debug!(user_id = %user_id, "Display name invalidated");
        }
    }

    pub async fn size(&self) -> usize {
        self.cache.read().await.len()
    }
}
