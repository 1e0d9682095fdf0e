//! Bounded TTL store for rendered page bodies.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::infra::telemetry::{PAGE_CACHE_EVICT, PAGE_CACHE_HIT, PAGE_CACHE_MISS, PAGE_CACHE_STORE};

use super::config::CacheConfig;

#[derive(Clone)]
struct CachedPage {
    body: String,
    stored_at: Instant,
}

/// Rendered pages keyed by route, each valid for a fixed window after it
/// was stored.
///
/// Expiry uses the monotonic tokio clock so tests can drive it with a
/// paused runtime.
pub struct PageCache {
    entries: Mutex<LruCache<String, CachedPage>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity)),
            ttl: config.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the stored body when it is still inside its window. Expired
    /// entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock_entries("get");
        let fresh = match entries.get(key) {
            Some(page) if page.stored_at.elapsed() < self.ttl => Some(page.body.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        match fresh {
            Some(body) => {
                counter!(PAGE_CACHE_HIT).increment(1);
                debug!(cache = "page", outcome = "hit", key, "serving cached page");
                Some(body)
            }
            None => {
                counter!(PAGE_CACHE_MISS).increment(1);
                debug!(cache = "page", outcome = "miss", key, "page not cached");
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, body: String) {
        let page = CachedPage {
            body,
            stored_at: Instant::now(),
        };
        let evicted = {
            let mut entries = self.lock_entries("insert");
            entries.push(key.into(), page)
        };
        counter!(PAGE_CACHE_STORE).increment(1);
        // `push` also hands back the old value when the key was already present
        if let Some((evicted_key, _)) = evicted {
            debug!(cache = "page", key = %evicted_key, "page cache entry replaced or evicted");
            counter!(PAGE_CACHE_EVICT).increment(1);
        }
    }

    /// Serve `key` from the cache or render, store and return it. Failed
    /// renders are not stored. The lock is not held while rendering, so
    /// concurrent misses may both render; the later insert wins.
    pub async fn get_or_render<F, Fut, E>(&self, key: &str, render: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(body) = self.get(key) {
            return Ok(body);
        }

        let body = render().await?;
        self.insert(key, body.clone());
        Ok(body)
    }

    pub fn clear(&self) {
        self.lock_entries("clear").clear();
        debug!(cache = "page", "page cache cleared");
    }

    pub fn len(&self) -> usize {
        self.lock_entries("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poisoning is recovered; a panicked holder leaves at worst a stale page.
    fn lock_entries(&self, op: &'static str) -> MutexGuard<'_, LruCache<String, CachedPage>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!(
                cache = "page",
                op,
                result = "poisoned_recovered",
                "recovered from poisoned page cache lock"
            );
            poisoned.into_inner()
        })
    }
}
