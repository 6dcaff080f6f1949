//! In-memory TTL cache for successful service responses.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http_client::HttpMethod;
use crate::ServiceId;

/// Default interval of the background sweep task.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Time-to-live values per kind of upstream data.
pub struct CacheTtl;

impl CacheTtl {
    pub const ACTIVE_LISTINGS: Duration = Duration::from_secs(300);
    pub const PROPERTY_DETAILS: Duration = Duration::from_secs(3_600);
    pub const MARKET_STATISTICS: Duration = Duration::from_secs(1_800);
    pub const DEMOGRAPHICS: Duration = Duration::from_secs(86_400);
    pub const WALK_SCORES: Duration = Duration::from_secs(604_800);
    pub const PUBLIC_RECORDS: Duration = Duration::from_secs(86_400);
}

/// Defines the behavior of the cache for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read a live entry if present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Always fetch, then overwrite the cached entry.
    Refresh,
    /// Always fetch; neither read nor write the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Self::Use | Self::Refresh)
    }
}

/// Deterministic cache key for `(service, method, endpoint, params)`.
///
/// Params are taken from a `BTreeMap`, so their order never affects the key.
pub fn cache_key(
    service: ServiceId,
    method: HttpMethod,
    endpoint: &str,
    params: &BTreeMap<String, String>,
) -> String {
    let mut canonical = format!("{}|{}|{}", service.as_str(), method.as_str(), endpoint);
    for (name, value) in params {
        canonical.push('|');
        canonical.push_str(name);
        canonical.push('=');
        canonical.push_str(value);
    }
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe response cache shared by every service client.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<tokio::sync::RwLock<HashMap<String, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value unless it is missing or expired.
    ///
    /// Expired entries are removed on the way out.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let store = self.inner.read().await;
            match store.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        if store.get(key).is_some_and(|entry| entry.is_expired(now)) {
            store.remove(key);
            debug!(key, "evicted expired cache entry");
        }
        None
    }

    /// Stores `value` for `ttl`. A zero TTL is a no-op.
    pub async fn set(&self, key: String, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let expires_at = Instant::now() + ttl;
        self.inner
            .write()
            .await
            .insert(key, CacheEntry { value, expires_at });
    }

    /// Removes expired entries and returns how many were dropped.
    pub async fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.inner.write().await;
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        before - store.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Number of entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Spawns the periodic sweep; it stops once `shutdown` is cancelled.
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.clear_expired().await;
                        if removed > 0 {
                            debug!(removed, "cache sweep removed expired entries");
                        }
                    }
                }
            }
        })
    }
}
