//! # Response cache
//!
//! Read endpoints are memoized under normalized keys; writes invalidate
//! conservatively (the touched detail entry plus every list/nearby
//! entry). The cache is a performance layer only: every backend error
//! is logged and degrades to a miss, never to a failed request.
//!
//! Two backends share one interface. Deployments with a `REDIS_URL` get
//! the shared Redis store; without one the service falls back to an
//! in-process TTL map, which is also what the test suite runs against.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Namespace prepended to every key, so pattern invalidation never
/// touches foreign data in a shared Redis database.
pub const KEY_NAMESPACE: &str = "mpl";

pub const PRODUCERS_LIST: &str = "producers_list";
pub const PRODUCERS_NEARBY: &str = "producers_nearby";
pub const PRODUCER_DETAIL: &str = "producer_detail";
pub const CATEGORIES_LIST: &str = "categories_list";

const MAX_PARAM_CHARS: usize = 100;

/// Builds `mpl:<prefix>:<k=v:...>` with parameters sorted by name so
/// equivalent requests share an entry. Oversized values are collapsed
/// to a content hash to bound key length.
pub fn cache_key(prefix: &str, params: &[(&str, String)]) -> String {
    let mut pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    pairs.sort_by_key(|(k, _)| *k);

    let joined = pairs
        .iter()
        .map(|(k, v)| {
            if v.len() > MAX_PARAM_CHARS {
                format!("{k}={}", blake3::hash(v.as_bytes()).to_hex())
            } else {
                format!("{k}={v}")
            }
        })
        .collect::<Vec<_>>()
        .join(":");

    if joined.is_empty() {
        format!("{KEY_NAMESPACE}:{prefix}")
    } else {
        format!("{KEY_NAMESPACE}:{prefix}:{joined}")
    }
}

/// ~1 km granularity for nearby keys: nearby repeats from the same town
/// hit the same entry.
pub fn round_coord(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

struct MemoryEntry {
    body: String,
    expires_at: Instant,
}

enum Backend {
    Redis(ConnectionManager),
    Memory(Mutex<HashMap<String, MemoryEntry>>),
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_keys: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory: Option<String>,
}

pub struct CacheService {
    backend: Backend,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheService {
    /// Connects to Redis when a URL is configured, otherwise (or when
    /// the connection fails) runs on the in-process map.
    pub async fn new(redis_url: Option<&str>) -> Self {
        let backend = match redis_url {
            Some(url) => match Self::connect_redis(url).await {
                Ok(conn) => {
                    info!("Cache backed by Redis at {url}");
                    Backend::Redis(conn)
                }
                Err(e) => {
                    warn!("Redis unavailable ({e}), using in-process cache");
                    Backend::Memory(Mutex::new(HashMap::new()))
                }
            },
            None => {
                info!("REDIS_URL not set, using in-process cache");
                Backend::Memory(Mutex::new(HashMap::new()))
            }
        };

        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn connect_redis(url: &str) -> redis::RedisResult<ConnectionManager> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        Client::open(url)?
            .get_connection_manager_with_config(config)
            .await
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let found = match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Cache read failed for {key}: {e}");
                        None
                    }
                }
            }
            Backend::Memory(map) => {
                let mut map = map.lock().expect("cache map poisoned");
                let now = Instant::now();
                map.retain(|_, entry| entry.expires_at > now);
                map.get(key).map(|entry| entry.body.clone())
            }
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache HIT for {key}");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache MISS for {key}");
        }
        found
    }

    pub async fn put(&self, key: &str, value: &str, ttl_secs: u64) {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
                    warn!("Cache write failed for {key}: {e}");
                }
            }
            Backend::Memory(map) => {
                let mut map = map.lock().expect("cache map poisoned");
                map.insert(
                    key.to_string(),
                    MemoryEntry {
                        body: value.to_string(),
                        expires_at: Instant::now() + Duration::from_secs(ttl_secs),
                    },
                );
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(e) = conn.del::<_, ()>(key).await {
                    warn!("Cache delete failed for {key}: {e}");
                }
            }
            Backend::Memory(map) => {
                map.lock().expect("cache map poisoned").remove(key);
            }
        }
    }

    /// Removes every key under `mpl:<prefix>`. Redis is swept with
    /// SCAN+DEL rather than KEYS to avoid blocking the server.
    pub async fn delete_prefix(&self, prefix: &str) {
        let pattern = format!("{KEY_NAMESPACE}:{prefix}*");
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(e) = scan_delete(&mut conn, &pattern).await {
                    warn!("Cache invalidation failed for {pattern}: {e}");
                }
            }
            Backend::Memory(map) => {
                let needle = format!("{KEY_NAMESPACE}:{prefix}");
                map.lock()
                    .expect("cache map poisoned")
                    .retain(|key, _| !key.starts_with(&needle));
            }
        }
    }

    pub async fn clear(&self) {
        self.delete_prefix("").await;
        info!("Cleared all cache");
    }

    /// Write-path invalidation for the producer aggregate: the detail
    /// entry when an id is known, and every list/nearby entry always.
    pub async fn invalidate_producers(&self, producer_id: Option<i64>) {
        if let Some(id) = producer_id {
            let key = cache_key(PRODUCER_DETAIL, &[("id", id.to_string())]);
            self.delete(&key).await;
            info!("Invalidated cache for producer {id}");
        }
        self.delete_prefix(PRODUCERS_LIST).await;
        self.delete_prefix(PRODUCERS_NEARBY).await;
    }

    /// Set/get round-trip used by the readiness probe.
    pub async fn health_roundtrip(&self) -> bool {
        let key = format!("{KEY_NAMESPACE}:health_check");
        self.put(&key, "ok", 10).await;
        self.get(&key).await.as_deref() == Some("ok")
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            (hits as f64 / (hits + misses) as f64 * 100.0 * 100.0).round() / 100.0
        };

        let (backend, total_keys, used_memory) = match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let total: u64 = redis::cmd("DBSIZE")
                    .query_async(&mut conn)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Cache stats failed: {e}");
                        0
                    });
                let info: String = redis::cmd("INFO")
                    .arg("memory")
                    .query_async(&mut conn)
                    .await
                    .unwrap_or_default();
                let used = info
                    .lines()
                    .find_map(|line| line.strip_prefix("used_memory_human:"))
                    .map(|v| v.trim().to_string());
                ("redis", total, used)
            }
            Backend::Memory(map) => {
                let len = map.lock().expect("cache map poisoned").len() as u64;
                ("memory", len, None)
            }
        };

        CacheStats {
            backend,
            hits,
            misses,
            hit_rate,
            total_keys,
            used_memory,
        }
    }
}

async fn scan_delete(conn: &mut ConnectionManager, pattern: &str) -> redis::RedisResult<()> {
    let mut cursor: u64 = 0;
    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(&mut *conn)
            .await?;

        if !keys.is_empty() {
            let _: u64 = conn.del(keys).await?;
        }
        if next == 0 {
            return Ok(());
        }
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sorts_params() {
        let a = cache_key(
            "producers_list",
            &[("search", "miel".into()), ("page", "1".into())],
        );
        let b = cache_key(
            "producers_list",
            &[("page", "1".into()), ("search", "miel".into())],
        );
        assert_eq!(a, b);
        assert_eq!(a, "mpl:producers_list:page=1:search=miel");
    }

    #[test]
    fn test_key_without_params() {
        assert_eq!(cache_key("categories_list", &[]), "mpl:categories_list");
    }

    #[test]
    fn test_key_hashes_long_values() {
        let long = "x".repeat(250);
        let key = cache_key("producers_list", &[("search", long.clone())]);
        assert!(key.len() < 150);
        assert!(!key.contains(&long));
        // Deterministic for identical input.
        assert_eq!(key, cache_key("producers_list", &[("search", long)]));
    }

    #[test]
    fn test_round_coord() {
        assert_eq!(round_coord(48.8566), 48.86);
        assert_eq!(round_coord(-1.23449), -1.23);
        assert_eq!(round_coord(2.0), 2.0);
    }

    #[tokio::test]
    async fn test_memory_put_get_delete() {
        let cache = CacheService::new(None).await;
        assert_eq!(cache.get("mpl:k").await, None);

        cache.put("mpl:k", "v", 60).await;
        assert_eq!(cache.get("mpl:k").await.as_deref(), Some("v"));

        cache.delete("mpl:k").await;
        assert_eq!(cache.get("mpl:k").await, None);
    }

    #[tokio::test]
    async fn test_memory_expiry() {
        let cache = CacheService::new(None).await;
        cache.put("mpl:gone", "v", 0).await;
        assert_eq!(cache.get("mpl:gone").await, None);
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let cache = CacheService::new(None).await;
        cache.put("mpl:producers_list:page=1", "a", 60).await;
        cache.put("mpl:producers_nearby:lat=48.86", "b", 60).await;
        cache.put("mpl:producer_detail:id=3", "c", 60).await;

        cache.invalidate_producers(Some(3)).await;

        assert_eq!(cache.get("mpl:producers_list:page=1").await, None);
        assert_eq!(cache.get("mpl:producers_nearby:lat=48.86").await, None);
        assert_eq!(cache.get("mpl:producer_detail:id=3").await, None);
    }

    #[tokio::test]
    async fn test_detail_invalidation_is_scoped() {
        let cache = CacheService::new(None).await;
        cache.put("mpl:producer_detail:id=3", "c", 60).await;
        cache.put("mpl:producer_detail:id=4", "d", 60).await;

        cache.invalidate_producers(Some(3)).await;

        assert_eq!(cache.get("mpl:producer_detail:id=3").await, None);
        assert_eq!(cache.get("mpl:producer_detail:id=4").await.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let cache = CacheService::new(None).await;
        cache.put("mpl:k", "v", 60).await;
        cache.get("mpl:k").await;
        cache.get("mpl:missing").await;

        let stats = cache.stats().await;
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.total_keys, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = CacheService::new(None).await;
        cache.put("mpl:a", "1", 60).await;
        cache.put("mpl:b", "2", 60).await;
        cache.clear().await;
        assert_eq!(cache.stats().await.total_keys, 0);
    }
}
