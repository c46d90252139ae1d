/// Safety-report and snapshot caching module
///
/// This module provides the cache used to serve repeated safety evaluations
/// without re-running sub-checks, and to publish the latest hot snapshot
/// under the `gem:top` key for external readers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::Connection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use common::{SafetyReport, SignalPayload};

use crate::config::CacheConfig;

/// Key of the published top list
pub const HOT_SNAPSHOT_KEY: &str = "gem:top";

/// Prefix of every key written to redis
const REDIS_NAMESPACE: &str = "hypersniper";

/// Cache provider trait defining the interface for cache implementations
#[async_trait]
pub trait CacheProvider: Send + Sync + 'static {
    /// Get arbitrary data from cache
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set arbitrary data in cache
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;

    /// Delete a key from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Clear all cache data
    async fn clear(&self) -> Result<()>;

    /// Check if a key exists in cache
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats>;
}

/// Format a cache key with prefix for different data types
pub fn format_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

/// Read a cached safety report
pub async fn get_safety_report(cache: &dyn CacheProvider, address: &str) -> Result<Option<SafetyReport>> {
    let key = format_key("safety", address);
    match cache.get(&key).await? {
        Some(data) => {
            let report = bincode::deserialize::<SafetyReport>(&data)
                .context("Failed to deserialize safety report")?;
            Ok(Some(report))
        }
        None => Ok(None),
    }
}

/// Store a safety report with TTL
pub async fn set_safety_report(
    cache: &dyn CacheProvider,
    address: &str,
    report: &SafetyReport,
    ttl_seconds: u64,
) -> Result<()> {
    let key = format_key("safety", address);
    let data = bincode::serialize(report).context("Failed to serialize safety report")?;
    cache.set(&key, data, ttl_seconds).await
}

/// Publish the current top list as JSON
pub async fn set_hot_snapshot(cache: &dyn CacheProvider, tokens: &[SignalPayload], ttl_seconds: u64) -> Result<()> {
    let data = serde_json::to_vec(tokens).context("Failed to serialize hot snapshot")?;
    cache.set(HOT_SNAPSHOT_KEY, data, ttl_seconds).await
}

/// Read back the published top list
pub async fn get_hot_snapshot(cache: &dyn CacheProvider) -> Result<Option<Vec<SignalPayload>>> {
    match cache.get(HOT_SNAPSHOT_KEY).await? {
        Some(data) => {
            let tokens = serde_json::from_slice(&data).context("Failed to deserialize hot snapshot")?;
            Ok(Some(tokens))
        }
        None => Ok(None),
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    /// Memory storage for cache items
    cache: RwLock<HashMap<String, CacheItem>>,
    /// Maximum items to keep in memory
    max_items: usize,
    /// Statistics
    stats: RwLock<CacheStats>,
}

/// Redis cache implementation
pub struct RedisCache {
    /// Redis client
    client: Client,
    /// Statistics
    stats: RwLock<CacheStats>,
}

/// Cache item with TTL
struct CacheItem {
    /// Cached data
    data: Vec<u8>,
    /// Expiration time
    expires_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Total number of items in cache
    pub item_count: usize,
    /// Total number of cache hits
    pub hits: usize,
    /// Total number of cache misses
    pub misses: usize,
    /// Cache hit ratio (hits / (hits + misses))
    pub hit_ratio: f64,
}

impl CacheStats {
    fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        let total = self.hits + self.misses;
        if total > 0 {
            self.hit_ratio = self.hits as f64 / total as f64;
        }
    }
}

impl InMemoryCache {
    /// Create a new in-memory cache
    pub fn new(max_items: usize) -> Self {
        let max_items = max_items.max(1);
        Self {
            cache: RwLock::new(HashMap::with_capacity(max_items.min(1024))),
            max_items,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Remove expired items from cache
    async fn cleanup(&self) {
        let mut cache = self.cache.write().await;
        let now = Instant::now();
        cache.retain(|_, item| item.expires_at > now);
    }

    /// Evict items if cache is full
    async fn evict_if_needed(&self) {
        let mut cache = self.cache.write().await;

        if cache.len() >= self.max_items {
            debug!("Cache is full, evicting soonest-expiring items");

            let mut keys_by_expiration: Vec<(String, Instant)> = cache
                .iter()
                .map(|(key, item)| (key.clone(), item.expires_at))
                .collect();
            keys_by_expiration.sort_by(|a, b| a.1.cmp(&b.1));

            // Remove 10% or at least one item
            let items_to_remove = std::cmp::max(1, self.max_items / 10);
            for (key, _) in keys_by_expiration.into_iter().take(items_to_remove) {
                cache.remove(&key);
            }
        }
    }
}

impl RedisCache {
    /// Create a new Redis cache
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to connect to Redis at {}", redis_url))?;

        Ok(Self {
            client,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Get a Redis connection
    async fn get_connection(&self) -> Result<Connection> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .context("Failed to get Redis connection")?;

        Ok(conn)
    }

    fn namespaced(&self, key: &str) -> String {
        format_key(REDIS_NAMESPACE, key)
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // Clean up expired items occasionally (1% chance)
        if rand::random::<f64>() < 0.01 {
            self.cleanup().await;
        }

        let found = {
            let cache = self.cache.read().await;
            cache
                .get(key)
                .filter(|item| item.expires_at > Instant::now())
                .map(|item| item.data.clone())
        };

        self.stats.write().await.record(found.is_some());
        Ok(found)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        // Ensure cache isn't full
        self.evict_if_needed().await;

        let item = CacheItem {
            data: value,
            expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
        };

        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), item);
        self.stats.write().await.item_count = cache.len();

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.remove(key);
        self.stats.write().await.item_count = cache.len();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.write().await.clear();
        *self.stats.write().await = CacheStats::default();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let cache = self.cache.read().await;
        Ok(cache.get(key).map_or(false, |item| item.expires_at > Instant::now()))
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.stats.read().await.clone())
    }
}

#[async_trait]
impl CacheProvider for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;

        let data: Option<Vec<u8>> = conn
            .get(self.namespaced(key))
            .await
            .context("Failed to get data from Redis")?;

        self.stats.write().await.record(data.is_some());
        Ok(data)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;

        conn.set_ex::<_, _, ()>(self.namespaced(key), value, ttl_seconds.max(1) as usize)
            .await
            .context("Failed to set data in Redis")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;

        conn.del::<_, ()>(self.namespaced(key))
            .await
            .context("Failed to delete key from Redis")?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let pattern = format!("{}:*", REDIS_NAMESPACE);
        let keys: Vec<String> = conn.keys(pattern).await.context("Failed to get keys from Redis")?;

        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.context("Failed to delete keys from Redis")?;
        }

        *self.stats.write().await = CacheStats::default();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;

        let exists: bool = conn
            .exists(self.namespaced(key))
            .await
            .context("Failed to check if key exists in Redis")?;

        Ok(exists)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.get_connection().await?;

        let pattern = format!("{}:*", REDIS_NAMESPACE);
        let keys: Vec<String> = conn.keys(pattern).await.context("Failed to get keys from Redis")?;

        let mut stats = self.stats.write().await;
        stats.item_count = keys.len();
        Ok(stats.clone())
    }
}

/// Factory function to create a cache provider based on configuration
pub fn create_cache_provider(config: &CacheConfig) -> Arc<dyn CacheProvider> {
    match (config.cache_type.as_str(), config.redis_url.as_deref()) {
        ("redis", Some(url)) => match RedisCache::new(url) {
            Ok(cache) => {
                info!("Using Redis cache at {}", url);
                Arc::new(cache)
            }
            Err(e) => {
                error!("Failed to create Redis cache: {}. Falling back to in-memory cache", e);
                Arc::new(InMemoryCache::new(config.memory_max_items))
            }
        },
        ("redis", None) => {
            error!("cache_type is redis but no redis_url is configured, falling back to in-memory cache");
            Arc::new(InMemoryCache::new(config.memory_max_items))
        }
        _ => {
            info!("Using in-memory cache");
            Arc::new(InMemoryCache::new(config.memory_max_items))
        }
    }
}
