//! External store adapters
//!
//! Rule engine và scanner không tự lưu trạng thái dài hạn; chúng gọi các trait hẹp
//! bên dưới. `MemoryStore` dùng cho mặc định/test, `RedisStore` lưu JSON trong hash.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::Connection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use common::{PersistedRule, RuleStatus, Signal};

use crate::errors::{Result, SniperError};

const RULES_HASH: &str = "hypersniper:rules";
const GEM_CACHE_HASH: &str = "hypersniper:gem_cache";

/// Persistence of exit rules
#[async_trait]
pub trait RuleStore: Send + Sync + 'static {
    /// Insert or replace the record for `rule.position_id`
    async fn upsert_rule(&self, rule: &PersistedRule) -> Result<()>;

    /// Change the status of the record armed at `armed_at`. Unknown ids and records
    /// re-armed since then are left untouched.
    async fn mark_rule_status(
        &self,
        position_id: &str,
        armed_at: DateTime<Utc>,
        status: RuleStatus,
    ) -> Result<()>;

    /// All records still in `Open` status
    async fn load_active_rules(&self) -> Result<Vec<PersistedRule>>;
}

/// Persistence of accepted signals (gem cache)
#[async_trait]
pub trait SignalStore: Send + Sync + 'static {
    async fn upsert_signal(&self, signal: &Signal, raw: &Value) -> Result<()>;
}

/// Stored form of an accepted signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GemCacheEntry {
    pub token_address: String,
    pub score: f64,
    pub liquidity_usd: f64,
    pub volume_5m_usd: f64,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
}

impl GemCacheEntry {
    fn from_signal(signal: &Signal, raw: &Value) -> Self {
        Self {
            token_address: signal.address.clone(),
            score: signal.score,
            liquidity_usd: signal.report.liquidity_usd,
            volume_5m_usd: signal.report.volume_5m_usd,
            payload: raw.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    rules: RwLock<HashMap<String, PersistedRule>>,
    gems: RwLock<HashMap<String, GemCacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rule(&self, position_id: &str) -> Option<PersistedRule> {
        self.rules.read().await.get(position_id).cloned()
    }

    pub async fn gem(&self, address: &str) -> Option<GemCacheEntry> {
        self.gems.read().await.get(address).cloned()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn upsert_rule(&self, rule: &PersistedRule) -> Result<()> {
        self.rules
            .write()
            .await
            .insert(rule.position_id.clone(), rule.clone());
        Ok(())
    }

    async fn mark_rule_status(
        &self,
        position_id: &str,
        armed_at: DateTime<Utc>,
        status: RuleStatus,
    ) -> Result<()> {
        match self.rules.write().await.get_mut(position_id) {
            Some(rule) if rule.created_at == armed_at => rule.status = status,
            Some(_) => debug!("Rule {} was re-armed, keeping its status", position_id),
            None => {}
        }
        Ok(())
    }

    async fn load_active_rules(&self) -> Result<Vec<PersistedRule>> {
        Ok(self
            .rules
            .read()
            .await
            .values()
            .filter(|r| r.status == RuleStatus::Open)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn upsert_signal(&self, signal: &Signal, raw: &Value) -> Result<()> {
        self.gems
            .write()
            .await
            .insert(signal.address.clone(), GemCacheEntry::from_signal(signal, raw));
        Ok(())
    }
}

/// Redis-backed store, JSON values in two hashes
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<Connection> {
        Ok(self.client.get_async_connection().await?)
    }
}

#[async_trait]
impl RuleStore for RedisStore {
    async fn upsert_rule(&self, rule: &PersistedRule) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(rule)
            .map_err(|e| SniperError::StoreError(format!("encode rule: {}", e)))?;
        conn.hset::<_, _, _, ()>(RULES_HASH, &rule.position_id, json).await?;
        Ok(())
    }

    async fn mark_rule_status(
        &self,
        position_id: &str,
        armed_at: DateTime<Utc>,
        status: RuleStatus,
    ) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let existing: Option<String> = conn.hget(RULES_HASH, position_id).await?;
        let Some(existing) = existing else {
            return Ok(());
        };
        let mut rule: PersistedRule = serde_json::from_str(&existing)
            .map_err(|e| SniperError::StoreError(format!("decode rule {}: {}", position_id, e)))?;
        if rule.created_at != armed_at {
            debug!("Rule {} was re-armed, keeping its status", position_id);
            return Ok(());
        }
        rule.status = status;
        let json = serde_json::to_string(&rule)
            .map_err(|e| SniperError::StoreError(format!("encode rule: {}", e)))?;
        conn.hset::<_, _, _, ()>(RULES_HASH, position_id, json).await?;
        Ok(())
    }

    async fn load_active_rules(&self) -> Result<Vec<PersistedRule>> {
        let mut conn = self.get_connection().await?;
        let all: HashMap<String, String> = conn.hgetall(RULES_HASH).await?;

        let mut rules = Vec::with_capacity(all.len());
        for (position_id, json) in all {
            match serde_json::from_str::<PersistedRule>(&json) {
                Ok(rule) if rule.status == RuleStatus::Open => rules.push(rule),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable rule record {}: {}", position_id, e),
            }
        }
        Ok(rules)
    }
}

#[async_trait]
impl SignalStore for RedisStore {
    async fn upsert_signal(&self, signal: &Signal, raw: &Value) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let entry = GemCacheEntry::from_signal(signal, raw);
        let json = serde_json::to_string(&entry)
            .map_err(|e| SniperError::StoreError(format!("encode gem entry: {}", e)))?;
        conn.hset::<_, _, _, ()>(GEM_CACHE_HASH, &signal.address, json).await?;
        Ok(())
    }
}

/// Both store roles behind one handle
pub struct Stores {
    pub rules: Arc<dyn RuleStore>,
    pub signals: Arc<dyn SignalStore>,
}

/// Factory function: redis when configured and reachable by URL, memory otherwise
pub fn create_stores(store_type: &str, redis_url: Option<&str>) -> Stores {
    if store_type == "redis" {
        match redis_url.map(RedisStore::new) {
            Some(Ok(store)) => {
                info!("Using Redis store for rules and signals");
                let store = Arc::new(store);
                return Stores {
                    rules: store.clone(),
                    signals: store,
                };
            }
            Some(Err(e)) => error!("Failed to create Redis store: {}. Falling back to memory", e),
            None => error!("store_type is redis but no redis_url is configured, falling back to memory"),
        }
    }
    let store = Arc::new(MemoryStore::new());
    Stores {
        rules: store.clone(),
        signals: store,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: RuleStatus) -> PersistedRule {
        record_at(id, status, Utc::now())
    }

    fn record_at(id: &str, status: RuleStatus, created_at: DateTime<Utc>) -> PersistedRule {
        PersistedRule {
            position_id: id.to_string(),
            owner_id: 1,
            wallet: "EQwallet".to_string(),
            token: "EQtoken".to_string(),
            trigger_price_usd: 2.0,
            stop_price_usd: None,
            status,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_memory_store_only_loads_open_rules() {
        let store = MemoryStore::new();
        let b = record("b", RuleStatus::Open);
        store.upsert_rule(&record("a", RuleStatus::Open)).await.unwrap();
        store.upsert_rule(&b).await.unwrap();
        store.mark_rule_status("b", b.created_at, RuleStatus::AutoSold).await.unwrap();
        store.mark_rule_status("missing", Utc::now(), RuleStatus::Closed).await.unwrap();

        let active = store.load_active_rules().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].position_id, "a");
        assert_eq!(store.rule("b").await.map(|r| r.status), Some(RuleStatus::AutoSold));
    }

    #[tokio::test]
    async fn test_status_change_ignores_rearmed_record() {
        let store = MemoryStore::new();
        let first = Utc::now();
        let second = first + chrono::Duration::milliseconds(5);
        store.upsert_rule(&record_at("p", RuleStatus::Open, second)).await.unwrap();

        store.mark_rule_status("p", first, RuleStatus::AutoSold).await.unwrap();
        assert_eq!(store.rule("p").await.map(|r| r.status), Some(RuleStatus::Open));

        store.mark_rule_status("p", second, RuleStatus::Closed).await.unwrap();
        assert_eq!(store.rule("p").await.map(|r| r.status), Some(RuleStatus::Closed));
    }

    #[test]
    fn test_redis_without_url_falls_back_to_memory() {
        let stores = create_stores("redis", None);
        tokio_test::block_on(async {
            stores.rules.upsert_rule(&record("x", RuleStatus::Open)).await.unwrap();
            let active = stores.rules.load_active_rules().await.unwrap();
            assert_eq!(active.len(), 1);
        });
    }
}
