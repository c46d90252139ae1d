//! Safety checker
//!
//! Chấm điểm an toàn cho một jetton mới trong ngân sách thời gian cố định
//! (`security.max_safety_latency_ms`, mặc định 600 ms):
//! 1. Đọc cache theo địa chỉ, có thì trả về ngay.
//! 2. Chạy song song đọc contract data và mô phỏng honeypot.
//! 3. Tính thanh khoản, volume, smart money, owner, LP từ dữ liệu thu được.
//! 4. Áp công thức điểm, ghi cache với TTL.
//!
//! Each sub-check failure is replaced by its default. Only the deadline can fail
//! the call, with `EvaluationTimeout`; no partial report is ever returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use common::{MinterEvent, SafetyReport, NEW_TOKEN_MAX_AGE_SECS};

use crate::analys::token_status::{
    count_smart_money, estimate_liquidity_usd, estimate_volume_5m_usd, is_lp_burned, raw_field,
    resolve_owner, score_token, Blacklist, ScoreInputs, ScoreThresholds,
};
use crate::cache::{self, CacheProvider};
use crate::chain_adapters::OnChainReader;
use crate::config::SecurityConfig;
use crate::errors::{Result, SniperError};
use crate::metric;

/// Deadline-bounded safety scoring engine
pub struct SafetyChecker {
    reader: Arc<dyn OnChainReader>,
    cache: Arc<dyn CacheProvider>,
    security: SecurityConfig,
    blacklist: Blacklist,
    trusted: HashSet<String>,
    cache_ttl: u64,
}

impl SafetyChecker {
    pub fn new(
        reader: Arc<dyn OnChainReader>,
        cache: Arc<dyn CacheProvider>,
        security: SecurityConfig,
        cache_ttl: u64,
    ) -> Self {
        let blacklist = Blacklist::new(&security.blacklist_addresses);
        let trusted = security
            .trusted_smart_money
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        info!(
            "Safety checker ready: deadline {} ms, {} blacklisted owners, {} trusted wallets",
            security.max_safety_latency_ms,
            blacklist.len(),
            security.trusted_smart_money.len()
        );

        Self {
            reader,
            cache,
            security,
            blacklist,
            trusted,
            cache_ttl,
        }
    }

    pub fn budget_ms(&self) -> u64 {
        self.security.max_safety_latency_ms
    }

    /// Evaluate a minter event. The event's owner and timestamp are folded into
    /// the raw attributes when the source frame does not carry them.
    pub async fn evaluate_event(&self, event: &MinterEvent) -> Result<SafetyReport> {
        let mut raw = match &event.raw {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if raw_field(&event.raw, "owner").is_none() {
            if let Some(owner) = &event.owner_address {
                raw.insert("owner".to_string(), Value::String(owner.clone()));
            }
        }
        if raw_field(&event.raw, "timestamp").is_none() {
            raw.insert("timestamp".to_string(), Value::from(event.timestamp_unix));
        }
        self.evaluate(&event.address, &Value::Object(raw)).await
    }

    /// Produce a `SafetyReport` for `address` within the configured deadline.
    ///
    /// Cache I/O shares the same deadline; a slow cache is treated as a miss.
    pub async fn evaluate(&self, address: &str, raw: &Value) -> Result<SafetyReport> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.security.deadline();

        match tokio::time::timeout_at(deadline, cache::get_safety_report(self.cache.as_ref(), address)).await {
            Ok(Ok(Some(report))) => {
                debug!("Safety report for {} served from cache", address);
                return Ok(report);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!("Safety cache read failed for {}: {}", address, e),
            Err(_) => warn!("Safety cache read for {} ran out of budget", address),
        }

        let report = match tokio::time::timeout_at(deadline, self.run_checks(address, raw)).await {
            Ok(report) => report,
            Err(_) => {
                metric::record_evaluation_timeout();
                warn!(
                    "Safety evaluation of {} exceeded {} ms",
                    address, self.security.max_safety_latency_ms
                );
                return Err(SniperError::EvaluationTimeout {
                    address: address.to_string(),
                    budget_ms: self.security.max_safety_latency_ms,
                });
            }
        };

        metric::record_evaluation(if report.is_safe { "safe" } else { "unsafe" }, started.elapsed());
        debug!(
            "Evaluated {}: score {:.1}, safe {}, reasons {:?}",
            address, report.score, report.is_safe, report.reasons
        );

        let write = cache::set_safety_report(self.cache.as_ref(), address, &report, self.cache_ttl);
        match tokio::time::timeout_at(deadline, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Safety cache write failed for {}: {}", address, e),
            Err(_) => debug!("Skipped safety cache write for {}: out of budget", address),
        }

        Ok(report)
    }

    async fn run_checks(&self, address: &str, raw: &Value) -> SafetyReport {
        let (contract, honeypot_passed) =
            tokio::join!(self.contract_data(address), self.honeypot_check(address, raw));

        let owner = resolve_owner(&contract, raw);
        let owner_blacklisted = owner.as_deref().map_or(false, |o| self.blacklist.contains(o));
        let lp_burned = is_lp_burned(&contract, raw, owner.as_deref());

        let inputs = ScoreInputs {
            honeypot_passed,
            owner_blacklisted,
            liquidity_usd: estimate_liquidity_usd(&contract, raw),
            volume_5m_usd: estimate_volume_5m_usd(raw),
            smart_money_hits: count_smart_money(raw, &self.trusted),
            lp_burned,
            is_new: is_new_token(raw),
            owner,
        };

        score_token(
            &inputs,
            ScoreThresholds {
                min_liquidity_usd: self.security.min_liquidity_usd,
                min_volume_5m_usd: self.security.min_volume_5m_usd,
            },
        )
    }

    /// Contract data, or an empty map when the read fails
    async fn contract_data(&self, address: &str) -> Value {
        match self.reader.read_contract_data(address).await {
            Ok(data @ Value::Object(_)) => data,
            Ok(_) => Value::Object(Map::new()),
            Err(e) => {
                warn!("Contract data read failed for {}: {}", address, e);
                Value::Object(Map::new())
            }
        }
    }

    /// Honeypot simulation. No payload means nothing to simulate and the check passes;
    /// a failed simulation counts as a failed check.
    async fn honeypot_check(&self, address: &str, raw: &Value) -> bool {
        let Some(payload) = raw_field(raw, "simulate_boc").and_then(Value::as_str) else {
            return true;
        };

        match self.reader.simulate_transaction(payload, address).await {
            Ok(result) => result.get("success").and_then(Value::as_bool).unwrap_or(true),
            Err(e) => {
                warn!("Honeypot simulation failed for {}: {}", address, e);
                false
            }
        }
    }
}

fn is_new_token(raw: &Value) -> bool {
    let Some(timestamp) = raw_field(raw, "timestamp").and_then(|t| {
        t.as_i64().or_else(|| t.as_f64().map(|f| f as i64))
    }) else {
        return false;
    };
    Utc::now().timestamp() - timestamp < NEW_TOKEN_MAX_AGE_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::chain_adapters::ton_adapter::MockOnChainReader;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Reader whose simulation never completes
    struct StalledReader;

    #[async_trait]
    impl OnChainReader for StalledReader {
        async fn read_contract_data(&self, _address: &str) -> Result<Value> {
            Ok(json!({"liquidity_usd": 8000}))
        }

        async fn simulate_transaction(&self, _payload: &str, _address: &str) -> Result<Value> {
            std::future::pending().await
        }

        async fn estimate_fee(&self, _payload: &str) -> Result<Value> {
            Ok(json!({}))
        }
    }

    fn security() -> SecurityConfig {
        SecurityConfig {
            trusted_smart_money: vec!["EQwhale".to_string()],
            blacklist_addresses: vec!["EQscammer".to_string()],
            ..SecurityConfig::default()
        }
    }

    fn checker(reader: Arc<dyn OnChainReader>) -> SafetyChecker {
        SafetyChecker::new(reader, Arc::new(InMemoryCache::new(100)), security(), 30)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_honeypot_times_out_at_deadline() {
        let checker = checker(Arc::new(StalledReader));
        let raw = json!({"simulate_boc": "te6cc...", "timestamp": Utc::now().timestamp()});

        let started = tokio::time::Instant::now();
        let err = checker.evaluate("EQslow", &raw).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "unexpected error: {:?}", err);
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(650));
    }

    /// Cache that never answers within the budget
    struct StalledCache;

    #[async_trait]
    impl CacheProvider for StalledCache {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_seconds: u64) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn clear(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn exists(&self, _key: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn stats(&self) -> anyhow::Result<crate::cache::CacheStats> {
            Ok(crate::cache::CacheStats::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cache_stays_within_deadline() {
        let mut reader = MockOnChainReader::new();
        reader.expect_read_contract_data().returning(|_| Ok(json!({"liquidity_usd": 8000})));
        let checker = SafetyChecker::new(Arc::new(reader), Arc::new(StalledCache), security(), 30);

        let started = tokio::time::Instant::now();
        let result = checker.evaluate("EQslowcache", &json!({})).await;
        let elapsed = started.elapsed();

        if let Err(e) = &result {
            assert!(e.is_timeout(), "unexpected error: {:?}", e);
        }
        assert!(elapsed < Duration::from_millis(650), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_repeat_evaluation_served_from_cache() {
        let mut reader = MockOnChainReader::new();
        reader
            .expect_read_contract_data()
            .times(1)
            .returning(|_| Ok(json!({"liquidity_usd": 8000, "lp_status": "burned"})));

        let checker = checker(Arc::new(reader));
        let raw = json!({
            "timestamp": Utc::now().timestamp(),
            "payload": {"owner": "EQdev", "volume_5m_usd": 25000, "holders": ["EQwhale"]}
        });

        let first = checker.evaluate("EQgem", &raw).await.unwrap();
        let second = checker.evaluate("EQgem", &raw).await.unwrap();
        assert_eq!(first, second);

        // 60 + 8 (liq) + 12.5 (vol) + 4 + 5 + 3
        assert_eq!(first.score, 92.5);
        assert!(first.is_safe);
        assert_eq!(first.smart_money_hits, 1);
        assert_eq!(first.owner.as_deref(), Some("EQdev"));
    }

    #[tokio::test]
    async fn test_failing_sub_checks_fall_back_to_defaults() {
        let mut reader = MockOnChainReader::new();
        reader
            .expect_read_contract_data()
            .returning(|_| Err(SniperError::UpstreamUnavailable("rpc down".into())));
        reader
            .expect_simulate_transaction()
            .returning(|_, _| Err(SniperError::UpstreamError { code: -1, message: "boom".into() }));

        let checker = checker(Arc::new(reader));
        let raw = json!({"simulate_boc": "te6cc...", "liquidity_usd": 9000, "owner": "EQdev"});

        let report = checker.evaluate("EQbroken", &raw).await.unwrap();
        assert!(!report.is_safe);
        assert_eq!(report.liquidity_usd, 9000.0);
        assert_eq!(report.volume_5m_usd, 0.0);
        assert!(!report.is_new);
        assert_eq!(report.reasons[0], "honeypot simulation failed");
    }

    #[tokio::test]
    async fn test_blacklisted_owner_from_event() {
        let mut reader = MockOnChainReader::new();
        reader.expect_read_contract_data().returning(|_| Ok(json!({})));

        let checker = checker(Arc::new(reader));
        let event = MinterEvent {
            address: "EQrug".to_string(),
            owner_address: Some("EQscammer".to_string()),
            total_supply: None,
            symbol: Some("RUG".to_string()),
            timestamp_unix: Utc::now().timestamp(),
            raw: json!({"source": "hypersniper_indexer", "liquidity_usd": 1_000_000}),
        };

        let report = checker.evaluate_event(&event).await.unwrap();
        assert_eq!(report.score, 0.0);
        assert!(!report.is_safe);
        assert!(report.is_new);
    }
}
