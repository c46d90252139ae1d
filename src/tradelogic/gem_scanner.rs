//! Gem scanner
//!
//! Giữ tập ứng viên "hot" đã qua kiểm tra an toàn, xếp hạng và đẩy snapshot định kỳ.
//!
//! - `on_accepted` lọc theo điểm an toàn / thanh khoản / volume, tính điểm xếp hạng,
//!   chèn vào working set, sắp xếp lại và cắt theo `max_hot_tokens` trong cùng một
//!   critical section.
//! - `get_top` áp bộ lọc runtime và khóa sắp xếp hiện tại.
//! - `run_periodic` ghi cache `gem:top` mỗi chu kỳ và chỉ phát snapshot khi tập không rỗng.
//!
//! `GemPipeline` nối feed → safety checker → scanner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use common::{HotSnapshot, MinterEvent, SafetyReport, Signal};

use crate::analys::SafetyChecker;
use crate::cache::{self, CacheProvider};
use crate::chain_adapters::MinterConsumer;
use crate::config::GemScannerConfig;
use crate::errors::Result;
use crate::metric;
use crate::storage::SignalStore;
use crate::tradelogic::traits::SnapshotListener;
use crate::types::{SignalFilters, SortKey};

pub const TAG_SMART_MONEY: &str = "Smart money inside";
pub const TAG_LP_BURNED: &str = "LP burned";
pub const TAG_NEW: &str = "new";

const LIQUIDITY_RANK_CAP: f64 = 40.0;
const VOLUME_RANK_CAP: f64 = 30.0;
const SMART_MONEY_RANK_BONUS: f64 = 5.0;
const LP_BURNED_RANK_BONUS: f64 = 5.0;
const NEW_RANK_BONUS: f64 = 3.0;
const HOT_AND_SAFE_RANK_BONUS: f64 = 5.0;

#[derive(Default)]
struct HotSet {
    /// Luôn được sắp xếp giảm dần theo điểm xếp hạng
    entries: Vec<Signal>,
    filters: SignalFilters,
}

/// Bounded, ranked working set of vetted candidates
pub struct GemScanner {
    config: GemScannerConfig,
    cache: Arc<dyn CacheProvider>,
    signal_store: Option<Arc<dyn SignalStore>>,
    state: Mutex<HotSet>,
    listeners: RwLock<Vec<Arc<dyn SnapshotListener>>>,
}

impl GemScanner {
    pub fn new(config: GemScannerConfig, cache: Arc<dyn CacheProvider>) -> Self {
        Self {
            config,
            cache,
            signal_store: None,
            state: Mutex::new(HotSet::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Persist every accepted signal to an external store
    pub fn with_signal_store(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.signal_store = Some(store);
        self
    }

    pub fn config(&self) -> &GemScannerConfig {
        &self.config
    }

    pub async fn add_listener(&self, listener: Arc<dyn SnapshotListener>) {
        info!("Snapshot listener registered: {}", listener.name());
        self.listeners.write().await.push(listener);
    }

    /// Composite ranking score of an accepted report
    pub fn rank_score(&self, report: &SafetyReport) -> f64 {
        let mut score = report.score;
        score += (report.liquidity_usd / 1_000.0).min(LIQUIDITY_RANK_CAP);
        score += (report.volume_5m_usd / 2_000.0).min(VOLUME_RANK_CAP);
        score += SMART_MONEY_RANK_BONUS * f64::from(report.smart_money_hits);
        if report.lp_burned {
            score += LP_BURNED_RANK_BONUS;
        }
        if report.is_new {
            score += NEW_RANK_BONUS;
        }
        if report.is_safe && report.volume_5m_usd >= 2.0 * self.config.min_volume_5m_usd {
            score += HOT_AND_SAFE_RANK_BONUS;
        }
        score
    }

    fn tags_for(report: &SafetyReport) -> Vec<String> {
        let mut tags = Vec::new();
        if report.smart_money_hits > 0 {
            tags.push(TAG_SMART_MONEY.to_string());
        }
        if report.lp_burned {
            tags.push(TAG_LP_BURNED.to_string());
        }
        if report.is_new {
            tags.push(TAG_NEW.to_string());
        }
        tags
    }

    /// Insert an evaluated candidate. Returns the stored signal, or `None` when the
    /// report is unsafe or below the liquidity/volume floors.
    pub async fn on_accepted(&self, event: &MinterEvent, report: &SafetyReport) -> Option<Signal> {
        if !report.is_safe {
            debug!("Rejecting {}: unsafe (score {:.1})", event.address, report.score);
            return None;
        }
        if report.liquidity_usd < self.config.min_liquidity_usd {
            debug!("Rejecting {}: liquidity ${:.0}", event.address, report.liquidity_usd);
            return None;
        }
        if report.volume_5m_usd < self.config.min_volume_5m_usd {
            debug!("Rejecting {}: 5m volume ${:.0}", event.address, report.volume_5m_usd);
            return None;
        }

        let signal = Signal {
            address: event.address.clone(),
            symbol: event.symbol.clone(),
            score: self.rank_score(report),
            tags: Self::tags_for(report),
            report: report.clone(),
            created_at: Utc::now(),
        };

        {
            let mut state = self.state.lock().await;
            state.entries.retain(|s| s.address != signal.address);
            state.entries.push(signal.clone());
            state.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
            state.entries.truncate(self.config.max_hot_tokens);
        }

        metric::record_signal_accepted();
        info!(
            "Hot candidate {} ({}) score {:.1} tags {:?}",
            signal.label(),
            signal.address,
            signal.score,
            signal.tags
        );

        if let Some(store) = &self.signal_store {
            if let Err(e) = store.upsert_signal(&signal, &event.raw).await {
                warn!("Failed to persist signal {}: {}", signal.address, e);
            }
        }

        Some(signal)
    }

    /// Up to `limit` signals, filtered and sorted by the active filters
    pub async fn get_top(&self, limit: usize) -> Vec<Signal> {
        let state = self.state.lock().await;
        let filters = &state.filters;

        let mut selected: Vec<Signal> = state
            .entries
            .iter()
            .filter(|s| s.score >= filters.min_score)
            .filter(|s| !filters.lp_burned_only || s.report.lp_burned)
            .filter(|s| s.report.smart_money_hits >= filters.smart_money_min)
            .cloned()
            .collect();

        if filters.sort_key == SortKey::Volume {
            selected.sort_by(|a, b| b.report.volume_5m_usd.total_cmp(&a.report.volume_5m_usd));
        }
        selected.truncate(limit);
        selected
    }

    pub async fn set_filters(&self, filters: SignalFilters) -> Result<()> {
        filters.validate()?;
        info!("Hot set filters updated: {:?}", filters);
        self.state.lock().await.filters = filters;
        Ok(())
    }

    pub async fn get_filters(&self) -> SignalFilters {
        self.state.lock().await.filters.clone()
    }

    /// Kích thước working set hiện tại (không áp bộ lọc)
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self, limit: usize) -> HotSnapshot {
        HotSnapshot::new(self.get_top(limit).await)
    }

    /// One push cycle: cache write always, listener emission only when non-empty
    pub async fn refresh_once(&self) -> HotSnapshot {
        let snapshot = self.snapshot(self.config.snapshot_size).await;

        let payload = snapshot.webhook_payload();
        if let Err(e) =
            cache::set_hot_snapshot(self.cache.as_ref(), &payload.tokens, self.config.refresh_interval_sec).await
        {
            warn!("Failed to cache hot snapshot: {}", e);
        }

        if snapshot.is_empty() {
            debug!("Hot set empty, skipping snapshot push");
            return snapshot;
        }

        let listeners = self.listeners.read().await.clone();
        let results = join_all(listeners.iter().map(|l| l.on_snapshot(&snapshot))).await;
        for (listener, result) in listeners.iter().zip(results) {
            if let Err(e) = result {
                warn!("Snapshot listener {} failed: {}", listener.name(), e);
            }
        }

        snapshot
    }

    /// Push a snapshot every `refresh_interval_sec` until shutdown
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.refresh_interval_sec);
        info!("Gem scanner push loop started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.refresh_once().await;
        }

        info!("Gem scanner push loop stopped");
    }
}

/// Feed consumer: evaluate each minter, hand safe ones to the scanner
pub struct GemPipeline {
    checker: Arc<SafetyChecker>,
    scanner: Arc<GemScanner>,
}

impl GemPipeline {
    pub fn new(checker: Arc<SafetyChecker>, scanner: Arc<GemScanner>) -> Self {
        Self { checker, scanner }
    }

    /// Evaluate and rank one event. A timed out evaluation is skipped, not rejected.
    pub async fn process_event(&self, event: &MinterEvent) -> Result<Option<Signal>> {
        match self.checker.evaluate_event(event).await {
            Ok(report) => Ok(self.scanner.on_accepted(event, &report).await),
            Err(e) if e.is_timeout() => {
                debug!("Skipping {} for now: {}", event.address, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MinterConsumer for GemPipeline {
    async fn on_minter(&self, event: &MinterEvent) -> Result<()> {
        self.process_event(event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(address: &str, symbol: &str) -> MinterEvent {
        MinterEvent {
            address: address.to_string(),
            owner_address: None,
            total_supply: None,
            symbol: Some(symbol.to_string()),
            timestamp_unix: Utc::now().timestamp(),
            raw: json!({"type": "jetton-minter-created"}),
        }
    }

    fn report(score: f64, liquidity_usd: f64, volume_5m_usd: f64) -> SafetyReport {
        SafetyReport {
            is_safe: true,
            score,
            reasons: Vec::new(),
            liquidity_usd,
            volume_5m_usd,
            smart_money_hits: 0,
            lp_burned: false,
            is_new: false,
            owner: Some("EQdev".to_string()),
        }
    }

    fn scanner(max_hot_tokens: usize) -> GemScanner {
        let config = GemScannerConfig {
            max_hot_tokens,
            ..GemScannerConfig::default()
        };
        GemScanner::new(config, Arc::new(InMemoryCache::new(100)))
    }

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotListener for CountingListener {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_snapshot(&self, _snapshot: &HotSnapshot) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_accepts_scenario_signal() {
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(10).with_signal_store(store.clone());
        let report = SafetyReport {
            smart_money_hits: 1,
            lp_burned: true,
            is_new: true,
            owner: None,
            ..report(82.0, 8_000.0, 25_000.0)
        };

        let signal = scanner.on_accepted(&event("A", "FOO"), &report).await.expect("accepted");
        assert!(signal.has_tag("LP burned"));
        assert!(signal.has_tag("new"));
        assert!(signal.has_tag("Smart money inside"));
        // 82 + 8 + 12.5 + 5 + 5 + 3
        assert_eq!(signal.score, 115.5);

        let top = scanner.get_top(1).await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].address, "A");
        assert_eq!(top[0].symbol.as_deref(), Some("FOO"));
        assert!(store.gem("A").await.is_some());
    }

    #[tokio::test]
    async fn test_low_liquidity_is_noop() {
        let scanner = scanner(10);
        scanner.on_accepted(&event("B", "OK"), &report(80.0, 9_000.0, 30_000.0)).await;
        assert_eq!(scanner.len().await, 1);

        let accepted = scanner.on_accepted(&event("C", "DRY"), &report(95.0, 1_000.0, 90_000.0)).await;
        assert!(accepted.is_none());
        assert_eq!(scanner.len().await, 1);

        let unsafe_report = SafetyReport {
            is_safe: false,
            ..report(95.0, 90_000.0, 90_000.0)
        };
        assert!(scanner.on_accepted(&event("D", "BAD"), &unsafe_report).await.is_none());
        assert_eq!(scanner.len().await, 1);
    }

    #[tokio::test]
    async fn test_cap_evicts_lowest_ranked() {
        let scanner = scanner(3);
        for (i, score) in [75.0, 90.0, 71.0, 85.0, 80.0].iter().enumerate() {
            let address = format!("EQ{}", i);
            scanner
                .on_accepted(&event(&address, "T"), &report(*score, 5_000.0, 20_000.0))
                .await;
            assert!(scanner.len().await <= 3);
        }

        let top: Vec<String> = scanner.get_top(10).await.into_iter().map(|s| s.address).collect();
        assert_eq!(top, vec!["EQ1", "EQ3", "EQ4"]);
    }

    #[tokio::test]
    async fn test_sort_key_change_reorders_reads() {
        let scanner = scanner(10);
        scanner.on_accepted(&event("HIGH", "H"), &report(95.0, 5_000.0, 21_000.0)).await;
        scanner.on_accepted(&event("LOUD", "L"), &report(71.0, 5_000.0, 39_000.0)).await;

        let by_score: Vec<String> = scanner.get_top(2).await.into_iter().map(|s| s.address).collect();
        assert_eq!(by_score, vec!["HIGH", "LOUD"]);

        scanner
            .set_filters(SignalFilters {
                sort_key: SortKey::Volume,
                ..SignalFilters::default()
            })
            .await
            .unwrap();
        let by_volume: Vec<String> = scanner.get_top(2).await.into_iter().map(|s| s.address).collect();
        assert_eq!(by_volume, vec!["LOUD", "HIGH"]);

        scanner
            .set_filters(SignalFilters {
                lp_burned_only: true,
                ..SignalFilters::default()
            })
            .await
            .unwrap();
        assert!(scanner.get_top(2).await.is_empty());
        assert_eq!(scanner.len().await, 2);
    }

    #[tokio::test]
    async fn test_refresh_skips_empty_push_but_writes_cache() {
        let cache: Arc<dyn CacheProvider> = Arc::new(InMemoryCache::new(100));
        let scanner = GemScanner::new(GemScannerConfig::default(), cache.clone());
        let listener = Arc::new(CountingListener::default());
        scanner.add_listener(listener.clone()).await;

        let snapshot = scanner.refresh_once().await;
        assert!(snapshot.is_empty());
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache::get_hot_snapshot(cache.as_ref()).await.unwrap(), Some(Vec::new()));

        scanner.on_accepted(&event("A", "FOO"), &report(80.0, 6_000.0, 22_000.0)).await;
        let snapshot = scanner.refresh_once().await;
        assert_eq!(snapshot.signals.len(), 1);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

        let cached = cache::get_hot_snapshot(cache.as_ref()).await.unwrap().unwrap();
        assert_eq!(cached[0].symbol, "FOO");
    }
}
