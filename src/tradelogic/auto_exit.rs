//! Auto-exit rule engine
//!
//! Quy tắc chốt lời / cắt lỗ theo vị thế. Mỗi `position_id` có tối đa một quy tắc;
//! arm lại sẽ thay thế quy tắc cũ. Khi giá chạm ngưỡng, quy tắc bị gỡ khỏi map
//! trong cùng critical section với việc kiểm tra, nên mỗi quy tắc chỉ bắn một lần
//! kể cả khi nhiều cập nhật giá chạy song song.
//!
//! Firing order: remove from the live map, notify every listener (bounded retry,
//! failures isolated per listener), then mark the stored record `auto_sold`.
//! Store status changes are keyed by `created_at`, so a rule re-armed while the
//! old one is still firing keeps its `open` record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use common::{ExitEvent, ExitRule, ExitTrigger, RuleStatus};

use crate::config::AutoExitConfig;
use crate::errors::{Result, SniperError};
use crate::metric;
use crate::storage::RuleStore;
use crate::tradelogic::traits::ExitListener;

/// Holds armed exit rules and fires them on price updates
pub struct AutoExitEngine {
    rules: Mutex<HashMap<String, ExitRule>>,
    store: Arc<dyn RuleStore>,
    listeners: RwLock<Vec<Arc<dyn ExitListener>>>,
    max_notify_attempts: u32,
    notify_retry: Duration,
}

impl AutoExitEngine {
    pub fn new(store: Arc<dyn RuleStore>, config: &AutoExitConfig) -> Self {
        Self {
            rules: Mutex::new(HashMap::new()),
            store,
            listeners: RwLock::new(Vec::new()),
            max_notify_attempts: config.max_notify_attempts.max(1),
            notify_retry: Duration::from_millis(config.notify_retry_ms),
        }
    }

    pub async fn add_listener(&self, listener: Arc<dyn ExitListener>) {
        info!("Exit listener registered: {}", listener.name());
        self.listeners.write().await.push(listener);
    }

    /// Restore open rules from the store. Returns the number of rules loaded.
    pub async fn preload(&self) -> Result<usize> {
        let records = self.store.load_active_rules().await?;
        let mut rules = self.rules.lock().await;
        let mut loaded = 0;
        for record in records {
            if record.status.is_retired() {
                continue;
            }
            let rule = record.into_rule();
            rules.insert(rule.position_id.clone(), rule);
            loaded += 1;
        }
        info!("Preloaded {} exit rules", loaded);
        Ok(loaded)
    }

    /// Arm (or replace) the rule of `position_id`.
    ///
    /// The rule is persisted first; a store failure leaves the live map unchanged.
    pub async fn arm(
        &self,
        position_id: &str,
        owner_id: i64,
        wallet: &str,
        token: &str,
        trigger_price_usd: f64,
        stop_price_usd: Option<f64>,
    ) -> Result<ExitRule> {
        validate_rule_args(position_id, token, trigger_price_usd, stop_price_usd)?;

        let rule = ExitRule {
            position_id: position_id.trim().to_string(),
            owner_id,
            wallet: wallet.trim().to_string(),
            token_address: token.trim().to_string(),
            trigger_price_usd,
            stop_price_usd,
            created_at: Utc::now(),
        };

        self.store.upsert_rule(&rule.to_record(RuleStatus::Open)).await?;

        let replaced = self
            .rules
            .lock()
            .await
            .insert(rule.position_id.clone(), rule.clone())
            .is_some();

        info!(
            "Exit rule {} {} for {}: take profit {} stop {:?}",
            rule.position_id,
            if replaced { "re-armed" } else { "armed" },
            rule.token_address,
            rule.trigger_price_usd,
            rule.stop_price_usd
        );
        Ok(rule)
    }

    /// Remove the rule and retire it as `closed`. `Ok(false)` if it was not armed.
    pub async fn disarm(&self, position_id: &str) -> Result<bool> {
        let Some(removed) = self.rules.lock().await.remove(position_id) else {
            debug!("Disarm of unknown rule {}", position_id);
            return Ok(false);
        };
        if let Err(e) = self
            .store
            .mark_rule_status(position_id, removed.created_at, RuleStatus::Closed)
            .await
        {
            error!("Rule {} disarmed but store update failed: {}", position_id, e);
        }
        info!("Exit rule {} disarmed", position_id);
        Ok(true)
    }

    /// Evaluate every live rule of `token` against `price_usd` and fire the matches
    pub async fn on_price_update(&self, token: &str, price_usd: f64) -> Vec<ExitEvent> {
        if !price_usd.is_finite() || price_usd < 0.0 {
            warn!("Ignoring invalid price {} for {}", price_usd, token);
            return Vec::new();
        }

        let fired: Vec<ExitEvent> = {
            let mut rules = self.rules.lock().await;
            let matches: Vec<(String, ExitTrigger)> = rules
                .values()
                .filter(|r| r.token_address == token)
                .filter_map(|r| r.check(price_usd).map(|t| (r.position_id.clone(), t)))
                .collect();

            matches
                .into_iter()
                .filter_map(|(id, trigger)| {
                    rules.remove(&id).map(|rule| ExitEvent {
                        rule,
                        price_usd,
                        trigger,
                        fired_at: Utc::now(),
                    })
                })
                .collect()
        };

        for event in &fired {
            metric::record_rule_fired(event.trigger);
            info!(
                "Exit rule {} fired ({:?}) for {} at ${}",
                event.rule.position_id, event.trigger, token, price_usd
            );

            self.notify_listeners(event).await;

            if let Err(e) = self
                .store
                .mark_rule_status(&event.rule.position_id, event.rule.created_at, RuleStatus::AutoSold)
                .await
            {
                error!(
                    "Rule {} fired but store update failed: {}",
                    event.rule.position_id, e
                );
            }
        }

        fired
    }

    async fn notify_listeners(&self, event: &ExitEvent) {
        let listeners = self.listeners.read().await.clone();
        join_all(listeners.iter().map(|l| self.deliver_with_retry(l.as_ref(), event))).await;
    }

    async fn deliver_with_retry(&self, listener: &dyn ExitListener, event: &ExitEvent) -> bool {
        for attempt in 1..=self.max_notify_attempts {
            match listener.on_exit(event).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "Exit listener {} failed for rule {} (attempt {}/{}): {}",
                        listener.name(),
                        event.rule.position_id,
                        attempt,
                        self.max_notify_attempts,
                        e
                    );
                    if attempt < self.max_notify_attempts {
                        tokio::time::sleep(self.notify_retry).await;
                    }
                }
            }
        }
        false
    }

    /// Tokens with at least one live rule, for the price poller
    pub async fn list_tracked_tokens(&self) -> BTreeSet<String> {
        self.rules
            .lock()
            .await
            .values()
            .map(|r| r.token_address.clone())
            .collect()
    }

    /// Live rules of one wallet, oldest first
    pub async fn rules_for_wallet(&self, wallet: &str) -> Vec<ExitRule> {
        let mut rules: Vec<ExitRule> = self
            .rules
            .lock()
            .await
            .values()
            .filter(|r| r.wallet == wallet)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.created_at);
        rules
    }

    pub async fn get_rule(&self, position_id: &str) -> Option<ExitRule> {
        self.rules.lock().await.get(position_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rules.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn validate_rule_args(
    position_id: &str,
    token: &str,
    trigger_price_usd: f64,
    stop_price_usd: Option<f64>,
) -> Result<()> {
    if position_id.trim().is_empty() {
        return Err(SniperError::ValidationError("position_id must not be empty".to_string()));
    }
    if token.trim().is_empty() {
        return Err(SniperError::ValidationError("token must not be empty".to_string()));
    }
    if !trigger_price_usd.is_finite() || trigger_price_usd <= 0.0 {
        return Err(SniperError::ValidationError(format!(
            "trigger price must be positive, got {}",
            trigger_price_usd
        )));
    }
    if let Some(stop) = stop_price_usd {
        if !stop.is_finite() || stop <= 0.0 || stop >= trigger_price_usd {
            return Err(SniperError::ValidationError(format!(
                "stop price must be positive and below the trigger ({}), got {}",
                trigger_price_usd, stop
            )));
        }
    }
    Ok(())
}
