//! Watch subscriptions and snapshot fan-out
//!
//! Hai map hai chiều `token -> subscribers` và `subscriber -> tokens` luôn đối xứng;
//! entry rỗng bị xóa ngay. Danh sách global watcher tách riêng.
//!
//! `dispatch` resolves recipients under the lock, releases it, then sends every
//! message concurrently. One failed recipient never blocks another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::{HotSnapshot, Signal};

use crate::errors::Result;
use crate::metric;
use crate::notifications::{escape_html, MessageSender};
use crate::tradelogic::SnapshotListener;
use crate::types::SubscriberId;

#[derive(Default)]
struct WatchState {
    by_token: HashMap<String, HashSet<SubscriberId>>,
    by_subscriber: HashMap<SubscriberId, HashSet<String>>,
    global: HashSet<SubscriberId>,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationFanout {
    sender: Arc<dyn MessageSender>,
    state: Mutex<WatchState>,
}

impl NotificationFanout {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            sender,
            state: Mutex::new(WatchState::default()),
        }
    }

    /// Toggle a per-token watch. `true` if now watching, `false` if the watch was removed.
    pub async fn watch_token(&self, subscriber: SubscriberId, token: &str) -> bool {
        let token = token.trim().to_string();
        let mut state = self.state.lock().await;

        let already = state
            .by_subscriber
            .get(&subscriber)
            .map_or(false, |tokens| tokens.contains(&token));

        if already {
            if let Some(tokens) = state.by_subscriber.get_mut(&subscriber) {
                tokens.remove(&token);
                if tokens.is_empty() {
                    state.by_subscriber.remove(&subscriber);
                }
            }
            if let Some(watchers) = state.by_token.get_mut(&token) {
                watchers.remove(&subscriber);
                if watchers.is_empty() {
                    state.by_token.remove(&token);
                }
            }
            debug!("{} stopped watching {}", subscriber, token);
            false
        } else {
            state.by_subscriber.entry(subscriber).or_default().insert(token.clone());
            state.by_token.entry(token.clone()).or_default().insert(subscriber);
            debug!("{} is watching {}", subscriber, token);
            true
        }
    }

    /// `false` if the subscriber already watches the global feed
    pub async fn watch_global(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().await.global.insert(subscriber)
    }

    /// `false` if the subscriber was not watching the global feed
    pub async fn unwatch_global(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().await.global.remove(&subscriber)
    }

    /// Tokens watched by one subscriber, sorted
    pub async fn list_tokens(&self, subscriber: SubscriberId) -> Vec<String> {
        let state = self.state.lock().await;
        let mut tokens: Vec<String> = state
            .by_subscriber
            .get(&subscriber)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        tokens.sort();
        tokens
    }

    pub async fn watchers_of(&self, token: &str) -> HashSet<SubscriberId> {
        self.state
            .lock()
            .await
            .by_token
            .get(token)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_global_watcher(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().await.global.contains(&subscriber)
    }

    /// Deliver a snapshot: one grouped message per token watcher, one full
    /// ranking per global watcher.
    pub async fn dispatch(&self, snapshot: &HotSnapshot) -> DispatchReport {
        if snapshot.is_empty() {
            return DispatchReport::default();
        }

        let (per_subscriber, globals) = {
            let state = self.state.lock().await;
            let mut per_subscriber: BTreeMap<SubscriberId, Vec<&Signal>> = BTreeMap::new();
            for signal in &snapshot.signals {
                if let Some(watchers) = state.by_token.get(&signal.address) {
                    for subscriber in watchers {
                        per_subscriber.entry(*subscriber).or_default().push(signal);
                    }
                }
            }
            let globals: Vec<SubscriberId> = state.global.iter().copied().collect();
            (per_subscriber, globals)
        };

        let mut messages: Vec<(SubscriberId, String)> = per_subscriber
            .into_iter()
            .map(|(subscriber, signals)| (subscriber, format_watch_update(&signals)))
            .collect();
        if !globals.is_empty() {
            let ranking = format_top_list(&snapshot.signals);
            messages.extend(globals.into_iter().map(|subscriber| (subscriber, ranking.clone())));
        }

        let results = join_all(
            messages
                .iter()
                .map(|(subscriber, text)| self.sender.send(*subscriber, text)),
        )
        .await;

        let mut report = DispatchReport::default();
        for ((subscriber, _), result) in messages.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    metric::record_delivery("chat", true);
                }
                Err(e) => {
                    report.failed += 1;
                    metric::record_delivery("chat", false);
                    warn!("Snapshot delivery to {} failed: {}", subscriber, e);
                }
            }
        }

        if report.delivered + report.failed > 0 {
            info!(
                "Snapshot dispatched via {}: {} delivered, {} failed",
                self.sender.name(),
                report.delivered,
                report.failed
            );
        }
        report
    }
}

#[async_trait]
impl SnapshotListener for NotificationFanout {
    fn name(&self) -> &str {
        "chat-fanout"
    }

    async fn on_snapshot(&self, snapshot: &HotSnapshot) -> Result<()> {
        self.dispatch(snapshot).await;
        Ok(())
    }
}

fn tags_text(signal: &Signal) -> String {
    if signal.tags.is_empty() {
        "-".to_string()
    } else {
        escape_html(&signal.tags.join(", "))
    }
}

/// Tin nhắn cho các token đang theo dõi
fn format_watch_update(signals: &[&Signal]) -> String {
    let mut text = String::from("🔥 <b>Update on your watched jettons</b>\n");
    for signal in signals {
        text.push_str(&format!(
            "\n<b>{}</b> • score {:.1} • {}",
            escape_html(&signal.label()),
            signal.score,
            tags_text(signal)
        ));
    }
    text
}

/// Tin nhắn bảng xếp hạng cho global watcher
fn format_top_list(signals: &[Signal]) -> String {
    let mut text = String::from("🏆 <b>Top jettons right now</b>\n");
    for (idx, signal) in signals.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. <b>{}</b> • {:.1} • {}",
            idx + 1,
            escape_html(&signal.label()),
            signal.score,
            tags_text(signal)
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SniperError;
    use chrono::Utc;
    use common::SafetyReport;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeSender {
        sent: StdMutex<Vec<(SubscriberId, String)>>,
        unreachable: HashSet<SubscriberId>,
    }

    #[async_trait]
    impl MessageSender for FakeSender {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, recipient: SubscriberId, text: &str) -> Result<()> {
            if self.unreachable.contains(&recipient) {
                return Err(SniperError::delivery(recipient, "bot was blocked by the user"));
            }
            self.sent.lock().unwrap().push((recipient, text.to_string()));
            Ok(())
        }
    }

    fn signal(address: &str, symbol: &str, score: f64) -> Signal {
        Signal {
            address: address.to_string(),
            symbol: Some(symbol.to_string()),
            score,
            tags: vec!["LP burned".to_string()],
            report: SafetyReport {
                is_safe: true,
                score: 80.0,
                reasons: Vec::new(),
                liquidity_usd: 6_000.0,
                volume_5m_usd: 21_000.0,
                smart_money_hits: 0,
                lp_burned: true,
                is_new: false,
                owner: None,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_watch_toggle_keeps_maps_mirrored() {
        let fanout = NotificationFanout::new(Arc::new(FakeSender::default()));

        assert!(fanout.watch_token(1, "EQa").await);
        assert!(fanout.watch_token(1, "EQb").await);
        assert!(fanout.watch_token(2, "EQa").await);
        assert_eq!(fanout.list_tokens(1).await, vec!["EQa", "EQb"]);

        assert!(!fanout.watch_token(1, "EQb").await);
        assert!(fanout.watchers_of("EQb").await.is_empty());
        assert!(!fanout.state.lock().await.by_token.contains_key("EQb"));
        assert_eq!(fanout.list_tokens(1).await, vec!["EQa"]);

        assert!(!fanout.watch_token(1, "EQa").await);
        assert!(!fanout.state.lock().await.by_subscriber.contains_key(&1));
        assert_eq!(fanout.watchers_of("EQa").await, HashSet::from([2]));
    }

    #[tokio::test]
    async fn test_global_toggles_are_idempotent() {
        let fanout = NotificationFanout::new(Arc::new(FakeSender::default()));
        assert!(fanout.watch_global(5).await);
        assert!(!fanout.watch_global(5).await);
        assert!(fanout.is_global_watcher(5).await);
        assert!(fanout.unwatch_global(5).await);
        assert!(!fanout.unwatch_global(5).await);
    }

    #[tokio::test]
    async fn test_dispatch_groups_and_isolates_failures() {
        let sender = Arc::new(FakeSender {
            unreachable: HashSet::from([13]),
            ..FakeSender::default()
        });
        let fanout = NotificationFanout::new(sender.clone());

        fanout.watch_token(1, "EQa").await;
        fanout.watch_token(1, "EQb").await;
        fanout.watch_token(13, "EQa").await;
        fanout.watch_global(2).await;
        fanout.watch_global(13).await;

        let snapshot = HotSnapshot::new(vec![
            signal("EQa", "AAA", 120.0),
            signal("EQb", "B<B>", 100.0),
            signal("EQc", "CCC", 90.0),
        ]);
        let report = fanout.dispatch(&snapshot).await;
        assert_eq!(report, DispatchReport { delivered: 2, failed: 2 });

        let sent = sender.sent.lock().unwrap().clone();
        let to_one: Vec<&String> = sent.iter().filter(|(r, _)| *r == 1).map(|(_, t)| t).collect();
        assert_eq!(to_one.len(), 1);
        assert!(to_one[0].contains("AAA"));
        assert!(to_one[0].contains("B&lt;B&gt;"));
        assert!(!to_one[0].contains("CCC"));

        let to_global: Vec<&String> = sent.iter().filter(|(r, _)| *r == 2).map(|(_, t)| t).collect();
        assert_eq!(to_global.len(), 1);
        assert!(to_global[0].contains("1. <b>AAA</b>"));
        assert!(to_global[0].contains("3. <b>CCC</b>"));
    }
}
