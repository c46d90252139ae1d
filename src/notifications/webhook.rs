//! Outbound webhook delivery
//!
//! Mỗi subscriber đăng ký một callback URL và ngưỡng điểm; snapshot chỉ được
//! POST khi điểm của tín hiệu đứng đầu đạt ngưỡng đó.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{HotSnapshot, WebhookPayload};

use crate::errors::{Result, SniperError};
use crate::metric;
use crate::tradelogic::SnapshotListener;
use crate::types::WebhookSubscription;

pub struct WebhookDispatcher {
    client: Client,
    timeout: Duration,
    subs: RwLock<HashMap<String, WebhookSubscription>>,
}

impl WebhookDispatcher {
    pub fn new(timeout_ms: u64) -> Self {
        let timeout = Duration::from_millis(timeout_ms.max(1));
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!("Failed to build webhook HTTP client: {}. Using default client", e);
            Client::new()
        });
        Self {
            client,
            timeout,
            subs: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace the subscription of `subscriber_id`
    pub async fn register(&self, subscription: WebhookSubscription) -> Result<()> {
        subscription.validate()?;
        let previous = self
            .subs
            .write()
            .await
            .insert(subscription.subscriber_id.clone(), subscription.clone());
        if previous.is_some() {
            info!("Webhook of {} replaced", subscription.subscriber_id);
        } else {
            info!(
                "Webhook registered for {} -> {}",
                subscription.subscriber_id, subscription.callback_url
            );
        }
        Ok(())
    }

    pub async fn unregister(&self, subscriber_id: &str) -> bool {
        self.subs.write().await.remove(subscriber_id).is_some()
    }

    pub async fn list(&self) -> Vec<WebhookSubscription> {
        let mut subs: Vec<WebhookSubscription> = self.subs.read().await.values().cloned().collect();
        subs.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        subs
    }

    /// POST the snapshot to every subscriber whose threshold the leading score reaches.
    /// Returns the number of successful deliveries.
    pub async fn deliver(&self, snapshot: &HotSnapshot) -> usize {
        let leading = match snapshot.leading_score() {
            Some(score) => score,
            None => return 0,
        };

        let targets: Vec<WebhookSubscription> = self
            .subs
            .read()
            .await
            .values()
            .filter(|sub| sub.accepts(leading))
            .cloned()
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let payload = snapshot.webhook_payload();
        let results = join_all(targets.iter().map(|sub| self.post(sub, &payload))).await;

        let mut delivered = 0;
        for (sub, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    delivered += 1;
                    metric::record_delivery("webhook", true);
                }
                Err(e) => {
                    metric::record_delivery("webhook", false);
                    warn!("Webhook delivery to {} failed: {}", sub.subscriber_id, e);
                }
            }
        }
        debug!("Webhook snapshot delivered to {}/{}", delivered, targets.len());
        delivered
    }

    async fn post(&self, sub: &WebhookSubscription, payload: &WebhookPayload) -> Result<()> {
        let response = self
            .client
            .post(&sub.callback_url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| SniperError::delivery(&sub.subscriber_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SniperError::delivery(&sub.subscriber_id, format!("HTTP {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotListener for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_snapshot(&self, snapshot: &HotSnapshot) -> Result<()> {
        self.deliver(snapshot).await;
        Ok(())
    }
}
