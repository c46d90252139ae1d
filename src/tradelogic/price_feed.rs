//! Price feed poller
//!
//! Hỏi giá USD của các token đang có quy tắc auto-exit và đẩy từng cặp
//! (token, giá) vào `AutoExitEngine::on_price_update`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use common::ExitEvent;

use crate::config::PriceFeedConfig;
use crate::errors::{Result, SniperError};
use crate::tradelogic::auto_exit::AutoExitEngine;

/// Parse a rates response.
///
/// Accepts `{"rates": [{"token", "prices": {"usd"}}]}` and the keyed form
/// `{"rates": {"<token>": {"prices": {"USD"}}}}`.
pub fn parse_rates(body: &Value) -> Vec<(String, f64)> {
    let usd = |entry: &Value| {
        let prices = entry.get("prices")?;
        prices
            .get("USD")
            .or_else(|| prices.get("usd"))
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite())
    };

    match body.get("rates") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let token = item.get("token").and_then(Value::as_str)?;
                Some((token.to_string(), usd(item)?))
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(token, entry)| Some((token.clone(), usd(entry)?)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Polls the external price source for every tracked token
pub struct PriceFeedService {
    engine: Arc<AutoExitEngine>,
    client: Client,
    config: PriceFeedConfig,
}

impl PriceFeedService {
    pub fn new(engine: Arc<AutoExitEngine>, config: PriceFeedConfig) -> Self {
        let client = match Client::builder()
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build HTTP client for price feed: {}. Using default client", e);
                Client::new()
            }
        };
        Self { engine, client, config }
    }

    /// Push already fetched prices into the rule engine
    pub async fn apply_rates(&self, rates: &[(String, f64)]) -> Vec<ExitEvent> {
        let mut fired = Vec::new();
        for (token, price) in rates {
            fired.extend(self.engine.on_price_update(token, *price).await);
        }
        fired
    }

    /// One poll cycle; returns the number of prices applied
    pub async fn poll_once(&self) -> Result<usize> {
        let tokens = self.engine.list_tracked_tokens().await;
        if tokens.is_empty() {
            return Ok(0);
        }

        let url = format!(
            "{}{}",
            self.config.source_url,
            tokens.into_iter().collect::<Vec<_>>().join(",")
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SniperError::UpstreamError {
                code: i64::from(status.as_u16()),
                message: format!("price source returned HTTP {}", status),
            });
        }

        let body: Value = response.json().await?;
        let rates = parse_rates(&body);
        debug!("Price feed returned {} rates", rates.len());

        let fired = self.apply_rates(&rates).await;
        if !fired.is_empty() {
            info!("Price update fired {} exit rules", fired.len());
        }
        Ok(rates.len())
    }

    /// Poll every `interval_sec` until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.interval_sec);
        info!("Price feed started (every {:?})", interval);

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

            if let Err(e) = self.poll_once().await {
                warn!("Price feed cycle skipped: {}", e);
            }
        }

        info!("Price feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoExitConfig;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn service(source_url: &str) -> (Arc<AutoExitEngine>, PriceFeedService) {
        let engine = Arc::new(AutoExitEngine::new(
            Arc::new(MemoryStore::new()),
            &AutoExitConfig::default(),
        ));
        let config = PriceFeedConfig {
            source_url: source_url.to_string(),
            request_timeout: 1,
            ..PriceFeedConfig::default()
        };
        (engine.clone(), PriceFeedService::new(engine, config))
    }

    #[test]
    fn test_parse_rates_both_shapes() {
        let list = json!({"rates": [
            {"token": "EQa", "prices": {"usd": 1.5}},
            {"token": "EQb", "prices": {}},
        ]});
        assert_eq!(parse_rates(&list), vec![("EQa".to_string(), 1.5)]);

        let keyed = json!({"rates": {"EQc": {"prices": {"USD": 0.02}}}});
        assert_eq!(parse_rates(&keyed), vec![("EQc".to_string(), 0.02)]);

        assert!(parse_rates(&json!({"error": "rate limited"})).is_empty());
    }

    #[tokio::test]
    async fn test_no_tracked_tokens_skips_request() {
        let (_engine, service) = service("http://127.0.0.1:9/rates?tokens=");
        assert_eq!(service.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_an_error() {
        let (engine, service) = service("http://127.0.0.1:9/rates?tokens=");
        engine.arm("pos", 1, "EQw", "EQt", 2.0, None).await.unwrap();
        assert!(service.poll_once().await.is_err());
        assert_eq!(engine.len().await, 1);
    }

    #[tokio::test]
    async fn test_apply_rates_fires_rules() {
        let (engine, service) = service("http://127.0.0.1:9/rates?tokens=");
        engine.arm("pos", 1, "EQw", "EQt", 2.0, None).await.unwrap();

        let fired = service
            .apply_rates(&[("EQother".to_string(), 5.0), ("EQt".to_string(), 2.1)])
            .await;
        assert_eq!(fired.len(), 1);
        assert!(engine.is_empty().await);
    }
}
