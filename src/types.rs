//! Types module
//!
//! Module này định nghĩa các kiểu dữ liệu dùng chung trong hypersniper: khóa sắp xếp,
//! bộ lọc của hot set, đăng ký webhook và loại chain mà plugin phục vụ.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SniperError};

/// Chat/subscriber identifier (Telegram chat id)
pub type SubscriberId = i64;

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainKind {
    /// The Open Network
    Ton,

    /// Solana (stub plugin)
    Solana,

    /// Base (stub plugin)
    Base,
}

impl ChainKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChainKind::Ton => "ton",
            ChainKind::Solana => "solana",
            ChainKind::Base => "base",
        }
    }
}

/// Sort key of the ranked view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Composite ranking score
    Score,
    /// 5 minute volume
    Volume,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Score
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Score => f.write_str("score"),
            SortKey::Volume => f.write_str("volume"),
        }
    }
}

impl FromStr for SortKey {
    type Err = SniperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "score" => Ok(SortKey::Score),
            "volume" => Ok(SortKey::Volume),
            other => Err(SniperError::ValidationError(format!("unknown sort key: {}", other))),
        }
    }
}

/// Runtime filters applied on every read of the hot set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalFilters {
    pub min_score: f64,
    pub lp_burned_only: bool,
    pub smart_money_min: u32,
    pub sort_key: SortKey,
}

impl Default for SignalFilters {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            lp_burned_only: false,
            smart_money_min: 0,
            sort_key: SortKey::Score,
        }
    }
}

impl SignalFilters {
    pub fn validate(&self) -> Result<()> {
        if !self.min_score.is_finite() || self.min_score < 0.0 {
            return Err(SniperError::ValidationError(format!(
                "min_score must be a non-negative number, got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// External webhook consumer of the periodic snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub subscriber_id: String,
    pub callback_url: String,
    /// Snapshot is delivered only when its leading score reaches this value
    #[serde(default = "default_webhook_min_score")]
    pub min_score: f64,
}

fn default_webhook_min_score() -> f64 {
    60.0
}

impl WebhookSubscription {
    pub fn new(subscriber_id: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            callback_url: callback_url.into(),
            min_score: default_webhook_min_score(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.callback_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SniperError::ValidationError(format!(
                "callback_url must be http(s): {}",
                self.callback_url
            )));
        }
        if !self.min_score.is_finite() {
            return Err(SniperError::ValidationError("min_score must be finite".to_string()));
        }
        Ok(())
    }

    pub fn accepts(&self, leading_score: f64) -> bool {
        self.min_score <= leading_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parse() {
        assert_eq!("Volume".parse::<SortKey>().ok(), Some(SortKey::Volume));
        assert!("age".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_webhook_defaults() {
        let sub: WebhookSubscription =
            serde_json::from_str(r#"{"subscriber_id":"7","callback_url":"https://example.org/hook"}"#)
                .expect("parse subscription");
        assert_eq!(sub.min_score, 60.0);
        assert!(sub.validate().is_ok());
        assert!(sub.accepts(60.0));
        assert!(!sub.accepts(59.9));
        assert!(WebhookSubscription::new("1", "ftp://nope").validate().is_err());
    }

    #[test]
    fn test_filters_reject_negative_score() {
        let filters = SignalFilters {
            min_score: -1.0,
            ..SignalFilters::default()
        };
        assert!(filters.validate().is_err());
    }
}
