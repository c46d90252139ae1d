//! Jetton signal types
//!
//! Types that flow through the signal pipeline: the minter event decoded from the
//! chain feed, the safety report produced by the scorer, the ranked signal kept in
//! the hot set and the snapshot that is pushed to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Số giây để một jetton còn được coi là "mới"
pub const NEW_TOKEN_MAX_AGE_SECS: i64 = 7_200;

/// A freshly deployed jetton minter, as seen on the chain feed or the indexer webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinterEvent {
    /// Minter contract address
    pub address: String,
    /// Admin/owner address reported by the source, if any
    pub owner_address: Option<String>,
    /// Total supply in minimal units
    pub total_supply: Option<u128>,
    /// Ticker symbol
    pub symbol: Option<String>,
    /// Unix timestamp of the deploy event
    pub timestamp_unix: i64,
    /// Raw attributes of the source frame, kept for sub-checks that read extra fields
    pub raw: Value,
}

impl MinterEvent {
    /// Display label: symbol, or the address tail when the symbol is unknown
    pub fn label(&self) -> String {
        match &self.symbol {
            Some(symbol) if !symbol.is_empty() => symbol.clone(),
            _ => address_tail(&self.address),
        }
    }
}

/// Result of a safety evaluation for one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    /// Score in [0, 100]
    pub score: f64,
    /// Human readable reasons, in the order they contributed
    pub reasons: Vec<String>,
    pub liquidity_usd: f64,
    pub volume_5m_usd: f64,
    pub smart_money_hits: u32,
    pub lp_burned: bool,
    pub is_new: bool,
    pub owner: Option<String>,
}

/// A vetted candidate held in the hot set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub address: String,
    pub symbol: Option<String>,
    /// Composite ranking score (may exceed 100)
    pub score: f64,
    /// Labels in insertion order, without duplicates
    pub tags: Vec<String>,
    pub report: SafetyReport,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn label(&self) -> String {
        match &self.symbol {
            Some(symbol) if !symbol.is_empty() => symbol.clone(),
            _ => address_tail(&self.address),
        }
    }

    /// Wire form used by the outbound webhook and the `gem:top` cache entry
    pub fn as_payload(&self) -> SignalPayload {
        SignalPayload {
            address: self.address.clone(),
            symbol: self.symbol.clone().unwrap_or_else(|| "???".to_string()),
            score: (self.score * 100.0).round() / 100.0,
            tags: self.tags.clone(),
            liquidity_usd: self.report.liquidity_usd,
            volume_5m_usd: self.report.volume_5m_usd,
            smart_money: self.report.smart_money_hits,
            lp_burned: self.report.lp_burned,
            is_new: self.report.is_new,
        }
    }
}

/// One entry of the outbound webhook payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub address: String,
    pub symbol: String,
    pub score: f64,
    pub tags: Vec<String>,
    pub liquidity_usd: f64,
    pub volume_5m_usd: f64,
    pub smart_money: u32,
    pub lp_burned: bool,
    pub is_new: bool,
}

/// Body POSTed to webhook subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub tokens: Vec<SignalPayload>,
}

/// Immutable, time-stamped view of the ranked hot set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotSnapshot {
    pub taken_at: DateTime<Utc>,
    pub signals: Vec<Signal>,
}

impl HotSnapshot {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            taken_at: Utc::now(),
            signals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Score of the first (best ranked) signal
    pub fn leading_score(&self) -> Option<f64> {
        self.signals.first().map(|s| s.score)
    }

    pub fn webhook_payload(&self) -> WebhookPayload {
        WebhookPayload {
            tokens: self.signals.iter().map(Signal::as_payload).collect(),
        }
    }
}

/// Last six characters of an address, used when no symbol is known
pub fn address_tail(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    let start = chars.len().saturating_sub(6);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SafetyReport {
        SafetyReport {
            is_safe: true,
            score: 82.0,
            reasons: vec!["LP burned".to_string()],
            liquidity_usd: 8_000.0,
            volume_5m_usd: 25_000.0,
            smart_money_hits: 1,
            lp_burned: true,
            is_new: true,
            owner: None,
        }
    }

    #[test]
    fn test_payload_rounds_score_and_defaults_symbol() {
        let signal = Signal {
            address: "EQabcdef123456".to_string(),
            symbol: None,
            score: 123.45678,
            tags: vec!["LP burned".to_string()],
            report: report(),
            created_at: Utc::now(),
        };

        let payload = signal.as_payload();
        assert_eq!(payload.symbol, "???");
        assert_eq!(payload.score, 123.46);
        assert_eq!(payload.smart_money, 1);
        assert_eq!(signal.label(), "123456");
    }

    #[test]
    fn test_safety_report_survives_bincode() {
        let original = report();
        let bytes = bincode::serialize(&original).expect("serialize");
        let decoded: SafetyReport = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_snapshot_leading_score() {
        assert_eq!(HotSnapshot::new(Vec::new()).leading_score(), None);
    }
}
