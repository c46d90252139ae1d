//! Auto-exit rule types
//!
//! Take-profit / stop-loss rules armed against open positions, and the records
//! exchanged with the external position store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a persisted rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// Rule is armed
    Open,
    /// Rule was cancelled by its owner
    Closed,
    /// Rule fired and the position was handed off for an automatic sale
    AutoSold,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::AutoSold => "auto_sold",
        }
    }

    /// Retired rules never come back on preload
    pub fn is_retired(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "auto_sold" | "autosold" => Ok(Self::AutoSold),
            other => Err(format!("unknown rule status: {}", other)),
        }
    }
}

/// Which branch of a rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitTrigger {
    TakeProfit,
    StopLoss,
}

/// Một quy tắc chốt lời / cắt lỗ cho một vị thế
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRule {
    pub position_id: String,
    pub owner_id: i64,
    pub wallet: String,
    pub token_address: String,
    pub trigger_price_usd: f64,
    pub stop_price_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ExitRule {
    /// Returns the branch that fires at `price_usd`, if any.
    ///
    /// Take-profit wins when both thresholds would match.
    pub fn check(&self, price_usd: f64) -> Option<ExitTrigger> {
        if price_usd >= self.trigger_price_usd {
            return Some(ExitTrigger::TakeProfit);
        }
        match self.stop_price_usd {
            Some(stop) if price_usd <= stop => Some(ExitTrigger::StopLoss),
            _ => None,
        }
    }

    pub fn to_record(&self, status: RuleStatus) -> PersistedRule {
        PersistedRule {
            position_id: self.position_id.clone(),
            owner_id: self.owner_id,
            wallet: self.wallet.clone(),
            token: self.token_address.clone(),
            trigger_price_usd: self.trigger_price_usd,
            stop_price_usd: self.stop_price_usd,
            status,
            created_at: self.created_at,
        }
    }
}

/// Rule record as stored by the external position store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRule {
    pub position_id: String,
    pub owner_id: i64,
    pub wallet: String,
    pub token: String,
    pub trigger_price_usd: f64,
    pub stop_price_usd: Option<f64>,
    pub status: RuleStatus,
    pub created_at: DateTime<Utc>,
}

impl PersistedRule {
    pub fn into_rule(self) -> ExitRule {
        ExitRule {
            position_id: self.position_id,
            owner_id: self.owner_id,
            wallet: self.wallet,
            token_address: self.token,
            trigger_price_usd: self.trigger_price_usd,
            stop_price_usd: self.stop_price_usd,
            created_at: self.created_at,
        }
    }
}

/// Emitted exactly once when a rule fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub rule: ExitRule,
    pub price_usd: f64,
    pub trigger: ExitTrigger,
    pub fired_at: DateTime<Utc>,
}
