//! Indexer webhook ingestion
//!
//! An external indexer can push freshly deployed minters over HTTP instead of the
//! WebSocket feed. The payload is converted into the same `MinterEvent` the feed
//! produces, so the rest of the pipeline cannot tell the two sources apart.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::MinterEvent;

/// The only event type that is processed
pub const MINTER_DEPLOYED_EVENT: &str = "jetton_minter_deployed";

/// Source marker stored in the raw attributes
pub const INDEXER_SOURCE: &str = "hypersniper_indexer";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerJetton {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: u32,
    /// Decimal string, may exceed u64
    pub total_supply: Option<String>,
    pub content_uri: Option<String>,
}

impl Default for IndexerJetton {
    fn default() -> Self {
        Self {
            name: None,
            symbol: None,
            decimals: 9,
            total_supply: None,
            content_uri: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerAdmin {
    pub address: Option<String>,
    pub is_contract: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerFlags {
    pub mintable: bool,
    pub verified_by_interface: bool,
    pub known_code_hash: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerMeta {
    pub block_unixtime: Option<i64>,
    pub indexer_unixtime: Option<i64>,
    pub latency_ms: Option<u64>,
    pub minter_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerLinks {
    pub tonviewer: Option<String>,
    pub tonscan: Option<String>,
    pub dexscreener: Option<String>,
}

/// Body of `POST /api/indexer/event`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerWebhookPayload {
    pub event: String,
    pub minter_address: String,
    #[serde(default)]
    pub workchain: i32,
    #[serde(default)]
    pub seqno: Option<u64>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub tx_lt: Option<String>,
    #[serde(default)]
    pub code_hash: Option<String>,
    #[serde(default)]
    pub jetton: IndexerJetton,
    #[serde(default)]
    pub admin: IndexerAdmin,
    #[serde(default)]
    pub flags: IndexerFlags,
    #[serde(default)]
    pub meta: IndexerMeta,
    #[serde(default)]
    pub links: IndexerLinks,
}

impl IndexerWebhookPayload {
    pub fn is_minter_deployed(&self) -> bool {
        self.event == MINTER_DEPLOYED_EVENT
    }

    /// Convert into a feed-equivalent event; `None` for other event types
    pub fn into_minter_event(self) -> Option<MinterEvent> {
        if !self.is_minter_deployed() {
            return None;
        }

        let timestamp_unix = self
            .meta
            .block_unixtime
            .unwrap_or_else(|| Utc::now().timestamp());

        let raw = json!({
            "source": INDEXER_SOURCE,
            "code_hash": self.code_hash,
            "tx_hash": self.tx_hash,
            "workchain": self.workchain,
            "seqno": self.seqno,
            "latency_ms": self.meta.latency_ms,
            "minter_type": self.meta.minter_type,
            "flags": self.flags,
            "links": self.links,
            "jetton_name": self.jetton.name,
            "decimals": self.jetton.decimals,
            "content_uri": self.jetton.content_uri,
            "timestamp": timestamp_unix,
        });

        Some(MinterEvent {
            address: self.minter_address,
            owner_address: self.admin.address.filter(|a| !a.trim().is_empty()),
            total_supply: self
                .jetton
                .total_supply
                .as_deref()
                .and_then(|s| s.trim().parse::<u128>().ok()),
            symbol: self.jetton.symbol.filter(|s| !s.trim().is_empty()),
            timestamp_unix,
            raw,
        })
    }
}
