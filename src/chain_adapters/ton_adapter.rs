// TON Blockchain Adapter
//
// JSON-RPC client for the on-chain reads the pipeline needs:
// - getJettonData (contract data of a minter)
// - simulateMessageProcess (honeypot detection)
// - estimateFee (fee quote for prepared swaps)
//
// Every call goes through the `OnChainReader` trait so the scorer and the swap
// service can be exercised against fakes.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::TonConfig;
use crate::errors::{Result, SniperError};

/// Raw form `wc:hex64`
static RAW_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+:[0-9a-fA-F]{64}$").expect("raw address regex"));

/// User-friendly base64url form, 48 chars
static FRIENDLY_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-+/]{48}$").expect("friendly address regex"));

/// Kiểm tra định dạng địa chỉ TON (raw hoặc user-friendly)
pub fn is_valid_ton_address(address: &str) -> bool {
    let address = address.trim();
    RAW_ADDRESS.is_match(address) || FRIENDLY_ADDRESS.is_match(address)
}

/// On-chain reads used by the scorer and the swap service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OnChainReader: Send + Sync + 'static {
    /// Contract data of a jetton minter
    async fn read_contract_data(&self, address: &str) -> Result<Value>;

    /// Simulate an inbound message against `address`
    async fn simulate_transaction(&self, payload: &str, address: &str) -> Result<Value>;

    /// Fee estimate for a serialized message
    async fn estimate_fee(&self, payload: &str) -> Result<Value>;
}

/// TON adapter for interacting with the TON JSON-RPC endpoint
pub struct TonAdapter {
    /// HTTP client with request timeout
    client: Client,

    /// JSON-RPC endpoint
    rpc_endpoint: String,

    /// mainnet | testnet
    network: String,
}

impl TonAdapter {
    /// Create a new TON adapter from configuration
    pub fn new(config: &TonConfig) -> Self {
        let client = match Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build HTTP client for TON RPC: {}. Using default client", e);
                Client::new()
            }
        };

        Self {
            client,
            rpc_endpoint: config.rpc_endpoint.clone(),
            network: config.network.clone(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_endpoint
    }

    /// Thực hiện một lời gọi JSON-RPC và trả về trường `result`
    pub async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!("TON RPC call {}", method);
        let response = self
            .client
            .post(&self.rpc_endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SniperError::UpstreamUnavailable(format!("RPC {}: {}", method, e)))?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(SniperError::UpstreamUnavailable(format!(
                "RPC {} returned HTTP {}: {}",
                method, status, text
            )));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(SniperError::UpstreamError {
                code: i64::from(status.as_u16()),
                message: format!("RPC {} returned HTTP {}: {}", method, status, text),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SniperError::TransportFailure(format!("RPC {} body: {}", method, e)))?;

        parse_rpc_envelope(method, body)
    }
}

/// Split a JSON-RPC response into result or error
pub fn parse_rpc_envelope(method: &str, body: Value) -> Result<Value> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(SniperError::UpstreamError {
            code,
            message: format!("RPC {}: {}", method, message),
        });
    }
    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl OnChainReader for TonAdapter {
    async fn read_contract_data(&self, address: &str) -> Result<Value> {
        self.rpc_call(
            "getJettonData",
            json!({ "address": address, "network": self.network }),
        )
        .await
    }

    async fn simulate_transaction(&self, payload: &str, address: &str) -> Result<Value> {
        self.rpc_call(
            "simulateMessageProcess",
            json!({ "address": address, "boc": payload, "network": self.network }),
        )
        .await
    }

    async fn estimate_fee(&self, payload: &str) -> Result<Value> {
        self.rpc_call(
            "estimateFee",
            json!({ "boc": payload, "network": self.network }),
        )
        .await
    }
}
