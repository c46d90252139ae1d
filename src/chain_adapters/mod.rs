//! Module chain_adapters
//!
//! Module này chịu trách nhiệm kết nối với blockchain:
//! - ton_adapter: JSON-RPC đọc dữ liệu on-chain (getJettonData, simulate, estimateFee)
//! - ton_feed: luồng sự kiện minter mới qua WebSocket, tự kết nối lại
//! - indexer: chuyển payload webhook của indexer thành `MinterEvent`
//! - sol_adapter: plugin Solana/Base (stub)
//!
//! Chain plugins are registered explicitly in `PluginRegistry` and selected by
//! the `plugins.enabled` config list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::errors::{Result, SniperError};
use crate::types::ChainKind;

pub mod indexer;
pub mod sol_adapter;
pub mod ton_adapter;
pub mod ton_feed;

pub use indexer::IndexerWebhookPayload;
pub use sol_adapter::{BasePlugin, SolanaPlugin};
pub use ton_adapter::{is_valid_ton_address, OnChainReader, TonAdapter};
pub use ton_feed::{FeedConnection, FeedTransport, MinterConsumer, MinterFeed, WsTransport};

/// What a plugin gets at init time
#[derive(Clone)]
pub struct PluginContext {
    pub config: BotConfig,
    pub reader: Option<Arc<dyn OnChainReader>>,
}

impl PluginContext {
    pub fn new(config: BotConfig) -> Self {
        Self { config, reader: None }
    }

    pub fn with_reader(mut self, reader: Arc<dyn OnChainReader>) -> Self {
        self.reader = Some(reader);
        self
    }
}

/// Capability interface of a chain integration
#[async_trait]
pub trait ChainPlugin: Send + Sync + 'static {
    fn chain(&self) -> ChainKind;

    fn name(&self) -> &'static str {
        self.chain().name()
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()>;
}

/// TON plugin: checks the endpoints and network the pipeline will use
#[derive(Debug, Default)]
pub struct TonPlugin;

#[async_trait]
impl ChainPlugin for TonPlugin {
    fn chain(&self) -> ChainKind {
        ChainKind::Ton
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()> {
        let ton = &ctx.config.ton;
        if !matches!(ton.network.as_str(), "mainnet" | "testnet") {
            return Err(SniperError::ValidationError(format!(
                "unsupported TON network: {}",
                ton.network
            )));
        }
        if ctx.reader.is_none() {
            warn!("TON plugin initialised without an on-chain reader");
        }
        info!(
            "TON plugin ready (network {}, rpc {}, websocket {})",
            ton.network,
            ton.rpc_endpoint,
            if ton.use_websocket { ton.ws_endpoint.as_str() } else { "disabled" }
        );
        Ok(())
    }
}

/// Registry of known chain plugins
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ChainPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every plugin compiled into this binary
    pub fn with_known() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TonPlugin));
        registry.register(Arc::new(SolanaPlugin));
        registry.register(Arc::new(BasePlugin));
        registry
    }

    /// Thêm plugin; plugin cùng tên sẽ bị thay thế
    pub fn register(&mut self, plugin: Arc<dyn ChainPlugin>) {
        self.plugins.retain(|p| p.name() != plugin.name());
        self.plugins.push(plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChainPlugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Init every enabled plugin. Unknown names and failing plugins are logged
    /// and skipped; the names that initialised are returned.
    pub async fn init_enabled(&self, ctx: &PluginContext, enabled: &[String]) -> Vec<&'static str> {
        let mut ready = Vec::new();
        for name in enabled {
            let Some(plugin) = self.get(name.trim()) else {
                warn!("Unknown chain plugin '{}', known: {:?}", name, self.names());
                continue;
            };
            match plugin.init(ctx).await {
                Ok(()) => ready.push(plugin.name()),
                Err(e) => error!("Chain plugin {} failed to initialise: {}", plugin.name(), e),
            }
        }
        ready
    }
}
