/// Configuration module for HyperSniper
///
/// This module defines the configuration structures used throughout the bot:
/// TON endpoints, safety thresholds, cache, hot-candidate scanner, price feed,
/// notifications, auto-exit, API and chain plugins.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::WebhookSubscription;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/bot_config.yaml";

/// Main configuration structure for HyperSniper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// General bot settings
    pub general: GeneralConfig,

    /// TON RPC / WebSocket endpoints
    pub ton: TonConfig,

    /// Safety scoring thresholds
    pub security: SecurityConfig,

    /// Cache backend
    pub cache: CacheConfig,

    /// Hot-candidate scanner
    pub gem_scanner: GemScannerConfig,

    /// External price source
    pub price_feed: PriceFeedConfig,

    /// Chat and webhook delivery
    pub notifications: NotificationConfig,

    /// Auto-exit rule engine
    pub auto_exit: AutoExitConfig,

    /// API configurations
    pub api: ApiConfig,

    /// Chain plugins
    pub plugins: PluginConfig,

    /// Referral payload attached to prepared swaps
    pub referral: ReferralConfig,
}

impl BotConfig {
    /// Reject values that would stall or break the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.ton.rpc_endpoint.trim().is_empty() {
            bail!("ton.rpc_endpoint must not be empty");
        }
        if self.ton.use_websocket && self.ton.ws_endpoint.trim().is_empty() {
            bail!("ton.ws_endpoint must not be empty when use_websocket is enabled");
        }
        if self.security.max_safety_latency_ms == 0 {
            bail!("security.max_safety_latency_ms must be positive");
        }
        if self.gem_scanner.refresh_interval_sec == 0 {
            bail!("gem_scanner.refresh_interval_sec must be positive");
        }
        if self.gem_scanner.max_hot_tokens == 0 {
            bail!("gem_scanner.max_hot_tokens must be positive");
        }
        if self.gem_scanner.snapshot_size == 0 {
            bail!("gem_scanner.snapshot_size must be positive");
        }
        if self.price_feed.interval_sec == 0 {
            bail!("price_feed.interval_sec must be positive");
        }
        if self.auto_exit.max_notify_attempts == 0 {
            bail!("auto_exit.max_notify_attempts must be at least 1");
        }
        Ok(())
    }

    /// Override secrets from the environment (.env is loaded by main)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.notifications.telegram_bot_token = Some(token);
            }
        }
        if let Ok(url) = env::var("REDIS_URL") {
            if !url.trim().is_empty() {
                self.cache.redis_url = Some(url);
            }
        }
        if let Ok(endpoint) = env::var("TON_RPC_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.ton.rpc_endpoint = endpoint;
            }
        }
        if let Ok(endpoint) = env::var("TON_WS_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.ton.ws_endpoint = endpoint;
            }
        }
    }
}

/// General bot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Bot name/identifier
    pub bot_name: String,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Thư mục ghi log xoay vòng theo ngày (None = chỉ stdout)
    pub log_dir: Option<String>,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bot_name: "HyperSniper".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
            enable_metrics: true,
        }
    }
}

/// TON endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TonConfig {
    /// JSON-RPC endpoint
    pub rpc_endpoint: String,

    /// WebSocket endpoint for the minter feed; an `api_key` query parameter is sent as a header
    pub ws_endpoint: String,

    /// mainnet | testnet
    pub network: String,

    /// Disable when minters arrive through the indexer webhook instead
    pub use_websocket: bool,

    /// Fixed delay between reconnect attempts
    pub reconnect_delay_secs: u64,

    /// HTTP timeout for RPC calls
    pub request_timeout_secs: u64,

    /// Timeout for opening the WebSocket
    pub connect_timeout_secs: u64,
}

impl Default for TonConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "https://toncenter.com/api/v2/jsonRPC".to_string(),
            ws_endpoint: "wss://toncenter.com/api/v2/websocket".to_string(),
            network: "mainnet".to_string(),
            use_websocket: true,
            reconnect_delay_secs: 3,
            request_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl TonConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Safety scoring thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Overall deadline for one evaluation
    pub max_safety_latency_ms: u64,

    /// Minimum liquidity in USD before a penalty applies
    pub min_liquidity_usd: f64,

    /// Minimum 5 minute volume in USD before a penalty applies
    pub min_volume_5m_usd: f64,

    /// Owner addresses that force a zero score
    pub blacklist_addresses: Vec<String>,

    /// Known profitable early buyers
    pub trusted_smart_money: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_safety_latency_ms: 600,
            min_liquidity_usd: 5_000.0,
            min_volume_5m_usd: 20_000.0,
            blacklist_addresses: Vec::new(),
            trusted_smart_money: Vec::new(),
        }
    }
}

impl SecurityConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.max_safety_latency_ms)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache type (redis, memory)
    pub cache_type: String,

    /// Redis URL (if using redis)
    pub redis_url: Option<String>,

    /// Maximum memory cache items
    pub memory_max_items: usize,

    /// TTL of cached safety reports in seconds
    pub default_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: "memory".to_string(),
            redis_url: None,
            memory_max_items: 10_000,
            default_ttl: 30,
        }
    }
}

/// Hot-candidate scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GemScannerConfig {
    /// Snapshot push cadence
    pub refresh_interval_sec: u64,

    /// Maximum size of the hot set
    pub max_hot_tokens: usize,

    /// Acceptance floor for liquidity
    pub min_liquidity_usd: f64,

    /// Acceptance floor for 5 minute volume
    pub min_volume_5m_usd: f64,

    /// Number of entries in each pushed snapshot
    pub snapshot_size: usize,
}

impl Default for GemScannerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_sec: 15,
            max_hot_tokens: 10,
            min_liquidity_usd: 5_000.0,
            min_volume_5m_usd: 20_000.0,
            snapshot_size: 10,
        }
    }
}

/// External price source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceFeedConfig {
    pub enabled: bool,

    /// Poll cadence
    pub interval_sec: u64,

    /// Tracked tokens are appended comma-separated
    pub source_url: String,

    /// HTTP timeout in seconds
    pub request_timeout: u64,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_sec: 10,
            source_url: "https://tonapi.io/v2/rates?tokens=".to_string(),
            request_timeout: 5,
        }
    }
}

/// Chat and webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Telegram bot token; without it messages are only logged
    pub telegram_bot_token: Option<String>,

    /// Timeout for each webhook POST
    pub webhook_timeout_ms: u64,

    /// Webhooks registered from the config file
    pub webhooks: Vec<WebhookSubscription>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            webhook_timeout_ms: 3_000,
            webhooks: Vec::new(),
        }
    }
}

/// Auto-exit rule engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoExitConfig {
    /// Store backend for rules and signals (memory, redis)
    pub store_type: String,

    /// Attempts per listener when a rule fires
    pub max_notify_attempts: u32,

    /// Pause between attempts
    pub notify_retry_ms: u64,
}

impl Default for AutoExitConfig {
    fn default() -> Self {
        Self {
            store_type: "memory".to_string(),
            max_notify_attempts: 3,
            notify_retry_ms: 200,
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enable API server
    pub enable_api: bool,

    /// API server port
    pub port: u16,

    /// Required in the `X-API-Key` header for webhook registration when set
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_api: true,
            port: 3000,
            api_key: None,
        }
    }
}

/// Chain plugins to initialise, by registry name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub enabled: Vec<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["ton".to_string()],
        }
    }
}

/// Referral payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    pub omniston_payload: Option<String>,
}

/// Configuration manager for handling config loading/saving
pub struct ConfigManager {
    /// Current configuration
    config: RwLock<BotConfig>,

    /// Configuration file path
    pub config_path: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new(config_path: &str) -> Self {
        Self {
            config: RwLock::new(BotConfig::default()),
            config_path: config_path.to_string(),
        }
    }

    /// Load configuration from file, then apply environment overrides
    pub async fn load(&self) -> Result<()> {
        let path = Path::new(&self.config_path);

        let mut config = if path.exists() {
            let config_content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file: {}", self.config_path))?;
            let config: BotConfig = serde_yaml::from_str(&config_content)
                .context("Failed to parse configuration file")?;
            info!("Configuration loaded from {}", self.config_path);
            config
        } else {
            warn!("Configuration file {} not found, using default configuration", self.config_path);
            BotConfig::default()
        };

        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;

        *self.config.write().await = config;
        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_yaml = serde_yaml::to_string(&*config)
            .context("Failed to serialize configuration")?;

        let path = Path::new(&self.config_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        fs::write(path, config_yaml)
            .with_context(|| format!("Failed to write configuration to file: {}", self.config_path))?;

        info!("Configuration saved to {}", self.config_path);
        Ok(())
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> BotConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration and persist it
    pub async fn update_config(&self, config: BotConfig) -> Result<()> {
        config.validate().context("Refusing to store invalid configuration")?;
        *self.config.write().await = config;
        self.save().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.general.bot_name, "HyperSniper");
        assert_eq!(config.security.max_safety_latency_ms, 600);
        assert_eq!(config.security.min_liquidity_usd, 5_000.0);
        assert_eq!(config.security.min_volume_5m_usd, 20_000.0);
        assert_eq!(config.cache.default_ttl, 30);
        assert_eq!(config.gem_scanner.refresh_interval_sec, 15);
        assert_eq!(config.gem_scanner.max_hot_tokens, 10);
        assert_eq!(config.ton.reconnect_delay_secs, 3);
        assert_eq!(config.notifications.webhook_timeout_ms, 3_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = "security:\n  min_liquidity_usd: 1000.0\ngem_scanner:\n  max_hot_tokens: 3\n";
        let config: BotConfig = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(config.security.min_liquidity_usd, 1_000.0);
        assert_eq!(config.security.max_safety_latency_ms, 600);
        assert_eq!(config.gem_scanner.max_hot_tokens, 3);
        assert_eq!(config.gem_scanner.refresh_interval_sec, 15);
    }

    #[test]
    fn test_validate_rejects_zero_refresh() {
        let mut config = BotConfig::default();
        config.gem_scanner.refresh_interval_sec = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_snapshot() {
        let mut config = BotConfig::default();
        config.gem_scanner.snapshot_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("snapshot_size"));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("hypersniper-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("bot_config.yaml");
        let path_str = path.to_string_lossy().to_string();

        let manager = ConfigManager::new(&path_str);
        let mut config = BotConfig::default();
        config.security.trusted_smart_money = vec!["EQsmart".to_string()];
        manager.update_config(config).await.expect("save config");

        let reloaded = ConfigManager::new(&path_str);
        reloaded.load().await.expect("load config");
        let loaded = reloaded.get_config().await;
        assert_eq!(loaded.security.trusted_smart_money, vec!["EQsmart".to_string()]);

        let _ = fs::remove_dir_all(dir);
    }
}
