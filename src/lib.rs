//! HyperSniper library
//!
//! Signal pipeline for new TON jettons: the chain feed delivers minter events, the
//! safety checker scores them within a latency budget, the gem scanner keeps a
//! bounded ranked hot set and pushes snapshots to chat watchers and webhooks.
//! Independently, the auto-exit engine fires take-profit / stop-loss rules from
//! a polled price feed.

pub mod analys;
pub mod api;
pub mod cache;
pub mod chain_adapters;
pub mod config;
pub mod errors;
pub mod metric;
pub mod notifications;
pub mod storage;
pub mod tradelogic;
pub mod types;

pub use common::{ExitEvent, ExitRule, HotSnapshot, MinterEvent, SafetyReport, Signal};
pub use errors::SniperError;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::analys::SafetyChecker;
use crate::api::ApiState;
use crate::cache::{create_cache_provider, CacheProvider};
use crate::chain_adapters::{
    MinterFeed, OnChainReader, PluginContext, PluginRegistry, TonAdapter, WsTransport,
};
use crate::config::ConfigManager;
use crate::notifications::{create_sender, AutoExitNotifier, NotificationFanout, WebhookDispatcher};
use crate::storage::create_stores;
use crate::tradelogic::{AutoExitEngine, GemPipeline, GemScanner, PriceFeedService, SwapService};

/// Current version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long `stop` waits for background tasks
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Application state: every service object, built once and shared as `Arc` handles
pub struct AppState {
    pub config: Arc<ConfigManager>,
    pub reader: Arc<dyn OnChainReader>,
    pub cache: Arc<dyn CacheProvider>,
    pub checker: Arc<SafetyChecker>,
    pub scanner: Arc<GemScanner>,
    pub pipeline: Arc<GemPipeline>,
    /// None khi `ton.use_websocket` tắt (chỉ nhận sự kiện qua indexer webhook)
    pub feed: Option<Arc<MinterFeed>>,
    pub fanout: Arc<NotificationFanout>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub auto_exit: Arc<AutoExitEngine>,
    pub price_feed: Arc<PriceFeedService>,
    pub swap: Arc<SwapService>,
    /// Chain plugins that initialised
    pub active_plugins: Vec<&'static str>,

    shutdown_tx: watch::Sender<bool>,
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Build and wire every component from the loaded configuration
    pub async fn init(config_manager: Arc<ConfigManager>) -> Result<Self> {
        info!("Initializing HyperSniper");
        let config = config_manager.get_config().await;
        config.validate().context("Invalid configuration")?;

        metric::init_metrics(config.general.enable_metrics)?;

        let reader: Arc<dyn OnChainReader> = Arc::new(TonAdapter::new(&config.ton));

        let plugins = PluginRegistry::with_known();
        let ctx = PluginContext::new(config.clone()).with_reader(reader.clone());
        let active_plugins = plugins.init_enabled(&ctx, &config.plugins.enabled).await;
        if !active_plugins.contains(&"ton") {
            warn!("TON plugin is not active, plugins ready: {:?}", active_plugins);
        }
        debug!("Chain plugins initialized: {:?}", active_plugins);

        let cache = create_cache_provider(&config.cache);
        let stores = create_stores(&config.auto_exit.store_type, config.cache.redis_url.as_deref());

        let checker = Arc::new(SafetyChecker::new(
            reader.clone(),
            cache.clone(),
            config.security.clone(),
            config.cache.default_ttl,
        ));
        let scanner = Arc::new(
            GemScanner::new(config.gem_scanner.clone(), cache.clone())
                .with_signal_store(stores.signals.clone()),
        );
        let pipeline = Arc::new(GemPipeline::new(checker.clone(), scanner.clone()));

        let sender = create_sender(config.notifications.telegram_bot_token.as_deref());
        let fanout = Arc::new(NotificationFanout::new(sender.clone()));
        let webhooks = Arc::new(WebhookDispatcher::new(config.notifications.webhook_timeout_ms));
        for subscription in &config.notifications.webhooks {
            if let Err(e) = webhooks.register(subscription.clone()).await {
                warn!("Skipping configured webhook {}: {}", subscription.subscriber_id, e);
            }
        }
        scanner.add_listener(fanout.clone()).await;
        scanner.add_listener(webhooks.clone()).await;

        let auto_exit = Arc::new(AutoExitEngine::new(stores.rules.clone(), &config.auto_exit));
        auto_exit
            .add_listener(Arc::new(AutoExitNotifier::new(sender)))
            .await;
        match auto_exit.preload().await {
            Ok(count) => info!("Restored {} open exit rules", count),
            Err(e) => warn!("Could not restore exit rules: {}", e),
        }

        let feed = if config.ton.use_websocket {
            let feed = Arc::new(MinterFeed::new(
                Arc::new(WsTransport::new(&config.ton)),
                &config.ton.network,
                config.ton.reconnect_delay(),
            ));
            feed.subscribe(pipeline.clone()).await;
            Some(feed)
        } else {
            info!("WebSocket feed disabled, waiting for indexer events only");
            None
        };

        let price_feed = Arc::new(PriceFeedService::new(auto_exit.clone(), config.price_feed.clone()));
        let swap = Arc::new(SwapService::new(reader.clone(), config.referral.omniston_payload.clone()));

        let (shutdown_tx, _) = watch::channel(false);

        info!("HyperSniper initialization complete");
        Ok(Self {
            config: config_manager,
            reader,
            cache,
            checker,
            scanner,
            pipeline,
            feed,
            fanout,
            webhooks,
            auto_exit,
            price_feed,
            swap,
            active_plugins,
            shutdown_tx,
            background_tasks: Vec::new(),
        })
    }

    /// Spawn the background tasks
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting HyperSniper services");
        let config = self.config.get_config().await;

        if let Some(feed) = &self.feed {
            let feed = feed.clone();
            let shutdown = self.shutdown_tx.subscribe();
            self.background_tasks
                .push(tokio::spawn(async move { feed.run(shutdown).await }));
        }

        let scanner = self.scanner.clone();
        let shutdown = self.shutdown_tx.subscribe();
        self.background_tasks
            .push(tokio::spawn(async move { scanner.run_periodic(shutdown).await }));

        if config.price_feed.enabled {
            let price_feed = self.price_feed.clone();
            let shutdown = self.shutdown_tx.subscribe();
            self.background_tasks
                .push(tokio::spawn(async move { price_feed.run(shutdown).await }));
        }

        if config.api.enable_api {
            let state = Arc::new(ApiState {
                pipeline: self.pipeline.clone(),
                scanner: self.scanner.clone(),
                webhooks: self.webhooks.clone(),
                api_key: config.api.api_key.clone(),
            });
            let port = config.api.port;
            let shutdown = self.shutdown_tx.subscribe();
            self.background_tasks.push(tokio::spawn(async move {
                if let Err(e) = api::serve(state, port, shutdown).await {
                    error!("API server error: {}", e);
                }
            }));
        } else {
            info!("API server is disabled in config");
        }

        info!("All services started ({} tasks)", self.background_tasks.len());
        Ok(())
    }

    /// Signal shutdown and wait for the background tasks
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping HyperSniper");
        if self.shutdown_tx.send(true).is_err() {
            debug!("No background task is listening for shutdown");
        }

        for task in self.background_tasks.drain(..) {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Background task failed: {}", e),
                Err(_) => warn!("Background task did not stop within {:?}", SHUTDOWN_GRACE),
            }
        }

        info!("HyperSniper stopped");
        Ok(())
    }
}

/// Initialize logging.
///
/// `RUST_LOG` wins over `log_level`. With a `log_dir`, JSON lines are also written to
/// a daily rolling file; keep the returned guard alive so buffered lines get flushed.
pub fn init_logging(log_level: &str, log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    let guard = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hypersniper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().json().with_writer(writer))
                .try_init()
                .context("Failed to set global default subscriber")?;
            Some(guard)
        }
        None => {
            registry
                .try_init()
                .context("Failed to set global default subscriber")?;
            None
        }
    };

    info!("Logging initialized at {} level", log_level);
    Ok(guard)
}

/// Get a greeting message with version info
pub fn greeting() -> String {
    format!("HyperSniper v{} starting up", VERSION)
}
