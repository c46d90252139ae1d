/// HyperSniper - Main entry point

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::signal;
use tracing::{error, info, warn};

use hypersniper::analys::SafetyChecker;
use hypersniper::cache::InMemoryCache;
use hypersniper::chain_adapters::{is_valid_ton_address, PluginRegistry, TonAdapter};
use hypersniper::config::{BotConfig, ConfigManager, DEFAULT_CONFIG_PATH};
use hypersniper::{greeting, init_logging, AppState};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path (falls back to HYPERSNIPER_CONFIG, then config/bot_config.yaml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides general.log_level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand)]
enum Commands {
    /// Generate default configuration
    Init,

    /// Run the bot
    Run,

    /// Run a one-off safety check for a jetton minter
    Check {
        /// Minter address
        #[arg(short, long)]
        address: String,
    },

    /// List chain plugins compiled into this binary
    Plugins,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| std::env::var("HYPERSNIPER_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config_manager = Arc::new(ConfigManager::new(&config_path));
    let command = cli.command.unwrap_or(Commands::Run);

    if let Commands::Init = command {
        let _guard = init_logging(cli.log_level.as_deref().unwrap_or("info"), None)?;
        return init_config(config_manager).await;
    }

    config_manager.load().await?;
    let config = config_manager.get_config().await;
    let log_level = cli.log_level.unwrap_or_else(|| config.general.log_level.clone());
    let _guard = init_logging(&log_level, config.general.log_dir.as_deref())?;
    println!("{}", greeting());

    match command {
        Commands::Init => Ok(()),
        Commands::Run => run_bot(config_manager).await,
        Commands::Check { address } => check_token(&config, &address).await,
        Commands::Plugins => {
            list_plugins(&config);
            Ok(())
        }
    }
}

/// Initialize configuration with defaults
async fn init_config(config_manager: Arc<ConfigManager>) -> Result<()> {
    info!("Initializing default configuration at {}", config_manager.config_path);
    config_manager.update_config(BotConfig::default()).await?;
    info!("Default configuration generated successfully");
    info!("You can now edit the configuration file and run the bot");
    Ok(())
}

/// Run the bot until Ctrl+C
async fn run_bot(config_manager: Arc<ConfigManager>) -> Result<()> {
    let mut app_state = AppState::init(config_manager).await?;
    app_state.start().await?;
    info!("Bot started successfully");

    wait_for_shutdown().await;

    app_state.stop().await?;
    info!("Bot stopped successfully");
    Ok(())
}

/// Safety check of one address, printed as JSON
async fn check_token(config: &BotConfig, address: &str) -> Result<()> {
    let address = address.trim();
    if !is_valid_ton_address(address) {
        bail!("Not a TON address: {}", address);
    }

    let checker = SafetyChecker::new(
        Arc::new(TonAdapter::new(&config.ton)),
        Arc::new(InMemoryCache::new(16)),
        config.security.clone(),
        config.cache.default_ttl,
    );

    match checker.evaluate(address, &json!({})).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            warn!("Safety check of {} failed: {}", address, e);
            println!("Could not check this token right now, please try again in a moment.");
            Ok(())
        }
    }
}

fn list_plugins(config: &BotConfig) {
    for name in PluginRegistry::with_known().names() {
        let enabled = config.plugins.enabled.iter().any(|e| e.trim() == name);
        println!("{:<10} {}", name, if enabled { "enabled" } else { "disabled" });
    }
}

/// Wait for shutdown signal (Ctrl+C)
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
