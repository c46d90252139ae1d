// Solana / Base chain plugins (STUB IMPLEMENTATION)
//
// These plugins only register themselves so that a config listing them does not
// fail at startup. Neither chain has a minter feed or a reader yet; init logs
// the stub status and returns.

use async_trait::async_trait;
use tracing::warn;

use crate::errors::Result;
use crate::types::ChainKind;

use super::{ChainPlugin, PluginContext};

/// Solana plugin stub
#[derive(Debug, Default)]
pub struct SolanaPlugin;

#[async_trait]
impl ChainPlugin for SolanaPlugin {
    fn chain(&self) -> ChainKind {
        ChainKind::Solana
    }

    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        warn!("Solana plugin is a stub: no minter feed is started");
        Ok(())
    }
}

/// Base plugin stub
#[derive(Debug, Default)]
pub struct BasePlugin;

#[async_trait]
impl ChainPlugin for BasePlugin {
    fn chain(&self) -> ChainKind {
        ChainKind::Base
    }

    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        warn!("Base plugin is a stub: no minter feed is started");
        Ok(())
    }
}
