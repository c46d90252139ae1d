//! Listener traits of the signal pipeline
//!
//! Components never hold references into each other's state. The scanner pushes
//! immutable snapshots and the rule engine pushes fired events to whoever
//! registered through these traits.

use async_trait::async_trait;

use common::{ExitEvent, HotSnapshot};

use crate::errors::Result;

/// Receiver of the periodic hot-set snapshot
#[async_trait]
pub trait SnapshotListener: Send + Sync + 'static {
    /// Tên dùng trong log
    fn name(&self) -> &str;

    async fn on_snapshot(&self, snapshot: &HotSnapshot) -> Result<()>;
}

/// Receiver of fired exit rules
#[async_trait]
pub trait ExitListener: Send + Sync + 'static {
    /// Tên dùng trong log
    fn name(&self) -> &str;

    /// Called once per fired rule; may be retried on error
    async fn on_exit(&self, event: &ExitEvent) -> Result<()>;
}
