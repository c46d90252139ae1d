//! TradeLogic module for HyperSniper
//!
//! Contains the hot-candidate registry, the auto-exit rule engine and the
//! services that feed them (price poller, swap payload preparation).

// Re-export traits
pub mod traits;
pub use traits::*;

pub mod auto_exit;
pub mod gem_scanner;
pub mod price_feed;
pub mod swap;

pub use auto_exit::AutoExitEngine;
pub use gem_scanner::{GemPipeline, GemScanner};
pub use price_feed::PriceFeedService;
pub use swap::{SwapAction, SwapQuote, SwapService};
