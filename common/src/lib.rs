// Common library for the HyperSniper workspace
//
// Shared data types passed between the feed, the scoring engine, the hot-candidate
// registry, the notification fanout and the auto-exit rule engine.

pub mod jetton_types;
pub mod rule_types;

pub use jetton_types::{
    HotSnapshot, MinterEvent, SafetyReport, Signal, SignalPayload, WebhookPayload,
    NEW_TOKEN_MAX_AGE_SECS,
};
pub use rule_types::{ExitEvent, ExitRule, ExitTrigger, PersistedRule, RuleStatus};
