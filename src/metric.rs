/// Metrics collection and reporting module
///
/// Counters and histograms for the signal pipeline. A Prometheus recorder is
/// installed once per process when metrics are enabled; the rendered page is
/// served by the API at `/metrics`.

use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram, increment_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

use common::ExitTrigger;

/// Prometheus metrics handle
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub const FEED_EVENTS: &str = "hypersniper_feed_events_total";
pub const FEED_RECONNECTS: &str = "hypersniper_feed_reconnects_total";
pub const EVALUATIONS: &str = "hypersniper_evaluations_total";
pub const EVALUATION_TIMEOUTS: &str = "hypersniper_evaluation_timeouts_total";
pub const EVALUATION_LATENCY: &str = "hypersniper_evaluation_latency_seconds";
pub const SIGNALS_ACCEPTED: &str = "hypersniper_signals_accepted_total";
pub const DELIVERIES: &str = "hypersniper_deliveries_total";
pub const RULES_FIRED: &str = "hypersniper_rules_fired_total";

/// Install the Prometheus recorder (idempotent)
pub fn init_metrics(enabled: bool) -> Result<()> {
    if !enabled {
        info!("Metrics collection disabled");
        return Ok(());
    }

    PROMETHEUS_HANDLE.get_or_try_init(|| -> Result<PrometheusHandle> {
        let handle = PrometheusBuilder::new()
            .set_buckets(&[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 0.6, 1.0])
            .context("Invalid histogram buckets")?
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        register_descriptions();
        info!("Metrics collection initialized");
        Ok(handle)
    })?;

    Ok(())
}

fn register_descriptions() {
    describe_counter!(FEED_EVENTS, "Minter events decoded from the chain feed");
    describe_counter!(FEED_RECONNECTS, "Feed reconnect attempts");
    describe_counter!(EVALUATIONS, "Safety evaluations by outcome");
    describe_counter!(EVALUATION_TIMEOUTS, "Safety evaluations that exceeded the deadline");
    describe_histogram!(EVALUATION_LATENCY, Unit::Seconds, "Safety evaluation latency");
    describe_counter!(SIGNALS_ACCEPTED, "Signals inserted into the hot set");
    describe_counter!(DELIVERIES, "Notification and webhook deliveries by channel and outcome");
    describe_counter!(RULES_FIRED, "Exit rules fired by branch");
}

/// Rendered Prometheus page, if the recorder is installed
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_feed_event() {
    increment_counter!(FEED_EVENTS);
}

pub fn record_reconnect() {
    increment_counter!(FEED_RECONNECTS);
}

pub fn record_evaluation(outcome: &'static str, elapsed: Duration) {
    counter!(EVALUATIONS, 1, "outcome" => outcome);
    histogram!(EVALUATION_LATENCY, elapsed.as_secs_f64());
}

pub fn record_evaluation_timeout() {
    increment_counter!(EVALUATION_TIMEOUTS);
}

pub fn record_signal_accepted() {
    increment_counter!(SIGNALS_ACCEPTED);
}

pub fn record_delivery(channel: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    counter!(DELIVERIES, 1, "channel" => channel, "outcome" => outcome);
}

pub fn record_rule_fired(trigger: ExitTrigger) {
    let branch = match trigger {
        ExitTrigger::TakeProfit => "take_profit",
        ExitTrigger::StopLoss => "stop_loss",
    };
    counter!(RULES_FIRED, 1, "branch" => branch);
}
