//! Prometheus metrics for the engine, pipeline, and deposit layers.
//!
//! Ambient observability, carried over regardless of which feature surfaces
//! are in scope for a given deployment of this crate.

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

pub mod names {
    pub const ACTIONS_PROCESSED_TOTAL: &str = "actions_processed_total";
    pub const ACTION_DISPATCH_DURATION_SECONDS: &str = "action_dispatch_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const CANCELS_ABSORBED_TOTAL: &str = "cancels_absorbed_total";
    pub const DEPOSITS_REFUNDED_TOTAL: &str = "deposits_refunded_total";
    pub const DEPOSITS_ACCEPTED_TOTAL: &str = "deposits_accepted_total";
    pub const TRANSFERS_SUBMITTED_TOTAL: &str = "transfers_submitted_total";
    pub const TRANSFERS_RETRIED_TOTAL: &str = "transfers_retried_total";
    pub const DISPATCHER_CHECKPOINT_LAG_SECONDS: &str = "dispatcher_checkpoint_lag_seconds";
    pub const BOOK_ORDER_COUNT: &str = "book_order_count";
}

pub mod labels {
    pub const MARKET: &str = "market";
    pub const BROKER: &str = "broker";
    pub const SIDE: &str = "side";
    pub const REASON: &str = "reason";
}

/// Install the Prometheus recorder, matching the teacher's bucket-tuning
/// style for latency histograms.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::ACTION_DISPATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full(names::DISPATCHER_CHECKPOINT_LAG_SECONDS.to_string()),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )
        .unwrap();

    builder
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_action_processed(market: &str) {
    counter!(names::ACTIONS_PROCESSED_TOTAL, labels::MARKET => market.to_string()).increment(1);
}

pub fn record_action_dispatch_duration(market: &str, duration_secs: f64) {
    histogram!(names::ACTION_DISPATCH_DURATION_SECONDS, labels::MARKET => market.to_string())
        .record(duration_secs);
}

pub fn record_trade_executed(market: &str) {
    counter!(names::TRADES_EXECUTED_TOTAL, labels::MARKET => market.to_string()).increment(1);
}

pub fn record_cancel_absorbed(market: &str) {
    counter!(names::CANCELS_ABSORBED_TOTAL, labels::MARKET => market.to_string()).increment(1);
}

pub fn record_deposit_refunded(reason: &str) {
    counter!(names::DEPOSITS_REFUNDED_TOTAL, labels::REASON => reason.to_string()).increment(1);
}

pub fn record_deposit_accepted() {
    counter!(names::DEPOSITS_ACCEPTED_TOTAL).increment(1);
}

pub fn record_transfer_submitted(broker: &str) {
    counter!(names::TRANSFERS_SUBMITTED_TOTAL, labels::BROKER => broker.to_string()).increment(1);
}

pub fn record_transfer_retried(broker: &str) {
    counter!(names::TRANSFERS_RETRIED_TOTAL, labels::BROKER => broker.to_string()).increment(1);
}

pub fn set_checkpoint_lag(market: &str, lag_secs: f64) {
    gauge!(names::DISPATCHER_CHECKPOINT_LAG_SECONDS, labels::MARKET => market.to_string())
        .set(lag_secs);
}

pub fn set_book_order_count(market: &str, side: &str, count: i64) {
    gauge!(
        names::BOOK_ORDER_COUNT,
        labels::MARKET => market.to_string(),
        labels::SIDE => side.to_string()
    )
    .set(count as f64);
}

/// Timer for measuring durations, same helper the teacher keeps in
/// `metrics/mod.rs`.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
