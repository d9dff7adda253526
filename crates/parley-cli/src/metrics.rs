//! Metrics collection for Parley.
//!
//! Uses the `metrics` crate for instrumentation. The Prometheus recorder is
//! installed in-process only; its rendering is printed by the runner.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parley_core::{DeliveryReport, Route};
use tracing::info;

/// Metric names.
pub mod names {
    pub const JOINS_TOTAL: &str = "parley_joins_total";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const DELIVERIES_TOTAL: &str = "parley_deliveries_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "parley_delivery_failures_total";
    pub const MEMBERS_ACTIVE: &str = "parley_members_active";
}

/// Install the Prometheus recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    info!("Metrics recorder installed");
    Ok(handle)
}

/// Describe all metrics.
pub fn init_metrics() {
    metrics::describe_counter!(names::JOINS_TOTAL, "Total number of admitted participants");
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of routed messages");
    metrics::describe_counter!(names::DELIVERIES_TOTAL, "Total number of successful deliveries");
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Total number of failed deliveries"
    );
    metrics::describe_gauge!(names::MEMBERS_ACTIVE, "Current number of members across rooms");
}

/// Record an admitted participant.
pub fn record_join(members: usize) {
    counter!(names::JOINS_TOTAL).increment(1);
    gauge!(names::MEMBERS_ACTIVE).set(members as f64);
}

/// Record a routed message and its deliveries.
pub fn record_message(route: &Route, report: &DeliveryReport) {
    counter!(names::MESSAGES_TOTAL, "route" => route.label()).increment(1);
    record_report(report);
}

/// Record the outcome of a routing call.
pub fn record_report(report: &DeliveryReport) {
    counter!(names::DELIVERIES_TOTAL).increment(report.delivered as u64);
    if !report.failures.is_empty() {
        counter!(names::DELIVERY_FAILURES_TOTAL).increment(report.failures.len() as u64);
    }
}

/// Record a delivery failure that aborted a routing call.
pub fn record_aborted_delivery() {
    counter!(names::DELIVERY_FAILURES_TOTAL).increment(1);
}
