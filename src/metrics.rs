//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port 9090).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `ipwl_gate_decisions_total` - Request gate outcomes (label: decision = allowed|rejected|bypassed|error)
//! - `ipwl_ip_resolutions_total` - IP authentication backend outcomes (label: outcome)
//! - `ipwl_users_provisioned_total` - Users auto-created from whitelist usernames
//! - `ipwl_tokens_issued_total` - Token pairs issued (label: method = password|ip)
//! - `ipwl_login_failures_total` - Token requests with no active account
//! - `ipwl_login_throttled_total` - Token requests rejected by the failure throttle
//! - `ipwl_settings_reloads_total` - Settings reloads (label: status)
//!
//! # Usage
//!
//! ```rust,ignore
//! use ip_whitelist_auth::metrics::{init_metrics, record_gate_decision};
//!
//! init_metrics(addr)?;
//! record_gate_decision("allowed");
//! ```

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const GATE_DECISIONS_TOTAL: &str = "ipwl_gate_decisions_total";
    pub const IP_RESOLUTIONS_TOTAL: &str = "ipwl_ip_resolutions_total";
    pub const USERS_PROVISIONED_TOTAL: &str = "ipwl_users_provisioned_total";
    pub const TOKENS_ISSUED_TOTAL: &str = "ipwl_tokens_issued_total";
    pub const LOGIN_FAILURES_TOTAL: &str = "ipwl_login_failures_total";
    pub const LOGIN_THROTTLED_TOTAL: &str = "ipwl_login_throttled_total";
    pub const SETTINGS_RELOADS_TOTAL: &str = "ipwl_settings_reloads_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::GATE_DECISIONS_TOTAL,
        "Requests allowed or rejected by the IP whitelist gate"
    );
    describe_counter!(
        names::IP_RESOLUTIONS_TOTAL,
        "IP-to-user resolution attempts by outcome"
    );
    describe_counter!(
        names::USERS_PROVISIONED_TOTAL,
        "Users created for whitelisted usernames"
    );
    describe_counter!(
        names::TOKENS_ISSUED_TOTAL,
        "Token pairs issued by authentication method"
    );
    describe_counter!(
        names::LOGIN_FAILURES_TOTAL,
        "Token requests that found no active account"
    );
    describe_counter!(
        names::LOGIN_THROTTLED_TOTAL,
        "Token requests rejected after too many failures"
    );
    describe_counter!(
        names::SETTINGS_RELOADS_TOTAL,
        "Whitelist settings reloads by status"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

pub fn record_gate_decision(decision: &'static str) {
    counter!(names::GATE_DECISIONS_TOTAL, "decision" => decision).increment(1);
}

pub fn record_ip_resolution(outcome: &'static str) {
    counter!(names::IP_RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_user_provisioned() {
    counter!(names::USERS_PROVISIONED_TOTAL).increment(1);
}

pub fn record_token_issued(method: &'static str) {
    counter!(names::TOKENS_ISSUED_TOTAL, "method" => method).increment(1);
}

pub fn record_login_failure() {
    counter!(names::LOGIN_FAILURES_TOTAL).increment(1);
}

pub fn record_login_throttled() {
    counter!(names::LOGIN_THROTTLED_TOTAL).increment(1);
}

pub fn record_settings_reload(status: &'static str) {
    counter!(names::SETTINGS_RELOADS_TOTAL, "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed exporter must be a no-op.
    #[test]
    fn test_recorders_do_not_panic_without_exporter() {
        record_gate_decision("allowed");
        record_gate_decision("rejected");
        record_ip_resolution("resolved");
        record_user_provisioned();
        record_token_issued("ip");
        record_login_failure();
        record_login_throttled();
        record_settings_reload("success");
    }
}
