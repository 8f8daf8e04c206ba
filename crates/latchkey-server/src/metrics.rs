// Metrics module for observability
// Registers descriptions for the lock and identity counters and installs the Prometheus recorder

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize all metric descriptions
/// Should be called once at application startup, after the recorder is installed
pub fn init_metrics() {
    // Lock metrics
    describe_counter!(
        "latchkey_lock_acquired_total",
        "Total number of successful lock acquisitions"
    );
    describe_counter!(
        "latchkey_lock_busy_total",
        "Total number of acquisition attempts that found the key held"
    );
    describe_counter!(
        "latchkey_lock_released_total",
        "Total number of locks released by their owner"
    );
    describe_counter!(
        "latchkey_lock_store_errors_total",
        "Total number of coordination store call failures"
    );
    describe_counter!(
        "latchkey_lock_execute_timeout_total",
        "Total number of guarded executions that ran their fallback"
    );

    // Identity metrics
    describe_counter!(
        "latchkey_identity_created_total",
        "Total number of identity records created"
    );
    describe_counter!(
        "latchkey_login_total",
        "Total number of logins by outcome"
    );
}

/// Install the process-wide Prometheus recorder and describe all metrics
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}
