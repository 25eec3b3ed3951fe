//! Prometheus metrics setup and metric definitions

use anyhow::Context;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    // Seconds; directory binds and policy reloads land in the upper buckets
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("failed to set histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so Prometheus
/// output includes HELP/TYPE lines from startup.
pub fn describe_metrics() {
    // HTTP metrics
    describe_counter!("opsiam_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "opsiam_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "opsiam_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    // Authorization metrics
    describe_counter!(
        "opsiam_group_operations_total",
        "Group operations by operation and result"
    );
    describe_counter!(
        "opsiam_policy_reloads_total",
        "Policy enforcer reloads by result"
    );
    describe_histogram!(
        "opsiam_policy_reload_duration_seconds",
        "Time to read the policy table and swap the enforcer"
    );

    // Directory metrics
    describe_counter!(
        "opsiam_directory_operations_total",
        "Directory operations by operation and result"
    );
    describe_counter!(
        "opsiam_directory_sync_users_total",
        "Users processed by directory sync, by outcome"
    );

    gauge!("opsiam_http_requests_in_flight").set(0.0);
    counter!("opsiam_policy_reloads_total", "result" => "success").absolute(0);
    counter!("opsiam_policy_reloads_total", "result" => "failure").absolute(0);
    counter!(
        "opsiam_directory_operations_total",
        "operation" => "authenticate",
        "result" => "failure"
    )
    .absolute(0);
}
