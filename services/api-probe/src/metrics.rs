//! Prometheus metrics exposition
//!
//! The pipeline records through the `metrics` facade; this installs the
//! recorder the probe renders on `--metrics`:
//!
//! - `auth_refresh_total` (counter): label `outcome`
//! - `auth_refresh_waiters` (histogram): requests served per refresh
//! - `auth_csrf_refetch_total` (counter): label `outcome`
//! - `auth_session_terminated_total` (counter): label `reason`
//! - `auth_request_failures_total` (counter): label `classification`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Requests sharing one refresh: 1 means nobody else was waiting.
const WAITER_BUCKETS: &[f64] = &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("auth_refresh_waiters".to_string()),
            WAITER_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `auth_refresh_waiters` gets explicit buckets so it renders as a histogram
/// (with `_bucket` lines) rather than the default summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
