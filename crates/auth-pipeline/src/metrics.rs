//! Pipeline metrics
//!
//! Recording only; the binary decides whether a recorder is installed.
//! Without one every call here is a no-op.
//!
//! - `auth_refresh_total` (counter): label `outcome` (`success`, `failure`)
//! - `auth_refresh_waiters` (histogram): requests that shared one refresh
//! - `auth_csrf_refetch_total` (counter): label `outcome`
//! - `auth_session_terminated_total` (counter): label `reason`
//! - `auth_request_failures_total` (counter): label `classification`

/// Record a finished refresh cycle and how many requests it served.
pub fn record_refresh(outcome: &'static str, waiters: usize) {
    metrics::counter!("auth_refresh_total", "outcome" => outcome).increment(1);
    metrics::histogram!("auth_refresh_waiters").record(waiters as f64);
}

/// Record an anti-forgery token refetch.
pub fn record_csrf_refetch(outcome: &'static str) {
    metrics::counter!("auth_csrf_refetch_total", "outcome" => outcome).increment(1);
}

/// Record a session end (fires once per session, not once per request).
pub fn record_session_terminated(reason: &'static str) {
    metrics::counter!("auth_session_terminated_total", "reason" => reason).increment(1);
}

/// Record a request that failed after all recovery was exhausted.
pub fn record_failure(classification: &'static str) {
    metrics::counter!("auth_request_failures_total", "classification" => classification)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_refresh("success", 3);
        record_csrf_refetch("failure");
        record_session_terminated("refresh_failed");
        record_failure("transport");
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn refresh_counter_carries_outcome() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_refresh("success", 3);
        record_refresh("failure", 1);

        let output = handle.render();
        assert!(output.contains("auth_refresh_total{outcome=\"success\"} 1"));
        assert!(output.contains("auth_refresh_total{outcome=\"failure\"} 1"));
        assert!(output.contains("auth_refresh_waiters"));
    }

    #[test]
    fn session_and_failure_counters_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_session_terminated("account_blocked");
        record_failure("method_not_allowed");
        record_failure("method_not_allowed");
        record_csrf_refetch("success");

        let output = handle.render();
        assert!(output.contains("auth_session_terminated_total{reason=\"account_blocked\"} 1"));
        assert!(
            output.contains(
                "auth_request_failures_total{classification=\"method_not_allowed\"} 2"
            )
        );
        assert!(output.contains("auth_csrf_refetch_total{outcome=\"success\"} 1"));
    }
}
