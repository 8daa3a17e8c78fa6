//! Prediction metrics exported in Prometheus text format

use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

pub const PREDICT_REQUESTS: &str = "churn_predict_requests_total";
pub const PREDICT_RECORDS: &str = "churn_predict_records_total";
pub const PREDICT_ERRORS: &str = "churn_predict_errors_total";
pub const PREDICT_LATENCY: &str = "churn_predict_latency_seconds";

/// Install the global Prometheus recorder and describe the service metrics
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

pub fn describe() {
    describe_counter!(PREDICT_REQUESTS, "Prediction requests received");
    describe_counter!(PREDICT_RECORDS, "Records scored successfully");
    describe_counter!(PREDICT_ERRORS, "Failed prediction requests by error kind");
    describe_histogram!(
        PREDICT_LATENCY,
        Unit::Seconds,
        "Prediction latency including validation"
    );
}

pub fn record_success(records: usize, elapsed: Duration) {
    counter!(PREDICT_REQUESTS).increment(1);
    counter!(PREDICT_RECORDS).increment(records as u64);
    histogram!(PREDICT_LATENCY).record(elapsed.as_secs_f64());
}

/// A request refused before any record was looked at
pub fn record_rejected(kind: &'static str) {
    counter!(PREDICT_REQUESTS).increment(1);
    counter!(PREDICT_ERRORS, "kind" => kind).increment(1);
}

pub fn record_failure(kind: &'static str, elapsed: Duration) {
    counter!(PREDICT_REQUESTS).increment(1);
    counter!(PREDICT_ERRORS, "kind" => kind).increment(1);
    histogram!(PREDICT_LATENCY).record(elapsed.as_secs_f64());
}
