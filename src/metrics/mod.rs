//! Metrics module
//!
//! Prometheus counters and histograms for the upload lifecycle. The CLI can
//! dump them in text exposition format when a run ends.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "kanshi_uploads_total",
        "Total number of uploads by final status",
        &["kind", "status"]
    ).expect("uploads counter registers once");

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "kanshi_upload_bytes_total",
        "Total bytes transferred"
    ).expect("bytes counter registers once");

    pub static ref TRANSFER_DURATION: HistogramVec = register_histogram_vec!(
        "kanshi_transfer_duration_seconds",
        "Time from transfer start until the record id is known",
        &["kind", "strategy"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    ).expect("transfer histogram registers once");

    // Processing metrics
    pub static ref POLL_REQUESTS: CounterVec = register_counter_vec!(
        "kanshi_poll_requests_total",
        "Processing status queries by outcome",
        &["kind", "outcome"]  // pending, completed, failed, transient_error
    ).expect("poll counter registers once");

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "kanshi_errors_total",
        "Total errors",
        &["type"]
    ).expect("error counter registers once");
}

/// Record a completed upload (processing finished)
pub fn record_upload_success(kind: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[kind, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record an upload that ended in failure
pub fn record_upload_failure(kind: &str) {
    UPLOADS_TOTAL.with_label_values(&[kind, "failure"]).inc();
}

/// Record an upload abandoned by the user
pub fn record_upload_cancelled(kind: &str) {
    UPLOADS_TOTAL.with_label_values(&[kind, "cancelled"]).inc();
}

/// Record how long the transfer phase took
pub fn record_transfer_duration(kind: &str, strategy: &str, duration_secs: f64) {
    TRANSFER_DURATION
        .with_label_values(&[kind, strategy])
        .observe(duration_secs);
}

/// Record one status query
pub fn record_poll(kind: &str, outcome: &str) {
    POLL_REQUESTS.with_label_values(&[kind, outcome]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render all registered metrics in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_success() {
        record_upload_success("video", 1024);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_poll_outcomes() {
        let before = POLL_REQUESTS
            .with_label_values(&["photo", "transient_error"])
            .get();
        record_poll("photo", "transient_error");
        let after = POLL_REQUESTS
            .with_label_values(&["photo", "transient_error"])
            .get();
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_gather_includes_registered_metrics() {
        record_error("test_error");
        record_transfer_duration("video", "direct", 0.25);
        let text = gather();
        assert!(text.contains("kanshi_errors_total"));
        assert!(text.contains("kanshi_transfer_duration_seconds"));
    }
}
