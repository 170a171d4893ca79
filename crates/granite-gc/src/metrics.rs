//! GC metrics.
//!
//! Emitted through the `metrics` facade; complements the structured
//! traces and logging in the queue and scanner.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Ranges processed counter.
pub const RANGES_PROCESSED: &str = "granite_gc_ranges_processed_total";

/// Versions deleted counter.
pub const KEYS_DELETED: &str = "granite_gc_keys_deleted_total";

/// Failed GC passes counter.
pub const PASS_ERRORS: &str = "granite_gc_pass_errors_total";

/// GC pass duration histogram.
pub const PASS_DURATION: &str = "granite_gc_pass_duration_seconds";

/// Registers all GC metric descriptions.
///
/// Call once at startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(RANGES_PROCESSED, "Total GC passes completed");
    describe_counter!(KEYS_DELETED, "Total versions deleted by GC");
    describe_counter!(PASS_ERRORS, "Total GC passes abandoned on error");
    describe_histogram!(PASS_DURATION, "Duration of GC passes in seconds");
}

/// Records a completed GC pass.
pub fn record_pass(keys_deleted: u64, duration_secs: f64) {
    counter!(RANGES_PROCESSED).increment(1);
    counter!(KEYS_DELETED).increment(keys_deleted);
    histogram!(PASS_DURATION).record(duration_secs);
}

/// Records an abandoned GC pass.
pub fn record_pass_error() {
    counter!(PASS_ERRORS).increment(1);
}
