//! Protected-timestamp metrics.
//!
//! Emitted through the `metrics` facade; complements the structured
//! logging in the store, cache, and reconciler.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Records protected counter.
pub const RECORDS_PROTECTED: &str = "granite_pts_records_protected_total";

/// Records released counter.
pub const RECORDS_RELEASED: &str = "granite_pts_records_released_total";

/// Cache refresh errors counter.
pub const REFRESH_ERRORS: &str = "granite_pts_refresh_errors_total";

/// Cache refresh duration histogram.
pub const REFRESH_DURATION: &str = "granite_pts_refresh_duration_seconds";

/// Records released by the reconciler counter.
pub const RECONCILE_RELEASED: &str = "granite_pts_reconcile_released_total";

/// Registers all protected-timestamp metric descriptions.
///
/// Call once at startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(RECORDS_PROTECTED, "Total protection records created");
    describe_counter!(RECORDS_RELEASED, "Total protection records released");
    describe_counter!(REFRESH_ERRORS, "Total protection cache refresh failures");
    describe_histogram!(
        REFRESH_DURATION,
        "Duration of protection cache refreshes in seconds"
    );
    describe_counter!(
        RECONCILE_RELEASED,
        "Total records released by the reconciler for dropped targets"
    );
}

/// Records a successful protect.
pub fn record_protected() {
    counter!(RECORDS_PROTECTED).increment(1);
}

/// Records a successful release.
pub fn record_released() {
    counter!(RECORDS_RELEASED).increment(1);
}

/// Records a cache refresh failure.
pub fn record_refresh_error() {
    counter!(REFRESH_ERRORS).increment(1);
}

/// Records a completed cache refresh.
pub fn record_refresh(duration_secs: f64) {
    histogram!(REFRESH_DURATION).record(duration_secs);
}

/// Records a reconciler-driven release.
pub fn record_reconcile_released() {
    counter!(RECONCILE_RELEASED).increment(1);
}
