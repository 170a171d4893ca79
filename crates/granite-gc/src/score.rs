//! GC-worthiness scoring.
//!
//! The score is transient, recomputed per evaluation, and never
//! persisted: a garbage-byte estimate, a likelihood-to-queue decision,
//! and a human-readable reason used for observability and tests.

use std::time::Duration;

use granite_core::Timestamp;

use crate::policy::GcPolicy;
use crate::version_store::RangeStats;

/// Queue a range once this fraction of its bytes is collectable garbage.
pub const DEAD_FRACTION_THRESHOLD: f64 = 0.25;

/// The GC-worthiness of a range at one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct GcScore {
    /// Estimated garbage bytes in the range.
    pub garbage_bytes: u64,
    /// Garbage bytes as a fraction of all bytes.
    pub dead_fraction: f64,
    /// Wall time since the last completed pass's threshold.
    pub ttl_elapsed: Duration,
    /// Whether the range should be queued for a GC pass.
    pub should_queue: bool,
    /// Why the decision came out the way it did.
    pub reason: String,
}

/// Scores a range for GC-worthiness.
///
/// `threshold` is the already-computed GC threshold for the range: only
/// garbage *below* it is collectable, so a protection floor that holds the
/// threshold under the oldest garbage suppresses queueing no matter how
/// large the backlog grows. Forced processing bypasses this gate, never
/// the threshold itself.
///
/// `last_threshold` is the threshold the range's last completed pass used
/// (`Timestamp::MIN` if it never ran). The dead fraction is weighted by
/// how many TTLs have elapsed since then, so a range sitting just under
/// [`DEAD_FRACTION_THRESHOLD`] still queues once its collectable garbage
/// has aged long enough.
#[must_use]
pub fn score_range(
    stats: &RangeStats,
    policy: &GcPolicy,
    threshold: Timestamp,
    now: Timestamp,
    last_threshold: Timestamp,
) -> GcScore {
    let total_bytes = stats.live_bytes + stats.garbage_bytes;
    #[allow(clippy::cast_precision_loss)]
    let dead_fraction = if total_bytes == 0 {
        0.0
    } else {
        stats.garbage_bytes as f64 / total_bytes as f64
    };

    let ttl_elapsed = Duration::from_nanos(
        u64::try_from(now.wall.saturating_sub(last_threshold.wall)).unwrap_or(0),
    );
    #[allow(clippy::cast_precision_loss)]
    let age_factor = if policy.ttl.is_zero() {
        1.0
    } else {
        (ttl_elapsed.as_nanos() as f64 / policy.ttl.as_nanos() as f64).max(1.0)
    };

    let collectable = stats
        .oldest_garbage
        .is_some_and(|oldest| oldest < threshold);

    let (should_queue, reason) = if stats.garbage_bytes == 0 {
        (false, "no garbage".to_string())
    } else if !collectable {
        (
            false,
            format!(
                "garbage not collectable below threshold {threshold} (oldest {})",
                stats
                    .oldest_garbage
                    .map_or_else(|| "none".to_string(), |ts| ts.to_string())
            ),
        )
    } else if dead_fraction >= DEAD_FRACTION_THRESHOLD {
        (
            true,
            format!("dead fraction {dead_fraction:.2} >= {DEAD_FRACTION_THRESHOLD:.2}"),
        )
    } else if dead_fraction * age_factor >= DEAD_FRACTION_THRESHOLD {
        (
            true,
            format!("dead fraction {dead_fraction:.2} aged {age_factor:.1}x since last pass"),
        )
    } else if total_bytes > policy.range_max_bytes {
        (
            true,
            format!(
                "range size {total_bytes} exceeds max {}",
                policy.range_max_bytes
            ),
        )
    } else {
        (
            false,
            format!("dead fraction {dead_fraction:.2} < {DEAD_FRACTION_THRESHOLD:.2}"),
        )
    };

    GcScore {
        garbage_bytes: stats.garbage_bytes,
        dead_fraction,
        ttl_elapsed,
        should_queue,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(nanos: i64) -> Timestamp {
        Timestamp::from_nanos(nanos)
    }

    // TTL of 40ns; `now` one TTL past the last pass so the age factor
    // is exactly 1 unless a test says otherwise.
    fn policy() -> GcPolicy {
        GcPolicy::with_ttl(Duration::from_nanos(40))
    }

    const NOW: i64 = 90;
    const LAST: i64 = 50;

    fn stats(live: u64, garbage: u64, oldest: Option<i64>) -> RangeStats {
        RangeStats {
            live_bytes: live,
            garbage_bytes: garbage,
            oldest_garbage: oldest.map(Timestamp::from_nanos),
            point_keys: 10,
        }
    }

    #[test]
    fn queues_on_high_dead_fraction() {
        let score = score_range(
            &stats(100, 100, Some(10)),
            &policy(),
            ts(50),
            ts(NOW),
            ts(LAST),
        );
        assert!(score.should_queue);
        assert!((score.dead_fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn no_garbage_means_no_queue() {
        let score = score_range(&stats(100, 0, None), &policy(), ts(50), ts(NOW), ts(LAST));
        assert!(!score.should_queue);
        assert_eq!(score.reason, "no garbage");
    }

    #[test]
    fn protection_floor_suppresses_queueing() {
        // Plenty of garbage, but the threshold (held down by a
        // protection) sits below the oldest garbage.
        let score = score_range(
            &stats(0, 1_000_000, Some(100)),
            &policy(),
            ts(50),
            ts(NOW),
            ts(LAST),
        );
        assert!(!score.should_queue);
        assert!(score.reason.contains("not collectable"));
    }

    #[test]
    fn small_dead_fraction_does_not_queue() {
        let score = score_range(
            &stats(1_000, 10, Some(10)),
            &policy(),
            ts(50),
            ts(NOW),
            ts(LAST),
        );
        assert!(!score.should_queue);
        assert_eq!(score.ttl_elapsed, Duration::from_nanos(40));
    }

    #[test]
    fn stale_range_with_small_fraction_eventually_queues() {
        // Fraction ~0.01 stays under the cutoff at age factor 1, but the
        // weight grows with every TTL that passes without a GC pass.
        let stats = stats(1_000, 10, Some(10));
        let score = score_range(&stats, &policy(), ts(50), ts(NOW), ts(LAST));
        assert!(!score.should_queue);

        let score = score_range(&stats, &policy(), ts(50), ts(LAST + 40 * 100), ts(LAST));
        assert!(score.should_queue);
        assert!(score.reason.contains("aged"));
    }

    #[test]
    fn protection_floor_holds_regardless_of_age() {
        // Aging raises urgency, never the threshold: garbage above the
        // floor stays unqueueable no matter how stale the range is.
        let score = score_range(
            &stats(0, 1_000_000, Some(100)),
            &policy(),
            ts(50),
            ts(LAST + 40 * 1_000),
            ts(LAST),
        );
        assert!(!score.should_queue);
        assert!(score.reason.contains("not collectable"));
    }

    #[test]
    fn oversized_range_queues_despite_small_fraction() {
        let policy = GcPolicy {
            ttl: Duration::from_nanos(40),
            range_max_bytes: 500,
        };
        let score = score_range(
            &stats(1_000, 10, Some(10)),
            &policy,
            ts(50),
            ts(NOW),
            ts(LAST),
        );
        assert!(score.should_queue);
        assert!(score.reason.contains("exceeds max"));
    }
}
