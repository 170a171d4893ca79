//! GC threshold calculation.
//!
//! The threshold is the timestamp below which a range may remove old
//! versions. The rule is `min(now - ttl, protection floor)`: however old
//! the garbage and however large the backlog, the computed threshold never
//! reaches an overlapping active protection's timestamp.

use std::sync::Arc;
use std::time::Duration;

use granite_core::clock::Clock;
use granite_core::kv::KvStore;
use granite_core::{Result, Span, Timestamp};

use granite_protect::cache::ProtectionCache;
use granite_protect::resolver::MetadataResolver;

/// A computed threshold plus the inputs that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdResult {
    /// The highest timestamp it is legal to collect up to.
    pub threshold: Timestamp,
    /// The minimum overlapping active protection, if any record applied.
    pub protection_floor: Option<Timestamp>,
    /// Freshness of the cache snapshot the floor came from.
    pub as_of: Timestamp,
    /// The clock reading the age-based candidate was computed from.
    pub now: Timestamp,
}

/// Pure threshold rule.
///
/// `protection_floor` is the minimum timestamp among active records whose
/// target overlaps the range's span, or `None` if no record applies. The
/// result is strictly below the floor: the protected timestamp itself
/// stays readable. Ties among records need no breaking, only the minimum
/// timestamp value matters.
#[must_use]
pub fn compute_threshold(
    now: Timestamp,
    ttl: Duration,
    protection_floor: Option<Timestamp>,
) -> Timestamp {
    let candidate = now.saturating_sub(ttl);
    match protection_floor {
        Some(floor) => candidate.min(floor.prev()),
        None => candidate,
    }
}

/// Threshold calculator bound to a protection cache and metadata
/// resolver.
pub struct ThresholdCalculator<K> {
    cache: Arc<ProtectionCache<K>>,
    resolver: Arc<dyn MetadataResolver>,
    clock: Arc<dyn Clock>,
}

impl<K: KvStore> ThresholdCalculator<K> {
    /// Creates a calculator.
    #[must_use]
    pub fn new(
        cache: Arc<ProtectionCache<K>>,
        resolver: Arc<dyn MetadataResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            resolver,
            clock,
        }
    }

    /// Computes the threshold for `span` under `ttl`, consulting the
    /// current cache snapshot for the protection floor.
    ///
    /// # Errors
    ///
    /// Propagates target-resolution failures from the cache query.
    pub async fn compute(&self, span: &Span, ttl: Duration) -> Result<ThresholdResult> {
        let (protection_floor, as_of) = self
            .cache
            .query_protection_timestamp(self.resolver.as_ref(), span)
            .await?;
        let now = self.clock.now();
        let threshold = compute_threshold(now, ttl, protection_floor);
        Ok(ThresholdResult {
            threshold,
            protection_floor,
            as_of,
            now,
        })
    }
}
