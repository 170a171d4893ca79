//! The GC queue: per-range evaluation and processing.
//!
//! Each evaluation scores a range, gates on the score (unless forced),
//! then processes under per-range exclusivity: compute the threshold from
//! a recent cache snapshot, instruct the version store to remove versions
//! strictly below it, and emit a trace. Forcing bypasses the gate, never
//! the threshold: it changes whether GC runs, not how far it may
//! advance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use granite_core::kv::KvStore;
use granite_core::{Error, Result, Timestamp};

use crate::metrics;
use crate::policy::PolicySource;
use crate::range::{RangeDescriptor, RangeId};
use crate::score::score_range;
use crate::threshold::ThresholdCalculator;
use crate::trace::GcTrace;
use crate::version_store::VersionStore;

struct RangeEntry {
    descriptor: RangeDescriptor,
    /// At most one GC pass per range at a time.
    exclusivity: tokio::sync::Mutex<()>,
    /// Highest threshold a completed pass has used; never regresses.
    last_threshold: Mutex<Timestamp>,
}

/// Per-store GC queue over a set of registered ranges.
pub struct GcQueue<K> {
    calculator: ThresholdCalculator<K>,
    policy: Arc<dyn PolicySource>,
    versions: Arc<dyn VersionStore>,
    ranges: RwLock<HashMap<RangeId, Arc<RangeEntry>>>,
}

impl<K: KvStore> GcQueue<K> {
    /// Creates a queue.
    #[must_use]
    pub fn new(
        calculator: ThresholdCalculator<K>,
        policy: Arc<dyn PolicySource>,
        versions: Arc<dyn VersionStore>,
    ) -> Self {
        Self {
            calculator,
            policy,
            versions,
            ranges: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a range for evaluation.
    pub fn register_range(&self, descriptor: RangeDescriptor) {
        if let Ok(mut ranges) = self.ranges.write() {
            ranges
                .entry(descriptor.id)
                .or_insert_with(|| {
                    Arc::new(RangeEntry {
                        descriptor,
                        exclusivity: tokio::sync::Mutex::new(()),
                        last_threshold: Mutex::new(Timestamp::MIN),
                    })
                });
        }
    }

    /// Returns the ids of all registered ranges.
    #[must_use]
    pub fn range_ids(&self) -> Vec<RangeId> {
        self.ranges
            .read()
            .map(|ranges| ranges.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the highest threshold a completed pass on `range` has
    /// used.
    #[must_use]
    pub fn last_threshold(&self, range: RangeId) -> Option<Timestamp> {
        let entry = self.entry(range).ok()?;
        entry.last_threshold.lock().ok().map(|t| *t)
    }

    fn entry(&self, range: RangeId) -> Result<Arc<RangeEntry>> {
        self.ranges
            .read()
            .ok()
            .and_then(|ranges| ranges.get(&range).cloned())
            .ok_or_else(|| Error::not_found("range", range))
    }

    /// Evaluates a range and, if the score gate passes (or is skipped),
    /// processes it.
    ///
    /// With `run_async`, processing is spawned and the returned trace
    /// covers only the scoring decision. The spawned pass is not tied to
    /// the task supervisor: one cut off at shutdown leaves no partial
    /// state (removal below the threshold is idempotent) and the next
    /// scan cycle redoes it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unregistered range; processing
    /// failures propagate to this caller and the pass is retried on the
    /// next scan cycle.
    pub async fn enqueue(
        self: &Arc<Self>,
        range: RangeId,
        skip_should_queue: bool,
        run_async: bool,
    ) -> Result<GcTrace> {
        let entry = self.entry(range)?;
        let policy = self.policy.policy_for(range);

        let threshold = self
            .calculator
            .compute(&entry.descriptor.span, policy.ttl)
            .await?;
        let stats = self.versions.range_stats(range).await?;
        let last = entry
            .last_threshold
            .lock()
            .map_or(Timestamp::MIN, |t| *t);
        let score = score_range(&stats, &policy, threshold.threshold, threshold.now, last);

        tracing::debug!(
            range = %range,
            should_queue = score.should_queue,
            garbage_bytes = score.garbage_bytes,
            threshold = %threshold.threshold,
            as_of = %threshold.as_of,
            reason = %score.reason,
            "scored range for GC"
        );

        if !score.should_queue && !skip_should_queue {
            return Ok(GcTrace::scored(range, false, score.reason));
        }

        if run_async {
            let queue = Arc::clone(self);
            let should_queue = score.should_queue;
            let reason = score.reason.clone();
            tokio::spawn(async move {
                if let Err(e) = queue.process(&entry, should_queue, reason).await {
                    tracing::warn!(range = %range, error = %e, "async GC pass failed");
                }
            });
            return Ok(GcTrace::scored(range, score.should_queue, score.reason));
        }

        self.process(&entry, score.should_queue, score.reason).await
    }

    /// Runs one GC pass on a range under its exclusivity.
    ///
    /// `should_queue` is the score gate's decision, carried into the
    /// trace unchanged even when the gate was bypassed.
    async fn process(
        &self,
        entry: &Arc<RangeEntry>,
        should_queue: bool,
        score_reason: String,
    ) -> Result<GcTrace> {
        let range = entry.descriptor.id;
        let _guard = entry.exclusivity.lock().await;
        let start = Instant::now();

        // Recompute under the lock so the pass uses a recent snapshot: a
        // protect that landed while we waited must be respected.
        let policy = self.policy.policy_for(range);
        let threshold = self
            .calculator
            .compute(&entry.descriptor.span, policy.ttl)
            .await?;

        let removal = self
            .versions
            .remove_versions_below(range, threshold.threshold)
            .await
            .inspect_err(|e| {
                metrics::record_pass_error();
                tracing::warn!(range = %range, error = %e, "GC removal failed; pass abandoned");
            })?;

        // The recorded threshold is monotone even if a later pass
        // computes a lower one (a new protection below an old threshold
        // only means there is nothing new to delete).
        if let Ok(mut last) = entry.last_threshold.lock() {
            *last = (*last).max(threshold.threshold);
        }

        metrics::record_pass(removal.keys_deleted, start.elapsed().as_secs_f64());
        tracing::info!(
            range = %range,
            threshold = %threshold.threshold,
            keys_handled = removal.keys_handled,
            keys_deleted = removal.keys_deleted,
            "GC pass completed"
        );

        Ok(GcTrace {
            range,
            should_queue,
            score_reason,
            processed: true,
            threshold: Some(threshold.threshold),
            keys_handled: removal.keys_handled,
            keys_deleted: removal.keys_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use granite_core::clock::{Clock, ManualClock};
    use granite_core::kv::MemoryKv;
    use granite_core::{Key, Span};

    use granite_protect::cache::ProtectionCache;
    use granite_protect::resolver::{MetadataResolver, StaticResolver};
    use granite_protect::store::RecordStore;

    use crate::policy::{GcPolicy, StaticPolicy};
    use crate::version_store::MemoryVersionStore;

    use super::*;

    type TestQueue = GcQueue<std::sync::Arc<MemoryKv>>;

    async fn queue_fixture() -> (Arc<TestQueue>, Arc<MemoryVersionStore>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let kv = Arc::new(MemoryKv::new(Arc::clone(&clock) as Arc<dyn Clock>));
        let store = Arc::new(RecordStore::new(kv).await.expect("store"));
        let cache = Arc::new(ProtectionCache::new(store));
        cache.refresh().await.expect("refresh");

        let versions = Arc::new(MemoryVersionStore::new());
        let calculator = ThresholdCalculator::new(
            cache,
            Arc::new(StaticResolver::new()) as Arc<dyn MetadataResolver>,
            clock as Arc<dyn Clock>,
        );
        let queue = Arc::new(GcQueue::new(
            calculator,
            Arc::new(StaticPolicy::new(GcPolicy::with_ttl(Duration::from_nanos(
                100,
            )))),
            Arc::clone(&versions) as Arc<dyn VersionStore>,
        ));
        queue.register_range(RangeDescriptor {
            id: RangeId(1),
            span: Span::for_prefix("table1"),
        });
        (queue, versions)
    }

    #[tokio::test]
    async fn unregistered_range_is_not_found() {
        let (queue, _) = queue_fixture().await;
        let err = queue
            .enqueue(RangeId(99), false, false)
            .await
            .expect_err("unregistered");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn registering_a_range_twice_keeps_its_threshold() {
        let (queue, _) = queue_fixture().await;
        queue.enqueue(RangeId(1), true, false).await.expect("pass");
        let before = queue.last_threshold(RangeId(1)).expect("threshold");

        queue.register_range(RangeDescriptor {
            id: RangeId(1),
            span: Span::for_prefix("table1"),
        });
        assert_eq!(queue.last_threshold(RangeId(1)), Some(before));
    }

    #[tokio::test]
    async fn async_enqueue_returns_the_scoring_decision_and_processes() {
        let (queue, versions) = queue_fixture().await;
        versions.write_version(
            RangeId(1),
            Key::from("table1/a"),
            granite_core::Timestamp::from_nanos(10),
            128,
            false,
        );

        let trace = queue.enqueue(RangeId(1), true, true).await.expect("queue");
        assert!(!trace.processed, "async trace covers only the decision");

        // The spawned pass lands shortly after.
        for _ in 0..100 {
            if versions.version_count(RangeId(1)) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("async GC pass never removed the garbage");
    }
}
