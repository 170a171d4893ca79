//! Reconciler: retires protections on since-deleted targets.
//!
//! A record targeting a dropped table would otherwise block GC on whatever
//! spans the table used to cover, forever. The reconciler periodically
//! walks the cached records, resolves each target against current
//! metadata, and releases records whose targets no longer exist. It is
//! best-effort: resolution or release failures are logged and retried on
//! the next cycle, never fatal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use granite_core::kv::KvStore;
use granite_core::tasks::ShutdownSignal;
use granite_core::Result;

use crate::cache::ProtectionCache;
use crate::metrics;
use crate::record::ProtectionTarget;
use crate::resolver::MetadataResolver;
use crate::store::RecordStore;

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often a reconciliation pass runs. Low frequency: this is a
    /// safety net, not a hot path.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Per-pass statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Records examined.
    pub scanned: u64,
    /// Records released because their targets were gone.
    pub released: u64,
    /// Failures absorbed during the pass.
    pub errors: u64,
}

/// Periodically releases records whose targets have been dropped.
pub struct Reconciler<K, R> {
    store: Arc<RecordStore<K>>,
    cache: Arc<ProtectionCache<K>>,
    resolver: Arc<R>,
    interval_nanos: AtomicU64,
}

impl<K: KvStore, R: MetadataResolver> Reconciler<K, R> {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        store: Arc<RecordStore<K>>,
        cache: Arc<ProtectionCache<K>>,
        resolver: Arc<R>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            resolver,
            interval_nanos: AtomicU64::new(
                u64::try_from(config.interval.as_nanos()).unwrap_or(u64::MAX),
            ),
        }
    }

    /// Current interval between reconciliation passes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos.load(Ordering::Relaxed))
    }

    /// Adjusts the interval; effective from the next cycle.
    pub fn set_interval(&self, interval: Duration) {
        self.interval_nanos.store(
            u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Runs a single reconciliation pass.
    ///
    /// Only schema-object targets can become orphaned; explicit-span
    /// records are left alone. A record is released only when *every* one
    /// of its objects has been dropped; a partially dropped target still
    /// protects the surviving spans.
    ///
    /// # Errors
    ///
    /// Individual failures are absorbed into the stats; this only errors
    /// if the pass cannot run at all.
    pub async fn run_pass(&self) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        for record in self.cache.iterate() {
            stats.scanned += 1;

            let ProtectionTarget::SchemaObjects(ref ids) = record.target else {
                continue;
            };

            let mut all_dropped = true;
            let mut resolution_failed = false;
            for id in ids {
                match self.resolver.resolve(*id).await {
                    Ok(Some(_)) => {
                        all_dropped = false;
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        stats.errors += 1;
                        resolution_failed = true;
                        tracing::warn!(record = %record.id, object = %id, error = %e,
                            "target resolution failed; retrying next cycle");
                        break;
                    }
                }
            }

            if resolution_failed || !all_dropped || ids.is_empty() {
                continue;
            }

            match self.store.release_idempotent(record.id).await {
                Ok(()) => {
                    stats.released += 1;
                    metrics::record_reconcile_released();
                    tracing::info!(record = %record.id, timestamp = %record.timestamp,
                        "released protection on dropped target");
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(record = %record.id, error = %e,
                        "release failed; retrying next cycle");
                }
            }
        }

        Ok(stats)
    }

    /// The reconciler loop for the task supervisor.
    pub async fn run(self: Arc<Self>, mut signal: ShutdownSignal) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval()) => {
                    match self.run_pass().await {
                        Ok(stats) => {
                            tracing::debug!(scanned = stats.scanned, released = stats.released,
                                errors = stats.errors, "reconcile pass completed");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "reconcile pass failed");
                        }
                    }
                }
                () = signal.wait() => {
                    tracing::debug!("reconciler stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granite_core::{ManualClock, MemoryKv, Span, Timestamp};

    use crate::record::{ProtectionRecord, SchemaObjectId};
    use crate::resolver::StaticResolver;

    struct Fixture {
        store: Arc<RecordStore<Arc<MemoryKv>>>,
        cache: Arc<ProtectionCache<Arc<MemoryKv>>>,
        resolver: Arc<StaticResolver>,
        reconciler: Reconciler<Arc<MemoryKv>, StaticResolver>,
        kv: Arc<MemoryKv>,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::new(1_000_000_000);
        let kv = Arc::new(MemoryKv::new(Arc::new(clock)));
        let store = Arc::new(RecordStore::new(Arc::clone(&kv)).await.expect("init"));
        let cache = Arc::new(ProtectionCache::new(Arc::clone(&store)));
        let resolver = Arc::new(StaticResolver::new());
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&resolver),
            ReconcilerConfig::default(),
        );
        Fixture {
            store,
            cache,
            resolver,
            reconciler,
            kv,
        }
    }

    #[tokio::test]
    async fn releases_record_on_dropped_object() {
        let f = fixture().await;
        let id = SchemaObjectId(7);
        f.resolver.insert(id, vec![Span::for_prefix("table/7/")]);

        let rec =
            ProtectionRecord::protect_after_schema_objects(Timestamp::from_nanos(100), vec![id]);
        f.store.protect(&rec).await.expect("protect");
        f.cache.refresh().await.expect("refresh");

        // Target still live: nothing released.
        let stats = f.reconciler.run_pass().await.expect("pass");
        assert_eq!(stats, ReconcileStats { scanned: 1, released: 0, errors: 0 });

        f.resolver.drop_object(id);
        let stats = f.reconciler.run_pass().await.expect("pass");
        assert_eq!(stats.released, 1);

        let (state, _) = f.store.get_state().await.expect("state");
        assert!(state.records.is_empty());
    }

    #[tokio::test]
    async fn partially_dropped_target_is_kept() {
        let f = fixture().await;
        let live = SchemaObjectId(1);
        let dropped = SchemaObjectId(2);
        f.resolver.insert(live, vec![Span::for_prefix("table/1/")]);

        let rec = ProtectionRecord::protect_after_schema_objects(
            Timestamp::from_nanos(100),
            vec![dropped, live],
        );
        f.store.protect(&rec).await.expect("protect");
        f.cache.refresh().await.expect("refresh");

        let stats = f.reconciler.run_pass().await.expect("pass");
        assert_eq!(stats.released, 0);

        let (state, _) = f.store.get_state().await.expect("state");
        assert_eq!(state.num_records, 1);
    }

    #[tokio::test]
    async fn span_targets_are_never_reconciled() {
        let f = fixture().await;
        let rec = ProtectionRecord::protect_after_spans(
            Timestamp::from_nanos(100),
            vec![Span::for_prefix("table/1/")],
        );
        f.store.protect(&rec).await.expect("protect");
        f.cache.refresh().await.expect("refresh");

        let stats = f.reconciler.run_pass().await.expect("pass");
        assert_eq!(stats, ReconcileStats { scanned: 1, released: 0, errors: 0 });
    }

    #[tokio::test]
    async fn release_failure_is_absorbed_and_retried() {
        let f = fixture().await;
        let id = SchemaObjectId(7);

        let rec =
            ProtectionRecord::protect_after_schema_objects(Timestamp::from_nanos(100), vec![id]);
        f.store.protect(&rec).await.expect("protect");
        f.cache.refresh().await.expect("refresh");

        // The release's reads hit an injected outage.
        f.kv.fail_next(1);
        let stats = f.reconciler.run_pass().await.expect("pass");
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.released, 0);

        // Next cycle succeeds.
        let stats = f.reconciler.run_pass().await.expect("pass");
        assert_eq!(stats.released, 1);
    }
}
