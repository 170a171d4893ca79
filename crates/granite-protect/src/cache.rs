//! Per-node read-through cache of the protection state.
//!
//! The cache amortizes read load off the record store: a background poller
//! refreshes an immutable snapshot on a fixed interval, and every GC
//! decision answers from the last-refreshed snapshot. Staleness is allowed
//! and bounded by the poll interval; a stale cache can only over-protect
//! (delay GC), never under-protect, because records are only ever removed
//! by an explicit release.
//!
//! Readers clone an `Arc` to the current snapshot; refreshes swap the
//! whole `Arc`, so no reader ever observes a partially updated view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use granite_core::kv::KvStore;
use granite_core::tasks::ShutdownSignal;
use granite_core::{Error, Result, Span, Timestamp};

use crate::metrics;
use crate::record::{ProtectionRecord, ProtectionState};
use crate::resolver::{MetadataResolver, resolve_target};
use crate::store::RecordStore;

/// Default poll interval for the refresh loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// An immutable snapshot of the protection state, fresh through `as_of`.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    /// The cached protection state.
    pub state: ProtectionState,
    /// The timestamp through which this snapshot is known fresh (the
    /// refresh transaction's read time).
    pub as_of: Timestamp,
}

impl CacheSnapshot {
    fn empty() -> Self {
        Self {
            state: ProtectionState::default(),
            as_of: Timestamp::MIN,
        }
    }
}

/// Read-through protection cache refreshed by a background poller.
pub struct ProtectionCache<K> {
    store: Arc<RecordStore<K>>,
    snapshot: RwLock<Arc<CacheSnapshot>>,
    /// Serializes refreshes; at most one in flight.
    refresh_guard: tokio::sync::Mutex<()>,
    as_of_tx: watch::Sender<Timestamp>,
    poll_interval_nanos: AtomicU64,
}

impl<K: KvStore> ProtectionCache<K> {
    /// Creates a cache over the record store with the default poll
    /// interval. The snapshot is empty until the first refresh.
    #[must_use]
    pub fn new(store: Arc<RecordStore<K>>) -> Self {
        let (as_of_tx, _rx) = watch::channel(Timestamp::MIN);
        Self {
            store,
            snapshot: RwLock::new(Arc::new(CacheSnapshot::empty())),
            refresh_guard: tokio::sync::Mutex::new(()),
            as_of_tx,
            poll_interval_nanos: AtomicU64::new(
                u64::try_from(DEFAULT_POLL_INTERVAL.as_nanos()).unwrap_or(u64::MAX),
            ),
        }
    }

    /// Returns the configured poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_nanos(self.poll_interval_nanos.load(Ordering::Relaxed))
    }

    /// Adjusts the poll interval; picked up by the running poller on its
    /// next tick, no restart required.
    pub fn set_poll_interval(&self, interval: Duration) {
        self.poll_interval_nanos.store(
            u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Returns the current snapshot.
    ///
    /// Never performs I/O; the returned `Arc` stays consistent even if a
    /// refresh lands concurrently.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .unwrap_or_else(|_| Arc::new(CacheSnapshot::empty()))
    }

    /// Fetches the state from the record store and atomically replaces the
    /// in-memory snapshot.
    ///
    /// # Errors
    ///
    /// Transient store failures propagate (the poller logs and retries on
    /// its next tick). A `CorruptState` verification failure aborts the
    /// refresh; the prior snapshot keeps serving.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_guard.lock().await;
        let start = Instant::now();

        let (state, read_ts) = self.store.get_state().await.inspect_err(|e| {
            metrics::record_refresh_error();
            if matches!(e, Error::CorruptState { .. }) {
                tracing::error!(error = %e, "protection state failed verification; keeping prior snapshot");
            } else {
                tracing::warn!(error = %e, "protection cache refresh failed; serving stale snapshot");
            }
        })?;

        let snapshot = Arc::new(CacheSnapshot {
            state,
            as_of: read_ts,
        });
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = snapshot;
        }
        let _ = self.as_of_tx.send(read_ts);

        metrics::record_refresh(start.elapsed().as_secs_f64());
        tracing::trace!(as_of = %read_ts, "protection cache refreshed");
        Ok(())
    }

    /// Returns the minimum active protection timestamp overlapping `span`
    /// (or `None` if no record applies), plus the snapshot's `as_of`.
    ///
    /// Answers from the last-refreshed snapshot; the only I/O is resolving
    /// schema-object targets through the metadata collaborator.
    ///
    /// # Errors
    ///
    /// Propagates target-resolution failures.
    pub async fn query_protection_timestamp<R: MetadataResolver + ?Sized>(
        &self,
        resolver: &R,
        span: &Span,
    ) -> Result<(Option<Timestamp>, Timestamp)> {
        let snapshot = self.snapshot();
        let mut floor: Option<Timestamp> = None;

        for record in &snapshot.state.records {
            let spans = resolve_target(resolver, &record.target).await?;
            if spans.iter().any(|s| s.overlaps(span)) {
                floor = Some(floor.map_or(record.timestamp, |f| f.min(record.timestamp)));
            }
        }

        Ok((floor, snapshot.as_of))
    }

    /// Returns the raw records of the current snapshot; finite and
    /// restartable each call. Used by the reconciler.
    #[must_use]
    pub fn iterate(&self) -> Vec<ProtectionRecord> {
        self.snapshot().state.records.clone()
    }

    /// Blocks until the cache's `as_of` is at or past `ts`.
    ///
    /// This is the verification call for strict consumers that cannot
    /// tolerate staleness: after a `protect`, waiting for the write's
    /// timestamp guarantees the cache reflects it.
    pub async fn wait_for_as_of(&self, ts: Timestamp) {
        let mut rx = self.as_of_tx.subscribe();
        // An error means the cache is being torn down; nothing to wait for.
        let _ = rx.wait_for(|as_of| *as_of >= ts).await;
    }

    /// The poller loop: refresh on every tick until shutdown.
    pub async fn run(self: Arc<Self>, mut signal: ShutdownSignal) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval()) => {
                    // Errors were already logged; stale serving continues.
                    let _ = self.refresh().await;
                }
                () = signal.wait() => {
                    tracing::debug!("protection cache poller stopping");
                    return;
                }
            }
        }
    }
}
