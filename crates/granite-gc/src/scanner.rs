//! Background scanner driving the GC queue.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use granite_core::kv::KvStore;
use granite_core::tasks::ShutdownSignal;

use crate::queue::GcQueue;

/// Default interval between scan cycles.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of ranges processed concurrently within a cycle.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Scanner configuration.
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Interval between scan cycles.
    pub scan_interval: Duration,
    /// Concurrency bound for range processing within a cycle.
    pub concurrency: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Periodically evaluates every registered range through the queue.
///
/// Interval and concurrency are adjustable at runtime and take effect on
/// the next cycle.
pub struct Scanner<K> {
    queue: Arc<GcQueue<K>>,
    scan_interval_nanos: AtomicU64,
    concurrency: AtomicUsize,
}

impl<K: KvStore> Scanner<K> {
    /// Creates a scanner over `queue`.
    #[must_use]
    pub fn new(queue: Arc<GcQueue<K>>, config: GcConfig) -> Self {
        Self {
            queue,
            scan_interval_nanos: AtomicU64::new(
                u64::try_from(config.scan_interval.as_nanos()).unwrap_or(u64::MAX),
            ),
            concurrency: AtomicUsize::new(config.concurrency.max(1)),
        }
    }

    /// Current interval between scan cycles.
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_nanos(self.scan_interval_nanos.load(Ordering::Relaxed))
    }

    /// Adjusts the interval; effective from the next cycle.
    pub fn set_scan_interval(&self, interval: Duration) {
        self.scan_interval_nanos.store(
            u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Adjusts the concurrency bound; effective from the next cycle.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.concurrency.store(concurrency.max(1), Ordering::Relaxed);
    }

    /// Runs one scan cycle over all registered ranges.
    pub async fn scan_once(&self) {
        let concurrency = self.concurrency.load(Ordering::Relaxed);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::new();

        for range in self.queue.range_ids() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let queue = Arc::clone(&self.queue);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = queue.enqueue(range, false, false).await {
                    tracing::warn!(range = %range, error = %e, "GC scan of range failed");
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Runs scan cycles until shutdown.
    pub async fn run(self: Arc<Self>, mut signal: ShutdownSignal) {
        tracing::info!(interval = ?self.scan_interval(), "GC scanner started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.scan_interval()) => {
                    self.scan_once().await;
                }
                () = signal.wait() => {
                    tracing::info!("GC scanner stopped");
                    return;
                }
            }
        }
    }
}
