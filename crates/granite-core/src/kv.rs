//! Transactional key-value abstraction.
//!
//! Protection records are plain rows written through the store's
//! transactional KV interface; this trait captures the slice of that
//! interface the subsystem needs. Mutations go through atomic batches with
//! per-op preconditions, and snapshot reads return a consistent view
//! together with its read timestamp.
//!
//! [`MemoryKv`] is the in-process implementation used by tests and demos.
//! It supports failure injection so pollers and reconcilers can be
//! exercised against transient unavailability.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::span::Key;
use crate::timestamp::Timestamp;

/// Precondition attached to a single write within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// The key must not exist (insert semantics).
    MustNotExist,
    /// The key must exist (update/delete semantics).
    MustExist,
    /// The key must hold exactly this value (compare-and-swap).
    MatchesValue(Bytes),
    /// Write unconditionally.
    None,
}

/// A single operation within an atomic batch.
#[derive(Debug, Clone)]
pub enum KvOp {
    /// Write `value` at `key`, subject to `precondition`.
    Put {
        /// Destination key.
        key: Key,
        /// Value bytes.
        value: Bytes,
        /// Precondition checked atomically with the batch.
        precondition: WritePrecondition,
    },
    /// Delete `key`, subject to `precondition`.
    Delete {
        /// Key to delete.
        key: Key,
        /// Precondition checked atomically with the batch.
        precondition: WritePrecondition,
    },
}

/// A consistent prefix read together with its read timestamp.
#[derive(Debug, Clone)]
pub struct SnapshotRead {
    /// Key-value pairs under the requested prefix, key-ordered.
    pub entries: Vec<(Key, Bytes)>,
    /// The timestamp at which this snapshot was taken.
    pub read_ts: Timestamp,
}

/// The transactional key-value interface protection records are stored
/// through.
///
/// All batches are atomic and linearizable with respect to each other; no
/// partial writes are observable.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Point lookup. Returns `None` if the key is absent.
    async fn get(&self, key: &Key) -> Result<Option<Bytes>>;

    /// Applies all operations atomically, or none of them.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` / `Error::NotFound` if a
    /// precondition fails; no operation in the batch takes effect.
    async fn batch(&self, ops: Vec<KvOp>) -> Result<()>;

    /// Returns a consistent snapshot of all keys under `prefix` plus the
    /// timestamp the snapshot was read at.
    async fn read_snapshot(&self, prefix: &[u8]) -> Result<SnapshotRead>;
}

#[async_trait]
impl<K: KvStore + ?Sized> KvStore for Arc<K> {
    async fn get(&self, key: &Key) -> Result<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn batch(&self, ops: Vec<KvOp>) -> Result<()> {
        (**self).batch(ops).await
    }

    async fn read_snapshot(&self, prefix: &[u8]) -> Result<SnapshotRead> {
        (**self).read_snapshot(prefix).await
    }
}

/// In-memory KV store for tests and demos.
///
/// Thread-safe via `RwLock`; batches hold the write lock for their whole
/// application, which makes them atomic and linearizable.
pub struct MemoryKv {
    entries: RwLock<BTreeMap<Key, Bytes>>,
    clock: Arc<dyn Clock>,
    inject_failures: AtomicU32,
}

impl MemoryKv {
    /// Creates an empty store reading timestamps from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            clock,
            inject_failures: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` operations fail with `Error::Unavailable`.
    ///
    /// Used by tests to exercise the absorb-and-retry paths of background
    /// tasks.
    pub fn fail_next(&self, n: u32) {
        self.inject_failures.store(n, Ordering::SeqCst);
    }

    fn check_fault(&self) -> Result<()> {
        let remaining = self.inject_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .inject_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(Error::unavailable("injected failure"));
        }
        Ok(())
    }

    fn check_precondition(
        entries: &BTreeMap<Key, Bytes>,
        key: &Key,
        precondition: &WritePrecondition,
    ) -> Result<()> {
        match precondition {
            WritePrecondition::MustNotExist if entries.contains_key(key) => {
                Err(Error::already_exists("key", key))
            }
            WritePrecondition::MustExist if !entries.contains_key(key) => {
                Err(Error::not_found("key", key))
            }
            WritePrecondition::MatchesValue(expected) => match entries.get(key) {
                Some(current) if current == expected => Ok(()),
                _ => Err(Error::cas_failed(format!(
                    "concurrent modification of {key}"
                ))),
            },
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &Key) -> Result<Option<Bytes>> {
        self.check_fault()?;
        let entries = self.entries.read().map_err(|_| Error::internal("lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn batch(&self, ops: Vec<KvOp>) -> Result<()> {
        self.check_fault()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::internal("lock poisoned"))?;

        // Validate every precondition before applying anything.
        for op in &ops {
            match op {
                KvOp::Put {
                    key, precondition, ..
                }
                | KvOp::Delete { key, precondition } => {
                    Self::check_precondition(&entries, key, precondition)?;
                }
            }
        }

        for op in ops {
            match op {
                KvOp::Put { key, value, .. } => {
                    entries.insert(key, value);
                }
                KvOp::Delete { key, .. } => {
                    entries.remove(&key);
                }
            }
        }

        Ok(())
    }

    async fn read_snapshot(&self, prefix: &[u8]) -> Result<SnapshotRead> {
        self.check_fault()?;
        let read_ts = self.clock.now();
        let entries = self.entries.read().map_err(|_| Error::internal("lock poisoned"))?;

        Ok(SnapshotRead {
            entries: entries
                .iter()
                .filter(|(k, _)| k.as_bytes().starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            read_ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemoryKv, ManualClock) {
        let clock = ManualClock::new(1_000_000_000);
        (MemoryKv::new(Arc::new(clock.clone())), clock)
    }

    fn put(key: &str, value: &str, precondition: WritePrecondition) -> KvOp {
        KvOp::Put {
            key: Key::from(key),
            value: Bytes::copy_from_slice(value.as_bytes()),
            precondition,
        }
    }

    #[tokio::test]
    async fn batch_is_atomic_on_precondition_failure() {
        let (kv, _clock) = store();
        kv.batch(vec![put("a", "1", WritePrecondition::None)])
            .await
            .expect("seed");

        // Second op's precondition fails; the first must not apply.
        let err = kv
            .batch(vec![
                put("b", "2", WritePrecondition::None),
                put("a", "x", WritePrecondition::MustNotExist),
            ])
            .await
            .expect_err("precondition should fail");
        assert!(matches!(err, Error::AlreadyExists { .. }));

        assert!(kv.get(&Key::from("b")).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn delete_must_exist_reports_not_found() {
        let (kv, _clock) = store();
        let err = kv
            .batch(vec![KvOp::Delete {
                key: Key::from("missing"),
                precondition: WritePrecondition::MustExist,
            }])
            .await
            .expect_err("should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn snapshot_read_carries_clock_timestamp() {
        let (kv, clock) = store();
        kv.batch(vec![
            put("pts/a", "1", WritePrecondition::None),
            put("pts/b", "2", WritePrecondition::None),
            put("other/c", "3", WritePrecondition::None),
        ])
        .await
        .expect("seed");

        clock.set(42);
        let snap = kv.read_snapshot(b"pts/").await.expect("snapshot");
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.read_ts, Timestamp::from_nanos(42));
    }

    #[tokio::test]
    async fn matches_value_detects_concurrent_modification() {
        let (kv, _clock) = store();
        kv.batch(vec![put("counter", "1", WritePrecondition::None)])
            .await
            .expect("seed");

        // Matching value succeeds.
        kv.batch(vec![put(
            "counter",
            "2",
            WritePrecondition::MatchesValue(Bytes::from_static(b"1")),
        )])
        .await
        .expect("cas");

        // Stale value fails.
        let err = kv
            .batch(vec![put(
                "counter",
                "3",
                WritePrecondition::MatchesValue(Bytes::from_static(b"1")),
            )])
            .await
            .expect_err("stale cas");
        assert!(matches!(err, Error::CasFailed { .. }));
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let (kv, _clock) = store();
        kv.fail_next(1);

        let err = kv.get(&Key::from("a")).await.expect_err("injected");
        assert!(err.is_transient());

        // Next call succeeds.
        assert!(kv.get(&Key::from("a")).await.expect("get").is_none());
    }
}
