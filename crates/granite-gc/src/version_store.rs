//! Version storage collaborator.
//!
//! The GC queue decides *whether* and *up to where* to collect; actually
//! removing expired versions is the storage layer's job, reached through
//! [`VersionStore`]. Removal is idempotent at that layer: removing
//! already-removed versions is a no-op, so an abandoned pass retried on
//! the next scan cycle cannot corrupt anything.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use granite_core::{Error, Key, Result, Timestamp};

use crate::range::RangeId;

/// Garbage statistics for a range, consumed by the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeStats {
    /// Bytes held by live (current) versions.
    pub live_bytes: u64,
    /// Bytes held by superseded versions, i.e. candidates for removal
    /// once past the threshold.
    pub garbage_bytes: u64,
    /// Timestamp of the oldest superseded version, if any.
    pub oldest_garbage: Option<Timestamp>,
    /// Total point keys in the range.
    pub point_keys: u64,
}

/// Result of a removal pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    /// Point keys inspected.
    pub keys_handled: u64,
    /// Versions removed.
    pub keys_deleted: u64,
}

/// The storage layer's version-removal interface.
#[async_trait]
pub trait VersionStore: Send + Sync + 'static {
    /// Returns garbage statistics for `range`.
    async fn range_stats(&self, range: RangeId) -> Result<RangeStats>;

    /// Removes superseded versions with timestamps strictly below
    /// `threshold`. Idempotent.
    async fn remove_versions_below(
        &self,
        range: RangeId,
        threshold: Timestamp,
    ) -> Result<RemovalStats>;
}

/// A single MVCC version in the in-memory store.
#[derive(Debug, Clone)]
struct Version {
    key: Key,
    ts: Timestamp,
    bytes: u64,
    /// Live versions are never removable regardless of age.
    live: bool,
}

/// In-memory version store for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    ranges: RwLock<HashMap<RangeId, Vec<Version>>>,
}

impl MemoryVersionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a version into a range. `live=false` marks it superseded
    /// (garbage once past the GC threshold).
    pub fn write_version(&self, range: RangeId, key: Key, ts: Timestamp, bytes: u64, live: bool) {
        if let Ok(mut ranges) = self.ranges.write() {
            ranges.entry(range).or_default().push(Version {
                key,
                ts,
                bytes,
                live,
            });
        }
    }

    /// Returns the number of versions currently stored in `range`.
    #[must_use]
    pub fn version_count(&self, range: RangeId) -> usize {
        self.ranges
            .read()
            .ok()
            .and_then(|r| r.get(&range).map(Vec::len))
            .unwrap_or(0)
    }

    /// Returns the keys of versions at or above `ts` in `range`. Tests
    /// use this to assert that protected data survived a GC pass.
    #[must_use]
    pub fn keys_at_or_above(&self, range: RangeId, ts: Timestamp) -> Vec<Key> {
        self.ranges
            .read()
            .ok()
            .and_then(|r| {
                r.get(&range).map(|versions| {
                    versions
                        .iter()
                        .filter(|v| v.ts >= ts)
                        .map(|v| v.key.clone())
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn range_stats(&self, range: RangeId) -> Result<RangeStats> {
        let ranges = self
            .ranges
            .read()
            .map_err(|_| Error::internal("lock poisoned"))?;
        let versions = ranges.get(&range).map(Vec::as_slice).unwrap_or_default();

        let mut stats = RangeStats::default();
        for v in versions {
            stats.point_keys += 1;
            if v.live {
                stats.live_bytes += v.bytes;
            } else {
                stats.garbage_bytes += v.bytes;
                stats.oldest_garbage = Some(match stats.oldest_garbage {
                    Some(old) => old.min(v.ts),
                    None => v.ts,
                });
            }
        }
        Ok(stats)
    }

    async fn remove_versions_below(
        &self,
        range: RangeId,
        threshold: Timestamp,
    ) -> Result<RemovalStats> {
        let mut ranges = self
            .ranges
            .write()
            .map_err(|_| Error::internal("lock poisoned"))?;
        let versions = ranges.entry(range).or_default();

        let before = versions.len() as u64;
        versions.retain(|v| v.live || v.ts >= threshold);
        let deleted = before - versions.len() as u64;

        Ok(RemovalStats {
            keys_handled: before,
            keys_deleted: deleted,
        })
    }
}
