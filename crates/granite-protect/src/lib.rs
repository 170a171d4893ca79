//! # granite-protect
//!
//! The protected-timestamp subsystem: durable declarations that data
//! needed to read as of a timestamp, for a set of targets, must not be
//! garbage collected.
//!
//! ## Architecture
//!
//! - **Record Store**: transactional storage of [`record::ProtectionRecord`]s;
//!   the single source of truth. Mutations are atomic and linearized by
//!   the underlying KV layer.
//! - **Protection Cache**: per-node read-through mirror refreshed by a
//!   background poller; answers "what is the minimum protected timestamp
//!   overlapping this span?" with bounded staleness. Stale answers can
//!   only over-protect, never under-protect.
//! - **Reconciler**: low-frequency pass that releases records whose
//!   schema-object targets were dropped, so orphaned protections cannot
//!   block GC forever.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use granite_protect::{ProtectionCache, ProtectionRecord, RecordStore};
//!
//! let store = Arc::new(RecordStore::new(kv).await?);
//! let cache = Arc::new(ProtectionCache::new(Arc::clone(&store)));
//!
//! let record = ProtectionRecord::protect_after_spans(ts, spans);
//! store.protect(&record).await?;
//!
//! // Strict consumers synchronize with the write before relying on it.
//! cache.wait_for_as_of(record.timestamp).await;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod metrics;
pub mod record;
pub mod reconciler;
pub mod resolver;
pub mod store;

// Re-export main types at crate root
pub use cache::{CacheSnapshot, DEFAULT_POLL_INTERVAL, ProtectionCache};
pub use record::{
    ProtectionMode, ProtectionRecord, ProtectionState, ProtectionTarget, RecordId, SchemaObjectId,
};
pub use reconciler::{ReconcileStats, Reconciler, ReconcilerConfig};
pub use resolver::{MetadataResolver, StaticResolver, resolve_target};
pub use store::RecordStore;
