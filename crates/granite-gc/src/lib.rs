//! # granite-gc
//!
//! The garbage-collection control loop: decides, per range, how far GC
//! may advance and drives version removal below that threshold.
//!
//! ## Architecture
//!
//! - **Threshold Calculator**: `threshold = min(now - ttl, floor.prev())`
//!   where the floor is the minimum protected timestamp overlapping the
//!   range, answered by the protection cache. Data at or above the floor
//!   is never collected.
//! - **GC Queue**: per-range evaluation through a score gate, then
//!   processing under per-range exclusivity; every evaluation yields a
//!   structured [`trace::GcTrace`].
//! - **Scanner**: background loop that periodically pushes every
//!   registered range through the queue with bounded concurrency.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use granite_gc::{GcQueue, Scanner, GcConfig, ThresholdCalculator};
//!
//! let calculator = ThresholdCalculator::new(cache, resolver, clock);
//! let queue = Arc::new(GcQueue::new(calculator, policy, versions));
//! queue.register_range(descriptor);
//!
//! // Manual, forced pass (admin path):
//! let trace = queue.enqueue(range, true, false).await?;
//! println!("{trace}");
//!
//! // Or let the scanner drive it:
//! let scanner = Arc::new(Scanner::new(queue, GcConfig::default()));
//! group.spawn("gc-scanner", |signal| scanner.run(signal));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod metrics;
pub mod policy;
pub mod queue;
pub mod range;
pub mod scanner;
pub mod score;
pub mod threshold;
pub mod trace;
pub mod version_store;

// Re-export main types at crate root
pub use policy::{GcPolicy, PolicySource, StaticPolicy};
pub use queue::GcQueue;
pub use range::{RangeDescriptor, RangeId};
pub use scanner::{DEFAULT_CONCURRENCY, DEFAULT_SCAN_INTERVAL, GcConfig, Scanner};
pub use score::{DEAD_FRACTION_THRESHOLD, GcScore, score_range};
pub use threshold::{ThresholdCalculator, ThresholdResult, compute_threshold};
pub use trace::GcTrace;
pub use version_store::{MemoryVersionStore, RangeStats, RemovalStats, VersionStore};
