//! # granite-core
//!
//! Core abstractions for the Granite protected-timestamp and GC subsystem.
//!
//! This crate provides the foundational types and traits used across all
//! Granite components:
//!
//! - **Timestamps**: Hybrid-logical clock values and clock sources
//! - **Keys and Spans**: The keyspace vocabulary shared by protection
//!   targets and range boundaries
//! - **Transactional KV**: The storage seam protection records are written
//!   through, with an in-memory implementation for tests
//! - **Error Types**: Shared error definitions and result types
//! - **Task Supervision**: Process-wide ownership of background loops
//!
//! ## Crate Boundary
//!
//! `granite-core` is the only crate allowed to define shared primitives.
//! Cross-component interaction happens via the traits defined here.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use granite_core::prelude::*;
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let kv = MemoryKv::new(clock);
//! let _span = Span::for_prefix("table/1/");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod error;
pub mod kv;
pub mod span;
pub mod tasks;
pub mod timestamp;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use granite_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{Error, Result};
    pub use crate::kv::{KvOp, KvStore, MemoryKv, SnapshotRead, WritePrecondition};
    pub use crate::span::{Key, Span};
    pub use crate::tasks::{ShutdownSignal, TaskGroup};
    pub use crate::timestamp::Timestamp;
}

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use kv::{KvOp, KvStore, MemoryKv, SnapshotRead, WritePrecondition};
pub use span::{Key, Span};
pub use tasks::{ShutdownSignal, TaskGroup};
pub use timestamp::Timestamp;
