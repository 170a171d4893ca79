//! Keys and key spans.
//!
//! Ranges of the keyspace and protection targets are both expressed as
//! end-exclusive [`Span`]s over opaque byte [`Key`]s. Overlap between a
//! record's target spans and a range's span is what puts the record's
//! timestamp on that range's protection floor.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An opaque key in the store's keyspace, ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Bytes);

impl Key {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes of the key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Printable keys render as text, others as hex.
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{s}"),
            _ => {
                for b in &self.0 {
                    write!(f, "\\x{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// An end-exclusive span of the keyspace: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start key.
    pub start: Key,
    /// Exclusive end key.
    pub end: Key,
}

impl Span {
    /// Creates a span, validating that `start < end`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the span is empty or inverted.
    pub fn new(start: Key, end: Key) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidInput(format!(
                "invalid span: start {start} must precede end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Creates a span over the whole keyspace of a single table-like
    /// prefix: `[prefix, prefix+0xff)`.
    #[must_use]
    pub fn for_prefix(prefix: &str) -> Self {
        let mut end = prefix.as_bytes().to_vec();
        end.push(0xff);
        Self {
            start: Key::from(prefix),
            end: Key::from(end),
        }
    }

    /// Returns true if this span overlaps `other`.
    #[must_use]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `key` falls within this span.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        *key >= self.start && *key < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
