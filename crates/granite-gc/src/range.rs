//! Range identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use granite_core::Span;

/// Identifier of a range, the unit GC operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeId(pub u64);

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A range's identity plus the span of the keyspace it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    /// Range identifier.
    pub id: RangeId,
    /// The span the range covers.
    pub span: Span,
}

impl RangeDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(id: RangeId, span: Span) -> Self {
        Self { id, span }
    }
}
