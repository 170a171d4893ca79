//! Protection record model.
//!
//! A [`ProtectionRecord`] is a durable assertion that data needed to read
//! as of a given timestamp, for a given target, must not be garbage
//! collected. Records are immutable after creation: they are created by
//! `protect`, read by `get_record`/`get_state`, and destroyed by
//! `release`, never mutated in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use granite_core::{Error, Result, Span, Timestamp};

/// A globally unique identifier for a protection record.
///
/// Assigned at creation with no coordination; immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a new unique record ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from a raw UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid record ID '{s}': {e}")))
    }
}

/// An identifier for a schema object (table, index, ...) whose current
/// spans are resolved at evaluation time by the metadata collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaObjectId(pub u64);

impl fmt::Display for SchemaObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a protection record protects relative to its timestamp.
///
/// Only [`ProtectionMode::ProtectAfter`] carries semantics today; the
/// variant is an extensible tagged enum so new modes can be added without
/// a storage migration, but no semantics are defined for them here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ProtectionMode {
    /// Protects all versions visible as of the record's timestamp and
    /// later.
    ProtectAfter,
}

/// The target a protection record applies to: either explicit key spans,
/// or schema objects resolved to spans at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionTarget {
    /// Explicit key spans.
    Spans(Vec<Span>),
    /// Schema object identifiers, resolved via the metadata collaborator.
    SchemaObjects(Vec<SchemaObjectId>),
}

/// A durable protection assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRecord {
    /// Globally unique identifier, immutable.
    pub id: RecordId,
    /// The timestamp the record protects; immutable after creation.
    pub timestamp: Timestamp,
    /// Protection mode.
    pub mode: ProtectionMode,
    /// The record's target.
    pub target: ProtectionTarget,
}

impl ProtectionRecord {
    /// Creates a `ProtectAfter` record over explicit spans.
    #[must_use]
    pub fn protect_after_spans(timestamp: Timestamp, spans: Vec<Span>) -> Self {
        Self {
            id: RecordId::generate(),
            timestamp,
            mode: ProtectionMode::ProtectAfter,
            target: ProtectionTarget::Spans(spans),
        }
    }

    /// Creates a `ProtectAfter` record over schema objects.
    #[must_use]
    pub fn protect_after_schema_objects(timestamp: Timestamp, ids: Vec<SchemaObjectId>) -> Self {
        Self {
            id: RecordId::generate(),
            timestamp,
            mode: ProtectionMode::ProtectAfter,
            target: ProtectionTarget::SchemaObjects(ids),
        }
    }
}

/// Aggregate snapshot of all currently active protection records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionState {
    /// All active records, id-ordered by storage key.
    pub records: Vec<ProtectionRecord>,
    /// Count maintained alongside the records; a cheap consistency check
    /// against `records.len()`.
    pub num_records: u64,
}

impl ProtectionState {
    /// Verifies the record-count invariant.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorruptState` if `num_records` disagrees with the
    /// collection length. Callers must abort rather than serve the
    /// inconsistent snapshot.
    pub fn verify(&self) -> Result<()> {
        let len = self.records.len() as u64;
        if self.num_records != len {
            return Err(Error::corrupt_state(format!(
                "protection state count mismatch: num_records={} but {} records",
                self.num_records, len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granite_core::Key;

    #[test]
    fn record_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }

    #[test]
    fn record_id_parse_roundtrip() {
        let id = RecordId::generate();
        let parsed: RecordId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<RecordId>().is_err());
    }

    #[test]
    fn record_serde_roundtrip() {
        let span = Span::new(Key::from("a"), Key::from("b")).expect("span");
        let record = ProtectionRecord::protect_after_spans(Timestamp::new(100, 1), vec![span]);

        let json = serde_json::to_string(&record).expect("serialize");
        let parsed: ProtectionRecord = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, record);
    }

    #[test]
    fn state_verify_detects_count_mismatch() {
        let mut state = ProtectionState::default();
        assert!(state.verify().is_ok());

        state.num_records = 1;
        let err = state.verify().expect_err("mismatch");
        assert!(matches!(err, Error::CorruptState { .. }));
    }
}
