//! Per-range GC policy.
//!
//! TTL and size thresholds come from zone configuration, an external
//! collaborator; the scanner and calculator consume them read-only
//! through [`PolicySource`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::range::RangeId;

/// GC policy for a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcPolicy {
    /// Maximum age of a version before it becomes eligible for removal,
    /// absent protections.
    pub ttl: Duration,
    /// Soft size cap for the range; feeds the score's urgency.
    pub range_max_bytes: u64,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            // 25 hours: long enough that reads as of "yesterday at this
            // time" still succeed by default.
            ttl: Duration::from_secs(25 * 60 * 60),
            range_max_bytes: 256 << 20,
        }
    }
}

impl GcPolicy {
    /// Returns a policy with the given TTL and default size cap.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// Validates the policy settings.
    ///
    /// Returns a description of the problem if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.ttl.is_zero() {
            return Some("ttl must be positive".to_string());
        }
        if self.range_max_bytes == 0 {
            return Some("range_max_bytes must be positive".to_string());
        }
        None
    }
}

/// Supplies the GC policy for a range.
pub trait PolicySource: Send + Sync + 'static {
    /// Returns the policy currently in effect for `range`.
    fn policy_for(&self, range: RangeId) -> GcPolicy;
}

/// Policy source over a default plus per-range overrides; adjustable at
/// runtime.
#[derive(Debug, Default)]
pub struct StaticPolicy {
    default: GcPolicy,
    overrides: RwLock<HashMap<RangeId, GcPolicy>>,
}

impl StaticPolicy {
    /// Creates a source that answers `default` for every range.
    #[must_use]
    pub fn new(default: GcPolicy) -> Self {
        Self {
            default,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Sets an override for a single range.
    pub fn set_override(&self, range: RangeId, policy: GcPolicy) {
        if let Ok(mut overrides) = self.overrides.write() {
            overrides.insert(range, policy);
        }
    }
}

impl PolicySource for StaticPolicy {
    fn policy_for(&self, range: RangeId) -> GcPolicy {
        self.overrides
            .read()
            .ok()
            .and_then(|o| o.get(&range).cloned())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        let policy = GcPolicy::default();
        assert!(policy.validate().is_none());
        assert_eq!(policy.ttl, Duration::from_secs(90_000));
    }

    #[test]
    fn zero_ttl_fails_validation() {
        let policy = GcPolicy::with_ttl(Duration::ZERO);
        assert!(policy.validate().is_some());
    }

    #[test]
    fn overrides_take_precedence() {
        let source = StaticPolicy::new(GcPolicy::default());
        let range = RangeId(3);
        assert_eq!(source.policy_for(range), GcPolicy::default());

        let short = GcPolicy::with_ttl(Duration::from_secs(1));
        source.set_override(range, short.clone());
        assert_eq!(source.policy_for(range), short);
        assert_eq!(source.policy_for(RangeId(4)), GcPolicy::default());
    }
}
