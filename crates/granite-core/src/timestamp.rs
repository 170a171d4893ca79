//! Hybrid-logical timestamps.
//!
//! A [`Timestamp`] is a wall-clock reading in nanoseconds paired with a
//! logical counter that breaks ties between events within the same
//! nanosecond. Ordering is total: wall time first, logical second. This is
//! the causal clock value that protection records carry and that GC
//! thresholds are expressed in.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A hybrid-logical timestamp: wall-clock nanoseconds plus a logical
/// tie-breaker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Wall-clock reading in nanoseconds since the Unix epoch.
    pub wall: i64,
    /// Logical counter distinguishing events within the same nanosecond.
    pub logical: u32,
}

impl Timestamp {
    /// The zero timestamp, ordered before every real clock reading.
    pub const MIN: Self = Self {
        wall: 0,
        logical: 0,
    };

    /// The maximum representable timestamp, ordered after every real
    /// clock reading. Used as the protection floor when no record applies.
    pub const MAX: Self = Self {
        wall: i64::MAX,
        logical: u32::MAX,
    };

    /// Creates a timestamp from raw parts.
    #[must_use]
    pub const fn new(wall: i64, logical: u32) -> Self {
        Self { wall, logical }
    }

    /// Creates a timestamp from wall-clock nanoseconds with a zero logical
    /// component.
    #[must_use]
    pub const fn from_nanos(wall: i64) -> Self {
        Self { wall, logical: 0 }
    }

    /// Returns this timestamp advanced by `duration` of wall time.
    ///
    /// The logical component is reset: adding wall time dominates any
    /// logical ordering.
    #[must_use]
    pub fn add(self, duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self {
            wall: self.wall.saturating_add(nanos),
            logical: 0,
        }
    }

    /// Returns this timestamp moved back by `duration` of wall time,
    /// saturating at [`Timestamp::MIN`].
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self {
            wall: self.wall.saturating_sub(nanos).max(0),
            logical: 0,
        }
    }

    /// Returns the immediate logical successor of this timestamp.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            wall: self.wall,
            logical: self.logical.saturating_add(1),
        }
    }

    /// Returns the immediate logical predecessor of this timestamp,
    /// saturating at [`Timestamp::MIN`].
    ///
    /// `prev()` is the latest timestamp strictly ordered before `self`;
    /// GC thresholds are capped at a protection's predecessor so the
    /// protected timestamp itself stays readable.
    #[must_use]
    pub const fn prev(self) -> Self {
        if self.logical > 0 {
            Self {
                wall: self.wall,
                logical: self.logical - 1,
            }
        } else if self.wall > 0 {
            Self {
                wall: self.wall - 1,
                logical: u32::MAX,
            }
        } else {
            Self::MIN
        }
    }

    /// Returns true if this is the zero timestamp.
    #[must_use]
    pub const fn is_min(self) -> bool {
        self.wall == 0 && self.logical == 0
    }
}

impl fmt::Display for Timestamp {
    /// Renders as `<seconds>.<nanos, 9 digits>,<logical>`, e.g.
    /// `1611623250.000000000,0`. This is the form traces embed after
    /// `Threshold:` and the form [`FromStr`] accepts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.wall / NANOS_PER_SEC;
        let nanos = self.wall % NANOS_PER_SEC;
        write!(f, "{secs}.{nanos:09},{}", self.logical)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse_err = || Error::InvalidInput(format!("invalid timestamp '{s}'"));

        let (wall_str, logical_str) = s.split_once(',').ok_or_else(parse_err)?;
        let (secs_str, nanos_str) = wall_str.split_once('.').ok_or_else(parse_err)?;

        let secs: i64 = secs_str.parse().map_err(|_| parse_err())?;
        let nanos: i64 = nanos_str.parse().map_err(|_| parse_err())?;
        let logical: u32 = logical_str.parse().map_err(|_| parse_err())?;

        if !(0..NANOS_PER_SEC).contains(&nanos) {
            return Err(parse_err());
        }

        Ok(Self {
            wall: secs
                .checked_mul(NANOS_PER_SEC)
                .and_then(|w| w.checked_add(nanos))
                .ok_or_else(parse_err)?,
            logical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_wall_then_logical() {
        let a = Timestamp::new(10, 0);
        let b = Timestamp::new(10, 1);
        let c = Timestamp::new(11, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(Timestamp::MIN < a);
        assert!(c < Timestamp::MAX);
    }

    #[test]
    fn display_roundtrip() {
        let ts = Timestamp::new(1_611_623_250 * 1_000_000_000 + 42, 7);
        assert_eq!(ts.to_string(), "1611623250.000000042,7");
        let parsed: Timestamp = ts.to_string().parse().expect("parse");
        assert_eq!(parsed, ts);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("".parse::<Timestamp>().is_err());
        assert!("123".parse::<Timestamp>().is_err());
        assert!("1.2".parse::<Timestamp>().is_err());
        assert!("1.9999999999,0".parse::<Timestamp>().is_err());
    }

    #[test]
    fn add_and_sub_move_wall_time() {
        let ts = Timestamp::new(5 * 1_000_000_000, 3);
        let later = ts.add(Duration::from_secs(2));
        assert_eq!(later.wall, 7 * 1_000_000_000);
        assert_eq!(later.logical, 0);

        let earlier = ts.saturating_sub(Duration::from_secs(10));
        assert_eq!(earlier, Timestamp::MIN);
    }

    #[test]
    fn next_increments_logical_only() {
        let ts = Timestamp::new(100, 0);
        assert_eq!(ts.next(), Timestamp::new(100, 1));
    }

    #[test]
    fn prev_is_strictly_before() {
        let ts = Timestamp::new(100, 2);
        assert_eq!(ts.prev(), Timestamp::new(100, 1));

        let rollover = Timestamp::new(100, 0).prev();
        assert_eq!(rollover, Timestamp::new(99, u32::MAX));
        assert!(rollover < Timestamp::new(100, 0));

        assert_eq!(Timestamp::MIN.prev(), Timestamp::MIN);
    }

    #[test]
    fn serde_roundtrip() {
        let ts = Timestamp::new(1_234_567_890, 7);
        let json = serde_json::to_string(&ts).expect("serialize");
        let parsed: Timestamp = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, ts);
    }
}
