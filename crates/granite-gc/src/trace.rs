//! Structured GC traces.
//!
//! Every evaluation produces a [`GcTrace`] with explicit fields; the text
//! form is a pure rendering over the structure. Tests assert on the
//! fields first and on the rendered text where operators would grep it.

use std::fmt;

use granite_core::Timestamp;

use crate::range::RangeId;

/// Structured record of one GC evaluation of a range.
#[derive(Debug, Clone, PartialEq)]
pub struct GcTrace {
    /// The range evaluated.
    pub range: RangeId,
    /// The score gate's decision.
    pub should_queue: bool,
    /// Why the score decided the way it did.
    pub score_reason: String,
    /// True once the range was actually processed (gate passed or
    /// bypassed, exclusivity acquired, removal invoked).
    pub processed: bool,
    /// The threshold the pass used, set iff processed.
    pub threshold: Option<Timestamp>,
    /// Point keys inspected by the removal, set iff processed.
    pub keys_handled: u64,
    /// Versions deleted by the removal, set iff processed.
    pub keys_deleted: u64,
}

impl GcTrace {
    /// A trace for an evaluation that stopped at the score gate.
    #[must_use]
    pub fn scored(range: RangeId, should_queue: bool, score_reason: String) -> Self {
        Self {
            range,
            should_queue,
            score_reason,
            processed: false,
            threshold: None,
            keys_handled: 0,
            keys_deleted: 0,
        }
    }
}

impl fmt::Display for GcTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shouldQueue={} ({})",
            self.should_queue, self.score_reason
        )?;
        if self.processed {
            writeln!(f)?;
            writeln!(f, "processing replica {}", self.range)?;
            writeln!(
                f,
                "handled {} incoming point keys; deleted {}",
                self.keys_handled, self.keys_deleted
            )?;
            if let Some(threshold) = self.threshold {
                writeln!(f, "Threshold:{threshold}")?;
            }
            write!(f, "GC score after GC")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scored_only_trace_renders_decision() {
        let trace = GcTrace::scored(RangeId(1), false, "no garbage".to_string());
        let text = trace.to_string();
        assert!(text.contains("shouldQueue=false"));
        assert!(!text.contains("Threshold:"));
    }

    #[test]
    fn processed_trace_renders_counts_and_threshold() {
        let trace = GcTrace {
            range: RangeId(7),
            should_queue: true,
            score_reason: "dead fraction 0.50 >= 0.25".to_string(),
            processed: true,
            threshold: Some(Timestamp::new(1_000_000_000, 3)),
            keys_handled: 12,
            keys_deleted: 4,
        };
        let text = trace.to_string();
        assert!(text.contains("shouldQueue=true"));
        assert!(text.contains("processing replica r7"));
        assert!(text.contains("handled 12 incoming point keys; deleted 4"));
        assert!(text.contains("Threshold:1.000000000,3"));
        assert!(text.contains("GC score after GC"));
    }

    #[test]
    fn rendered_threshold_parses_back() {
        let threshold = Timestamp::new(42 * 1_000_000_000, 1);
        let trace = GcTrace {
            range: RangeId(1),
            should_queue: true,
            score_reason: String::new(),
            processed: true,
            threshold: Some(threshold),
            keys_handled: 0,
            keys_deleted: 0,
        };
        let text = trace.to_string();
        let rendered = text
            .lines()
            .find_map(|line| line.strip_prefix("Threshold:"))
            .expect("threshold line");
        let parsed: Timestamp = rendered.parse().expect("parse");
        assert_eq!(parsed, threshold);
    }
}
