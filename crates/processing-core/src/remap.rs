//! Source-time → output-time remapping.
//!
//! The map is piecewise affine over kept segments with slope `1 / speed`.
//! Times inside removed ranges snap forward to the next kept segment's
//! output start; times past the last kept segment clamp to the output end.
//! Callers turn the snap into an [`Adjustment`] for the render report.

use std::fmt;

use reelcut_common::clock::TIME_EPSILON;
use serde::Serialize;

use crate::segments::Segment;

/// Why a time could not be mapped verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Inside a removed range; moved to the next kept boundary.
    SnappedForward,
    /// After the last kept segment; pinned to the end of the output.
    ClampedToEnd,
    /// Nothing left to place after remapping.
    Dropped,
    /// Shortened so it ends with the output.
    Truncated,
    /// Moved later so it starts when the previous cue ends.
    Delayed,
}

/// A non-fatal timing correction recorded in the render report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    /// What was adjusted, e.g. `cue-3` or `op-7`.
    pub subject: String,
    pub reason: AdjustmentReason,
    pub requested_source: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_source: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_time: Option<f64>,
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} at source {:.3}s",
            self.subject, self.reason, self.requested_source
        )?;
        if let Some(src) = self.resolved_source {
            write!(f, " -> source {src:.3}s")?;
        }
        if let Some(out) = self.output_time {
            write!(f, " (output {out:.3}s)")?;
        }
        Ok(())
    }
}

/// Result of mapping one source time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Remapped {
    pub output: f64,
    /// Source time actually used; differs from the request when snapped.
    pub source: f64,
    /// Segment the time landed in, `None` when clamped past the end.
    pub segment: Option<usize>,
    pub adjustment: Option<AdjustmentReason>,
}

/// One segment's share of a source interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalPiece {
    pub segment: usize,
    pub source_start: f64,
    pub source_end: f64,
    pub output_start: f64,
    pub output_end: f64,
}

/// Piecewise-affine source → output time function.
#[derive(Debug, Clone)]
pub struct TimeRemap {
    segments: Vec<Segment>,
    source_duration: f64,
    final_duration: f64,
}

impl TimeRemap {
    pub fn new(segments: &[Segment], source_duration: f64) -> Self {
        let final_duration = segments.last().map(Segment::output_end).unwrap_or(0.0);
        Self {
            segments: segments.to_vec(),
            source_duration,
            final_duration,
        }
    }

    pub fn final_duration(&self) -> f64 {
        self.final_duration
    }

    pub fn source_duration(&self) -> f64 {
        self.source_duration
    }

    /// Index of the first segment whose end lies after `t`.
    fn first_ending_after(&self, t: f64) -> usize {
        self.segments.partition_point(|s| s.source_end <= t)
    }

    /// Segment containing `t`, if `t` is kept.
    pub fn segment_at(&self, t: f64) -> Option<usize> {
        let i = self.first_ending_after(t);
        match self.segments.get(i) {
            Some(seg) if t >= seg.source_start - TIME_EPSILON => Some(i),
            Some(_) => None,
            None => {
                let last = self.segments.len().checked_sub(1)?;
                ((t - self.segments[last].source_end).abs() <= TIME_EPSILON).then_some(last)
            }
        }
    }

    /// Output time for a kept source time; `None` inside removed ranges.
    pub fn map_kept(&self, t: f64) -> Option<f64> {
        self.segment_at(t).map(|i| {
            let seg = &self.segments[i];
            seg.to_output(t.clamp(seg.source_start, seg.source_end))
        })
    }

    /// Map any source time, applying the snap-forward policy.
    pub fn map(&self, t: f64) -> Remapped {
        if let Some(i) = self.segment_at(t) {
            let seg = &self.segments[i];
            let source = t.clamp(seg.source_start, seg.source_end);
            return Remapped {
                output: seg.to_output(source),
                source,
                segment: Some(i),
                adjustment: None,
            };
        }

        match self.segments.get(self.first_ending_after(t)) {
            Some(next) => Remapped {
                output: next.output_start,
                source: next.source_start,
                segment: Some(next.index),
                adjustment: Some(AdjustmentReason::SnappedForward),
            },
            None => Remapped {
                output: self.final_duration,
                source: self
                    .segments
                    .last()
                    .map(|s| s.source_end)
                    .unwrap_or(self.source_duration),
                segment: None,
                adjustment: Some(AdjustmentReason::ClampedToEnd),
            },
        }
    }

    /// Split a source interval into its kept, per-segment pieces.
    ///
    /// Removed parts are dropped; an interval entirely inside removed ranges
    /// yields nothing.
    pub fn map_interval(&self, start: f64, end: f64) -> Vec<IntervalPiece> {
        if end <= start {
            return Vec::new();
        }
        self.segments
            .iter()
            .filter(|s| s.source_start < end && s.source_end > start)
            .filter_map(|s| {
                let lo = start.max(s.source_start);
                let hi = end.min(s.source_end);
                (hi - lo > TIME_EPSILON).then(|| IntervalPiece {
                    segment: s.index,
                    source_start: lo,
                    source_end: hi,
                    output_start: s.to_output(lo),
                    output_end: s.to_output(hi),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::compile_segments;
    use crate::timeline::Timeline;
    use proptest::prelude::*;
    use reelcut_plan_model::EditPlan;

    fn remap(json: &str, duration: f64) -> TimeRemap {
        let plan = EditPlan::from_json(json).unwrap();
        compile_segments(&Timeline::build(&plan, duration).unwrap()).remap
    }

    const TWO_CUTS: &str = r#"{"timeline": [
        {"action": "cut", "start": 10.0, "end": 15.0},
        {"action": "cut", "start": 40.0, "end": 42.0}
    ]}"#;

    #[test]
    fn test_zoom_interval_remaps() {
        let r = remap(TWO_CUTS, 100.0);
        assert!((r.map_kept(20.0).unwrap() - 15.0).abs() < 1e-9);
        assert!((r.map_kept(25.0).unwrap() - 20.0).abs() < 1e-9);
        assert!((r.map_kept(100.0).unwrap() - 93.0).abs() < 1e-9);
    }

    #[test]
    fn test_removed_time_snaps_forward() {
        let r = remap(TWO_CUTS, 100.0);
        assert!(r.map_kept(12.0).is_none());
        let m = r.map(12.0);
        assert_eq!(m.adjustment, Some(AdjustmentReason::SnappedForward));
        assert!((m.source - 15.0).abs() < 1e-9);
        assert!((m.output - 10.0).abs() < 1e-9);
        assert_eq!(m.segment, Some(1));

        // Cut start is removed (half-open), cut end is kept.
        assert!(r.map_kept(10.0).is_none());
        assert!((r.map_kept(15.0).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_cut_clamps_to_end() {
        let r = remap(r#"{"timeline": [{"action": "cut", "start": 90.0}]}"#, 100.0);
        let m = r.map(95.0);
        assert_eq!(m.adjustment, Some(AdjustmentReason::ClampedToEnd));
        assert!((m.output - 90.0).abs() < 1e-9);
        assert_eq!(m.segment, None);
    }

    #[test]
    fn test_speed_slope() {
        let r = remap(
            r#"{"timeline": [{"action": "speed", "start": 10.0, "end": 20.0,
                              "params": {"speed_multiplier": 2.0}}]}"#,
            30.0,
        );
        assert!((r.map_kept(14.0).unwrap() - 12.0).abs() < 1e-9);
        assert!((r.map_kept(25.0).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_interval_split_across_cut() {
        let r = remap(TWO_CUTS, 100.0);
        let pieces = r.map_interval(8.0, 18.0);
        assert_eq!(pieces.len(), 2);
        assert!((pieces[0].output_end - 10.0).abs() < 1e-9);
        assert!((pieces[1].source_start - 15.0).abs() < 1e-9);
        assert!((pieces[1].output_end - 13.0).abs() < 1e-9);
        assert!(r.map_interval(11.0, 14.0).is_empty());
    }

    fn arb_remap() -> impl Strategy<Value = TimeRemap> {
        let cuts = proptest::collection::btree_set(0usize..20, 0..6);
        let speeds = proptest::collection::vec(0.25f64..4.0, 20);
        (cuts, speeds).prop_map(|(cuts, speeds)| {
            // 5 s cells: cut the first 2 s of chosen cells, speed the rest.
            let mut ops = Vec::new();
            for cell in &cuts {
                let s = *cell as f64 * 5.0;
                ops.push(format!(r#"{{"action": "cut", "start": {s}, "end": {}}}"#, s + 2.0));
            }
            for (cell, f) in speeds.iter().enumerate() {
                let s = cell as f64 * 5.0 + 2.0;
                ops.push(format!(
                    r#"{{"action": "speed", "start": {s}, "end": {}, "params": {{"speed_multiplier": {f}}}}}"#,
                    s + 3.0
                ));
            }
            remap(&format!(r#"{{"timeline": [{}]}}"#, ops.join(",")), 100.0)
        })
    }

    proptest! {
        #[test]
        fn map_is_monotonic(r in arb_remap(), a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(r.map(lo).output <= r.map(hi).output + 1e-9);
        }

        #[test]
        fn map_is_strictly_increasing_within_kept(r in arb_remap(), a in 0.0f64..100.0, d in 0.01f64..1.0) {
            if let (Some(i), Some(j)) = (r.segment_at(a), r.segment_at(a + d)) {
                if i == j {
                    prop_assert!(r.map_kept(a).unwrap() < r.map_kept(a + d).unwrap());
                }
            }
        }

        #[test]
        fn map_is_continuous_at_boundaries(r in arb_remap()) {
            for pair in r.segments.windows(2) {
                let left = pair[0].to_output(pair[0].source_end);
                prop_assert!((left - pair[1].output_start).abs() < 1e-9);
            }
        }
    }
}
