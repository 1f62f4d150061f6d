//! Segment compiler: kept source ranges to ordered output segments.
//!
//! # Algorithm
//!
//! 1. **Complement** the cut set over `[0, source_duration]` to get kept ranges.
//! 2. **Split** kept ranges at speed-change boundaries so each span has one factor.
//! 3. **Accumulate** output positions in source order, `len / speed` per span,
//!    pulling each segment back by the crossfade overlap at its left boundary.

use reelcut_common::clock::TIME_EPSILON;
use serde::Serialize;

use crate::remap::TimeRemap;
use crate::timeline::{ResolvedTransition, SpeedRange, Timeline};

/// A kept source range with a single speed factor, before output placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceSpan {
    pub source_start: f64,
    pub source_end: f64,
    pub speed_factor: f64,
}

impl SourceSpan {
    pub fn source_len(&self) -> f64 {
        self.source_end - self.source_start
    }

    pub fn output_duration(&self) -> f64 {
        self.source_len() / self.speed_factor
    }
}

/// A contiguous kept source range mapped to a contiguous output range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub source_start: f64,
    pub source_end: f64,
    pub speed_factor: f64,
    pub output_start: f64,
    pub output_duration: f64,
}

impl Segment {
    pub fn source_len(&self) -> f64 {
        self.source_end - self.source_start
    }

    pub fn output_end(&self) -> f64 {
        self.output_start + self.output_duration
    }

    /// Half-open containment in source time.
    pub fn contains_source(&self, t: f64) -> bool {
        t >= self.source_start && t < self.source_end
    }

    /// Affine source → output mapping for a time inside this segment.
    pub fn to_output(&self, source_time: f64) -> f64 {
        self.output_start + (source_time - self.source_start) / self.speed_factor
    }

    /// Inverse of [`Segment::to_output`], for segment-local output offsets.
    pub fn source_at(&self, local_output: f64) -> f64 {
        (self.source_start + local_output * self.speed_factor).min(self.source_end)
    }
}

/// Segments, transitions, and the remap function for one render job.
#[derive(Debug, Clone)]
pub struct CompiledTimeline {
    pub segments: Vec<Segment>,
    pub transitions: Vec<ResolvedTransition>,
    pub remap: TimeRemap,
    pub source_duration: f64,
    pub final_duration: f64,
}

impl CompiledTimeline {
    /// Crossfade into the segment that follows `segment`.
    pub fn transition_after(&self, segment: usize) -> Option<&ResolvedTransition> {
        self.transitions.iter().find(|t| t.boundary == segment)
    }

    /// Crossfade from the segment preceding `segment`.
    pub fn transition_before(&self, segment: usize) -> Option<&ResolvedTransition> {
        segment
            .checked_sub(1)
            .and_then(|b| self.transition_after(b))
    }

    /// Sum of segment output durations, ignoring crossfade overlap.
    pub fn total_segment_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.output_duration).sum()
    }

    pub fn total_overlap(&self) -> f64 {
        self.transitions.iter().map(|t| t.duration).sum()
    }
}

/// Split kept ranges at speed-change boundaries.
///
/// `kept` and `speeds` must both be sorted and internally disjoint.
/// Adjacent spans that end up with the same factor are merged.
pub fn split_spans(kept: &[(f64, f64)], speeds: &[SpeedRange]) -> Vec<SourceSpan> {
    let mut spans: Vec<SourceSpan> = Vec::with_capacity(kept.len() + speeds.len() * 2);
    let mut push = |span: SourceSpan| {
        if span.source_len() <= TIME_EPSILON {
            return;
        }
        if let Some(last) = spans.last_mut() {
            if (last.source_end - span.source_start).abs() <= TIME_EPSILON
                && last.speed_factor == span.speed_factor
            {
                last.source_end = span.source_end;
                return;
            }
        }
        spans.push(span);
    };

    for &(start, end) in kept {
        let mut cursor = start;
        for speed in speeds.iter().filter(|s| s.start < end && s.end > start) {
            let lo = speed.start.max(start);
            let hi = speed.end.min(end);
            push(SourceSpan {
                source_start: cursor,
                source_end: lo,
                speed_factor: 1.0,
            });
            push(SourceSpan {
                source_start: lo.max(cursor),
                source_end: hi,
                speed_factor: speed.factor,
            });
            cursor = cursor.max(hi);
        }
        push(SourceSpan {
            source_start: cursor,
            source_end: end,
            speed_factor: 1.0,
        });
    }

    spans
}

/// Place the timeline's spans on the output axis.
pub fn compile_segments(timeline: &Timeline) -> CompiledTimeline {
    let transitions = timeline.transitions().to_vec();
    let mut segments = Vec::with_capacity(timeline.spans().len());
    let mut cursor = 0.0;

    for (index, span) in timeline.spans().iter().enumerate() {
        let output_duration = span.output_duration();
        segments.push(Segment {
            index,
            source_start: span.source_start,
            source_end: span.source_end,
            speed_factor: span.speed_factor,
            output_start: cursor,
            output_duration,
        });
        cursor += output_duration;
        if let Some(t) = transitions.iter().find(|t| t.boundary == index) {
            cursor -= t.duration;
        }
    }

    let final_duration = segments.last().map(Segment::output_end).unwrap_or(0.0);
    let remap = TimeRemap::new(&segments, timeline.source_duration());

    tracing::info!(
        segments = segments.len(),
        transitions = transitions.len(),
        source_duration = timeline.source_duration(),
        final_duration,
        "Segments compiled"
    );

    CompiledTimeline {
        segments,
        transitions,
        remap,
        source_duration: timeline.source_duration(),
        final_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reelcut_plan_model::EditPlan;

    fn compile(json: &str, duration: f64) -> CompiledTimeline {
        let plan = EditPlan::from_json(json).unwrap();
        compile_segments(&Timeline::build(&plan, duration).unwrap())
    }

    #[test]
    fn test_two_cuts_on_hundred_seconds() {
        let compiled = compile(
            r#"{"timeline": [
                {"action": "cut", "start": 10.0, "end": 15.0},
                {"action": "cut", "start": 40.0, "end": 42.0}
            ]}"#,
            100.0,
        );
        assert_eq!(compiled.segments.len(), 3);
        assert!((compiled.final_duration - 93.0).abs() < 1e-9);
        assert!((compiled.segments[1].output_start - 10.0).abs() < 1e-9);
        assert!((compiled.segments[2].output_start - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_splits_kept_range() {
        let compiled = compile(
            r#"{"timeline": [
                {"action": "speed", "start": 10.0, "end": 20.0, "params": {"speed_multiplier": 2.0}}
            ]}"#,
            30.0,
        );
        let factors: Vec<f64> = compiled.segments.iter().map(|s| s.speed_factor).collect();
        assert_eq!(factors, vec![1.0, 2.0, 1.0]);
        assert!((compiled.final_duration - 25.0).abs() < 1e-9);
        assert!((compiled.segments[2].output_start - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_partially_cut() {
        // Speed [5, 15) with cut [8, 12): kept spans [0,5) [5,8)x2 [12,15)x2 [15,20)
        let compiled = compile(
            r#"{"timeline": [
                {"action": "cut", "start": 8.0, "end": 12.0},
                {"action": "speed", "start": 5.0, "end": 15.0, "params": {"speed_multiplier": 2.0}}
            ]}"#,
            20.0,
        );
        assert_eq!(compiled.segments.len(), 4);
        assert!((compiled.final_duration - (5.0 + 1.5 + 1.5 + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_unit_speed_spans_merge() {
        let compiled = compile(
            r#"{"timeline": [
                {"action": "speed", "start": 5.0, "end": 10.0, "params": {"speed_multiplier": 1.0}}
            ]}"#,
            20.0,
        );
        assert_eq!(compiled.segments.len(), 1);
    }

    #[test]
    fn test_transition_pulls_next_segment_back() {
        let compiled = compile(
            r#"{"timeline": [
                {"action": "cut", "start": 10.0, "end": 15.0},
                {"action": "transition", "start": 10.0, "params": {"duration": 1.0}}
            ]}"#,
            30.0,
        );
        assert!((compiled.segments[1].output_start - 9.0).abs() < 1e-9);
        assert!((compiled.final_duration - 24.0).abs() < 1e-9);
        assert!(
            (compiled.total_segment_duration() - compiled.total_overlap()
                - compiled.final_duration)
                .abs()
                < 1e-9
        );
        assert!(compiled.transition_before(1).is_some());
        assert!(compiled.transition_after(1).is_none());
    }

    fn arb_plan() -> impl Strategy<Value = (Vec<(f64, f64)>, Vec<(f64, f64, f64)>)> {
        // Cuts and speeds laid out on a 100 s grid of 10 s cells so they never overlap.
        let cuts = proptest::collection::vec((0usize..10, 0.5f64..4.0), 0..4);
        let speeds = proptest::collection::vec((0usize..10, 0.5f64..6.0, 0.25f64..4.0), 0..4);
        (cuts, speeds).prop_map(|(cuts, speeds)| {
            let mut cells = std::collections::BTreeMap::new();
            for (cell, len) in cuts {
                cells.entry(cell).or_insert((cell as f64 * 10.0 + 1.0, len));
            }
            let cuts = cells.values().map(|&(s, l)| (s, s + l)).collect();
            let mut speed_cells = std::collections::BTreeMap::new();
            for (cell, len, f) in speeds {
                speed_cells
                    .entry(cell)
                    .or_insert((cell as f64 * 10.0 + 3.0, len, f));
            }
            let speeds = speed_cells
                .values()
                .map(|&(s, l, f)| (s, s + l, f))
                .collect();
            (cuts, speeds)
        })
    }

    fn plan_json(cuts: &[(f64, f64)], speeds: &[(f64, f64, f64)]) -> String {
        let mut ops = Vec::new();
        for (s, e) in cuts {
            ops.push(format!(r#"{{"action": "cut", "start": {s}, "end": {e}}}"#));
        }
        for (s, e, f) in speeds {
            ops.push(format!(
                r#"{{"action": "speed", "start": {s}, "end": {e}, "params": {{"speed_multiplier": {f}}}}}"#
            ));
        }
        format!(r#"{{"timeline": [{}]}}"#, ops.join(","))
    }

    proptest! {
        #[test]
        fn output_durations_sum_to_final((cuts, speeds) in arb_plan()) {
            let compiled = compile(&plan_json(&cuts, &speeds), 100.0);
            prop_assert!((compiled.total_segment_duration() - compiled.final_duration).abs() < 1e-6);
        }

        #[test]
        fn segments_are_ordered_without_gaps((cuts, speeds) in arb_plan()) {
            let compiled = compile(&plan_json(&cuts, &speeds), 100.0);
            for pair in compiled.segments.windows(2) {
                prop_assert!(pair[0].source_end <= pair[1].source_start + 1e-9);
                prop_assert!((pair[0].output_end() - pair[1].output_start).abs() < 1e-9);
            }
        }
    }
}
