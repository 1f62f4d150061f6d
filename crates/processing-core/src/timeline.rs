//! Timeline model: validates an edit plan against the source duration.
//!
//! Building a [`Timeline`] is the single gate before rendering. Every
//! validation, conflict, and range error is raised here; once built the
//! timeline is read-only for the rest of the job.

use reelcut_common::clock::TIME_EPSILON;
use reelcut_plan_model::{
    EditAction, EditOperation, EditPlan, OpId, OperationKind, PlanError, TransitionStyle,
};
use serde::Serialize;

use crate::segments::{split_spans, SourceSpan};

/// How far a transition's `start` may sit outside the gap it names.
pub const BOUNDARY_TOLERANCE_SECS: f64 = 1e-3;

/// A validated cut, `[start, end)` in source seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutRange {
    pub op_id: OpId,
    pub start: f64,
    pub end: f64,
}

/// A validated speed change, `[start, end)` in source seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedRange {
    pub op_id: OpId,
    pub start: f64,
    pub end: f64,
    pub factor: f64,
}

/// A transition bound to the boundary between spans `boundary` and `boundary + 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTransition {
    pub op_id: OpId,
    /// Index of the left-hand segment.
    pub boundary: usize,
    /// Overlap in output seconds.
    pub duration: f64,
    pub style: TransitionStyle,
}

/// An ordered, validated set of temporal and overlay operations.
#[derive(Debug, Clone)]
pub struct Timeline {
    source_duration: f64,
    cuts: Vec<CutRange>,
    speeds: Vec<SpeedRange>,
    overlays: Vec<EditOperation>,
    spans: Vec<SourceSpan>,
    transitions: Vec<ResolvedTransition>,
}

impl Timeline {
    /// Validate `plan` against a source of `source_duration` seconds.
    pub fn build(plan: &EditPlan, source_duration: f64) -> Result<Self, PlanError> {
        if !source_duration.is_finite() || source_duration <= 0.0 {
            return Err(PlanError::validation(
                "source",
                format!("source duration must be positive, got {source_duration}"),
            ));
        }

        let mut cuts = Vec::new();
        let mut speeds = Vec::new();
        let mut overlays = Vec::new();
        let mut transition_ops = Vec::new();

        for op in &plan.operations {
            check_range(op, source_duration)?;
            let end = op.resolved_end(source_duration).min(source_duration);
            match &op.action {
                EditAction::Cut(_) => cuts.push(CutRange {
                    op_id: op.id.clone(),
                    start: op.start,
                    end,
                }),
                EditAction::Speed(p) => speeds.push(SpeedRange {
                    op_id: op.id.clone(),
                    start: op.start,
                    end,
                    factor: p.speed_multiplier,
                }),
                EditAction::Transition(p) => transition_ops.push((op, p.duration, p.style)),
                EditAction::Zoom(_)
                | EditAction::Highlight(_)
                | EditAction::ClickEffect(_)
                | EditAction::Text(_) => {
                    let mut clipped = op.clone();
                    clipped.end = Some(end);
                    overlays.push(clipped);
                }
            }
        }

        sort_and_check_disjoint(&mut cuts, |c| (c.start, c.end), |c| &c.op_id, "cut")?;
        sort_and_check_disjoint(&mut speeds, |s| (s.start, s.end), |s| &s.op_id, "speed change")?;

        let kept = kept_ranges(&cuts, source_duration);
        if kept.is_empty() {
            let op_id = cuts.last().map(|c| c.op_id.clone()).unwrap_or_default();
            return Err(PlanError::validation(op_id, "cuts remove the entire source"));
        }

        let spans = split_spans(&kept, &speeds);
        let transitions = resolve_transitions(&transition_ops, &spans)?;

        tracing::debug!(
            cuts = cuts.len(),
            speeds = speeds.len(),
            overlays = overlays.len(),
            transitions = transitions.len(),
            spans = spans.len(),
            "Timeline validated"
        );

        Ok(Self {
            source_duration,
            cuts,
            speeds,
            overlays,
            spans,
            transitions,
        })
    }

    pub fn source_duration(&self) -> f64 {
        self.source_duration
    }

    /// Cuts sorted by start.
    pub fn cuts(&self) -> &[CutRange] {
        &self.cuts
    }

    /// Speed changes sorted by start.
    pub fn speeds(&self) -> &[SpeedRange] {
        &self.speeds
    }

    /// Overlay operations in declaration order, `end` resolved.
    pub fn overlays(&self) -> &[EditOperation] {
        &self.overlays
    }

    /// Kept source spans, each with a single speed factor.
    pub fn spans(&self) -> &[SourceSpan] {
        &self.spans
    }

    /// Transitions sorted by boundary.
    pub fn transitions(&self) -> &[ResolvedTransition] {
        &self.transitions
    }

    /// Complement of the cut set over `[0, source_duration]`.
    pub fn kept_ranges(&self) -> Vec<(f64, f64)> {
        kept_ranges(&self.cuts, self.source_duration)
    }
}

fn check_range(op: &EditOperation, source_duration: f64) -> Result<(), PlanError> {
    let limit = source_duration + TIME_EPSILON;
    if op.kind() == OperationKind::Transition {
        if op.start > limit {
            return Err(PlanError::out_of_range(
                &op.id,
                format!(
                    "transition at {:.3}s is beyond source duration {source_duration:.3}s",
                    op.start
                ),
            ));
        }
        return Ok(());
    }

    if op.start >= source_duration - TIME_EPSILON {
        return Err(PlanError::out_of_range(
            &op.id,
            format!(
                "{} starts at {:.3}s, at or beyond source duration {source_duration:.3}s",
                op.kind().as_str(),
                op.start
            ),
        ));
    }
    if let Some(end) = op.end {
        if end > limit {
            return Err(PlanError::out_of_range(
                &op.id,
                format!(
                    "{} ends at {end:.3}s, beyond source duration {source_duration:.3}s",
                    op.kind().as_str()
                ),
            ));
        }
    }
    Ok(())
}

/// Sort by `(start, end)` and reject any pair whose half-open ranges overlap.
fn sort_and_check_disjoint<T>(
    items: &mut [T],
    range: impl Fn(&T) -> (f64, f64),
    id: impl Fn(&T) -> &OpId,
    label: &str,
) -> Result<(), PlanError> {
    items.sort_by(|a, b| {
        let (a0, a1) = range(a);
        let (b0, b1) = range(b);
        a0.total_cmp(&b0).then(a1.total_cmp(&b1))
    });
    for pair in items.windows(2) {
        let (prev_start, prev_end) = range(&pair[0]);
        let (next_start, next_end) = range(&pair[1]);
        if next_start < prev_end - TIME_EPSILON {
            return Err(PlanError::conflict(
                id(&pair[1]),
                format!(
                    "{label} [{next_start:.3}, {next_end:.3}) overlaps {label} {} [{prev_start:.3}, {prev_end:.3})",
                    id(&pair[0])
                ),
            ));
        }
    }
    Ok(())
}

/// Complement of sorted, disjoint cuts over `[0, duration]`.
fn kept_ranges(cuts: &[CutRange], duration: f64) -> Vec<(f64, f64)> {
    let mut kept = Vec::with_capacity(cuts.len() + 1);
    let mut cursor = 0.0;
    for cut in cuts {
        if cut.start - cursor > TIME_EPSILON {
            kept.push((cursor, cut.start));
        }
        cursor = f64::max(cursor, cut.end);
    }
    if duration - cursor > TIME_EPSILON {
        kept.push((cursor, duration));
    }
    kept
}

fn resolve_transitions(
    requests: &[(&EditOperation, f64, TransitionStyle)],
    spans: &[SourceSpan],
) -> Result<Vec<ResolvedTransition>, PlanError> {
    let mut resolved: Vec<ResolvedTransition> = Vec::with_capacity(requests.len());

    for (op, duration, style) in requests {
        let boundary = (0..spans.len().saturating_sub(1))
            .find(|&b| {
                let gap_start = spans[b].source_end;
                let gap_end = spans[b + 1].source_start;
                op.start >= gap_start - BOUNDARY_TOLERANCE_SECS
                    && op.start <= gap_end + BOUNDARY_TOLERANCE_SECS
            })
            .ok_or_else(|| {
                PlanError::conflict(
                    &op.id,
                    format!(
                        "transition at {:.3}s does not sit between two adjacent kept segments",
                        op.start
                    ),
                )
            })?;

        if let Some(existing) = resolved.iter().find(|t| t.boundary == boundary) {
            return Err(PlanError::conflict(
                &op.id,
                format!(
                    "boundary at {:.3}s already has transition {}",
                    op.start, existing.op_id
                ),
            ));
        }

        let left = spans[boundary].output_duration();
        let right = spans[boundary + 1].output_duration();
        let shorter = left.min(right);
        if *duration > shorter + TIME_EPSILON {
            return Err(PlanError::conflict(
                &op.id,
                format!(
                    "transition overlap {duration:.3}s exceeds the shorter adjacent segment ({shorter:.3}s)"
                ),
            ));
        }

        resolved.push(ResolvedTransition {
            op_id: op.id.clone(),
            boundary,
            duration: *duration,
            style: *style,
        });
    }

    resolved.sort_by_key(|t| t.boundary);

    // A segment squeezed from both sides must still cover both overlaps.
    for pair in resolved.windows(2) {
        if pair[1].boundary == pair[0].boundary + 1 {
            let middle = spans[pair[1].boundary].output_duration();
            let consumed = pair[0].duration + pair[1].duration;
            if consumed > middle + TIME_EPSILON {
                return Err(PlanError::conflict(
                    &pair[1].op_id,
                    format!(
                        "transitions {} and {} consume {consumed:.3}s of a {middle:.3}s segment",
                        pair[0].op_id, pair[1].op_id
                    ),
                ));
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(json: &str) -> EditPlan {
        EditPlan::from_json(json).unwrap()
    }

    #[test]
    fn test_overlapping_cuts_conflict() {
        let p = plan(
            r#"{"timeline": [
                {"id": "a", "action": "cut", "start": 0.0, "end": 5.0},
                {"id": "b", "action": "cut", "start": 3.0, "end": 8.0}
            ]}"#,
        );
        let err = Timeline::build(&p, 100.0).unwrap_err();
        assert!(matches!(err, PlanError::TemporalConflict { ref op_id, .. } if op_id == "b"));
    }

    #[test]
    fn test_touching_cuts_are_disjoint() {
        let p = plan(
            r#"{"timeline": [
                {"action": "cut", "start": 5.0, "end": 8.0},
                {"action": "cut", "start": 0.0, "end": 5.0}
            ]}"#,
        );
        let timeline = Timeline::build(&p, 20.0).unwrap();
        assert_eq!(timeline.cuts()[0].start, 0.0);
        assert_eq!(timeline.kept_ranges(), vec![(8.0, 20.0)]);
    }

    #[test]
    fn test_out_of_range() {
        let p = plan(r#"{"timeline": [{"id": 9, "action": "zoom", "start": 20.0, "end": 120.0}]}"#);
        let err = Timeline::build(&p, 100.0).unwrap_err();
        assert!(matches!(err, PlanError::OutOfRange { ref op_id, .. } if op_id == "9"));

        let p = plan(r#"{"timeline": [{"action": "text", "start": 100.0, "params": {"text": "x"}}]}"#);
        assert!(matches!(
            Timeline::build(&p, 100.0).unwrap_err(),
            PlanError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_cut_everything_is_rejected() {
        let p = plan(r#"{"timeline": [{"action": "cut", "start": 0.0}]}"#);
        assert!(matches!(
            Timeline::build(&p, 30.0).unwrap_err(),
            PlanError::Validation { .. }
        ));
    }

    #[test]
    fn test_overlapping_speed_changes_conflict() {
        let p = plan(
            r#"{"timeline": [
                {"id": 1, "action": "speed", "start": 0.0, "end": 10.0, "params": {"speed_multiplier": 2.0}},
                {"id": 2, "action": "speed", "start": 5.0, "end": 15.0, "params": {"speed_multiplier": 1.5}}
            ]}"#,
        );
        assert!(matches!(
            Timeline::build(&p, 30.0).unwrap_err(),
            PlanError::TemporalConflict { .. }
        ));
    }

    #[test]
    fn test_transition_longer_than_neighbor_conflicts() {
        // Kept: [0, 2) and [5, 15); a 3 s crossfade cannot fit the 2 s segment.
        let p = plan(
            r#"{"timeline": [
                {"id": "c", "action": "cut", "start": 2.0, "end": 5.0},
                {"id": "t", "action": "transition", "start": 5.0, "params": {"duration": 3.0}}
            ]}"#,
        );
        let err = Timeline::build(&p, 15.0).unwrap_err();
        assert!(matches!(err, PlanError::TemporalConflict { ref op_id, .. } if op_id == "t"));
    }

    #[test]
    fn test_transition_resolves_to_boundary() {
        let p = plan(
            r#"{"timeline": [
                {"action": "cut", "start": 10.0, "end": 15.0},
                {"id": "t", "action": "transition", "start": 12.0, "params": {"duration": 1.0}}
            ]}"#,
        );
        let timeline = Timeline::build(&p, 30.0).unwrap();
        assert_eq!(timeline.transitions().len(), 1);
        assert_eq!(timeline.transitions()[0].boundary, 0);
    }

    #[test]
    fn test_transition_outside_any_gap_conflicts() {
        let p = plan(
            r#"{"timeline": [
                {"action": "cut", "start": 10.0, "end": 15.0},
                {"id": "t", "action": "transition", "start": 20.0}
            ]}"#,
        );
        assert!(matches!(
            Timeline::build(&p, 30.0).unwrap_err(),
            PlanError::TemporalConflict { .. }
        ));
    }

    #[test]
    fn test_duplicate_transition_at_boundary_conflicts() {
        let p = plan(
            r#"{"timeline": [
                {"action": "cut", "start": 10.0, "end": 15.0},
                {"id": "t1", "action": "transition", "start": 10.0},
                {"id": "t2", "action": "transition", "start": 15.0}
            ]}"#,
        );
        let err = Timeline::build(&p, 30.0).unwrap_err();
        assert!(matches!(err, PlanError::TemporalConflict { ref op_id, .. } if op_id == "t2"));
    }

    #[test]
    fn test_squeezed_segment_conflicts() {
        // Middle kept segment [5, 6) is 1 s; two 0.6 s crossfades need 1.2 s.
        let p = plan(
            r#"{"timeline": [
                {"action": "cut", "start": 4.0, "end": 5.0},
                {"action": "cut", "start": 6.0, "end": 7.0},
                {"id": "t1", "action": "transition", "start": 4.5, "params": {"duration": 0.6}},
                {"id": "t2", "action": "transition", "start": 6.5, "params": {"duration": 0.6}}
            ]}"#,
        );
        assert!(matches!(
            Timeline::build(&p, 20.0).unwrap_err(),
            PlanError::TemporalConflict { .. }
        ));
    }

    #[test]
    fn test_overlays_keep_declaration_order_and_resolved_end() {
        let p = plan(
            r#"{"timeline": [
                {"id": "z", "action": "zoom", "start": 3.0},
                {"id": "h", "action": "highlight", "start": 1.0, "params": {"bbox": [0, 0, 10, 10]}}
            ]}"#,
        );
        let timeline = Timeline::build(&p, 30.0).unwrap();
        let ids: Vec<_> = timeline.overlays().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "h"]);
        assert_eq!(timeline.overlays()[0].end, Some(3.5));
    }
}
