//! Edit plan documents (`edit_plan.json`).
//!
//! A plan is the declarative, timestamped list of edit operations produced
//! by the upstream planner. Loading validates every operation's shape; the
//! temporal checks that need the source duration live in the timeline model.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::operation::{EditOperation, OperationKind, RawOperation};

/// Counts and durations describing a plan.
///
/// The planner may ship its own copy; the engine recomputes counts from the
/// operations and fills durations once segments are compiled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSummary {
    pub total_cuts: usize,
    pub total_speed_changes: usize,
    pub total_zooms: usize,
    pub total_highlights: usize,
    /// Click effects.
    pub total_effects: usize,
    pub total_texts: usize,
    pub total_transitions: usize,
    pub original_duration: f64,
    pub final_duration: f64,
    pub time_saved: f64,
}

impl PlanSummary {
    /// Count operations by kind. Durations are left at zero.
    pub fn from_operations(ops: &[EditOperation]) -> Self {
        let count = |kind: OperationKind| ops.iter().filter(|op| op.kind() == kind).count();
        Self {
            total_cuts: count(OperationKind::Cut),
            total_speed_changes: count(OperationKind::Speed),
            total_zooms: count(OperationKind::Zoom),
            total_highlights: count(OperationKind::Highlight),
            total_effects: count(OperationKind::ClickEffect),
            total_texts: count(OperationKind::Text),
            total_transitions: count(OperationKind::Transition),
            ..Self::default()
        }
    }

    /// Fill in the duration fields.
    pub fn with_durations(mut self, original: f64, final_duration: f64) -> Self {
        self.original_duration = original;
        self.final_duration = final_duration;
        self.time_saved = (original - final_duration).max(0.0);
        self
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default, alias = "operations")]
    timeline: Vec<RawOperation>,
    #[serde(default)]
    summary: Option<PlanSummary>,
}

/// A shape-validated edit plan, operations in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditPlan {
    #[serde(rename = "timeline")]
    pub operations: Vec<EditOperation>,
    /// Summary as shipped by the planner, if any.
    #[serde(rename = "summary", skip_serializing_if = "Option::is_none")]
    pub declared_summary: Option<PlanSummary>,
}

impl EditPlan {
    pub fn new(operations: Vec<EditOperation>) -> Self {
        Self {
            operations,
            declared_summary: None,
        }
    }

    /// Load and validate a plan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PlanError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let raw: RawPlan = serde_json::from_str(&json).map_err(|e| PlanError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_raw(raw)
    }

    /// Parse and validate a plan from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let raw: RawPlan = serde_json::from_str(json)
            .map_err(|e| PlanError::validation("plan", format!("malformed plan JSON: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPlan) -> Result<Self, PlanError> {
        let operations = raw
            .timeline
            .into_iter()
            .enumerate()
            .map(|(index, op)| EditOperation::from_raw(index, op))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(dup) = first_duplicate_id(&operations) {
            return Err(PlanError::validation(dup, "duplicate operation id"));
        }

        Ok(Self {
            operations,
            declared_summary: raw.summary,
        })
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary::from_operations(&self.operations)
    }

    pub fn operations_of(&self, kind: OperationKind) -> impl Iterator<Item = &EditOperation> {
        self.operations.iter().filter(move |op| op.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn first_duplicate_id(ops: &[EditOperation]) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    ops.iter()
        .find(|op| !seen.insert(op.id.as_str()))
        .map(|op| op.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANNER_OUTPUT: &str = r##"{
        "timeline": [
            {"id": 0, "action": "cut", "start": 7.0, "end": 10.5,
             "params": {"duration": 3.5, "reason": "loading_screen"}},
            {"id": 1, "action": "zoom", "start": 6.0, "end": 6.5,
             "params": {"target_bbox": [450, 320, 550, 360], "zoom_scale": 1.4}},
            {"id": 2, "action": "highlight", "start": 6.0, "end": 7.0,
             "params": {"bbox": [450, 320, 550, 360], "color": "#4A90E2"}},
            {"id": 3, "action": "click_effect", "start": 6.0,
             "params": {"position": [500, 340], "effect_type": "ripple"}}
        ],
        "summary": {"total_cuts": 1, "total_zooms": 1, "original_duration": 45.0}
    }"##;

    #[test]
    fn test_parses_planner_output() {
        let plan = EditPlan::from_json(PLANNER_OUTPUT).unwrap();
        assert_eq!(plan.operations.len(), 4);
        assert_eq!(plan.operations[3].index, 3);

        let summary = plan.summary();
        assert_eq!(summary.total_cuts, 1);
        assert_eq!(summary.total_highlights, 1);
        assert_eq!(summary.total_effects, 1);

        let declared = plan.declared_summary.as_ref().unwrap();
        assert!((declared.original_duration - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_plan_is_valid() {
        let plan = EditPlan::from_json(r#"{"timeline": []}"#).unwrap();
        assert!(plan.is_empty());
        let plan = EditPlan::from_json("{}").unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let json = r#"{"timeline": [
            {"id": "a", "action": "cut", "start": 1.0, "end": 2.0},
            {"id": "a", "action": "cut", "start": 3.0, "end": 4.0}
        ]}"#;
        let err = EditPlan::from_json(json).unwrap_err();
        assert!(matches!(err, PlanError::Validation { ref op_id, .. } if op_id == "a"));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = EditPlan::load("/nonexistent/edit_plan.json").unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }

    #[test]
    fn test_summary_durations() {
        let summary = PlanSummary::default().with_durations(100.0, 93.0);
        assert!((summary.time_saved - 7.0).abs() < 1e-9);
    }
}
