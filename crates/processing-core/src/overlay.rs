//! Overlay clipping: split overlay operations into per-segment instances.
//!
//! An overlay spanning several kept segments becomes one instance per
//! segment, each inheriting the parent's params and remembering the parent's
//! source interval so animations stay continuous across the split.

use reelcut_plan_model::{
    ClickEffectParams, EditAction, EditOperation, HighlightParams, OpId, OperationKind,
    TextParams, ZoomParams,
};
use serde::Serialize;

use crate::remap::{Adjustment, AdjustmentReason};
use crate::segments::CompiledTimeline;

/// Overlay payload, one variant per overlay kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayEffect {
    Zoom(ZoomParams),
    Highlight(HighlightParams),
    ClickEffect(ClickEffectParams),
    Text(TextParams),
}

impl OverlayEffect {
    pub fn from_action(action: &EditAction) -> Option<Self> {
        match action {
            EditAction::Zoom(p) => Some(OverlayEffect::Zoom(p.clone())),
            EditAction::Highlight(p) => Some(OverlayEffect::Highlight(p.clone())),
            EditAction::ClickEffect(p) => Some(OverlayEffect::ClickEffect(p.clone())),
            EditAction::Text(p) => Some(OverlayEffect::Text(p.clone())),
            EditAction::Cut(_) | EditAction::Speed(_) | EditAction::Transition(_) => None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OverlayEffect::Zoom(_) => OperationKind::Zoom,
            OverlayEffect::Highlight(_) => OperationKind::Highlight,
            OverlayEffect::ClickEffect(_) => OperationKind::ClickEffect,
            OverlayEffect::Text(_) => OperationKind::Text,
        }
    }
}

/// An overlay operation clipped to one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayInstance {
    pub op_id: OpId,
    /// Declaration index of the parent operation.
    pub declared: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_order: Option<i32>,
    pub segment: usize,
    pub source_start: f64,
    pub source_end: f64,
    pub output_start: f64,
    pub output_end: f64,
    /// Unclipped source interval of the parent operation.
    pub parent_start: f64,
    pub parent_end: f64,
    /// Output seconds of the parent shown by earlier instances.
    pub shown_before: f64,
    /// Output seconds the parent is visible for across all its instances.
    pub shown_total: f64,
    pub effect: OverlayEffect,
}

impl OverlayInstance {
    pub fn kind(&self) -> OperationKind {
        self.effect.kind()
    }

    /// Same-kind tie-break key: higher `z_order` wins, then later declaration.
    pub fn priority(&self) -> (i32, usize) {
        (self.z_order.unwrap_or(0), self.declared)
    }

    /// Half-open containment in source time.
    pub fn active_at(&self, source_time: f64) -> bool {
        source_time >= self.source_start && source_time < self.source_end
    }

    /// Output seconds the parent has been visible at `source_time`.
    ///
    /// Continuous across the parent's instances: removed ranges do not
    /// count and sped-up segments advance it at output rate.
    pub fn shown_elapsed(&self, source_time: f64) -> f64 {
        let span = self.source_end - self.source_start;
        if span <= 0.0 {
            return self.shown_before;
        }
        let local = (source_time - self.source_start).clamp(0.0, span);
        self.shown_before + local * (self.output_end - self.output_start) / span
    }
}

/// All overlay instances for a job, grouped by segment in declaration order.
#[derive(Debug, Clone, Default)]
pub struct OverlayLayout {
    pub instances: Vec<OverlayInstance>,
    /// Overlays that fell entirely inside removed ranges.
    pub adjustments: Vec<Adjustment>,
}

impl OverlayLayout {
    pub fn for_segment(&self, segment: usize) -> impl Iterator<Item = &OverlayInstance> {
        self.instances.iter().filter(move |o| o.segment == segment)
    }
}

/// Clip each overlay to the kept segments it intersects.
pub fn clip_overlays(overlays: &[EditOperation], compiled: &CompiledTimeline) -> OverlayLayout {
    let mut layout = OverlayLayout::default();

    for op in overlays {
        let Some(effect) = OverlayEffect::from_action(&op.action) else {
            continue;
        };
        let parent_end = op.resolved_end(compiled.source_duration);
        let pieces = compiled.remap.map_interval(op.start, parent_end);

        if pieces.is_empty() {
            tracing::warn!(
                op_id = %op.id,
                kind = op.kind().as_str(),
                start = op.start,
                end = parent_end,
                "Overlay lies entirely inside removed ranges; dropped"
            );
            layout.adjustments.push(Adjustment {
                subject: format!("op-{}", op.id),
                reason: AdjustmentReason::Dropped,
                requested_source: op.start,
                resolved_source: None,
                output_time: None,
            });
            continue;
        }

        let shown_total: f64 = pieces.iter().map(|p| p.output_end - p.output_start).sum();
        let mut shown_before = 0.0;
        for piece in pieces {
            let shown = piece.output_end - piece.output_start;
            layout.instances.push(OverlayInstance {
                op_id: op.id.clone(),
                declared: op.index,
                z_order: op.z_order,
                segment: piece.segment,
                source_start: piece.source_start,
                source_end: piece.source_end,
                output_start: piece.output_start,
                output_end: piece.output_end,
                parent_start: op.start,
                parent_end,
                shown_before,
                shown_total,
                effect: effect.clone(),
            });
            shown_before += shown;
        }
    }

    layout
        .instances
        .sort_by(|a, b| a.segment.cmp(&b.segment).then(a.declared.cmp(&b.declared)));

    tracing::debug!(
        instances = layout.instances.len(),
        dropped = layout.adjustments.len(),
        "Overlays clipped to segments"
    );

    layout
}
