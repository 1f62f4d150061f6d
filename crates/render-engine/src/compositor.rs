//! Effect compositor: per-frame transforms for one segment.
//!
//! Layering per frame: the decoded source frame, then the zoom viewport,
//! then highlight, click ripple, and caption drawn inside that viewport.
//! Different overlay kinds stack. When several instances of the same kind
//! cover a frame, the highest `z_order` wins and ties go to the
//! later-declared operation.

use reelcut_common::clock::FrameClock;
use reelcut_plan_model::{OperationKind, Rgb, Viewport};
use reelcut_processing_core::{OverlayEffect, OverlayInstance, Segment};

/// Caption anchor when a text operation has no position (viewport-local).
const DEFAULT_CAPTION_ANCHOR: (f64, f64) = (0.5, 0.9);

/// Pixel dimensions of the source and output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub source_width: u32,
    pub source_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

impl FrameGeometry {
    /// Output pixels per source pixel at zoom 1.0.
    pub fn output_scale(&self) -> f64 {
        self.output_height.max(1) as f64 / self.source_height.max(1) as f64
    }
}

/// Alpha-ramped box around a target region.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightLayer {
    pub op_id: String,
    /// Visible part of the box, viewport-local normalized.
    pub rect: Viewport,
    pub color: Rgb,
    pub alpha: f64,
}

/// Expanding ripple at a click point.
#[derive(Debug, Clone, PartialEq)]
pub struct RippleLayer {
    pub op_id: String,
    /// Viewport-local normalized center.
    pub center: (f64, f64),
    /// Radius in output pixels.
    pub radius: f64,
    pub alpha: f64,
}

/// Caption text anchored inside the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayer {
    pub op_id: String,
    pub text: String,
    /// Viewport-local normalized anchor (text is centered on it).
    pub anchor: (f64, f64),
    /// Font size in output pixels.
    pub font_px: f64,
    pub color: Rgb,
}

/// A single frame's composition instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameComposition {
    /// Frame number within the segment.
    pub frame_index: u64,

    /// Segment-local output time in seconds.
    pub time_secs: f64,

    /// Source time this frame samples.
    pub source_secs: f64,

    /// The viewport to crop from the source video.
    pub viewport: Viewport,

    pub highlight: Option<HighlightLayer>,
    pub ripple: Option<RippleLayer>,
    pub caption: Option<CaptionLayer>,
}

/// Pick the instance of `kind` that wins at `source_time`.
pub fn resolve_same_kind<'a>(
    overlays: &[&'a OverlayInstance],
    kind: OperationKind,
    source_time: f64,
) -> Option<&'a OverlayInstance> {
    overlays
        .iter()
        .copied()
        .filter(|o| o.kind() == kind && o.active_at(source_time))
        .max_by_key(|o| o.priority())
}

/// Linear ramp up over `ramp` seconds and back down before `duration`.
fn ramp_envelope(elapsed: f64, duration: f64, ramp: f64) -> f64 {
    let ramp = ramp.min(duration / 2.0);
    if ramp <= 0.0 {
        return 1.0;
    }
    let rise = elapsed / ramp;
    let fall = (duration - elapsed) / ramp;
    rise.min(fall).clamp(0.0, 1.0)
}

/// Zoom viewport for `inst` at `source_time`.
pub fn zoom_viewport(inst: &OverlayInstance, geometry: &FrameGeometry, source_time: f64) -> Viewport {
    let OverlayEffect::Zoom(params) = &inst.effect else {
        return Viewport::FULL;
    };

    let (cx, cy, span) = match &params.target_bbox {
        Some(bbox) => {
            let norm = bbox.normalized(geometry.source_width, geometry.source_height);
            let (cx, cy) = norm.center();
            (cx, cy, norm.w.max(norm.h))
        }
        None => (0.5, 0.5, 0.0),
    };
    // Equal normalized w/h keeps the source aspect ratio.
    let size = (1.0 / params.zoom_scale).max(span).min(1.0);
    let target = Viewport::centered(cx, cy, size, size);

    let envelope = ramp_envelope(
        inst.shown_elapsed(source_time),
        inst.shown_total,
        params.ramp_secs,
    );
    Viewport::lerp(&Viewport::FULL, &target, params.animation.apply(envelope))
}

fn highlight_layer(
    inst: &OverlayInstance,
    viewport: &Viewport,
    geometry: &FrameGeometry,
    source_time: f64,
) -> Option<HighlightLayer> {
    let OverlayEffect::Highlight(params) = &inst.effect else {
        return None;
    };
    let bbox = params.bbox.as_ref()?;
    let rect = viewport.clip_local(&bbox.normalized(geometry.source_width, geometry.source_height))?;
    let envelope = ramp_envelope(
        inst.shown_elapsed(source_time),
        inst.shown_total,
        params.ramp_secs,
    );
    let alpha = params.intensity * envelope;
    if alpha <= 0.0 {
        return None;
    }
    Some(HighlightLayer {
        op_id: inst.op_id.clone(),
        rect,
        color: Rgb::parse_hex(&params.color).unwrap_or(Rgb::WHITE),
        alpha,
    })
}

fn ripple_layer(
    inst: &OverlayInstance,
    viewport: &Viewport,
    geometry: &FrameGeometry,
    source_time: f64,
) -> Option<RippleLayer> {
    let OverlayEffect::ClickEffect(params) = &inst.effect else {
        return None;
    };
    let position = params.position?;
    // A ripple cut short by the segment end still plays out in full.
    let length = params.duration.min(inst.shown_total);
    if length <= 0.0 {
        return None;
    }
    let progress = inst.shown_elapsed(source_time) / length;
    if progress >= 1.0 {
        return None;
    }
    let (px, py) = position.normalized(geometry.source_width, geometry.source_height);
    let center = viewport.to_local(px, py)?;
    let radius = params.max_radius * progress * viewport.zoom_factor() * geometry.output_scale();
    Some(RippleLayer {
        op_id: inst.op_id.clone(),
        center,
        radius,
        alpha: 1.0 - progress,
    })
}

fn caption_layer(
    inst: &OverlayInstance,
    viewport: &Viewport,
    geometry: &FrameGeometry,
) -> Option<CaptionLayer> {
    let OverlayEffect::Text(params) = &inst.effect else {
        return None;
    };
    let anchor = match params.position {
        Some(pos) => {
            let (px, py) = pos.normalized(geometry.source_width, geometry.source_height);
            viewport.to_local_clamped(px, py)
        }
        None => DEFAULT_CAPTION_ANCHOR,
    };
    Some(CaptionLayer {
        op_id: inst.op_id.clone(),
        text: params.text.clone(),
        anchor,
        font_px: params.font_size as f64 * geometry.output_scale(),
        color: Rgb::parse_hex(&params.color).unwrap_or(Rgb::WHITE),
    })
}

/// Compose a single frame at segment-local output time `time_secs`.
pub fn compose_frame(
    segment: &Segment,
    overlays: &[&OverlayInstance],
    geometry: &FrameGeometry,
    frame_index: u64,
    time_secs: f64,
) -> FrameComposition {
    let source_secs = segment.source_at(time_secs);

    let viewport = resolve_same_kind(overlays, OperationKind::Zoom, source_secs)
        .map(|z| zoom_viewport(z, geometry, source_secs))
        .unwrap_or(Viewport::FULL);

    let highlight = resolve_same_kind(overlays, OperationKind::Highlight, source_secs)
        .and_then(|h| highlight_layer(h, &viewport, geometry, source_secs));
    let ripple = resolve_same_kind(overlays, OperationKind::ClickEffect, source_secs)
        .and_then(|r| ripple_layer(r, &viewport, geometry, source_secs));
    let caption = resolve_same_kind(overlays, OperationKind::Text, source_secs)
        .and_then(|c| caption_layer(c, &viewport, geometry));

    FrameComposition {
        frame_index,
        time_secs,
        source_secs,
        viewport,
        highlight,
        ripple,
        caption,
    }
}

/// Compute the composition for every output frame of a segment.
pub fn compose_segment(
    segment: &Segment,
    overlays: &[&OverlayInstance],
    geometry: &FrameGeometry,
    clock: &FrameClock,
) -> Vec<FrameComposition> {
    let total_frames = clock.frames_in(segment.output_duration).max(1);
    (0..total_frames)
        .map(|frame| compose_frame(segment, overlays, geometry, frame, clock.frame_to_secs(frame)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_plan_model::{
        ClickEffectParams, HighlightParams, PixelPoint, PixelRect, TextParams, ZoomParams,
    };

    const GEOMETRY: FrameGeometry = FrameGeometry {
        source_width: 1000,
        source_height: 1000,
        output_width: 500,
        output_height: 500,
    };

    fn segment() -> Segment {
        Segment {
            index: 0,
            source_start: 0.0,
            source_end: 10.0,
            speed_factor: 1.0,
            output_start: 0.0,
            output_duration: 10.0,
        }
    }

    fn instance(id: &str, declared: usize, start: f64, end: f64, effect: OverlayEffect) -> OverlayInstance {
        OverlayInstance {
            op_id: id.to_string(),
            declared,
            z_order: None,
            segment: 0,
            source_start: start,
            source_end: end,
            output_start: start,
            output_end: end,
            parent_start: start,
            parent_end: end,
            shown_before: 0.0,
            shown_total: end - start,
            effect,
        }
    }

    fn zoom(scale: f64) -> OverlayEffect {
        OverlayEffect::Zoom(ZoomParams {
            target_bbox: Some(PixelRect::new(400.0, 400.0, 600.0, 600.0)),
            zoom_scale: scale,
            ..ZoomParams::default()
        })
    }

    #[test]
    fn test_zoom_ramps_in_and_out() {
        let z = instance("z", 0, 2.0, 6.0, zoom(2.0));
        let overlays = [&z];

        let before = compose_frame(&segment(), &overlays, &GEOMETRY, 0, 1.0);
        assert_eq!(before.viewport, Viewport::FULL);

        let held = compose_frame(&segment(), &overlays, &GEOMETRY, 0, 4.0);
        assert!((held.viewport.w - 0.5).abs() < 1e-9);
        assert!((held.viewport.center().0 - 0.5).abs() < 1e-9);

        let ramping = compose_frame(&segment(), &overlays, &GEOMETRY, 0, 2.15);
        assert!(ramping.viewport.w < 1.0 && ramping.viewport.w > 0.5);
    }

    #[test]
    fn test_zoom_ramp_keeps_its_length_in_sped_up_segment() {
        // 2..6 of source shown at 2x spans 1..3 of output.
        let mut z = instance("z", 0, 2.0, 6.0, zoom(2.0));
        z.output_start = 1.0;
        z.output_end = 3.0;
        z.shown_total = 2.0;
        let seg = Segment {
            speed_factor: 2.0,
            output_duration: 5.0,
            ..segment()
        };
        let ramp = ZoomParams::default().ramp_secs;

        // Half the ramp in output seconds is a full ramp in source seconds.
        let halfway = compose_frame(&seg, &[&z], &GEOMETRY, 0, 2.0 + ramp);
        assert!((halfway.viewport.w - 0.75).abs() < 1e-9);

        let held = compose_frame(&seg, &[&z], &GEOMETRY, 0, 4.0);
        assert!((held.viewport.w - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_split_highlight_does_not_ramp_again() {
        let highlight = OverlayEffect::Highlight(HighlightParams {
            bbox: Some(PixelRect::new(450.0, 450.0, 550.0, 550.0)),
            ramp_secs: 0.5,
            ..HighlightParams::default()
        });
        // Second half of a parent whose first two output seconds came earlier.
        let mut h = instance("h", 0, 6.0, 9.0, highlight);
        h.shown_before = 2.0;
        h.shown_total = 5.0;
        let start = compose_frame(&segment(), &[&h], &GEOMETRY, 0, 6.0);
        assert!((start.highlight.unwrap().alpha - 0.8).abs() < 1e-9);
        let end = compose_frame(&segment(), &[&h], &GEOMETRY, 0, 8.75);
        assert!((end.highlight.unwrap().alpha - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_keeps_aspect_and_stays_in_frame() {
        let mut z = instance("z", 0, 0.0, 4.0, zoom(3.0));
        if let OverlayEffect::Zoom(p) = &mut z.effect {
            p.target_bbox = Some(PixelRect::new(900.0, 900.0, 1000.0, 1000.0));
        }
        let vp = zoom_viewport(&z, &GEOMETRY, 2.0);
        assert!((vp.w - vp.h).abs() < 1e-12);
        assert!(vp.right() <= 1.0 + 1e-12 && vp.bottom() <= 1.0 + 1e-12);
    }

    #[test]
    fn test_same_kind_tie_break() {
        let a = instance("a", 0, 0.0, 5.0, zoom(2.0));
        let b = instance("b", 1, 0.0, 5.0, zoom(1.5));
        let winner = resolve_same_kind(&[&a, &b], OperationKind::Zoom, 1.0).unwrap();
        assert_eq!(winner.op_id, "b");

        let mut a = a;
        a.z_order = Some(1);
        let winner = resolve_same_kind(&[&a, &b], OperationKind::Zoom, 1.0).unwrap();
        assert_eq!(winner.op_id, "a");
    }

    #[test]
    fn test_kinds_stack_inside_zoom_viewport() {
        let z = instance("z", 0, 0.0, 10.0, zoom(2.0));
        let h = instance(
            "h",
            1,
            0.0,
            10.0,
            OverlayEffect::Highlight(HighlightParams {
                bbox: Some(PixelRect::new(450.0, 450.0, 550.0, 550.0)),
                ramp_secs: 0.0,
                ..HighlightParams::default()
            }),
        );
        let c = instance(
            "c",
            2,
            4.0,
            5.0,
            OverlayEffect::ClickEffect(ClickEffectParams {
                position: Some(PixelPoint::new(500.0, 500.0)),
                ..ClickEffectParams::default()
            }),
        );
        let t = instance(
            "t",
            3,
            0.0,
            10.0,
            OverlayEffect::Text(TextParams {
                text: "Hello".into(),
                ..TextParams::default()
            }),
        );
        let overlays = [&z, &h, &c, &t];
        let frame = compose_frame(&segment(), &overlays, &GEOMETRY, 0, 4.2);

        let highlight = frame.highlight.unwrap();
        // 0.1-wide box inside a 0.5-wide viewport is 0.2 of the output.
        assert!((highlight.rect.w - 0.2).abs() < 1e-9);
        assert!((highlight.alpha - 0.8).abs() < 1e-9);

        let ripple = frame.ripple.unwrap();
        assert!((ripple.center.0 - 0.5).abs() < 1e-9);
        assert!(ripple.alpha < 1.0 && ripple.alpha > 0.0);
        // 30 px * 0.5 progress * 2x zoom * 0.5 output scale
        assert!((ripple.radius - 15.0).abs() < 1e-9);

        assert_eq!(frame.caption.unwrap().anchor, DEFAULT_CAPTION_ANCHOR);
    }

    #[test]
    fn test_ripple_ends_after_its_duration() {
        let c = instance(
            "c",
            0,
            1.0,
            3.0,
            OverlayEffect::ClickEffect(ClickEffectParams {
                position: Some(PixelPoint::new(100.0, 100.0)),
                ..ClickEffectParams::default()
            }),
        );
        let frame = compose_frame(&segment(), &[&c], &GEOMETRY, 0, 2.0);
        assert!(frame.ripple.is_none());
    }

    #[test]
    fn test_compose_segment_follows_speed() {
        let seg = Segment {
            speed_factor: 2.0,
            output_duration: 5.0,
            ..segment()
        };
        let frames = compose_segment(&seg, &[], &GEOMETRY, &FrameClock::new(10));
        assert_eq!(frames.len(), 50);
        assert!((frames[10].source_secs - 2.0).abs() < 1e-9);
    }
}
