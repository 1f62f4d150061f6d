//! Show how a plan compiles: segments, transitions, overlays and cues.

use reelcut_common::config::EngineConfig;
use reelcut_plan_model::{PlanSummary, VideoCodec};
use reelcut_processing_core::{Adjustment, OverlayInstance, PlacedCue, ResolvedTransition, Segment};
use reelcut_render_engine::{prepare, FfmpegBackend, PreparedJob};
use serde::Serialize;

use super::{scratch_output, JobArgs};

#[derive(Serialize)]
struct CompiledPlan<'a> {
    summary: &'a PlanSummary,
    segments: &'a [Segment],
    transitions: &'a [ResolvedTransition],
    overlays: &'a [OverlayInstance],
    cues: &'a [PlacedCue],
    adjustments: Vec<Adjustment>,
}

impl<'a> CompiledPlan<'a> {
    fn new(prepared: &'a PreparedJob) -> Self {
        Self {
            summary: &prepared.summary,
            segments: &prepared.compiled.segments,
            transitions: &prepared.compiled.transitions,
            overlays: &prepared.overlays.instances,
            cues: prepared
                .audio
                .narration
                .as_ref()
                .map(|n| n.cues.as_slice())
                .unwrap_or_default(),
            adjustments: prepared.adjustments(),
        }
    }
}

pub async fn run(config: &EngineConfig, args: JobArgs, json: bool) -> anyhow::Result<()> {
    let backend = FfmpegBackend::new();
    let render = args.render_config(&scratch_output(VideoCodec::default().extension()))?;
    let job = args.load(&backend, render).await?;
    let prepared = prepare(&job, config)?;
    let compiled = CompiledPlan::new(&prepared);

    if json {
        println!("{}", serde_json::to_string_pretty(&compiled)?);
        return Ok(());
    }

    println!(
        "Timeline: {:.3}s -> {:.3}s",
        compiled.summary.original_duration, compiled.summary.final_duration
    );

    println!("\nSegments:");
    for segment in compiled.segments {
        println!(
            "  #{:<3} source [{:>8.3}, {:>8.3})  x{:<5.2} output [{:>8.3}, {:>8.3})",
            segment.index,
            segment.source_start,
            segment.source_end,
            segment.speed_factor,
            segment.output_start,
            segment.output_end()
        );
    }

    if !compiled.transitions.is_empty() {
        println!("\nTransitions:");
        for transition in compiled.transitions {
            println!(
                "  {} between #{} and #{}: {:?} {:.3}s",
                transition.op_id,
                transition.boundary,
                transition.boundary + 1,
                transition.style,
                transition.duration
            );
        }
    }

    if !compiled.overlays.is_empty() {
        println!("\nOverlays:");
        for overlay in compiled.overlays {
            println!(
                "  {:<10} {:<12} segment #{:<3} output [{:>8.3}, {:>8.3})",
                overlay.op_id,
                overlay.kind().as_str(),
                overlay.segment,
                overlay.output_start,
                overlay.output_end
            );
        }
    }

    if !compiled.cues.is_empty() {
        println!("\nNarration:");
        for cue in compiled.cues {
            println!(
                "  cue-{:<4} audio {:>8.3}s +{:.3}s at output {:>8.3}s",
                cue.cue_index, cue.audio_start, cue.duration, cue.output_start
            );
        }
    }

    if !compiled.adjustments.is_empty() {
        println!("\nAdjustments:");
        for adjustment in &compiled.adjustments {
            println!("  {adjustment}");
        }
    }

    Ok(())
}
