//! Validate an edit plan against its source recording.

use reelcut_common::config::EngineConfig;
use reelcut_plan_model::VideoCodec;
use reelcut_render_engine::{prepare, FfmpegBackend};

use super::{scratch_output, JobArgs};

pub async fn run(config: &EngineConfig, args: JobArgs) -> anyhow::Result<()> {
    println!("Validating plan: {}", args.plan.display());

    let backend = FfmpegBackend::new();
    let render = args.render_config(&scratch_output(VideoCodec::default().extension()))?;
    let job = args.load(&backend, render).await?;

    println!("  Operations: {}", job.plan.operations.len());
    println!(
        "  Source: {:.2}s, {}x{} @ {:.2}fps{}",
        job.media.duration_secs,
        job.media.width,
        job.media.height,
        job.media.fps,
        if job.media.has_audio { "" } else { " (no audio)" }
    );
    if let Some(track) = &job.narration {
        println!("  Narration cues: {}", track.cues.len());
    }

    let prepared = match prepare(&job, config) {
        Ok(prepared) => prepared,
        Err(e) => {
            println!("\nPlan is invalid:");
            println!("  - {e}");
            return Err(e.into());
        }
    };

    let summary = &prepared.summary;
    println!(
        "  Cuts: {}  Speed changes: {}  Zooms: {}  Highlights: {}  Clicks: {}  Texts: {}  Transitions: {}",
        summary.total_cuts,
        summary.total_speed_changes,
        summary.total_zooms,
        summary.total_highlights,
        summary.total_effects,
        summary.total_texts,
        summary.total_transitions
    );
    println!(
        "  Duration: {:.2}s -> {:.2}s (saves {:.2}s)",
        summary.original_duration, summary.final_duration, summary.time_saved
    );
    println!(
        "  Parts: {} segment(s), {} transition(s)",
        prepared.compiled.segments.len(),
        prepared.compiled.transitions.len()
    );

    let adjustments = prepared.adjustments();
    if adjustments.is_empty() {
        println!("\nPlan is valid.");
    } else {
        println!("\nTiming adjustments:");
        for adjustment in &adjustments {
            println!("  - {adjustment}");
        }
        println!(
            "\nPlan is valid with {} adjustment(s).",
            adjustments.len()
        );
    }

    Ok(())
}
