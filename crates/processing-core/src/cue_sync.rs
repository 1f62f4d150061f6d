//! Narration cue synchronization against the time remap.

use reelcut_common::clock::TIME_EPSILON;
use reelcut_plan_model::AudioCue;
use serde::Serialize;

use crate::remap::{Adjustment, AdjustmentReason, TimeRemap};

/// A narration cue positioned on the output timeline.
///
/// Narration plays at natural speed: the audio slice
/// `[audio_start, audio_start + duration)` of the narration asset is placed
/// at `output_start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedCue {
    pub cue_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub audio_start: f64,
    pub duration: f64,
    pub output_start: f64,
}

impl PlacedCue {
    pub fn output_end(&self) -> f64 {
        self.output_start + self.duration
    }
}

#[derive(Debug, Clone, Default)]
pub struct CueSync {
    pub placed: Vec<PlacedCue>,
    pub adjustments: Vec<Adjustment>,
}

/// Place every cue on the output timeline.
///
/// Cues starting inside a removed range snap forward to the next kept
/// boundary. A cue that would start before the previous one ends is
/// delayed to that end so clips never overlap in the mix. Cues that would
/// start at or after the end of the output are dropped, and cues running
/// past it are truncated. Each correction is
/// recorded as an [`Adjustment`]; none of them fail the job.
pub fn sync_cues(cues: &[AudioCue], remap: &TimeRemap) -> CueSync {
    let mut sync = CueSync::default();
    let final_duration = remap.final_duration();
    let mut previous_end = 0.0_f64;

    for (i, cue) in cues.iter().enumerate() {
        let subject = format!("cue-{i}");
        let mapped = remap.map(cue.source_start);

        if mapped.output >= final_duration - TIME_EPSILON {
            tracing::warn!(
                cue = i,
                source_start = cue.source_start,
                "Narration cue starts after the end of the output; dropped"
            );
            sync.adjustments.push(Adjustment {
                subject,
                reason: AdjustmentReason::Dropped,
                requested_source: cue.source_start,
                resolved_source: None,
                output_time: None,
            });
            continue;
        }

        if let Some(reason) = mapped.adjustment {
            tracing::warn!(
                cue = i,
                requested = cue.source_start,
                snapped = mapped.source,
                output = mapped.output,
                "Narration cue inside removed range; snapped forward"
            );
            sync.adjustments.push(Adjustment {
                subject: subject.clone(),
                reason,
                requested_source: cue.source_start,
                resolved_source: Some(mapped.source),
                output_time: Some(mapped.output),
            });
        }

        let mut output_start = mapped.output;
        if output_start < previous_end - TIME_EPSILON {
            tracing::warn!(
                cue = i,
                output = output_start,
                delayed_to = previous_end,
                "Narration cue overlaps the previous cue; delayed"
            );
            if previous_end >= final_duration - TIME_EPSILON {
                sync.adjustments.push(Adjustment {
                    subject,
                    reason: AdjustmentReason::Dropped,
                    requested_source: cue.source_start,
                    resolved_source: Some(mapped.source),
                    output_time: None,
                });
                continue;
            }
            sync.adjustments.push(Adjustment {
                subject: subject.clone(),
                reason: AdjustmentReason::Delayed,
                requested_source: cue.source_start,
                resolved_source: Some(mapped.source),
                output_time: Some(previous_end),
            });
            output_start = previous_end;
        }

        let mut duration = cue.duration();
        if output_start + duration > final_duration + TIME_EPSILON {
            duration = final_duration - output_start;
            tracing::warn!(
                cue = i,
                output_start,
                kept = duration,
                "Narration cue runs past the end of the output; truncated"
            );
            sync.adjustments.push(Adjustment {
                subject,
                reason: AdjustmentReason::Truncated,
                requested_source: cue.source_start,
                resolved_source: Some(mapped.source),
                output_time: Some(final_duration),
            });
        }

        previous_end = output_start + duration;
        sync.placed.push(PlacedCue {
            cue_index: i,
            text: cue.text.clone(),
            audio_start: cue.source_start,
            duration,
            output_start,
        });
    }

    sync
}
