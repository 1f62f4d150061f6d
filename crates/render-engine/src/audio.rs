//! Audio mixer: decides what each segment contributes and what gets mixed on top.
//!
//! - **Original:** each segment's own audio, time-stretched with the same
//!   speed factor as its video (pitch preserved by `atempo`).
//! - **Narration:** segment audio is silent; narration cues are remapped onto
//!   the output timeline and mixed in.
//! - **Mixed:** original segment audio with narration cues on top.
//!
//! An optional background bed is mixed under any mode at a fixed attenuation.

use std::path::PathBuf;

use reelcut_common::config::AudioDefaults;
use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_plan_model::{NarrationTrack, RenderConfig, SourceMedia};
use reelcut_processing_core::{sync_cues, Adjustment, CompiledTimeline, PlacedCue};

/// `atempo` accepts factors within this range per stage.
pub const ATEMPO_MIN: f64 = 0.5;
pub const ATEMPO_MAX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Original,
    Narration,
    Mixed,
}

/// Where a rendered segment's audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentAudio {
    /// Source audio with an `atempo` chain (empty at 1x).
    Original { tempo_chain: Vec<f64> },
    Silence,
}

/// Narration cues placed on the output timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationMix {
    pub audio_path: PathBuf,
    pub cues: Vec<PlacedCue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundBed {
    pub path: PathBuf,
    /// Linear gain.
    pub volume: f64,
}

/// Full audio plan for a render job.
#[derive(Debug, Clone)]
pub struct AudioMixPlan {
    pub mode: AudioMode,
    /// One entry per segment, in segment order.
    pub segments: Vec<SegmentAudio>,
    pub narration: Option<NarrationMix>,
    pub background: Option<BackgroundBed>,
    pub sample_rate: u32,
    /// Cue corrections made while remapping narration.
    pub adjustments: Vec<Adjustment>,
}

impl AudioMixPlan {
    /// Whether the final mux must mix extra inputs over the segment audio.
    pub fn needs_final_mix(&self) -> bool {
        self.narration.as_ref().is_some_and(|n| !n.cues.is_empty()) || self.background.is_some()
    }
}

/// Split a speed factor into `atempo` stages each within `[0.5, 2.0]`.
pub fn atempo_chain(speed: f64) -> Vec<f64> {
    if (speed - 1.0).abs() < 1e-9 || !speed.is_finite() || speed <= 0.0 {
        return Vec::new();
    }
    let mut chain = Vec::new();
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        chain.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        chain.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    if (remaining - 1.0).abs() > 1e-9 {
        chain.push(remaining);
    }
    chain
}

/// Build the audio plan for a compiled timeline.
pub fn plan_audio(
    compiled: &CompiledTimeline,
    media: &SourceMedia,
    config: &RenderConfig,
    narration: Option<&NarrationTrack>,
    defaults: &AudioDefaults,
) -> ReelcutResult<AudioMixPlan> {
    let mode = match (config.keep_original_audio, narration) {
        (true, None) => AudioMode::Original,
        (true, Some(_)) => AudioMode::Mixed,
        (false, Some(_)) => AudioMode::Narration,
        (false, None) => {
            return Err(ReelcutError::config(
                "keep_original_audio is off but no narration track was provided",
            ))
        }
    };

    let use_source = mode != AudioMode::Narration && media.has_audio;
    if mode != AudioMode::Narration && !media.has_audio {
        tracing::warn!(
            source = %media.path.display(),
            "Source has no audio stream; segments will be silent"
        );
    }

    let segments = compiled
        .segments
        .iter()
        .map(|seg| {
            if use_source {
                SegmentAudio::Original {
                    tempo_chain: atempo_chain(seg.speed_factor),
                }
            } else {
                SegmentAudio::Silence
            }
        })
        .collect();

    let mut adjustments = Vec::new();
    let narration = narration.map(|track| {
        let sync = sync_cues(&track.cues, &compiled.remap);
        adjustments = sync.adjustments;
        NarrationMix {
            audio_path: track.audio_path.clone(),
            cues: sync.placed,
        }
    });

    let background = if config.background_music {
        let path = config.background_music_path.clone().ok_or_else(|| {
            ReelcutError::config("background_music is on but no background_music_path is set")
        })?;
        Some(BackgroundBed {
            path,
            volume: defaults.background_volume,
        })
    } else {
        None
    };

    tracing::info!(
        mode = ?mode,
        narration_cues = narration.as_ref().map(|n| n.cues.len()).unwrap_or(0),
        background = background.is_some(),
        adjustments = adjustments.len(),
        "Audio mix planned"
    );

    Ok(AudioMixPlan {
        mode,
        segments,
        narration,
        background,
        sample_rate: defaults.sample_rate,
        adjustments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_plan_model::{AudioCue, EditPlan};
    use reelcut_processing_core::{compile_segments, AdjustmentReason, Timeline};

    fn compiled() -> CompiledTimeline {
        let plan = EditPlan::from_json(
            r#"{"timeline": [
                {"action": "cut", "start": 10.0, "end": 15.0},
                {"action": "speed", "start": 20.0, "end": 30.0, "params": {"speed_multiplier": 3.0}}
            ]}"#,
        )
        .unwrap();
        compile_segments(&Timeline::build(&plan, 60.0).unwrap())
    }

    fn media(has_audio: bool) -> SourceMedia {
        SourceMedia {
            path: PathBuf::from("source.mp4"),
            duration_secs: 60.0,
            fps: 30.0,
            width: 1920,
            height: 1080,
            has_audio,
        }
    }

    fn narration() -> NarrationTrack {
        NarrationTrack {
            audio_path: PathBuf::from("narration.wav"),
            cues: vec![AudioCue::new(12.0, 14.0), AudioCue::new(40.0, 42.0)],
        }
    }

    #[test]
    fn test_atempo_chain_stages_stay_in_range() {
        assert!(atempo_chain(1.0).is_empty());
        assert_eq!(atempo_chain(1.5), vec![1.5]);
        assert_eq!(atempo_chain(3.0), vec![2.0, 1.5]);
        assert_eq!(atempo_chain(4.0), vec![2.0, 2.0]);
        assert_eq!(atempo_chain(0.25), vec![0.5, 0.5]);
        let chain = atempo_chain(0.3);
        assert!(chain.iter().all(|s| (ATEMPO_MIN..=ATEMPO_MAX).contains(s)));
        let product: f64 = chain.iter().product();
        assert!((product - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_original_mode_stretches_per_segment() {
        let cfg = RenderConfig::new("out.mp4");
        let plan = plan_audio(&compiled(), &media(true), &cfg, None, &AudioDefaults::default())
            .unwrap();
        assert_eq!(plan.mode, AudioMode::Original);
        assert_eq!(
            plan.segments[2],
            SegmentAudio::Original {
                tempo_chain: vec![2.0, 1.5]
            }
        );
        assert!(!plan.needs_final_mix());
    }

    #[test]
    fn test_narration_mode_remaps_cues() {
        let mut cfg = RenderConfig::new("out.mp4");
        cfg.keep_original_audio = false;
        let track = narration();
        let plan = plan_audio(
            &compiled(),
            &media(true),
            &cfg,
            Some(&track),
            &AudioDefaults::default(),
        )
        .unwrap();
        assert_eq!(plan.mode, AudioMode::Narration);
        assert!(plan.segments.iter().all(|s| *s == SegmentAudio::Silence));

        let cues = &plan.narration.as_ref().unwrap().cues;
        assert!((cues[0].output_start - 10.0).abs() < 1e-9);
        // 40 s: 10 s kept before the cut, 5 s + 10/3 s of sped-up range, then 10 s.
        assert!((cues[1].output_start - (10.0 + 5.0 + 10.0 / 3.0 + 10.0)).abs() < 1e-9);
        assert_eq!(plan.adjustments[0].reason, AdjustmentReason::SnappedForward);
        assert!(plan.needs_final_mix());
    }

    #[test]
    fn test_narration_mode_requires_track() {
        let mut cfg = RenderConfig::new("out.mp4");
        cfg.keep_original_audio = false;
        let err = plan_audio(&compiled(), &media(true), &cfg, None, &AudioDefaults::default())
            .unwrap_err();
        assert!(matches!(err, ReelcutError::Config { .. }));
    }

    #[test]
    fn test_background_bed_uses_fixed_volume() {
        let mut cfg = RenderConfig::new("out.mp4");
        cfg.background_music = true;
        assert!(plan_audio(&compiled(), &media(true), &cfg, None, &AudioDefaults::default())
            .is_err());

        cfg.background_music_path = Some(PathBuf::from("bed.mp3"));
        let plan = plan_audio(&compiled(), &media(false), &cfg, None, &AudioDefaults::default())
            .unwrap();
        let bed = plan.background.unwrap();
        assert!((bed.volume - 0.15).abs() < 1e-9);
        assert!(plan.segments.iter().all(|s| *s == SegmentAudio::Silence));
    }
}
