//! Narration tracks: an audio asset plus cues in the recording's time base.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// A timed unit of narration, in original recording time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCue {
    #[serde(alias = "start")]
    pub source_start: f64,
    #[serde(alias = "end")]
    pub source_end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AudioCue {
    pub fn new(source_start: f64, source_end: f64) -> Self {
        Self {
            source_start,
            source_end,
            text: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.source_end - self.source_start
    }
}

/// Narration audio asset with its cue list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationTrack {
    /// Resolved against the track file's directory when relative.
    pub audio_path: PathBuf,
    #[serde(default, alias = "segments")]
    pub cues: Vec<AudioCue>,
}

impl NarrationTrack {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PlanError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut track: NarrationTrack =
            serde_json::from_str(&json).map_err(|e| PlanError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        if track.audio_path.is_relative() {
            if let Some(dir) = path.parent() {
                track.audio_path = dir.join(&track.audio_path);
            }
        }
        track.validate()?;
        Ok(track)
    }

    /// Cues must have finite, non-negative, non-empty ranges.
    ///
    /// Cue ids in errors are the cue's position in the list.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (i, cue) in self.cues.iter().enumerate() {
            let id = format!("cue-{i}");
            if !cue.source_start.is_finite() || !cue.source_end.is_finite() {
                return Err(PlanError::validation(id, "cue times must be finite"));
            }
            if cue.source_start < 0.0 {
                return Err(PlanError::validation(id, "cue start must be >= 0"));
            }
            if cue.source_end <= cue.source_start {
                return Err(PlanError::validation(
                    id,
                    format!(
                        "cue end ({}) must be greater than start ({})",
                        cue.source_end, cue.source_start
                    ),
                ));
            }
        }
        Ok(())
    }
}
