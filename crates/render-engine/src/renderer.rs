//! Render parts and the backend seam that produces them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reelcut_common::clock::FrameClock;
use reelcut_common::error::ReelcutResult;
use reelcut_plan_model::SourceMedia;
use reelcut_processing_core::{OverlayInstance, ResolvedTransition, Segment};

use crate::audio::SegmentAudio;
use crate::compositor::{compose_segment, FrameComposition};
use crate::encoder::EncodeSettings;

/// Identifies one independently rendered piece of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartKey {
    Segment(usize),
    /// Crossfade between segment `b` and `b + 1`.
    Transition(usize),
}

impl PartKey {
    /// Position in the output: segment `i` is `2i`, the crossfade after it `2i + 1`.
    pub fn ordinal(self) -> usize {
        match self {
            PartKey::Segment(i) => 2 * i,
            PartKey::Transition(b) => 2 * b + 1,
        }
    }
}

impl fmt::Display for PartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartKey::Segment(i) => write!(f, "segment {i}"),
            PartKey::Transition(b) => write!(f, "transition {}->{}", b, b + 1),
        }
    }
}

/// A finished intermediate file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPart {
    pub key: PartKey,
    pub path: PathBuf,
    /// Playback duration in seconds.
    pub duration: f64,
}

/// Everything needed to render one segment in isolation.
#[derive(Debug, Clone)]
pub struct SegmentTask {
    pub segment: Segment,
    pub overlays: Vec<OverlayInstance>,
    pub audio: SegmentAudio,
    pub source: Arc<SourceMedia>,
    pub settings: Arc<EncodeSettings>,
    pub work_dir: PathBuf,
}

impl SegmentTask {
    pub fn key(&self) -> PartKey {
        PartKey::Segment(self.segment.index)
    }

    /// Per-frame composition for this segment.
    pub fn compositions(&self) -> Vec<FrameComposition> {
        let overlays: Vec<&OverlayInstance> = self.overlays.iter().collect();
        compose_segment(
            &self.segment,
            &overlays,
            &self.settings.geometry(&self.source),
            &FrameClock::new(self.settings.fps),
        )
    }

    pub fn output_path(&self) -> PathBuf {
        part_path(&self.work_dir, self.key())
    }
}

/// A crossfade to render once both neighbors exist.
#[derive(Debug, Clone)]
pub struct TransitionTask {
    pub transition: ResolvedTransition,
    pub settings: Arc<EncodeSettings>,
    pub work_dir: PathBuf,
}

impl TransitionTask {
    pub fn key(&self) -> PartKey {
        PartKey::Transition(self.transition.boundary)
    }

    pub fn output_path(&self) -> PathBuf {
        part_path(&self.work_dir, self.key())
    }
}

fn part_path(dir: &Path, key: PartKey) -> PathBuf {
    let name = match key {
        PartKey::Segment(i) => format!("segment-{i:04}.mkv"),
        PartKey::Transition(b) => format!("transition-{b:04}.mkv"),
    };
    dir.join(name)
}

/// Backend that renders segments and crossfades to intermediate files.
#[async_trait]
pub trait SegmentRenderer: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    async fn render_segment(&self, task: &SegmentTask) -> ReelcutResult<RenderedPart>;

    async fn render_transition(
        &self,
        task: &TransitionTask,
        left: &RenderedPart,
        right: &RenderedPart,
    ) -> ReelcutResult<RenderedPart>;
}
