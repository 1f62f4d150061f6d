//! Reelcut Processing Core
//!
//! Turns a validated edit plan into everything the renderer needs:
//! - **Timeline:** Validate operations against the source duration
//! - **Segments:** Compile kept ranges into ordered output segments
//! - **Remap:** Map source time to output time with snap-forward policy
//! - **Overlays:** Clip overlay operations to the segments they intersect
//! - **Cue sync:** Place narration cues on the output timeline
//!
//! This crate is pure computation with no I/O and no process spawning.
//! All inputs are data; all outputs are data.

pub mod cue_sync;
pub mod overlay;
pub mod remap;
pub mod segments;
pub mod timeline;

pub use cue_sync::{sync_cues, CueSync, PlacedCue};
pub use overlay::{clip_overlays, OverlayEffect, OverlayInstance, OverlayLayout};
pub use remap::{Adjustment, AdjustmentReason, IntervalPiece, Remapped, TimeRemap};
pub use segments::{compile_segments, CompiledTimeline, Segment, SourceSpan};
pub use timeline::{CutRange, ResolvedTransition, SpeedRange, Timeline};
