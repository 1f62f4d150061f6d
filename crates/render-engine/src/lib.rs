//! Reelcut Render Engine
//!
//! Executes a compiled edit plan against a source recording and produces
//! the final video file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ──┐
//!              ├── Segment render (seek, speed, zoom, overlays) ──┐
//! edit plan ───┘        × N workers, retried, any order           │
//!                                                                 ├── Ordered buffer
//!                       Crossfade render (both neighbors done) ───┘        │
//!                                                                          ▼
//! narration.wav ──┐                                               concat list
//!                 ├── Final mix (cue placement, background bed) ───────────┤
//! bed.mp3 ────────┘                                                        ▼
//!                                                                 Encode (temp file)
//!                                                                          │
//!                                                                          ▼
//!                                                              output.mp4 (atomic rename)
//! ```

pub mod audio;
pub mod compositor;
pub mod encoder;
pub mod ffmpeg;
pub mod filters;
pub mod job;
pub mod progress;
pub mod renderer;
pub mod scheduler;

pub use audio::{plan_audio, AudioMixPlan, AudioMode, SegmentAudio};
pub use encoder::{AtomicOutput, ConcatList, EncodeJob, EncodeSettings, Encoder};
pub use ffmpeg::FfmpegBackend;
pub use job::{prepare, report_path, PreparedJob, RenderEngine, RenderJob, RenderReport};
pub use progress::{ProgressCallback, RenderProgress, RenderStage};
pub use renderer::{PartKey, RenderedPart, SegmentRenderer, SegmentTask, TransitionTask};
pub use scheduler::{
    CancelToken, OrderedBuffer, PartSink, RenderScheduler, ScheduleOutcome, SchedulerConfig,
};
