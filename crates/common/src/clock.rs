//! Clock and timebase utilities.
//!
//! Edit plans are expressed in seconds of the source recording. Rendering
//! works in whole output frames. This module provides:
//! - A frame timebase for converting between seconds and frame indices
//! - A render clock for measuring job stages
//! - A shared epsilon for comparing plan times

use std::time::Instant;

/// Tolerance used when comparing plan timestamps (seconds).
pub const TIME_EPSILON: f64 = 1e-6;

/// Whether two plan timestamps are equal within [`TIME_EPSILON`].
pub fn time_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_EPSILON
}

/// Frame timebase for a fixed output frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a timebase. A zero rate is clamped to 1 fps.
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Duration of one frame in seconds.
    pub fn frame_secs(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Presentation time of a frame index.
    pub fn frame_to_secs(&self, frame: u64) -> f64 {
        frame as f64 / self.fps as f64
    }

    /// Index of the frame displayed at `secs` (floor, never negative).
    pub fn secs_to_frame(&self, secs: f64) -> u64 {
        ((secs.max(0.0) * self.fps as f64) + TIME_EPSILON).floor() as u64
    }

    /// Number of frames needed to cover `duration_secs` (rounded to nearest).
    pub fn frames_in(&self, duration_secs: f64) -> u64 {
        (duration_secs.max(0.0) * self.fps as f64).round() as u64
    }
}

/// A render clock that measures elapsed time from job start.
#[derive(Debug, Clone)]
pub struct RenderClock {
    /// The instant the job started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl RenderClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get milliseconds elapsed since job start.
    pub fn elapsed_ms(&self) -> u128 {
        self.epoch.elapsed().as_millis()
    }

    /// Get seconds elapsed since job start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at job start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}
