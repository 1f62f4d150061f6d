//! Render progress reporting.

/// Progress callback for a render job.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send + Sync>;

/// Render progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Parts (segments and transitions) finished so far.
    pub parts_done: usize,

    /// Total parts to render.
    pub total_parts: usize,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: RenderStage,
}

/// Stages of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Preparing,
    Rendering,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

/// Share of overall progress given to segment rendering; encoding gets the rest.
pub const RENDER_SHARE: f64 = 0.8;

impl RenderProgress {
    pub fn stage(stage: RenderStage, total_parts: usize) -> Self {
        let progress = match stage {
            RenderStage::Complete => 1.0,
            _ => 0.0,
        };
        Self {
            progress,
            parts_done: 0,
            total_parts,
            eta_secs: 0.0,
            stage,
        }
    }

    /// Progress after `done` of `total` parts finished.
    pub fn rendering(done: usize, total: usize, elapsed_secs: f64) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        let progress = fraction * RENDER_SHARE;
        Self {
            progress,
            parts_done: done,
            total_parts: total,
            eta_secs: eta(progress, elapsed_secs),
            stage: RenderStage::Rendering,
        }
    }
}

fn eta(progress: f64, elapsed_secs: f64) -> f64 {
    if progress > 0.0 {
        ((elapsed_secs / progress) - elapsed_secs).max(0.0)
    } else {
        0.0
    }
}

/// Accumulates `key=value` lines from `ffmpeg -progress`.
#[derive(Debug, Default)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    /// Encoding-stage report against the expected output duration.
    pub fn report(&self, expected_duration_secs: f64, total_parts: usize, elapsed_secs: f64) -> RenderProgress {
        let encoded = if expected_duration_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
        };
        let progress = if self.complete {
            1.0
        } else {
            RENDER_SHARE + encoded * (1.0 - RENDER_SHARE)
        };

        RenderProgress {
            progress,
            parts_done: total_parts,
            total_parts,
            eta_secs: eta(progress, elapsed_secs),
            stage: if self.complete {
                RenderStage::Finalizing
            } else {
                RenderStage::Encoding
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_state_parses_out_time() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "5000000");
        assert!((state.out_time_secs - 5.0).abs() < 1e-9);
        state.update("progress", "continue");
        assert!(!state.complete);

        let report = state.report(10.0, 4, 2.0);
        assert!((report.progress - (RENDER_SHARE + 0.5 * (1.0 - RENDER_SHARE))).abs() < 1e-9);
        assert_eq!(report.stage, RenderStage::Encoding);

        state.update("progress", "end");
        let report = state.report(10.0, 4, 2.0);
        assert_eq!(report.progress, 1.0);
        assert_eq!(report.stage, RenderStage::Finalizing);
    }

    #[test]
    fn test_rendering_progress_scales_to_share() {
        let p = RenderProgress::rendering(2, 4, 10.0);
        assert!((p.progress - 0.4).abs() < 1e-9);
        assert!((p.eta_secs - 15.0).abs() < 1e-9);
        assert_eq!(RenderProgress::rendering(0, 0, 0.0).progress, RENDER_SHARE);
    }
}
