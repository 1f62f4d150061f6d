pub mod check;
pub mod plan;
pub mod render;
pub mod validate;

use std::path::{Path, PathBuf};

use clap::Args;
use reelcut_plan_model::{EditPlan, NarrationTrack, RenderConfig, Resolution, SourceMedia};
use reelcut_render_engine::{FfmpegBackend, RenderJob};

/// Inputs shared by every command that reads a plan.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Edit plan (edit_plan.json)
    pub plan: PathBuf,

    /// Source recording, probed with ffprobe
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Source duration in seconds, used instead of probing
    #[arg(long, conflicts_with = "source")]
    pub duration: Option<f64>,

    /// Frame size assumed with --duration
    #[arg(long, default_value = "1920x1080")]
    pub frame_size: Resolution,

    /// Narration track (narration.json)
    #[arg(short, long)]
    pub narration: Option<PathBuf>,

    /// Per-job render options (render.json)
    #[arg(short = 'r', long = "render-config")]
    pub render_config: Option<PathBuf>,
}

impl JobArgs {
    /// Probe the source, or describe a synthetic one from `--duration`.
    pub async fn media(&self, backend: &FfmpegBackend) -> anyhow::Result<SourceMedia> {
        match (&self.source, self.duration) {
            (Some(source), _) => backend
                .probe_source(source)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", source.display())),
            (None, Some(duration)) => {
                if !duration.is_finite() || duration <= 0.0 {
                    anyhow::bail!("--duration must be a positive number of seconds");
                }
                Ok(SourceMedia {
                    path: PathBuf::from("<synthetic>"),
                    duration_secs: duration,
                    fps: 30.0,
                    width: self.frame_size.width,
                    height: self.frame_size.height,
                    has_audio: true,
                })
            }
            (None, None) => anyhow::bail!("either --source or --duration is required"),
        }
    }

    /// Load the render options, or defaults writing to `fallback_output`.
    pub fn render_config(&self, fallback_output: &Path) -> anyhow::Result<RenderConfig> {
        match &self.render_config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
                serde_json::from_str(&json)
                    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
            }
            None => Ok(RenderConfig::new(fallback_output)),
        }
    }

    /// Load everything a render needs. `config` is already resolved.
    pub async fn load(
        &self,
        backend: &FfmpegBackend,
        config: RenderConfig,
    ) -> anyhow::Result<RenderJob> {
        let plan = EditPlan::load(&self.plan)
            .map_err(|e| anyhow::anyhow!("Failed to load plan: {e}"))?;
        let narration = self
            .narration
            .as_ref()
            .map(NarrationTrack::load)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Failed to load narration: {e}"))?;
        let media = self.media(backend).await?;

        Ok(RenderJob {
            media,
            plan,
            narration,
            config,
        })
    }
}

/// Output path used when validating or inspecting without a render config.
pub fn scratch_output(codec_ext: &str) -> PathBuf {
    PathBuf::from(format!("preview.{codec_ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> JobArgs {
        JobArgs {
            plan: PathBuf::from("edit_plan.json"),
            source: None,
            duration: Some(42.0),
            frame_size: Resolution::new(1280, 720),
            narration: None,
            render_config: None,
        }
    }

    #[tokio::test]
    async fn test_duration_describes_synthetic_source() {
        let media = args().media(&FfmpegBackend::new()).await.unwrap();
        assert!((media.duration_secs - 42.0).abs() < 1e-9);
        assert_eq!((media.width, media.height), (1280, 720));
        assert!(media.has_audio);
    }

    #[tokio::test]
    async fn test_missing_source_and_duration_is_an_error() {
        let mut args = args();
        args.duration = None;
        let err = args.media(&FfmpegBackend::new()).await.unwrap_err();
        assert!(err.to_string().contains("--source or --duration"));
    }

    #[tokio::test]
    async fn test_non_positive_duration_is_rejected() {
        let mut args = args();
        args.duration = Some(0.0);
        assert!(args.media(&FfmpegBackend::new()).await.is_err());
    }

    #[test]
    fn test_render_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.json");
        std::fs::write(
            &path,
            r#"{"keep_original_audio": false, "background_music": false,
                "codec": "vp9", "resolution": "1280x720", "output_path": "out.webm"}"#,
        )
        .unwrap();

        let mut args = args();
        args.render_config = Some(path);
        let config = args.render_config(Path::new("ignored.mp4")).unwrap();
        assert_eq!(config.output_path, PathBuf::from("out.webm"));
        assert_eq!(config.resolution, Resolution::new(1280, 720));
        assert!(!config.keep_original_audio);
    }

    #[test]
    fn test_default_render_config_uses_fallback_output() {
        let config = args().render_config(Path::new("a.mp4")).unwrap();
        assert_eq!(config.output_path, PathBuf::from("a.mp4"));
        assert!(config.keep_original_audio);
    }
}
