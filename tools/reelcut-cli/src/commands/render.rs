//! Render an edit plan to a finished video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use reelcut_common::config::EngineConfig;
use reelcut_common::error::ReelcutError;
use reelcut_plan_model::{RenderConfig, Resolution, VideoCodec};
use reelcut_render_engine::{
    report_path, CancelToken, FfmpegBackend, ProgressCallback, RenderEngine, RenderProgress,
    RenderStage,
};

use super::JobArgs;

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Output file (overrides output_path in the render config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Video codec: h264, h265 or vp9
    #[arg(long)]
    pub codec: Option<VideoCodec>,

    /// Output resolution, e.g. 1280x720
    #[arg(long)]
    pub resolution: Option<Resolution>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Video bitrate in kbps
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// Drop the recording's own audio
    #[arg(long)]
    pub no_original_audio: bool,

    /// Mix this file under the result as a background bed
    #[arg(long)]
    pub background_music: Option<PathBuf>,

    /// Concurrent segment workers (overrides the engine config)
    #[arg(long)]
    pub workers: Option<usize>,

    /// ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// ffprobe binary
    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: String,
}

impl RenderArgs {
    /// Render config file (if any) with command-line overrides applied.
    pub fn resolve_config(&self) -> anyhow::Result<RenderConfig> {
        let mut config = match (&self.job.render_config, &self.output) {
            (Some(_), _) => self.job.render_config(&PathBuf::new())?,
            (None, Some(output)) => RenderConfig::new(output),
            (None, None) => anyhow::bail!("no output path: pass --output or a render config"),
        };

        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(codec) = self.codec {
            config.codec = codec;
        }
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(fps) = self.fps {
            config.fps = Some(fps);
        }
        if let Some(bitrate) = self.bitrate {
            config.bitrate_kbps = Some(bitrate);
        }
        if self.no_original_audio {
            config.keep_original_audio = false;
        }
        if let Some(path) = &self.background_music {
            config.background_music = true;
            config.background_music_path = Some(path.clone());
        }
        Ok(config)
    }
}

fn print_progress(p: RenderProgress) {
    let label = match p.stage {
        RenderStage::Preparing => "preparing",
        RenderStage::Rendering => "rendering",
        RenderStage::Encoding => "encoding",
        RenderStage::Finalizing => "finalizing",
        RenderStage::Complete => "complete",
        RenderStage::Failed => "failed",
    };
    print!(
        "\r  Progress: {:5.1}% [{label:<10}] parts {}/{}  ETA {:.0}s   ",
        p.progress * 100.0,
        p.parts_done,
        p.total_parts,
        p.eta_secs
    );
    std::io::stdout().flush().ok();
}

pub async fn run(mut engine_config: EngineConfig, args: RenderArgs) -> anyhow::Result<()> {
    if args.job.source.is_none() {
        anyhow::bail!("render needs the source recording: pass --source");
    }
    if let Some(workers) = args.workers {
        engine_config.workers.max_workers = workers;
    }

    let config = args.resolve_config()?;
    let output = config.output_path.clone();
    let backend = FfmpegBackend::with_binaries(&args.ffmpeg, &args.ffprobe);
    let job = args.job.load(&backend, config).await?;

    println!("Rendering: {}", args.job.plan.display());
    println!("  Source: {}", job.media.path.display());
    println!(
        "  Output: {} ({}, {} @ {}fps)",
        output.display(),
        job.config.codec,
        job.config.resolution,
        job.config.fps.unwrap_or(engine_config.render.fps)
    );
    println!("  Workers: {}", engine_config.workers.effective_workers());

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling render");
            trigger.cancel();
        }
    });

    let engine = RenderEngine::new(
        engine_config,
        Arc::new(backend.clone()),
        Arc::new(backend),
    );
    let progress: ProgressCallback = Box::new(print_progress);

    match engine.render(job, &cancel, Some(progress)).await {
        Ok(report) => {
            println!();
            println!("Render complete: {}", output.display());
            println!(
                "  Final duration: {:.2}s ({} segment(s), {} transition(s))",
                report.final_duration, report.segments_rendered, report.transitions_rendered
            );
            if !report.adjustments_logged.is_empty() {
                println!("  Adjustments: {}", report.adjustments_logged.len());
            }
            println!("  Report: {}", report_path(&output).display());
            Ok(())
        }
        Err(ReelcutError::Cancelled) => {
            println!("\nRender cancelled. {} was not touched.", output.display());
            Err(ReelcutError::Cancelled.into())
        }
        Err(e) => {
            println!("\nRender failed: {e}");
            if let ReelcutError::RenderAborted { failures } = &e {
                for failure in failures {
                    println!(
                        "  - {} after {} attempt(s): {}",
                        failure.part, failure.attempts, failure.last_error
                    );
                }
                println!("  Report: {}", report_path(&output).display());
            }
            Err(e.into())
        }
    }
}
