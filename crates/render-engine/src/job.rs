//! Render jobs: preparation, orchestration and the render report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelcut_common::clock::RenderClock;
use reelcut_common::config::EngineConfig;
use reelcut_common::error::{PartFailure, ReelcutError, ReelcutResult};
use reelcut_plan_model::{EditPlan, NarrationTrack, PlanSummary, RenderConfig, SourceMedia};
use reelcut_processing_core::{
    clip_overlays, compile_segments, Adjustment, CompiledTimeline, OverlayLayout, Timeline,
};
use serde::Serialize;

use crate::audio::{plan_audio, AudioMixPlan};
use crate::encoder::{encode_atomically, ConcatList, EncodeJob, EncodeSettings, Encoder};
use crate::ffmpeg::concat_list_path;
use crate::progress::{ProgressCallback, RenderProgress, RenderStage};
use crate::renderer::{SegmentRenderer, SegmentTask, TransitionTask};
use crate::scheduler::{CancelToken, RenderScheduler, ScheduleOutcome, SchedulerConfig};

/// A render job ready to be prepared.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Probed source recording.
    pub media: SourceMedia,
    pub plan: EditPlan,
    pub narration: Option<NarrationTrack>,
    pub config: RenderConfig,
}

/// Everything computed from a job before any process is spawned.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub compiled: CompiledTimeline,
    pub overlays: OverlayLayout,
    pub audio: AudioMixPlan,
    pub settings: EncodeSettings,
    pub summary: PlanSummary,
}

impl PreparedJob {
    /// Overlay adjustments followed by narration adjustments.
    pub fn adjustments(&self) -> Vec<Adjustment> {
        self.overlays
            .adjustments
            .iter()
            .chain(self.audio.adjustments.iter())
            .cloned()
            .collect()
    }

    pub fn total_parts(&self) -> usize {
        self.compiled.segments.len() + self.compiled.transitions.len()
    }

    pub fn segment_tasks(&self, media: &Arc<SourceMedia>, work_dir: &Path) -> Vec<SegmentTask> {
        let settings = Arc::new(self.settings.clone());
        self.compiled
            .segments
            .iter()
            .zip(self.audio.segments.iter())
            .map(|(segment, audio)| SegmentTask {
                segment: segment.clone(),
                overlays: self.overlays.for_segment(segment.index).cloned().collect(),
                audio: audio.clone(),
                source: Arc::clone(media),
                settings: Arc::clone(&settings),
                work_dir: work_dir.to_path_buf(),
            })
            .collect()
    }

    pub fn transition_tasks(&self, work_dir: &Path) -> Vec<TransitionTask> {
        let settings = Arc::new(self.settings.clone());
        self.compiled
            .transitions
            .iter()
            .map(|transition| TransitionTask {
                transition: transition.clone(),
                settings: Arc::clone(&settings),
                work_dir: work_dir.to_path_buf(),
            })
            .collect()
    }
}

/// Validate and compile a job. Plan errors surface here, before rendering.
pub fn prepare(job: &RenderJob, engine: &EngineConfig) -> ReelcutResult<PreparedJob> {
    if let Some(track) = &job.narration {
        track.validate()?;
    }

    let timeline = Timeline::build(&job.plan, job.media.duration_secs)?;
    let compiled = compile_segments(&timeline);
    let overlays = clip_overlays(timeline.overlays(), &compiled);
    let audio = plan_audio(
        &compiled,
        &job.media,
        &job.config,
        job.narration.as_ref(),
        &engine.audio,
    )?;
    let settings = EncodeSettings::resolve(&job.config, &engine.render, &engine.audio);

    let output_ext = job
        .config
        .output_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !output_ext.eq_ignore_ascii_case(settings.codec.extension()) {
        tracing::warn!(
            output = %job.config.output_path.display(),
            codec = %settings.codec,
            container = settings.muxer(),
            "Output extension does not match the codec's container"
        );
    }

    let summary = job
        .plan
        .summary()
        .with_durations(job.media.duration_secs, compiled.final_duration);

    tracing::info!(
        segments = compiled.segments.len(),
        transitions = compiled.transitions.len(),
        overlays = overlays.instances.len(),
        source_duration = job.media.duration_secs,
        final_duration = compiled.final_duration,
        "Render job prepared"
    );

    Ok(PreparedJob {
        compiled,
        overlays,
        audio,
        settings,
        summary,
    })
}

/// Outcome of a render, written next to the output as `<output>.report.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderReport {
    pub final_duration: f64,
    pub segments_rendered: usize,
    pub transitions_rendered: usize,
    pub adjustments_logged: Vec<Adjustment>,
    pub errors: Vec<PartFailure>,
    pub summary: PlanSummary,
}

impl RenderReport {
    fn new(prepared: &PreparedJob) -> Self {
        Self {
            final_duration: prepared.compiled.final_duration,
            segments_rendered: 0,
            transitions_rendered: 0,
            adjustments_logged: prepared.adjustments(),
            errors: Vec::new(),
            summary: prepared.summary.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn write(&self, path: &Path) -> ReelcutResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// `<output>.report.json`
pub fn report_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".report.json");
    output.with_file_name(name)
}

/// Drives a job through the scheduler and encoder.
pub struct RenderEngine {
    config: EngineConfig,
    renderer: Arc<dyn SegmentRenderer>,
    encoder: Arc<dyn Encoder>,
}

impl RenderEngine {
    pub fn new(
        config: EngineConfig,
        renderer: Arc<dyn SegmentRenderer>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            config,
            renderer,
            encoder,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render `job` to `job.config.output_path`.
    ///
    /// The report is written on success and when parts fail permanently; a
    /// cancelled job writes nothing. The output path is only ever replaced
    /// by a complete encode.
    pub async fn render(
        &self,
        job: RenderJob,
        cancel: &CancelToken,
        progress: Option<ProgressCallback>,
    ) -> ReelcutResult<RenderReport> {
        let clock = RenderClock::start();
        let output = job.config.output_path.clone();
        tracing::info!(
            output = %output.display(),
            source = %job.media.path.display(),
            renderer = self.renderer.name(),
            encoder = self.encoder.name(),
            started_at = clock.epoch_wall(),
            "Starting render"
        );

        let prepared = prepare(&job, &self.config)?;
        for adjustment in prepared.adjustments() {
            tracing::warn!(%adjustment, "Timing adjusted");
        }

        if !self.renderer.is_available() {
            return Err(ReelcutError::unsupported(format!(
                "Render backend {} is not available (expected ffmpeg in PATH)",
                self.renderer.name()
            )));
        }

        let total_parts = prepared.total_parts();
        if let Some(cb) = &progress {
            cb(RenderProgress::stage(RenderStage::Preparing, total_parts));
        }

        let scratch = self.scratch_dir(&output)?;
        tracing::debug!(scratch = %scratch.path().display(), "Created scratch directory");

        let media = Arc::new(job.media);
        let segments = prepared.segment_tasks(&media, scratch.path());
        let transitions = prepared.transition_tasks(scratch.path());

        let scheduler = RenderScheduler::new(
            Arc::clone(&self.renderer),
            SchedulerConfig::from(&self.config.workers),
        );
        let mut concat = ConcatList::new(&prepared.compiled);
        let mut report = RenderReport::new(&prepared);

        let mut outcome = ScheduleOutcome::default();
        let scheduled = scheduler
            .run_tracked(
                segments,
                transitions,
                &mut concat,
                cancel,
                progress.as_ref(),
                &mut outcome,
            )
            .await;
        report.segments_rendered = outcome.segments_rendered;
        report.transitions_rendered = outcome.transitions_rendered;

        match scheduled {
            Ok(()) => {}
            Err(ReelcutError::RenderAborted { failures }) => {
                report.errors = failures.clone();
                self.write_report(&report, &output);
                if let Some(cb) = &progress {
                    cb(RenderProgress::stage(RenderStage::Failed, total_parts));
                }
                tracing::error!(failed = failures.len(), "Render aborted");
                return Err(ReelcutError::RenderAborted { failures });
            }
            Err(err) => {
                if let Some(cb) = &progress {
                    cb(RenderProgress::stage(RenderStage::Failed, total_parts));
                }
                return Err(err);
            }
        }

        if cancel.is_cancelled() {
            return Err(ReelcutError::Cancelled);
        }

        let list_path = concat_list_path(scratch.path());
        concat.write(&list_path)?;
        let encode_job = EncodeJob::new(
            list_path,
            total_parts,
            prepared.compiled.final_duration,
            &prepared.audio,
            prepared.settings.clone(),
        );

        if let Some(cb) = &progress {
            cb(RenderProgress {
                stage: RenderStage::Encoding,
                ..RenderProgress::rendering(total_parts, total_parts, clock.elapsed_secs())
            });
        }

        let encoded = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReelcutError::Cancelled),
            result = encode_atomically(self.encoder.as_ref(), &encode_job, &output, progress.as_ref()) => result,
        };
        let path = match encoded {
            Ok(path) => path,
            Err(err) => {
                if let Some(cb) = &progress {
                    cb(RenderProgress::stage(RenderStage::Failed, total_parts));
                }
                tracing::error!(error = %err, "Final encode failed");
                return Err(err);
            }
        };

        self.write_report(&report, &path);
        if let Some(cb) = &progress {
            cb(RenderProgress::stage(RenderStage::Complete, total_parts));
        }
        tracing::info!(
            output = %path.display(),
            final_duration = report.final_duration,
            segments = report.segments_rendered,
            transitions = report.transitions_rendered,
            adjustments = report.adjustments_logged.len(),
            elapsed_secs = clock.elapsed_secs(),
            "Render finished"
        );
        Ok(report)
    }

    fn scratch_dir(&self, output: &Path) -> ReelcutResult<tempfile::TempDir> {
        let root = match (&self.config.work_dir, output.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&root)?;
        Ok(tempfile::Builder::new()
            .prefix(".reelcut-work-")
            .tempdir_in(&root)?)
    }

    fn write_report(&self, report: &RenderReport, output: &Path) {
        let path = report_path(output);
        match report.write(&path) {
            Ok(()) => tracing::info!(report = %path.display(), "Wrote render report"),
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "Failed to write render report")
            }
        }
    }
}
