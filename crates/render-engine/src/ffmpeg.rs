//! ffmpeg-backed segment renderer, encoder and source probe.

use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};

use async_trait::async_trait;
use reelcut_common::clock::RenderClock;
use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_plan_model::SourceMedia;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::encoder::{EncodeJob, EncodeSettings, Encoder};
use crate::filters::{final_audio_graph, segment_graph, transition_graph, CuePlacement};
use crate::progress::{ProgressCallback, ProgressState};
use crate::renderer::{RenderedPart, SegmentRenderer, SegmentTask, TransitionTask};

/// Renders and encodes by shelling out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress wiring for one ffmpeg run.
struct ProgressSink<'a> {
    callback: &'a ProgressCallback,
    expected_secs: f64,
    total_parts: usize,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }

    /// Use explicit binaries instead of the ones on `PATH`.
    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Run ffmpeg to completion. The error string carries ffmpeg's stderr.
    async fn run(&self, args: &[String], progress: Option<ProgressSink<'_>>) -> Result<(), String> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start {}: {e}", self.ffmpeg))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Failed to capture ffmpeg stdout".to_string())?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Failed to capture ffmpeg stderr".to_string())?;

        // Drain stderr concurrently so a full pipe never blocks ffmpeg.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let clock = RenderClock::start();
        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| format!("Failed reading ffmpeg progress: {e}"))?
        {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key == "progress" {
                if let Some(sink) = &progress {
                    (sink.callback)(state.report(
                        sink.expected_secs,
                        sink.total_parts,
                        clock.elapsed_secs(),
                    ));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| format!("Failed to wait on ffmpeg: {e}"))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(format!("ffmpeg exited with {status}: {}", stderr_output.trim()));
        }
        Ok(())
    }

    /// Read duration, frame rate, dimensions and audio presence.
    pub async fn probe_source(&self, path: &Path) -> ReelcutResult<SourceMedia> {
        if !path.exists() {
            return Err(ReelcutError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(ReelcutError::validation(format!(
                "ffprobe could not read {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        parse_probe(path, &probe)
    }
}

/// Build a [`SourceMedia`] from `ffprobe -print_format json` output.
pub fn parse_probe(path: &Path, probe: &serde_json::Value) -> ReelcutResult<SourceMedia> {
    let streams = probe["streams"].as_array().cloned().unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| {
            ReelcutError::validation(format!("{} has no video stream", path.display()))
        })?;
    let has_audio = streams.iter().any(|s| s["codec_type"] == "audio");

    let width = video["width"].as_u64().unwrap_or(0) as u32;
    let height = video["height"].as_u64().unwrap_or(0) as u32;
    let fps = video["avg_frame_rate"]
        .as_str()
        .and_then(parse_rational)
        .or_else(|| video["r_frame_rate"].as_str().and_then(parse_rational))
        .unwrap_or(0.0);
    let duration_secs = probe["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| video["duration"].as_str().and_then(|d| d.parse::<f64>().ok()))
        .unwrap_or(0.0);

    if width == 0 || height == 0 || duration_secs <= 0.0 {
        return Err(ReelcutError::validation(format!(
            "{} is not a decodable recording (width {width}, height {height}, duration {duration_secs})",
            path.display()
        )));
    }

    Ok(SourceMedia {
        path: path.to_path_buf(),
        duration_secs,
        fps,
        width,
        height,
        has_audio,
    })
}

fn parse_rational(raw: &str) -> Option<f64> {
    let value = match raw.split_once('/') {
        Some((n, d)) => {
            let d: f64 = d.parse().ok()?;
            if d == 0.0 {
                return None;
            }
            n.parse::<f64>().ok()? / d
        }
        None => raw.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Codec arguments for intermediate parts: all-intra so the concat
/// demuxer can cut on any frame, lossless-ish audio.
pub fn intermediate_codec_args(settings: &EncodeSettings) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "16".to_string(),
        "-g".to_string(),
        "1".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        settings.fps.to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        "-ar".to_string(),
        settings.sample_rate.to_string(),
        "-ac".to_string(),
        "2".to_string(),
    ]
}

fn base_args() -> Vec<String> {
    ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// ffmpeg arguments for one segment.
pub fn segment_args(task: &SegmentTask, filter_complex: &str) -> Vec<String> {
    let seg = &task.segment;
    let mut args = base_args();
    args.extend([
        "-ss".to_string(),
        format!("{:.6}", seg.source_start),
        "-t".to_string(),
        format!("{:.6}", seg.source_len()),
        "-i".to_string(),
        task.source.path.display().to_string(),
        "-filter_complex".to_string(),
        filter_complex.to_string(),
        "-map".to_string(),
        "[vout]".to_string(),
        "-map".to_string(),
        "[aout]".to_string(),
        "-t".to_string(),
        format!("{:.6}", seg.output_duration),
    ]);
    args.extend(intermediate_codec_args(&task.settings));
    args.push(task.output_path().display().to_string());
    args
}

/// ffmpeg arguments for one crossfade.
pub fn transition_args(task: &TransitionTask, left: &RenderedPart, right: &RenderedPart) -> Vec<String> {
    let overlap = task.transition.duration;
    let mut args = base_args();
    args.extend([
        "-ss".to_string(),
        format!("{:.6}", (left.duration - overlap).max(0.0)),
        "-t".to_string(),
        format!("{overlap:.6}"),
        "-i".to_string(),
        left.path.display().to_string(),
        "-t".to_string(),
        format!("{overlap:.6}"),
        "-i".to_string(),
        right.path.display().to_string(),
        "-filter_complex".to_string(),
        transition_graph(overlap),
        "-map".to_string(),
        "[vout]".to_string(),
        "-map".to_string(),
        "[aout]".to_string(),
    ]);
    args.extend(intermediate_codec_args(&task.settings));
    args.push(task.output_path().display().to_string());
    args
}

/// ffmpeg arguments for the final mux into `dest`.
pub fn encode_args(job: &EncodeJob, dest: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        job.concat_list.display().to_string(),
    ]);

    let mut next_input = 1;
    let mut narration_input = None;
    let mut cues: &[CuePlacement] = &[];
    if let Some((path, placed)) = &job.narration {
        if !placed.is_empty() {
            args.extend(["-i".to_string(), path.display().to_string()]);
            narration_input = Some(next_input);
            cues = placed;
            next_input += 1;
        }
    }
    let bed = job.background.as_ref().map(|bed| {
        args.extend([
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            bed.path.display().to_string(),
        ]);
        (next_input, bed.volume)
    });

    match final_audio_graph(
        cues,
        narration_input,
        bed,
        job.final_duration,
        job.settings.sample_rate,
    ) {
        Some(graph) => args.extend([
            "-filter_complex".to_string(),
            graph,
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
        ]),
        None => args.extend([
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "0:a".to_string(),
        ]),
    }

    args.extend(job.settings.codec_args());
    args.extend([
        "-r".to_string(),
        job.settings.fps.to_string(),
        "-t".to_string(),
        format!("{:.6}", job.final_duration),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        "-f".to_string(),
        job.settings.muxer().to_string(),
        dest.display().to_string(),
    ]);
    args
}

#[async_trait]
impl SegmentRenderer for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg) && command_exists(&self.ffprobe)
    }

    async fn render_segment(&self, task: &SegmentTask) -> ReelcutResult<RenderedPart> {
        let seg = &task.segment;
        tokio::fs::create_dir_all(&task.work_dir).await?;

        let frames = task.compositions();
        let graph = segment_graph(
            &frames,
            seg.speed_factor,
            seg.output_duration,
            &task.audio,
            &task.settings,
            &task.work_dir,
        );
        for (path, text) in &graph.caption_files {
            tokio::fs::write(path, text).await?;
        }

        let args = segment_args(task, &graph.filter_complex);
        self.run(&args, None)
            .await
            .map_err(|e| ReelcutError::segment_render(seg.index, e))?;

        Ok(RenderedPart {
            key: task.key(),
            path: task.output_path(),
            duration: seg.output_duration,
        })
    }

    async fn render_transition(
        &self,
        task: &TransitionTask,
        left: &RenderedPart,
        right: &RenderedPart,
    ) -> ReelcutResult<RenderedPart> {
        let args = transition_args(task, left, right);
        self.run(&args, None)
            .await
            .map_err(|e| ReelcutError::segment_render(task.transition.boundary, e))?;

        Ok(RenderedPart {
            key: task.key(),
            path: task.output_path(),
            duration: task.transition.duration,
        })
    }
}

#[async_trait]
impl Encoder for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> ReelcutResult<()> {
        let args = encode_args(job, dest);
        let sink = progress.map(|callback| ProgressSink {
            callback,
            expected_secs: job.final_duration,
            total_parts: job.total_parts,
        });
        self.run(&args, sink).await.map_err(ReelcutError::encode)
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    StdCommand::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Default scratch file name for the concat list.
pub fn concat_list_path(work_dir: &Path) -> PathBuf {
    work_dir.join("parts.ffconcat")
}
