//! Final encode: concat list, encoder seam and atomic output placement.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reelcut_common::config::{AudioDefaults, RenderDefaults};
use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_plan_model::{RenderConfig, SourceMedia, VideoCodec};
use reelcut_processing_core::CompiledTimeline;
use tempfile::TempPath;

use crate::audio::{AudioMixPlan, BackgroundBed};
use crate::compositor::FrameGeometry;
use crate::filters::{escape_concat_path, CuePlacement};
use crate::progress::ProgressCallback;
use crate::renderer::{PartKey, RenderedPart};
use crate::scheduler::PartSink;

/// Resolved encoding parameters for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodec,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub preset: String,
    pub crf: u32,
    pub sample_rate: u32,
}

impl EncodeSettings {
    /// Job options override engine defaults.
    pub fn resolve(config: &RenderConfig, render: &RenderDefaults, audio: &AudioDefaults) -> Self {
        Self {
            width: config.resolution.width,
            height: config.resolution.height,
            fps: config.fps.unwrap_or(render.fps).max(1),
            codec: config.codec,
            video_bitrate_kbps: config.bitrate_kbps.unwrap_or(render.video_bitrate_kbps),
            audio_bitrate_kbps: render.audio_bitrate_kbps,
            preset: render.preset.clone(),
            crf: render.crf,
            sample_rate: audio.sample_rate,
        }
    }

    pub fn geometry(&self, media: &SourceMedia) -> FrameGeometry {
        FrameGeometry {
            source_width: media.width,
            source_height: media.height,
            output_width: self.width,
            output_height: self.height,
        }
    }

    /// ffmpeg muxer name for the output container.
    pub fn muxer(&self) -> &'static str {
        self.codec.extension()
    }

    /// Codec arguments for the final encode.
    pub fn codec_args(&self) -> Vec<String> {
        let video_bitrate = format!("{}k", self.video_bitrate_kbps.max(500));
        let audio_bitrate = format!("{}k", self.audio_bitrate_kbps.max(64));

        let mut args = vec!["-c:v".to_string(), self.codec.encoder().to_string()];
        match self.codec {
            VideoCodec::H264 | VideoCodec::H265 => {
                args.extend(["-preset".to_string(), self.preset.clone()]);
                if self.codec == VideoCodec::H264 {
                    args.extend(["-profile:v".to_string(), "high".to_string()]);
                }
            }
            VideoCodec::Vp9 => {
                args.extend(["-row-mt".to_string(), "1".to_string()]);
            }
        }
        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-b:v".to_string(),
            video_bitrate,
            "-c:a".to_string(),
            self.codec.audio_encoder().to_string(),
            "-b:a".to_string(),
            audio_bitrate,
            "-ar".to_string(),
            self.sample_rate.to_string(),
        ]);
        if self.codec.extension() == "mp4" {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        args
    }
}

/// One line group of the concat demuxer list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatEntry {
    pub key: PartKey,
    pub path: PathBuf,
    pub inpoint: f64,
    pub outpoint: f64,
}

impl ConcatEntry {
    pub fn duration(&self) -> f64 {
        self.outpoint - self.inpoint
    }
}

/// Ordered list of parts for the final mux.
///
/// Segments adjoining a crossfade are trimmed by the overlap so the
/// transition part replaces both tails.
#[derive(Debug, Clone)]
pub struct ConcatList {
    /// Per segment: seconds trimmed from the head and from the tail.
    trims: Vec<(f64, f64)>,
    entries: Vec<ConcatEntry>,
}

impl ConcatList {
    pub fn new(compiled: &CompiledTimeline) -> Self {
        let trims = compiled
            .segments
            .iter()
            .map(|seg| {
                let head = compiled
                    .transition_before(seg.index)
                    .map(|t| t.duration)
                    .unwrap_or(0.0);
                let tail = compiled
                    .transition_after(seg.index)
                    .map(|t| t.duration)
                    .unwrap_or(0.0);
                (head, tail)
            })
            .collect();
        Self {
            trims,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[ConcatEntry] {
        &self.entries
    }

    /// Playback length of the concatenation.
    pub fn duration(&self) -> f64 {
        self.entries.iter().map(ConcatEntry::duration).sum()
    }

    pub fn to_ffconcat(&self) -> String {
        self.to_ffconcat_in(None)
    }

    /// Parts under `base` are written relative to it; the concat demuxer
    /// resolves them against the list's own directory.
    pub fn to_ffconcat_in(&self, base: Option<&Path>) -> String {
        let mut out = String::from("ffconcat version 1.0\n");
        for entry in &self.entries {
            let path = base
                .and_then(|dir| entry.path.strip_prefix(dir).ok())
                .unwrap_or(&entry.path);
            out.push_str(&format!(
                "file '{}'\ninpoint {:.6}\noutpoint {:.6}\n",
                escape_concat_path(path),
                entry.inpoint,
                entry.outpoint
            ));
        }
        out
    }

    pub fn write(&self, path: &Path) -> ReelcutResult<()> {
        std::fs::write(path, self.to_ffconcat_in(path.parent()))?;
        Ok(())
    }
}

impl PartSink for ConcatList {
    fn accept(&mut self, part: RenderedPart) -> ReelcutResult<()> {
        if let Some(last) = self.entries.last() {
            if part.key.ordinal() <= last.key.ordinal() {
                return Err(ReelcutError::encode(format!(
                    "{} arrived after {}",
                    part.key, last.key
                )));
            }
        }

        let (inpoint, outpoint) = match part.key {
            PartKey::Segment(i) => {
                let (head, tail) = self.trims.get(i).copied().ok_or_else(|| {
                    ReelcutError::encode(format!("{} is not in the compiled timeline", part.key))
                })?;
                (head, (part.duration - tail).max(head))
            }
            PartKey::Transition(_) => (0.0, part.duration),
        };

        tracing::debug!(part = %part.key, inpoint, outpoint, "Part queued for concat");
        self.entries.push(ConcatEntry {
            key: part.key,
            path: part.path,
            inpoint,
            outpoint,
        });
        Ok(())
    }
}

/// Inputs for the final encode.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// ffconcat list of rendered parts.
    pub concat_list: PathBuf,
    pub total_parts: usize,
    pub final_duration: f64,
    pub narration: Option<(PathBuf, Vec<CuePlacement>)>,
    pub background: Option<BackgroundBed>,
    pub settings: EncodeSettings,
}

impl EncodeJob {
    pub fn new(
        concat_list: PathBuf,
        total_parts: usize,
        final_duration: f64,
        audio: &AudioMixPlan,
        settings: EncodeSettings,
    ) -> Self {
        let narration = audio.narration.as_ref().map(|mix| {
            let cues = mix
                .cues
                .iter()
                .map(|c| CuePlacement {
                    audio_start: c.audio_start,
                    duration: c.duration,
                    output_start: c.output_start,
                })
                .collect();
            (mix.audio_path.clone(), cues)
        });
        Self {
            concat_list,
            total_parts,
            final_duration,
            narration,
            background: audio.background.clone(),
            settings,
        }
    }
}

/// Backend for the final mux and encode.
#[async_trait]
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    /// Encode `job` into `dest`. `dest` is a scratch path; callers move it
    /// into place only on success.
    async fn encode(
        &self,
        job: &EncodeJob,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> ReelcutResult<()>;
}

/// A temporary file beside the destination, renamed over it on commit.
///
/// Dropping it without committing removes the temporary file, so a failed
/// encode never leaves anything at the destination.
#[derive(Debug)]
pub struct AtomicOutput {
    dest: PathBuf,
    temp: TempPath,
}

impl AtomicOutput {
    pub fn create(dest: &Path) -> ReelcutResult<Self> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let suffix = dest
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(".reelcut-")
            .suffix(&suffix)
            .tempfile_in(&parent)?
            .into_temp_path();
        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
        })
    }

    /// Where the encoder should write.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn commit(self) -> ReelcutResult<PathBuf> {
        let dest = self.dest;
        self.temp.persist(&dest).map_err(|e| {
            ReelcutError::encode(format!("Failed to move output into {}: {}", dest.display(), e.error))
        })?;
        Ok(dest)
    }
}

/// Run `encoder` into a temporary file and move it to `dest` on success.
pub async fn encode_atomically(
    encoder: &dyn Encoder,
    job: &EncodeJob,
    dest: &Path,
    progress: Option<&ProgressCallback>,
) -> ReelcutResult<PathBuf> {
    let output = AtomicOutput::create(dest)?;
    tracing::info!(
        encoder = encoder.name(),
        temp = %output.path().display(),
        "Encoding final output"
    );
    encoder.encode(job, output.path(), progress).await?;
    output.commit()
}
