//! ffmpeg filter graph construction.
//!
//! Turns per-frame compositions into filter expressions. Continuous values
//! (the zoom viewport) become piecewise-linear expressions over `t`;
//! discrete layers (highlight, ripple, caption) become runs of identical
//! quantized frames, each drawn with an `enable` window.

use std::path::{Path, PathBuf};

use reelcut_plan_model::Viewport;

use crate::audio::SegmentAudio;
use crate::compositor::FrameComposition;
use crate::encoder::EncodeSettings;

/// Cap on breakpoints per piecewise expression; ffmpeg parses these per frame.
pub const MAX_VIEWPORT_EXPR_POINTS: usize = 48;

/// Alpha is drawn in steps of this size.
const ALPHA_STEP: f64 = 0.1;

/// Ripple radius is drawn in steps of this many output pixels.
const RADIUS_STEP_PX: f64 = 2.0;

/// Outline thickness for highlight boxes and ripples (output pixels).
const OUTLINE_PX: u32 = 4;

/// Build a nested `if(lt(t,..))` linear interpolation over `(t, value)` points.
pub fn build_piecewise_expr(points: Vec<(f64, f64)>) -> String {
    build_piecewise_expr_over(points, "t")
}

/// Same as [`build_piecewise_expr`] with a different time variable
/// (`zoompan` exposes input time as `it`).
pub fn build_piecewise_expr_over(mut points: Vec<(f64, f64)>, var: &str) -> String {
    if points.is_empty() {
        return "0".to_string();
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-6);

    let mut sanitized: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for (t, v) in points {
        if let Some((last_t, last_v)) = sanitized.last_mut() {
            if (t - *last_t).abs() < 1e-4 {
                *last_t = t;
                *last_v = v;
                continue;
            }
        }
        sanitized.push((t, v));
    }

    let Some(&(_, last_value)) = sanitized.last() else {
        return "0".to_string();
    };
    let mut expr = format!("{last_value:.6}");
    for idx in (0..sanitized.len().saturating_sub(1)).rev() {
        let (t0, v0) = sanitized[idx];
        let (t1, v1) = sanitized[idx + 1];
        if (t1 - t0).abs() < 1e-9 {
            continue;
        }

        let interp = format!(
            "{v0:.6}+({delta:.6})*({var}-{t0:.6})/{dur:.6}",
            delta = v1 - v0,
            dur = (t1 - t0).max(1e-4)
        );
        expr = format!("if(lt({var},{t1:.6}),{interp},{tail})", tail = expr);
    }

    expr
}

/// Evenly pick at most `max_points` entries, always keeping both ends.
pub fn downsample_timed_points<T: Clone>(points: Vec<(f64, T)>, max_points: usize) -> Vec<(f64, T)> {
    if points.len() <= max_points {
        return points;
    }

    let target = max_points.max(2);
    let last_idx = points.len() - 1;
    let mut selected = Vec::with_capacity(target);
    for i in 0..target {
        let idx = ((i as f64 / (target - 1) as f64) * last_idx as f64).round() as usize;
        selected.push(points[idx].clone());
    }
    selected
}

/// Viewport breakpoints: first and last frame plus every frame where the
/// viewport changes direction or starts/stops moving.
fn sample_viewport_points(frames: &[FrameComposition]) -> Vec<(f64, Viewport)> {
    let mut points = Vec::new();
    for (i, frame) in frames.iter().enumerate() {
        let is_edge = i == 0 || i + 1 == frames.len();
        let changed = |a: &Viewport, b: &Viewport| {
            (a.x - b.x).abs() > 1e-6
                || (a.y - b.y).abs() > 1e-6
                || (a.w - b.w).abs() > 1e-6
                || (a.h - b.h).abs() > 1e-6
        };
        let moving_in = i > 0 && changed(&frames[i - 1].viewport, &frame.viewport);
        let moving_out = i + 1 < frames.len() && changed(&frame.viewport, &frames[i + 1].viewport);
        if is_edge || moving_in != moving_out || (moving_in && i % 3 == 0) {
            points.push((frame.time_secs, frame.viewport));
        }
    }
    downsample_timed_points(points, MAX_VIEWPORT_EXPR_POINTS)
}

/// A maximal run of frames sharing one drawn value, `[start, end)` in seconds.
#[derive(Debug, Clone, PartialEq)]
struct Run<K> {
    start: f64,
    end: f64,
    key: K,
}

fn collect_runs<K: PartialEq + Clone>(
    frames: &[FrameComposition],
    frame_secs: f64,
    key: impl Fn(&FrameComposition) -> Option<K>,
) -> Vec<Run<K>> {
    let mut runs: Vec<Run<K>> = Vec::new();
    let mut open: Option<Run<K>> = None;
    for frame in frames {
        let k = key(frame);
        let end = frame.time_secs + frame_secs;
        match (&mut open, k) {
            (Some(run), Some(k)) if run.key == k => run.end = end,
            (slot, k) => {
                if let Some(run) = slot.take() {
                    runs.push(run);
                }
                *slot = k.map(|key| Run {
                    start: frame.time_secs,
                    end,
                    key,
                });
            }
        }
    }
    runs.extend(open);
    runs
}

fn quantize(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

fn enable(run_start: f64, run_end: f64) -> String {
    format!("enable='gte(t,{run_start:.4})*lt(t,{run_end:.4})'")
}

/// Escape a path for use as a quoted filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace('\'', "'\\\\''")
        .replace(':', "\\:")
}

/// Escape a path for a concat demuxer `file` directive.
pub fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

/// Video and audio graph for one segment render.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGraph {
    pub filter_complex: String,
    /// Caption text files the graph references; write them before running.
    pub caption_files: Vec<(PathBuf, String)>,
}

/// Build the segment graph.
///
/// Input 0 is the source, seeked to the segment start. The graph ends in
/// `[vout]` and `[aout]`.
pub fn segment_graph(
    frames: &[FrameComposition],
    speed_factor: f64,
    output_duration: f64,
    audio: &SegmentAudio,
    settings: &EncodeSettings,
    caption_dir: &Path,
) -> SegmentGraph {
    let (w, h, fps) = (settings.width, settings.height, settings.fps);
    let frame_secs = 1.0 / fps.max(1) as f64;
    let mut chain = vec![
        format!("setpts=(PTS-STARTPTS)/{speed_factor:.6}"),
        format!("fps={fps}"),
    ];

    let zoomed = frames.iter().any(|f| f.viewport != Viewport::FULL);
    if zoomed {
        let points = sample_viewport_points(frames);
        let series = |f: fn(&Viewport) -> f64| {
            build_piecewise_expr_over(points.iter().map(|(t, vp)| (*t, f(vp))).collect(), "it")
        };
        chain.push(format!(
            "zoompan=z='{zoom}':x='iw*({x})':y='ih*({y})':d=1:s={w}x{h}:fps={fps}",
            zoom = series(|vp| 1.0 / vp.w.max(1e-6)),
            x = series(|vp| vp.x),
            y = series(|vp| vp.y),
        ));
    } else {
        chain.push(format!("scale={w}:{h}:flags=lanczos"));
    }
    chain.push("setsar=1".to_string());

    let (wf, hf) = (w as f64, h as f64);

    for run in collect_runs(frames, frame_secs, |f| {
        f.highlight.as_ref().map(|hl| {
            (
                (hl.rect.x * wf).round() as i64,
                (hl.rect.y * hf).round() as i64,
                (hl.rect.w * wf).round().max(1.0) as i64,
                (hl.rect.h * hf).round().max(1.0) as i64,
                hl.color.to_ffmpeg_hex(),
                quantize(hl.alpha, ALPHA_STEP),
            )
        })
    }) {
        let (x, y, bw, bh, color, alpha) = &run.key;
        if *alpha <= 0.0 {
            continue;
        }
        // Soft fill plus a solid outline reads as a glow.
        chain.push(format!(
            "drawbox=x={x}:y={y}:w={bw}:h={bh}:color={color}@{fill:.2}:t=fill:{en}",
            fill = alpha * 0.35,
            en = enable(run.start, run.end)
        ));
        chain.push(format!(
            "drawbox=x={x}:y={y}:w={bw}:h={bh}:color={color}@{alpha:.2}:t={OUTLINE_PX}:{en}",
            en = enable(run.start, run.end)
        ));
    }

    for run in collect_runs(frames, frame_secs, |f| {
        f.ripple.as_ref().map(|r| {
            (
                (r.center.0 * wf).round() as i64,
                (r.center.1 * hf).round() as i64,
                quantize(r.radius, RADIUS_STEP_PX).max(RADIUS_STEP_PX) as i64,
                quantize(r.alpha, ALPHA_STEP),
            )
        })
    }) {
        let (cx, cy, radius, alpha) = run.key;
        if alpha <= 0.0 {
            continue;
        }
        chain.push(format!(
            "drawbox=x={x}:y={y}:w={d}:h={d}:color=white@{alpha:.2}:t={OUTLINE_PX}:{en}",
            x = cx - radius,
            y = cy - radius,
            d = radius * 2,
            en = enable(run.start, run.end)
        ));
    }

    let mut caption_files = Vec::new();
    for run in collect_runs(frames, frame_secs, |f| {
        f.caption.as_ref().map(|c| {
            (
                c.op_id.clone(),
                c.text.clone(),
                (c.anchor.0 * wf).round() as i64,
                (c.anchor.1 * hf).round() as i64,
                c.font_px.round().max(1.0) as i64,
                c.color.to_ffmpeg_hex(),
            )
        })
    }) {
        let (op_id, text, ax, ay, font_px, color) = &run.key;
        let path = caption_dir.join(format!("caption-{}-{}.txt", op_id, caption_files.len()));
        chain.push(format!(
            "drawtext=textfile='{file}':fontsize={font_px}:fontcolor={color}:x={ax}-text_w/2:y={ay}-text_h/2:box=1:boxcolor=black@0.5:boxborderw=10:{en}",
            file = escape_filter_path(&path),
            en = enable(run.start, run.end)
        ));
        caption_files.push((path, text.clone()));
    }

    chain.push("format=yuv420p".to_string());
    let video = format!("[0:v]{}[vout]", chain.join(","));

    let audio = match audio {
        SegmentAudio::Original { tempo_chain } => {
            let mut stages = vec!["asetpts=PTS-STARTPTS".to_string()];
            stages.extend(tempo_chain.iter().map(|f| format!("atempo={f:.6}")));
            stages.push(format!(
                "aresample={},aformat=sample_fmts=s16:channel_layouts=stereo",
                settings.sample_rate
            ));
            format!("[0:a]{}[aout]", stages.join(","))
        }
        SegmentAudio::Silence => format!(
            "anullsrc=r={}:cl=stereo,atrim=duration={output_duration:.6},aformat=sample_fmts=s16[aout]",
            settings.sample_rate
        ),
    };

    SegmentGraph {
        filter_complex: format!("{video};{audio}"),
        caption_files,
    }
}

/// Crossfade graph: input 0 is the tail of the left part, input 1 the head
/// of the right part, both `overlap` seconds long.
pub fn transition_graph(overlap: f64) -> String {
    format!(
        "[0:v][1:v]xfade=transition=fade:duration={overlap:.6}:offset=0,format=yuv420p[vout];\
         [0:a][1:a]acrossfade=d={overlap:.6}[aout]"
    )
}

/// A narration slice placed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuePlacement {
    pub audio_start: f64,
    pub duration: f64,
    pub output_start: f64,
}

/// Final audio mix over the concatenated parts.
///
/// Input 0 is the concat of parts; `narration_input` and `bed_input` are the
/// input indices of the narration asset and the looped background bed.
/// Returns `None` when the part audio can be mapped through unchanged.
pub fn final_audio_graph(
    cues: &[CuePlacement],
    narration_input: Option<usize>,
    bed: Option<(usize, f64)>,
    final_duration: f64,
    sample_rate: u32,
) -> Option<String> {
    let narration_input = narration_input.filter(|_| !cues.is_empty());
    if narration_input.is_none() && bed.is_none() {
        return None;
    }

    let mut graph = vec![format!("[0:a]aresample={sample_rate}[base]")];
    let mut mix_inputs = vec!["[base]".to_string()];

    if let Some(idx) = narration_input {
        let labels: Vec<String> = (0..cues.len()).map(|i| format!("[n{i}]")).collect();
        graph.push(format!("[{idx}:a]asplit={}{}", cues.len(), labels.concat()));
        for (i, cue) in cues.iter().enumerate() {
            let delay_ms = (cue.output_start * 1000.0).round() as u64;
            graph.push(format!(
                "[n{i}]atrim=start={start:.6}:duration={dur:.6},asetpts=PTS-STARTPTS,aresample={sample_rate},aformat=channel_layouts=stereo,adelay={delay_ms}|{delay_ms}[c{i}]",
                start = cue.audio_start,
                dur = cue.duration,
            ));
            mix_inputs.push(format!("[c{i}]"));
        }
    }

    if let Some((idx, volume)) = bed {
        graph.push(format!(
            "[{idx}:a]atrim=duration={final_duration:.6},asetpts=PTS-STARTPTS,aresample={sample_rate},aformat=channel_layouts=stereo,volume={volume:.3}[bed]"
        ));
        mix_inputs.push("[bed]".to_string());
    }

    graph.push(format!(
        "{}amix=inputs={}:duration=first:dropout_transition=0:normalize=0[aout]",
        mix_inputs.concat(),
        mix_inputs.len()
    ));
    Some(graph.join(";"))
}
