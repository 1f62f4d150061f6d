#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reelcut_common::config::EngineConfig;
use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_plan_model::{EditPlan, RenderConfig, SourceMedia};
use reelcut_render_engine::{
    prepare, EncodeJob, Encoder, PartKey, PreparedJob, ProgressCallback, RenderJob, RenderedPart,
    SegmentRenderer, SegmentTask, TransitionTask,
};

/// Four segments (0-5, 8-15, 18-25, 28-40) with a crossfade between 1 and 2.
pub const PLAN: &str = r#"{"timeline": [
    {"id": "c1", "action": "cut", "start": 5.0, "end": 8.0},
    {"id": "c2", "action": "cut", "start": 15.0, "end": 18.0},
    {"id": "c3", "action": "cut", "start": 25.0, "end": 28.0},
    {"id": "x", "action": "transition", "start": 15.0, "params": {"duration": 0.5}},
    {"id": "gone", "action": "text", "start": 16.0, "end": 17.0, "params": {"text": "lost"}}
]}"#;

pub fn media() -> SourceMedia {
    SourceMedia {
        path: PathBuf::from("/recordings/source.mp4"),
        duration_secs: 40.0,
        fps: 30.0,
        width: 1280,
        height: 720,
        has_audio: true,
    }
}

pub fn job(output: &Path) -> RenderJob {
    RenderJob {
        media: media(),
        plan: EditPlan::from_json(PLAN).expect("test plan"),
        narration: None,
        config: RenderConfig::new(output),
    }
}

pub fn prepared() -> PreparedJob {
    prepare(&job(Path::new("out.mp4")), &EngineConfig::default()).expect("test plan prepares")
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Fail this many attempts, then succeed.
    Transient(u32),
    Permanent,
    NotRetryable,
    Hang,
}

/// Renderer that sleeps instead of running ffmpeg.
#[derive(Default)]
pub struct MockRenderer {
    delays: HashMap<PartKey, Duration>,
    failures: Mutex<HashMap<PartKey, Failure>>,
    attempts: Mutex<HashMap<PartKey, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    write_files: bool,
    unavailable: bool,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writing_files() -> Self {
        Self {
            write_files: true,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, key: PartKey, delay: Duration) -> Self {
        self.delays.insert(key, delay);
        self
    }

    pub fn with_failure(self, key: PartKey, failure: Failure) -> Self {
        self.failures.lock().unwrap().insert(key, failure);
        self
    }

    pub fn attempts(&self, key: PartKey) -> u32 {
        self.attempts.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn attempt(&self, key: PartKey, path: PathBuf, duration: f64) -> ReelcutResult<RenderedPart> {
        *self.attempts.lock().unwrap().entry(key).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        let failure = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&key) {
                Some(Failure::Transient(0)) | None => None,
                Some(Failure::Transient(n)) => {
                    *n -= 1;
                    Some(Failure::Transient(*n))
                }
                Some(other) => Some(*other),
            }
        };
        match failure {
            None => {}
            Some(Failure::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Some(Failure::NotRetryable) => {
                return Err(ReelcutError::config(format!("{key} misconfigured")));
            }
            Some(Failure::Transient(_)) | Some(Failure::Permanent) => {
                return Err(ReelcutError::segment_render(key.ordinal(), format!("{key} decode failed")));
            }
        }

        if self.write_files {
            tokio::fs::write(&path, key.to_string()).await?;
        }
        Ok(RenderedPart { key, path, duration })
    }
}

#[async_trait]
impl SegmentRenderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn render_segment(&self, task: &SegmentTask) -> ReelcutResult<RenderedPart> {
        self.attempt(task.key(), task.output_path(), task.segment.output_duration)
            .await
    }

    async fn render_transition(
        &self,
        task: &TransitionTask,
        left: &RenderedPart,
        right: &RenderedPart,
    ) -> ReelcutResult<RenderedPart> {
        assert_eq!(left.key, PartKey::Segment(task.transition.boundary));
        assert_eq!(right.key, PartKey::Segment(task.transition.boundary + 1));
        self.attempt(task.key(), task.output_path(), task.transition.duration)
            .await
    }
}

/// Encoder that copies the concat list into the destination.
#[derive(Default)]
pub struct MockEncoder {
    pub fail: bool,
    pub hang: bool,
    pub seen: Mutex<Option<EncodeJob>>,
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        dest: &Path,
        _progress: Option<&ProgressCallback>,
    ) -> ReelcutResult<()> {
        *self.seen.lock().unwrap() = Some(job.clone());
        let list = tokio::fs::read_to_string(&job.concat_list).await?;
        tokio::fs::write(dest, list).await?;
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            return Err(ReelcutError::encode("muxer rejected stream"));
        }
        Ok(())
    }
}
