//! Segment scheduler: bounded parallel rendering with ordered delivery.
//!
//! Segments render concurrently on a worker pool of fixed size. Each part
//! gets a per-attempt timeout and a bounded number of retries. Finished
//! parts may complete in any order; the [`OrderedBuffer`] holds them until
//! every earlier part is done, so the [`PartSink`] always sees output order.
//! A crossfade is scheduled as soon as both of its neighbors exist.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reelcut_common::clock::RenderClock;
use reelcut_common::config::WorkerConfig;
use reelcut_common::error::{PartFailure, ReelcutError, ReelcutResult};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::progress::{ProgressCallback, RenderProgress};
use crate::renderer::{PartKey, RenderedPart, SegmentRenderer, SegmentTask, TransitionTask};

/// Receives rendered parts strictly in output order.
pub trait PartSink: Send {
    fn accept(&mut self, part: RenderedPart) -> ReelcutResult<()>;
}

impl PartSink for Vec<RenderedPart> {
    fn accept(&mut self, part: RenderedPart) -> ReelcutResult<()> {
        self.push(part);
        Ok(())
    }
}

/// Cooperative cancellation shared between the caller and the scheduler.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Worker pool and retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub workers: usize,
    /// First try plus retries.
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl From<&WorkerConfig> for SchedulerConfig {
    fn from(cfg: &WorkerConfig) -> Self {
        Self {
            workers: cfg.effective_workers(),
            max_attempts: cfg.max_attempts(),
            attempt_timeout: cfg.segment_timeout(),
            retry_delay: cfg.retry_delay(),
        }
    }
}

/// Reorders completed parts into output order.
#[derive(Debug)]
pub struct OrderedBuffer {
    expected: Vec<PartKey>,
    next: usize,
    pending: BTreeMap<usize, RenderedPart>,
}

impl OrderedBuffer {
    pub fn new(mut expected: Vec<PartKey>) -> Self {
        expected.sort_by_key(|k| k.ordinal());
        Self {
            expected,
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Store `part` and return every part that is now releasable, in order.
    pub fn push(&mut self, part: RenderedPart) -> Vec<RenderedPart> {
        self.pending.insert(part.key.ordinal(), part);
        let mut ready = Vec::new();
        while let Some(key) = self.expected.get(self.next) {
            match self.pending.remove(&key.ordinal()) {
                Some(part) => {
                    ready.push(part);
                    self.next += 1;
                }
                None => break,
            }
        }
        ready
    }

    pub fn released(&self) -> usize {
        self.next
    }

    pub fn is_complete(&self) -> bool {
        self.next == self.expected.len()
    }
}

/// Parts a schedule rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub segments_rendered: usize,
    pub transitions_rendered: usize,
}

#[derive(Debug)]
enum PartOutcome {
    Done(RenderedPart),
    Failed(PartFailure),
    /// Not attempted because the schedule was already failing.
    Skipped,
}

/// Runs part renders on a bounded pool.
pub struct RenderScheduler {
    renderer: Arc<dyn SegmentRenderer>,
    config: SchedulerConfig,
}

impl RenderScheduler {
    pub fn new(renderer: Arc<dyn SegmentRenderer>, config: SchedulerConfig) -> Self {
        Self { renderer, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Render every segment and crossfade, feeding `sink` in output order.
    ///
    /// The first part to exhaust its retries stops new work from starting;
    /// parts already running finish and their failures are collected too.
    pub async fn run(
        &self,
        segments: Vec<SegmentTask>,
        transitions: Vec<TransitionTask>,
        sink: &mut dyn PartSink,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
    ) -> ReelcutResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::default();
        self.run_tracked(segments, transitions, sink, cancel, progress, &mut outcome)
            .await?;
        Ok(outcome)
    }

    /// Like [`RenderScheduler::run`], but `outcome` counts every part that
    /// rendered even when the schedule fails, including parts finished out
    /// of order that never reached the sink.
    pub async fn run_tracked(
        &self,
        segments: Vec<SegmentTask>,
        transitions: Vec<TransitionTask>,
        sink: &mut dyn PartSink,
        cancel: &CancelToken,
        progress: Option<&ProgressCallback>,
        outcome: &mut ScheduleOutcome,
    ) -> ReelcutResult<()> {
        let total = segments.len() + transitions.len();
        let expected: Vec<PartKey> = segments
            .iter()
            .map(SegmentTask::key)
            .chain(transitions.iter().map(TransitionTask::key))
            .collect();
        let mut buffer = OrderedBuffer::new(expected);

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let abort = CancelToken::new();
        let mut set: JoinSet<(PartKey, PartOutcome)> = JoinSet::new();
        let clock = RenderClock::start();

        tracing::info!(
            segments = segments.len(),
            transitions = transitions.len(),
            workers = self.config.workers,
            max_attempts = self.config.max_attempts,
            "Scheduling render parts"
        );

        for task in segments {
            self.spawn_segment(&mut set, task, &semaphore, &abort);
        }

        let mut waiting: Vec<TransitionTask> = transitions;
        let mut finished_segments: HashMap<usize, RenderedPart> = HashMap::new();
        let mut failures: Vec<PartFailure> = Vec::new();
        let mut done = 0usize;

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(done, total, "Render cancelled; stopping workers");
                    abort.cancel();
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(ReelcutError::Cancelled);
                }
                joined = set.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            let (key, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::error!(error = %err, "Render worker panicked");
                    failures.push(PartFailure {
                        part: "worker".to_string(),
                        attempts: 0,
                        last_error: err.to_string(),
                    });
                    abort.cancel();
                    continue;
                }
            };

            let part = match result {
                PartOutcome::Done(part) => part,
                PartOutcome::Failed(failure) => {
                    tracing::error!(part = %key, attempts = failure.attempts, error = %failure.last_error, "Part failed permanently");
                    failures.push(failure);
                    abort.cancel();
                    continue;
                }
                PartOutcome::Skipped => continue,
            };

            done += 1;
            match key {
                PartKey::Segment(i) => {
                    outcome.segments_rendered += 1;
                    finished_segments.insert(i, part.clone());
                }
                PartKey::Transition(_) => outcome.transitions_rendered += 1,
            }
            if let Some(cb) = progress {
                cb(RenderProgress::rendering(done, total, clock.elapsed_secs()));
            }

            if !abort.is_cancelled() {
                let (ready, still_waiting): (Vec<_>, Vec<_>) = waiting.into_iter().partition(|t| {
                    let b = t.transition.boundary;
                    finished_segments.contains_key(&b) && finished_segments.contains_key(&(b + 1))
                });
                waiting = still_waiting;
                for task in ready {
                    let b = task.transition.boundary;
                    if let (Some(left), Some(right)) =
                        (finished_segments.get(&b), finished_segments.get(&(b + 1)))
                    {
                        self.spawn_transition(&mut set, task, left.clone(), right.clone(), &semaphore, &abort);
                    }
                }
            }

            for released in buffer.push(part) {
                if let Err(err) = sink.accept(released) {
                    abort.cancel();
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(err);
                }
            }
        }

        if !failures.is_empty() {
            return Err(ReelcutError::RenderAborted { failures });
        }
        if !buffer.is_complete() {
            return Err(ReelcutError::encode(format!(
                "only {} of {} parts were delivered",
                buffer.released(),
                total
            )));
        }

        tracing::info!(
            segments = outcome.segments_rendered,
            transitions = outcome.transitions_rendered,
            elapsed_ms = clock.elapsed_ms() as u64,
            "All parts rendered"
        );
        Ok(())
    }

    fn spawn_segment(
        &self,
        set: &mut JoinSet<(PartKey, PartOutcome)>,
        task: SegmentTask,
        semaphore: &Arc<Semaphore>,
        abort: &CancelToken,
    ) {
        let key = task.key();
        let renderer = Arc::clone(&self.renderer);
        let task = Arc::new(task);
        let attempt = move || {
            let renderer = Arc::clone(&renderer);
            let task = Arc::clone(&task);
            async move { renderer.render_segment(&task).await }
        };
        set.spawn(run_with_retry(
            key,
            self.config,
            Arc::clone(semaphore),
            abort.clone(),
            attempt,
        ));
    }

    fn spawn_transition(
        &self,
        set: &mut JoinSet<(PartKey, PartOutcome)>,
        task: TransitionTask,
        left: RenderedPart,
        right: RenderedPart,
        semaphore: &Arc<Semaphore>,
        abort: &CancelToken,
    ) {
        let key = task.key();
        let renderer = Arc::clone(&self.renderer);
        let inputs = Arc::new((task, left, right));
        let attempt = move || {
            let renderer = Arc::clone(&renderer);
            let inputs = Arc::clone(&inputs);
            async move {
                let (task, left, right) = &*inputs;
                renderer.render_transition(task, left, right).await
            }
        };
        set.spawn(run_with_retry(
            key,
            self.config,
            Arc::clone(semaphore),
            abort.clone(),
            attempt,
        ));
    }
}

async fn run_with_retry<F, Fut>(
    key: PartKey,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    abort: CancelToken,
    attempt: F,
) -> (PartKey, PartOutcome)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ReelcutResult<RenderedPart>>,
{
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return (key, PartOutcome::Skipped);
    };

    let max_attempts = config.max_attempts.max(1);
    let mut last_error = String::new();
    for n in 1..=max_attempts {
        if abort.is_cancelled() {
            if n == 1 {
                return (key, PartOutcome::Skipped);
            }
            return (key, failed(&abort, key, n - 1, last_error));
        }

        let started = RenderClock::start();
        match tokio::time::timeout(config.attempt_timeout, attempt()).await {
            Ok(Ok(part)) => {
                tracing::debug!(part = %key, attempt = n, elapsed_ms = started.elapsed_ms() as u64, "Part rendered");
                return (key, PartOutcome::Done(part));
            }
            Ok(Err(err)) => {
                tracing::warn!(part = %key, attempt = n, max_attempts, error = %err, "Part render failed");
                last_error = err.to_string();
                if !err.is_retryable() {
                    return (key, failed(&abort, key, n, last_error));
                }
            }
            Err(_) => {
                tracing::warn!(
                    part = %key,
                    attempt = n,
                    timeout_secs = config.attempt_timeout.as_secs_f64(),
                    "Part render timed out"
                );
                last_error = format!("timed out after {:.1}s", config.attempt_timeout.as_secs_f64());
            }
        }

        if n < max_attempts {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    (key, failed(&abort, key, max_attempts, last_error))
}

/// Record a permanent failure. The abort flag is raised before the worker
/// releases its permit so queued parts see it.
fn failed(abort: &CancelToken, key: PartKey, attempts: u32, last_error: String) -> PartOutcome {
    abort.cancel();
    PartOutcome::Failed(PartFailure {
        part: key.to_string(),
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn part(key: PartKey) -> RenderedPart {
        RenderedPart {
            key,
            path: PathBuf::from(format!("/w/{}", key.ordinal())),
            duration: 1.0,
        }
    }

    #[test]
    fn test_ordered_buffer_holds_until_gap_fills() {
        let mut buffer = OrderedBuffer::new(vec![
            PartKey::Segment(0),
            PartKey::Segment(1),
            PartKey::Transition(1),
            PartKey::Segment(2),
        ]);

        assert!(buffer.push(part(PartKey::Segment(2))).is_empty());
        assert!(buffer.push(part(PartKey::Segment(1))).is_empty());

        let released: Vec<PartKey> = buffer
            .push(part(PartKey::Segment(0)))
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(released, vec![PartKey::Segment(0), PartKey::Segment(1)]);
        assert!(!buffer.is_complete());

        let released: Vec<PartKey> = buffer
            .push(part(PartKey::Transition(1)))
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(released, vec![PartKey::Transition(1), PartKey::Segment(2)]);
        assert!(buffer.is_complete());
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());

        // Already-cancelled tokens resolve immediately.
        token.cancelled().await;
    }

    #[test]
    fn test_scheduler_config_from_worker_config() {
        let cfg = SchedulerConfig::from(&WorkerConfig {
            max_workers: 0,
            segment_timeout_secs: 10,
            max_retries: 2,
            retry_delay_ms: 50,
        });
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.attempt_timeout, Duration::from_secs(10));
        assert_eq!(cfg.retry_delay, Duration::from_millis(50));
    }
}
