//! Run Manager for the dubbing API
//!
//! Accepts dubbing requests and executes them one at a time, in the order they
//! were submitted, on a single background worker. A video dub saturates the
//! machine (ffmpeg, whisper, TTS), so runs never overlap.
//!
//! The manager keeps a registry of run records that the HTTP layer reads for
//! status queries. Records are fed by a `RunObserver` attached to each run and
//! swept once they have been terminal for longer than the retention period.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::pipeline::run::is_plain_code;
use crate::pipeline::{
    CancellationToken, DubbingRequest, ErrorKind, PipelineOrchestrator, PipelineRun,
    ProgressSample, RunObserver, RunState, RunSummary,
};

/// Run manager error types
#[derive(Error, Debug)]
pub enum QueueError {
    /// No run with this id is known
    #[error("Run not found: {0}")]
    RunNotFound(String),
    /// The request cannot be turned into a run
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The run already reached a terminal state
    #[error("Cannot cancel run: {0}")]
    CannotCancel(String),
    /// The run has not finished yet
    #[error("Run not finished: {0}")]
    NotReady(String),
    /// The worker is gone
    #[error("Queue error: {0}")]
    QueueClosed(String),
}

/// Returned to the submitter of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunHandle {
    pub run_id: String,
    /// 1-based position among waiting runs, `None` if already started
    pub queue_position: Option<usize>,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub state: RunState,
    pub video_path: PathBuf,
    pub target_language: String,
    pub progress: Option<ProgressSample>,
    pub queue_position: Option<usize>,
    pub video_duration_seconds: Option<f64>,
    /// Model being downloaded before transcription can start
    pub model_loading: Option<String>,
    pub source_language: Option<String>,
    pub transcript: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
    pub summary: Option<RunSummary>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    fn queued(run: &PipelineRun) -> Self {
        Self {
            run_id: run.id.clone(),
            state: RunState::Created,
            video_path: run.video_path.clone(),
            target_language: run.target_language.clone(),
            progress: None,
            queue_position: None,
            video_duration_seconds: None,
            model_loading: None,
            source_language: None,
            transcript: None,
            error_kind: None,
            error: None,
            output_path: None,
            summary: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Terminal with its outcome recorded
    ///
    /// A terminal state always arrives together with its payload and
    /// `finished_at`, so this is the only check readers rely on.
    fn is_finished(&self) -> bool {
        self.state.is_terminal() && self.finished_at.is_some()
    }

    fn finish(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

struct RunRecord {
    snapshot: RunSnapshot,
    token: CancellationToken,
}

/// Internal state of the run manager
#[derive(Default)]
struct ManagerState {
    /// Ids of runs waiting for the worker, oldest first
    queue: VecDeque<String>,
    records: HashMap<String, RunRecord>,
    /// Id of the run the worker is executing
    processing: Option<String>,
}

impl ManagerState {
    fn position(&self, run_id: &str) -> Option<usize> {
        self.queue.iter().position(|id| id == run_id).map(|p| p + 1)
    }

    fn snapshot(&self, run_id: &str) -> Option<RunSnapshot> {
        self.records.get(run_id).map(|record| {
            let mut snapshot = record.snapshot.clone();
            snapshot.queue_position = self.position(run_id);
            snapshot
        })
    }
}

type SharedState = Arc<Mutex<ManagerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ManagerState> {
    // A panic while holding the lock leaves the records usable
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Retention settings for finished run records
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub sweep_interval: Duration,
}

/// Feeds one run's notifications into the registry
struct RegistryObserver {
    state: SharedState,
}

impl RegistryObserver {
    fn update(&self, run_id: &str, apply: impl FnOnce(&mut RunSnapshot)) {
        let mut state = lock(&self.state);
        match state.records.get_mut(run_id) {
            Some(record) => apply(&mut record.snapshot),
            None => debug!("Notification for discarded run {}", run_id),
        }
    }
}

impl RunObserver for RegistryObserver {
    fn on_state_changed(&self, run_id: &str, new_state: RunState) {
        // Terminal states are recorded with their outcome below
        if !new_state.is_terminal() {
            self.update(run_id, |s| s.state = new_state);
        }
    }

    fn on_progress(&self, run_id: &str, sample: &ProgressSample) {
        self.update(run_id, |s| s.progress = Some(sample.clone()));
    }

    fn on_video_duration(&self, run_id: &str, seconds: f64) {
        self.update(run_id, |s| s.video_duration_seconds = Some(seconds));
    }

    fn on_model_loading(&self, run_id: &str, model: &str) {
        self.update(run_id, |s| s.model_loading = Some(model.to_string()));
    }

    fn on_transcript(&self, run_id: &str, transcript: &str) {
        self.update(run_id, |s| {
            s.model_loading = None;
            s.transcript = Some(transcript.to_string());
        });
    }

    fn on_language_detected(&self, run_id: &str, language: &str) {
        self.update(run_id, |s| s.source_language = Some(language.to_string()));
    }

    fn on_stage_error(&self, run_id: &str, kind: ErrorKind, message: &str) {
        self.update(run_id, |s| {
            s.error_kind = Some(kind);
            s.error = Some(message.to_string());
            s.finish(RunState::Failed);
        });
    }

    fn on_succeeded(&self, run_id: &str, output: &Path, summary: &RunSummary) {
        self.update(run_id, |s| {
            s.output_path = Some(output.to_path_buf());
            s.summary = Some(summary.clone());
            s.finish(RunState::Succeeded);
        });
    }

    fn on_cancelled(&self, run_id: &str) {
        self.update(run_id, |s| s.finish(RunState::Cancelled));
    }

    fn on_finished(&self, run_id: &str) {
        debug!("Run {} released by the worker", run_id);
    }
}

/// Run Manager for dubbing runs
pub struct RunManager {
    state: SharedState,
    /// Single channel into the single worker, which keeps runs sequential
    run_tx: mpsc::UnboundedSender<PipelineRun>,
    metrics: Metrics,
}

impl RunManager {
    /// Create a run manager and start its worker and cleanup tasks
    pub fn new(
        orchestrator: PipelineOrchestrator,
        retention: RetentionPolicy,
        metrics: Metrics,
    ) -> Arc<Self> {
        let (run_tx, run_rx) = mpsc::unbounded_channel();
        let state: SharedState = Arc::new(Mutex::new(ManagerState::default()));

        Self::start_worker(run_rx, state.clone(), orchestrator, metrics.clone());
        Self::start_cleanup_task(state.clone(), retention);

        Arc::new(Self {
            state,
            run_tx,
            metrics,
        })
    }

    fn start_worker(
        mut run_rx: mpsc::UnboundedReceiver<PipelineRun>,
        state: SharedState,
        orchestrator: PipelineOrchestrator,
        metrics: Metrics,
    ) {
        tokio::spawn(async move {
            info!("Run worker started");

            while let Some(run) = run_rx.recv().await {
                let run_id = run.id.clone();

                let queue_size = {
                    let mut guard = lock(&state);
                    let Some(index) = guard.queue.iter().position(|id| *id == run_id) else {
                        // Cancelled while waiting
                        debug!("Skipping run {}, no longer queued", run_id);
                        continue;
                    };
                    guard.queue.remove(index);
                    guard.processing = Some(run_id.clone());
                    guard.queue.len()
                };
                metrics.set_queue_size(queue_size).await;
                metrics.set_runs_processing(1).await;

                info!("Processing run: {}", run_id);
                let observer = Arc::new(RegistryObserver {
                    state: state.clone(),
                });
                let report = orchestrator.run(run, observer).await;
                info!(
                    "Run {} finished: {}",
                    report.run.id,
                    report.outcome.as_str()
                );

                lock(&state).processing = None;
                metrics.set_runs_processing(0).await;
            }

            warn!("Run worker stopped, channel closed");
        });
    }

    /// Periodically drop finished runs older than the retention period
    fn start_cleanup_task(state: SharedState, retention: RetentionPolicy) {
        info!(
            "Starting cleanup task: retention {}s, interval {}s",
            retention.max_age.as_secs(),
            retention.sweep_interval.as_secs()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(retention.sweep_interval);
            loop {
                interval.tick().await;
                let count = sweep_expired(&state, retention.max_age, Utc::now());
                if count > 0 {
                    info!("Discarded {} expired run record(s)", count);
                } else {
                    debug!("No expired run records");
                }
            }
        });
    }

    /// Queue a run for `request`
    pub async fn submit(&self, request: DubbingRequest) -> Result<RunHandle, QueueError> {
        validate_request(&request)?;

        let run_id = Uuid::new_v4().to_string();
        let run = PipelineRun::new(run_id.clone(), request);
        let record = RunRecord {
            snapshot: RunSnapshot::queued(&run),
            token: run.cancellation_token(),
        };
        let target_language = run.target_language.clone();
        let model = run.transcription_model.clone();

        let (position, queue_size) = {
            let mut guard = lock(&self.state);
            guard.records.insert(run_id.clone(), record);
            guard.queue.push_back(run_id.clone());
            (guard.position(&run_id), guard.queue.len())
        };

        if let Err(e) = self.run_tx.send(run) {
            error!("Failed to hand run {} to the worker: {}", run_id, e);
            let mut guard = lock(&self.state);
            guard.queue.retain(|id| *id != run_id);
            guard.records.remove(&run_id);
            return Err(QueueError::QueueClosed(
                "run worker is not running".to_string(),
            ));
        }

        self.metrics
            .record_run_submitted(&target_language, &model)
            .await;
        self.metrics.set_queue_size(queue_size).await;

        info!("Run {} added to queue at position {:?}", run_id, position);
        Ok(RunHandle {
            run_id,
            queue_position: position,
        })
    }

    /// Current view of a run
    pub fn status(&self, run_id: &str) -> Result<RunSnapshot, QueueError> {
        lock(&self.state)
            .snapshot(run_id)
            .ok_or_else(|| QueueError::RunNotFound(run_id.to_string()))
    }

    /// Request cancellation of a run
    ///
    /// A waiting run is cancelled on the spot and never touches the disk. A
    /// running run is signalled and reaches `Cancelled` once the worker has
    /// stopped its current step and cleaned up.
    pub async fn cancel(&self, run_id: &str) -> Result<RunSnapshot, QueueError> {
        let (snapshot, queue_size) = {
            let mut guard = lock(&self.state);
            let queued = guard.position(run_id).is_some();
            let record = guard
                .records
                .get_mut(run_id)
                .ok_or_else(|| QueueError::RunNotFound(run_id.to_string()))?;

            if record.snapshot.is_finished() {
                return Err(QueueError::CannotCancel(format!(
                    "run {} already {}",
                    run_id, record.snapshot.state
                )));
            }

            record.token.cancel();
            if queued {
                record.snapshot.finish(RunState::Cancelled);
                guard.queue.retain(|id| id != run_id);
            }
            let queue_size = guard.queue.len();
            (guard.snapshot(run_id), queue_size)
        };

        self.metrics.set_queue_size(queue_size).await;
        info!("Cancellation requested for run {}", run_id);
        snapshot.ok_or_else(|| QueueError::RunNotFound(run_id.to_string()))
    }

    /// Hand out the final record of a finished run and forget it
    pub fn take_result(&self, run_id: &str) -> Result<RunSnapshot, QueueError> {
        let mut guard = lock(&self.state);
        match guard.records.get(run_id) {
            None => Err(QueueError::RunNotFound(run_id.to_string())),
            Some(record) if !record.snapshot.is_finished() => Err(QueueError::NotReady(format!(
                "run {} is {}",
                run_id, record.snapshot.state
            ))),
            Some(_) => guard
                .records
                .remove(run_id)
                .map(|record| record.snapshot)
                .ok_or_else(|| QueueError::RunNotFound(run_id.to_string())),
        }
    }

    /// Number of runs waiting and whether one is executing
    pub fn load(&self) -> (usize, bool) {
        let guard = lock(&self.state);
        (guard.queue.len(), guard.processing.is_some())
    }
}

fn validate_request(request: &DubbingRequest) -> Result<(), QueueError> {
    if !request.video_path.is_file() {
        return Err(QueueError::InvalidRequest(format!(
            "video not found: {}",
            request.video_path.display()
        )));
    }
    let codes = [
        ("target_language", Some(request.target_language.as_str())),
        ("transcription_model", Some(request.transcription_model.as_str())),
        ("voice", request.voice_id.as_deref()),
    ];
    for (field, value) in codes {
        match value {
            Some(value) if !is_plain_code(value) => {
                return Err(QueueError::InvalidRequest(format!(
                    "{} must be a plain code (letters, digits, '-', '_' or '.'), got {:?}",
                    field, value
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Remove terminal records that finished more than `max_age` before `now`
fn sweep_expired(state: &SharedState, max_age: Duration, now: DateTime<Utc>) -> usize {
    let mut guard = lock(state);
    let before = guard.records.len();
    guard.records.retain(|run_id, record| {
        let expired = match record.snapshot.finished_at {
            Some(finished) if record.snapshot.is_finished() => (now - finished)
                .to_std()
                .map(|age| age > max_age)
                .unwrap_or(false),
            _ => false,
        };
        if expired {
            debug!("Discarding expired run {}", run_id);
        }
        !expired
    });
    before - guard.records.len()
}
