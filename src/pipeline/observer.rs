//! Run notifications
//!
//! The orchestrator reports everything it learns through a `RunObserver`.
//! Every method has a no-op default so observers only implement what they
//! need. `on_finished` is always the last call and happens exactly once.

use serde::Serialize;
use std::path::Path;

use crate::pipeline::error::ErrorKind;
use crate::pipeline::progress::ProgressSample;
use crate::pipeline::run::RunState;

/// Facts reported alongside a successful run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub transcript_words: usize,
    pub video_duration_seconds: Option<f64>,
    pub synthesized_audio_duration_seconds: Option<f64>,
    pub video_extended: bool,
    pub elapsed_seconds: f64,
    /// Artifacts that could not be removed during cleanup
    pub cleanup_failures: Vec<String>,
}

pub trait RunObserver: Send + Sync {
    fn on_state_changed(&self, _run_id: &str, _state: RunState) {}

    fn on_progress(&self, _run_id: &str, _sample: &ProgressSample) {}

    fn on_video_duration(&self, _run_id: &str, _seconds: f64) {}

    /// The transcription model is not cached and is downloaded by this run
    fn on_model_loading(&self, _run_id: &str, _model: &str) {}

    fn on_transcript(&self, _run_id: &str, _transcript: &str) {}

    /// The spoken language of the run, as supplied by the caller
    fn on_language_detected(&self, _run_id: &str, _language: &str) {}

    fn on_stage_error(&self, _run_id: &str, _kind: ErrorKind, _message: &str) {}

    fn on_succeeded(&self, _run_id: &str, _output: &Path, _summary: &RunSummary) {}

    fn on_cancelled(&self, _run_id: &str) {}

    fn on_finished(&self, _run_id: &str) {}
}

/// Observer that ignores every notification
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
