//! Progress and ETA estimation
//!
//! The collaborators expose no real completion fraction, so progress is a
//! heuristic: every stage owns a fixed percent band and the long transcription
//! stage is advanced by wall-clock time against an estimated total.

use serde::Serialize;
use std::time::Duration;

use crate::pipeline::run::Stage;

/// Transcription is assumed to take this fraction of the video length
const TRANSCRIPTION_SPEED_FACTOR: f64 = 0.7;
/// Lower bound for the transcription estimate, in seconds
const MIN_TRANSCRIPTION_ESTIMATE_SECONDS: f64 = 30.0;
/// Transcription estimate when the video duration is unknown, in seconds
const FALLBACK_TRANSCRIPTION_ESTIMATE_SECONDS: f64 = 60.0;

/// One progress report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSample {
    /// Overall completion, 0 to 100
    pub percent: u8,
    /// Estimated minutes left in the current stage
    pub eta_minutes: f64,
    pub stage_label: String,
}

/// Percent range reserved for a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBand {
    pub start: u8,
    pub end: u8,
}

impl StageBand {
    pub fn width(&self) -> u8 {
        self.end - self.start
    }
}

/// Fixed band assignment; bands are disjoint and increasing in stage order
pub fn stage_band(stage: Stage) -> StageBand {
    let (start, end) = match stage {
        Stage::ExtractAudio => (10, 20),
        Stage::Transcribe => (30, 70),
        Stage::Translate => (75, 80),
        Stage::Synthesize => (85, 90),
        Stage::ExtendVideo => (92, 93),
        Stage::Merge => (95, 100),
        Stage::Cleanup => (100, 100),
    };
    StageBand { start, end }
}

/// Estimated total transcription time for a video of the given length
pub fn estimated_transcription_seconds(video_duration_seconds: Option<f64>) -> f64 {
    match video_duration_seconds {
        Some(duration) if duration.is_finite() && duration > 0.0 => {
            (duration * TRANSCRIPTION_SPEED_FACTOR).max(MIN_TRANSCRIPTION_ESTIMATE_SECONDS)
        }
        _ => FALLBACK_TRANSCRIPTION_ESTIMATE_SECONDS,
    }
}

/// Stateful estimator for one run
///
/// Remembers the highest percent handed out so reported progress never moves
/// backwards, even if a caller asks for an earlier boundary again.
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    video_duration_seconds: Option<f64>,
    last_percent: u8,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_video_duration(&mut self, seconds: Option<f64>) {
        self.video_duration_seconds = seconds;
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }

    /// Sample emitted when a stage begins
    pub fn stage_started(&mut self, stage: Stage) -> ProgressSample {
        let band = stage_band(stage);
        let eta_seconds = if stage == Stage::Transcribe {
            estimated_transcription_seconds(self.video_duration_seconds)
        } else {
            0.0
        };
        self.sample(band.start, eta_seconds, stage)
    }

    /// Sample emitted when a stage finishes
    pub fn stage_completed(&mut self, stage: Stage) -> ProgressSample {
        self.sample(stage_band(stage).end, 0.0, stage)
    }

    /// Sample for the transcription stage after `elapsed` wall-clock time
    ///
    /// Saturates at the end of the band when the process overruns the
    /// estimate.
    pub fn transcription_sample(&mut self, elapsed: Duration) -> ProgressSample {
        let band = stage_band(Stage::Transcribe);
        let total = estimated_transcription_seconds(self.video_duration_seconds);
        let elapsed = elapsed.as_secs_f64();
        let fraction = (elapsed / total).min(1.0);
        let percent = band.start as f64 + band.width() as f64 * fraction;
        let eta_seconds = (total - elapsed).max(0.0);
        self.sample(percent.floor() as u8, eta_seconds, Stage::Transcribe)
    }

    fn sample(&mut self, percent: u8, eta_seconds: f64, stage: Stage) -> ProgressSample {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        ProgressSample {
            percent,
            eta_minutes: eta_seconds / 60.0,
            stage_label: stage.label().to_string(),
        }
    }
}
