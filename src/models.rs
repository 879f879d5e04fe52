// Dubbing API data models
//
// Request and response bodies exchanged over HTTP.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::pipeline::run::UNKNOWN_LANGUAGE;
use crate::pipeline::DubbingRequest;
use crate::run_manager::RunSnapshot;

/// Body of `POST /dubbing`
#[derive(Debug, Deserialize)]
pub struct DubbingRequestBody {
    /// Path of the video on the server's filesystem
    pub video_path: PathBuf,
    /// Spoken language of the video, if known
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    /// TTS voice; the target language's default voice when absent
    pub voice: Option<String>,
    pub transcription_model: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl DubbingRequestBody {
    /// Fill unset fields from the server defaults
    pub fn into_request(self, config: &PipelineConfig) -> DubbingRequest {
        DubbingRequest {
            video_path: self.video_path,
            source_language: non_empty(self.source_language)
                .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
            target_language: non_empty(self.target_language)
                .unwrap_or_else(|| config.default_target_language.clone()),
            voice_id: non_empty(self.voice),
            transcription_model: non_empty(self.transcription_model)
                .unwrap_or_else(|| config.default_transcription_model.clone()),
        }
    }
}

/// Response for an accepted dubbing request
#[derive(Serialize)]
pub struct DubbingResponse {
    pub run_id: String,
    /// URL to poll for progress
    pub status_url: String,
    /// Position among waiting runs (1-based), if not started yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

/// Error response for API
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Optional status information
    pub status: Option<String>,
}

/// Response for `GET /dubbing/{id}`
#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub run: RunSnapshot,
}

/// Response for `GET /status`
#[derive(Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub version: String,
    pub queued_runs: usize,
    pub processing: bool,
    pub authentication: bool,
}
