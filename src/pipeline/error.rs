// Pipeline error taxonomy
//
// Every stage failure is reported as a `PipelineError` carrying the kind, the
// stage it happened in, and a readable detail.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::pipeline::run::Stage;

/// Classification of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The input video does not exist
    InputNotFound,
    /// Audio extraction failed in the media tool
    MediaTool,
    /// The transcription process failed or produced nothing
    Transcription,
    /// The translation backend failed
    Translation,
    /// Speech synthesis failed
    Synthesis,
    /// Padding the video to the audio length failed
    VideoExtension,
    /// Muxing the dubbed audio into the video failed
    Merge,
    /// A fault outside the known taxonomy
    Unexpected,
}

impl ErrorKind {
    /// The kind a collaborator failure maps to when raised in `stage`
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::ExtractAudio => ErrorKind::MediaTool,
            Stage::Transcribe => ErrorKind::Transcription,
            Stage::Translate => ErrorKind::Translation,
            Stage::Synthesize => ErrorKind::Synthesis,
            Stage::ExtendVideo => ErrorKind::VideoExtension,
            Stage::Merge => ErrorKind::Merge,
            Stage::Cleanup => ErrorKind::Unexpected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputNotFound => "input_not_found",
            ErrorKind::MediaTool => "media_tool_error",
            ErrorKind::Transcription => "transcription_error",
            ErrorKind::Translation => "translation_error",
            ErrorKind::Synthesis => "synthesis_error",
            ErrorKind::VideoExtension => "video_extension_error",
            ErrorKind::Merge => "merge_error",
            ErrorKind::Unexpected => "unexpected_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure that aborts the run
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} in stage {}: {detail}", .stage.map(|s| s.as_str()).unwrap_or("unknown"))]
pub struct PipelineError {
    pub kind: ErrorKind,
    /// Stage the run was in, if it could be determined
    pub stage: Option<Stage>,
    pub detail: String,
}

impl PipelineError {
    pub fn new<S: Into<String>>(kind: ErrorKind, stage: Stage, detail: S) -> Self {
        Self {
            kind,
            stage: Some(stage),
            detail: detail.into(),
        }
    }

    pub fn input_not_found(path: &std::path::Path) -> Self {
        Self::new(
            ErrorKind::InputNotFound,
            Stage::ExtractAudio,
            format!("input video not found: {}", path.display()),
        )
    }

    /// Wrap a collaborator failure with the kind of the stage that called it
    pub fn from_gateway(stage: Stage, err: GatewayError) -> Self {
        Self::new(ErrorKind::for_stage(stage), stage, err.to_string())
    }

    pub fn unexpected<S: Into<String>>(stage: Option<Stage>, detail: S) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            stage,
            detail: detail.into(),
        }
    }
}

/// Why a run stopped before succeeding
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Interruption {
    Failed(PipelineError),
    Cancelled,
}

impl From<PipelineError> for Interruption {
    fn from(err: PipelineError) -> Self {
        Interruption::Failed(err)
    }
}
