//! Run record and the stage state machine
//!
//! A `PipelineRun` moves through `RunState` strictly forward. `Failed` and
//! `Cancelled` are absorbing and reachable from any non-terminal state.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::pipeline::cancellation::CancellationToken;

/// Sentinel used when the caller does not know the spoken language
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// The ordered work stages of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractAudio,
    Transcribe,
    Translate,
    Synthesize,
    ExtendVideo,
    Merge,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::ExtractAudio,
        Stage::Transcribe,
        Stage::Translate,
        Stage::Synthesize,
        Stage::ExtendVideo,
        Stage::Merge,
        Stage::Cleanup,
    ];

    /// Stable identifier used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractAudio => "extract_audio",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Synthesize => "synthesize",
            Stage::ExtendVideo => "extend_video",
            Stage::Merge => "merge",
            Stage::Cleanup => "cleanup",
        }
    }

    /// Human-readable label reported with progress samples
    pub fn label(&self) -> &'static str {
        match self {
            Stage::ExtractAudio => "Extracting audio",
            Stage::Transcribe => "Transcribing speech",
            Stage::Translate => "Translating",
            Stage::Synthesize => "Synthesizing speech",
            Stage::ExtendVideo => "Extending video",
            Stage::Merge => "Merging audio and video",
            Stage::Cleanup => "Cleaning up",
        }
    }

    /// The run state that corresponds to executing this stage
    pub fn running_state(&self) -> RunState {
        match self {
            Stage::ExtractAudio => RunState::ExtractingAudio,
            Stage::Transcribe => RunState::Transcribing,
            Stage::Translate => RunState::Translating,
            Stage::Synthesize => RunState::Synthesizing,
            Stage::ExtendVideo => RunState::ExtendingVideo,
            Stage::Merge => RunState::Merging,
            Stage::Cleanup => RunState::CleaningUp,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    ExtractingAudio,
    Transcribing,
    Translating,
    Synthesizing,
    ExtendingVideo,
    Merging,
    CleaningUp,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunState {
    /// Position in the forward order; terminal failure states have none
    fn ordinal(&self) -> Option<u8> {
        match self {
            RunState::Created => Some(0),
            RunState::ExtractingAudio => Some(1),
            RunState::Transcribing => Some(2),
            RunState::Translating => Some(3),
            RunState::Synthesizing => Some(4),
            RunState::ExtendingVideo => Some(5),
            RunState::Merging => Some(6),
            RunState::CleaningUp => Some(7),
            RunState::Succeeded => Some(8),
            RunState::Failed | RunState::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }

    /// Transition table
    ///
    /// Each move goes to the next state in order. The only skip is
    /// `Synthesizing -> Merging` when the video needs no extension.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunState::Failed | RunState::Cancelled => true,
            RunState::Merging if *self == RunState::Synthesizing => true,
            _ => match (self.ordinal(), next.ordinal()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::ExtractingAudio => "extracting_audio",
            RunState::Transcribing => "transcribing",
            RunState::Translating => "translating",
            RunState::Synthesizing => "synthesizing",
            RunState::ExtendingVideo => "extending_video",
            RunState::Merging => "merging",
            RunState::CleaningUp => "cleaning_up",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted a transition the state table does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal run state transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

/// Decide whether the video must be padded to fit the synthesized audio
///
/// Both durations have to be known; an unknown duration never triggers
/// extension.
pub fn should_extend_video(
    video_duration_seconds: Option<f64>,
    synthesized_audio_duration_seconds: Option<f64>,
) -> bool {
    match (video_duration_seconds, synthesized_audio_duration_seconds) {
        (Some(video), Some(audio)) => audio > video,
        _ => false,
    }
}

/// Whether `value` is a bare code such as `ar`, `ar-SA-HamedNeural` or `medium.en`
///
/// Languages, voices and model names end up in file names and command lines,
/// so path separators and dot segments are refused.
pub fn is_plain_code(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('.')
        && !value.contains("..")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Parameters of a dubbing request before it becomes a run
#[derive(Debug, Clone)]
pub struct DubbingRequest {
    pub video_path: PathBuf,
    pub source_language: String,
    pub target_language: String,
    pub voice_id: Option<String>,
    pub transcription_model: String,
}

/// One request to dub one video, plus everything learned while running it
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: String,
    pub video_path: PathBuf,
    pub source_language: String,
    pub target_language: String,
    pub voice_id: Option<String>,
    pub transcription_model: String,
    state: RunState,
    pub video_duration_seconds: Option<f64>,
    pub transcript: Option<String>,
    pub translated_text: Option<String>,
    pub synthesized_audio_duration_seconds: Option<f64>,
    final_output_path: Option<PathBuf>,
    error_detail: Option<String>,
    token: CancellationToken,
}

impl PipelineRun {
    pub fn new(id: impl Into<String>, request: DubbingRequest) -> Self {
        Self {
            id: id.into(),
            video_path: request.video_path,
            source_language: request.source_language,
            target_language: request.target_language,
            voice_id: request.voice_id,
            transcription_model: request.transcription_model,
            state: RunState::Created,
            video_duration_seconds: None,
            transcript: None,
            translated_text: None,
            synthesized_audio_duration_seconds: None,
            final_output_path: None,
            error_detail: None,
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn final_output_path(&self) -> Option<&PathBuf> {
        self.final_output_path.as_ref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Handle callers use to request cancellation of this run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Move to `next` if the transition table allows it
    pub(crate) fn transition(&mut self, next: RunState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn succeed(&mut self, output: PathBuf) -> Result<(), IllegalTransition> {
        self.transition(RunState::Succeeded)?;
        self.final_output_path = Some(output);
        Ok(())
    }

    pub(crate) fn fail(&mut self, detail: impl Into<String>) -> Result<(), IllegalTransition> {
        self.transition(RunState::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DubbingRequest {
        DubbingRequest {
            video_path: PathBuf::from("/videos/talk.mp4"),
            source_language: "en".to_string(),
            target_language: "ar".to_string(),
            voice_id: None,
            transcription_model: "medium".to_string(),
        }
    }

    #[test]
    fn extension_requires_both_durations_and_longer_audio() {
        assert!(should_extend_video(Some(10.0), Some(12.5)));
        assert!(!should_extend_video(Some(10.0), Some(9.9)));
        assert!(!should_extend_video(Some(10.0), Some(10.0)));
        assert!(!should_extend_video(None, Some(12.5)));
        assert!(!should_extend_video(Some(10.0), None));
        assert!(!should_extend_video(None, None));
    }

    #[test]
    fn forward_transitions_are_allowed_and_may_skip_extension() {
        let mut run = PipelineRun::new("r1", request());
        for state in [
            RunState::ExtractingAudio,
            RunState::Transcribing,
            RunState::Translating,
            RunState::Synthesizing,
            RunState::Merging,
            RunState::CleaningUp,
        ] {
            run.transition(state).unwrap();
        }
        run.succeed(PathBuf::from("/out/talk_ar.mp4")).unwrap();
        assert_eq!(run.state(), RunState::Succeeded);
        assert!(run.final_output_path().is_some());
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut run = PipelineRun::new("r1", request());
        run.transition(RunState::ExtractingAudio).unwrap();
        run.transition(RunState::Transcribing).unwrap();
        let err = run.transition(RunState::ExtractingAudio).unwrap_err();
        assert_eq!(err.from, RunState::Transcribing);
        assert_eq!(run.state(), RunState::Transcribing);
    }

    #[test]
    fn success_requires_cleanup_first() {
        let mut run = PipelineRun::new("r1", request());
        for state in [
            RunState::ExtractingAudio,
            RunState::Transcribing,
            RunState::Translating,
            RunState::Synthesizing,
            RunState::ExtendingVideo,
            RunState::Merging,
        ] {
            run.transition(state).unwrap();
        }
        assert!(run.succeed(PathBuf::from("/out/x.mp4")).is_err());
        assert!(run.final_output_path().is_none());
        assert!(!RunState::Synthesizing.can_transition_to(RunState::CleaningUp));
    }

    #[test]
    fn only_video_extension_may_be_skipped() {
        assert!(RunState::Synthesizing.can_transition_to(RunState::ExtendingVideo));
        assert!(RunState::Synthesizing.can_transition_to(RunState::Merging));
        assert!(RunState::ExtendingVideo.can_transition_to(RunState::Merging));

        assert!(!RunState::Created.can_transition_to(RunState::Merging));
        assert!(!RunState::Created.can_transition_to(RunState::Transcribing));
        assert!(!RunState::Transcribing.can_transition_to(RunState::Synthesizing));
        assert!(!RunState::Translating.can_transition_to(RunState::ExtendingVideo));
        assert!(!RunState::Merging.can_transition_to(RunState::Succeeded));
        assert!(!RunState::Created.can_transition_to(RunState::Created));

        let mut run = PipelineRun::new("r1", request());
        let err = run.transition(RunState::Merging).unwrap_err();
        assert_eq!(err.from, RunState::Created);
        assert_eq!(run.state(), RunState::Created);
    }

    #[test]
    fn plain_codes_exclude_path_syntax() {
        for ok in ["ar", "pt-BR", "ar-SA-HamedNeural", "large-v3", "medium.en", "zh_CN"] {
            assert!(is_plain_code(ok), "{}", ok);
        }
        for bad in ["", "x/../../../victim", "..", ".hidden", "a..b", "ar/x", "ar\\x", "ar x", "ar\0"] {
            assert!(!is_plain_code(bad), "{:?}", bad);
        }
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for start in [RunState::Created, RunState::Translating, RunState::CleaningUp] {
            assert!(start.can_transition_to(RunState::Failed));
            assert!(start.can_transition_to(RunState::Cancelled));
        }
        for terminal in [RunState::Succeeded, RunState::Failed, RunState::Cancelled] {
            for next in [
                RunState::Created,
                RunState::Merging,
                RunState::Failed,
                RunState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn failing_records_detail_without_output() {
        let mut run = PipelineRun::new("r1", request());
        run.fail("ffmpeg exited with status 1").unwrap();
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.error_detail(), Some("ffmpeg exited with status 1"));
        assert!(run.final_output_path().is_none());
    }
}
