// External collaborators of the dubbing pipeline
//
// The orchestrator only talks to these traits. The default implementations
// shell out to ffmpeg/ffprobe, the whisper CLI and edge-tts, and call an
// OpenAI-compatible chat endpoint for translation.

pub mod ffmpeg;
pub mod process;
pub mod translator;
pub mod tts;
pub mod whisper;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use ffmpeg::FfmpegTool;
pub use process::ChildProcess;
pub use translator::ChatCompletionTranslator;
pub use tts::EdgeTtsSynthesizer;
pub use whisper::WhisperCli;

/// Errors raised by collaborators
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The collaborator could not be started or its files could not be accessed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external process did not finish within its budget
    #[error("{operation} timed out after {} seconds", .timeout.as_secs())]
    Timeout { operation: String, timeout: Duration },

    /// The external process exited unsuccessfully
    #[error("{operation} exited with {}: {stderr}", .code.map(|c| format!("status {}", c)).unwrap_or_else(|| "a signal".to_string()))]
    ProcessFailed {
        operation: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The collaborator reported success but its output is missing
    #[error("expected output not found: {}", .0.display())]
    MissingOutput(PathBuf),

    /// A network request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The collaborator refused its input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Final status of a finished external process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

/// Media tool operations (extraction, probing, muxing, padding)
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Write mono 16 kHz 16-bit PCM audio of `video` to `output`
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), GatewayError>;

    /// Duration of a media file in seconds, `None` if it cannot be determined
    async fn probe_duration(&self, path: &Path) -> Option<f64>;

    /// Replace the audio track of `video` with `audio`
    async fn merge_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), GatewayError>;

    /// Pad the tail of `video` so it lasts at least `target_seconds`
    async fn extend_video_duration(
        &self,
        video: &Path,
        target_seconds: f64,
        output: &Path,
    ) -> Result<(), GatewayError>;
}

/// A running transcription job that is polled rather than awaited
#[async_trait]
pub trait TranscriptionProcess: Send {
    /// `Some` once the process has exited, `None` while it is still running
    async fn poll(&mut self) -> Result<Option<ProcessExit>, GatewayError>;

    /// Ask the process to stop, force-killing it after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<(), GatewayError>;
}

/// Speech-to-text launcher
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Start transcribing `audio`; the transcript lands at `transcript_path`
    async fn launch(
        &self,
        audio: &Path,
        model: &str,
        output_dir: &Path,
    ) -> Result<Box<dyn TranscriptionProcess>, GatewayError>;

    /// Where the plain-text transcript of `audio` will be written
    fn transcript_path(&self, audio: &Path, output_dir: &Path) -> PathBuf;

    /// Whether `model` is available locally; `false` means the first launch
    /// downloads it
    fn is_model_cached(&self, _model: &str) -> bool {
        true
    }
}

/// Machine translation backend
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, GatewayError>;
}

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into `output`, returning the measured duration if known
    async fn synthesize(
        &self,
        text: &str,
        target_language: &str,
        voice: Option<&str>,
        output: &Path,
    ) -> Result<Option<f64>, GatewayError>;

    /// Side file the text is written to before synthesizing `output`, if any
    fn script_path(&self, _output: &Path) -> Option<PathBuf> {
        None
    }
}

/// The set of collaborators one orchestrator uses
#[derive(Clone)]
pub struct Gateways {
    pub media: Arc<dyn MediaTool>,
    pub transcriber: Arc<dyn TranscriptionEngine>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}
