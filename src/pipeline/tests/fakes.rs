// Fake collaborators and a recording observer
//
// The fakes write real (tiny) files so artifact tracking and cleanup are
// exercised against the filesystem.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::gateway::{
    GatewayError, Gateways, MediaTool, ProcessExit, Synthesizer, TranscriptionEngine,
    TranscriptionProcess, Translator,
};
use crate::pipeline::error::ErrorKind;
use crate::pipeline::observer::{RunObserver, RunSummary};
use crate::pipeline::progress::ProgressSample;
use crate::pipeline::run::RunState;

fn failure(operation: &str) -> GatewayError {
    GatewayError::ProcessFailed {
        operation: operation.to_string(),
        code: Some(1),
        stderr: format!("{} failed on purpose", operation),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), GatewayError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Calls received by `FakeMedia`, in order
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Extract,
    Probe,
    Extend { target_seconds: f64 },
    Merge { video: PathBuf },
}

#[derive(Default)]
pub struct FakeMedia {
    pub video_duration: Option<f64>,
    pub fail_extract: bool,
    pub fail_extend: bool,
    pub fail_merge: bool,
    /// Merge never returns, like an encoder stuck on a huge file
    pub stall_merge: bool,
    pub calls: Mutex<Vec<MediaCall>>,
}

impl FakeMedia {
    pub fn with_duration(seconds: Option<f64>) -> Self {
        Self {
            video_duration: seconds,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_audio(&self, _video: &Path, output: &Path) -> Result<(), GatewayError> {
        self.record(MediaCall::Extract);
        if self.fail_extract {
            // Leave a partial file behind like a crashed encoder would.
            write_file(output, "partial")?;
            return Err(failure("ffmpeg audio extraction"));
        }
        write_file(output, "RIFF")
    }

    async fn probe_duration(&self, _path: &Path) -> Option<f64> {
        self.record(MediaCall::Probe);
        self.video_duration
    }

    async fn merge_audio_video(
        &self,
        video: &Path,
        _audio: &Path,
        output: &Path,
    ) -> Result<(), GatewayError> {
        self.record(MediaCall::Merge {
            video: video.to_path_buf(),
        });
        if self.fail_merge {
            return Err(failure("ffmpeg merge"));
        }
        if self.stall_merge {
            std::future::pending::<()>().await;
        }
        write_file(output, "dubbed")
    }

    async fn extend_video_duration(
        &self,
        _video: &Path,
        target_seconds: f64,
        output: &Path,
    ) -> Result<(), GatewayError> {
        self.record(MediaCall::Extend { target_seconds });
        if self.fail_extend {
            return Err(failure("ffmpeg video extension"));
        }
        write_file(output, "extended")
    }
}

/// How the fake transcription process ends
#[derive(Debug, Clone)]
pub enum TranscriptionScript {
    /// Exit successfully after `polls` polls and write `text`
    Succeed { polls: usize, text: String },
    /// Exit successfully without writing a transcript
    NoOutput,
    /// Exit with a non-zero status
    Crash,
    /// Never exit on its own
    Hang,
    /// Refuse to start
    LaunchFailure,
}

pub struct FakeTranscriber {
    pub script: TranscriptionScript,
    pub model_cached: bool,
    pub terminated: Arc<AtomicBool>,
    pub launched: AtomicBool,
}

impl FakeTranscriber {
    pub fn new(script: TranscriptionScript) -> Self {
        Self {
            script,
            model_cached: true,
            terminated: Arc::new(AtomicBool::new(false)),
            launched: AtomicBool::new(false),
        }
    }

    pub fn succeeding(text: &str) -> Self {
        Self::new(TranscriptionScript::Succeed {
            polls: 2,
            text: text.to_string(),
        })
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    script: TranscriptionScript,
    polls: usize,
    transcript_path: PathBuf,
    terminated: Arc<AtomicBool>,
    exit: Option<ProcessExit>,
}

#[async_trait]
impl TranscriptionProcess for FakeProcess {
    async fn poll(&mut self) -> Result<Option<ProcessExit>, GatewayError> {
        if let Some(exit) = &self.exit {
            return Ok(Some(exit.clone()));
        }
        self.polls += 1;
        let exit = match &self.script {
            TranscriptionScript::Succeed { polls, text } if self.polls > *polls => {
                write_file(&self.transcript_path, text)?;
                Some(ProcessExit {
                    success: true,
                    code: Some(0),
                    stderr: String::new(),
                })
            }
            TranscriptionScript::NoOutput => Some(ProcessExit {
                success: true,
                code: Some(0),
                stderr: String::new(),
            }),
            TranscriptionScript::Crash => Some(ProcessExit {
                success: false,
                code: Some(2),
                stderr: "model not found".to_string(),
            }),
            _ => None,
        };
        self.exit = exit.clone();
        Ok(exit)
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<(), GatewayError> {
        self.terminated.store(true, Ordering::SeqCst);
        self.exit = Some(ProcessExit {
            success: false,
            code: None,
            stderr: String::new(),
        });
        Ok(())
    }
}

#[async_trait]
impl TranscriptionEngine for FakeTranscriber {
    async fn launch(
        &self,
        audio: &Path,
        _model: &str,
        output_dir: &Path,
    ) -> Result<Box<dyn TranscriptionProcess>, GatewayError> {
        self.launched.store(true, Ordering::SeqCst);
        if matches!(self.script, TranscriptionScript::LaunchFailure) {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "whisper: command not found",
            )));
        }
        Ok(Box::new(FakeProcess {
            script: self.script.clone(),
            polls: 0,
            transcript_path: self.transcript_path(audio, output_dir),
            terminated: self.terminated.clone(),
            exit: None,
        }))
    }

    fn transcript_path(&self, audio: &Path, output_dir: &Path) -> PathBuf {
        let stem = audio.file_stem().and_then(|s| s.to_str()).unwrap_or("audio");
        output_dir.join(format!("{}.txt", stem))
    }

    fn is_model_cached(&self, _model: &str) -> bool {
        self.model_cached
    }
}

#[derive(Debug, Clone)]
pub enum TranslationScript {
    Return(String),
    Fail,
    Panic,
}

pub struct FakeTranslator {
    pub script: TranslationScript,
    pub requests: Mutex<Vec<(String, String, String)>>,
}

impl FakeTranslator {
    pub fn new(script: TranslationScript) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(text: &str) -> Self {
        Self::new(TranslationScript::Return(text.to_string()))
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, GatewayError> {
        self.requests.lock().unwrap().push((
            text.to_string(),
            source_language.to_string(),
            target_language.to_string(),
        ));
        match &self.script {
            TranslationScript::Return(translated) => Ok(translated.clone()),
            TranslationScript::Fail => Err(GatewayError::InvalidResponse(
                "translation API returned 503".to_string(),
            )),
            TranslationScript::Panic => panic!("translator exploded"),
        }
    }
}

pub struct FakeSynthesizer {
    pub duration: Option<f64>,
    pub fail: bool,
    /// Write the text to a side file first, as edge-tts does
    pub uses_script: bool,
    pub voices: Mutex<Vec<Option<String>>>,
}

impl FakeSynthesizer {
    pub fn with_duration(seconds: Option<f64>) -> Self {
        Self {
            duration: seconds,
            fail: false,
            uses_script: false,
            voices: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _target_language: &str,
        voice: Option<&str>,
        output: &Path,
    ) -> Result<Option<f64>, GatewayError> {
        self.voices.lock().unwrap().push(voice.map(str::to_string));
        if let Some(script) = self.script_path(output) {
            write_file(&script, text)?;
        }
        if self.fail {
            return Err(failure("edge-tts synthesis"));
        }
        write_file(output, "ID3")?;
        Ok(self.duration)
    }

    fn script_path(&self, output: &Path) -> Option<PathBuf> {
        self.uses_script.then(|| output.with_extension("txt"))
    }
}

/// Bundle of fakes, kept as `Arc`s so tests can inspect them afterwards
pub struct FakeGateways {
    pub media: Arc<FakeMedia>,
    pub transcriber: Arc<FakeTranscriber>,
    pub translator: Arc<FakeTranslator>,
    pub synthesizer: Arc<FakeSynthesizer>,
}

impl FakeGateways {
    /// The 60 s "Hello world." scenario with 58 s of dubbed audio
    pub fn happy_path() -> Self {
        Self {
            media: Arc::new(FakeMedia::with_duration(Some(60.0))),
            transcriber: Arc::new(FakeTranscriber::succeeding("Hello world.")),
            translator: Arc::new(FakeTranslator::returning("مرحبا بالعالم.")),
            synthesizer: Arc::new(FakeSynthesizer::with_duration(Some(58.0))),
        }
    }

    pub fn gateways(&self) -> Gateways {
        Gateways {
            media: self.media.clone(),
            transcriber: self.transcriber.clone(),
            translator: self.translator.clone(),
            synthesizer: self.synthesizer.clone(),
        }
    }
}

/// One observer notification
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    State(RunState),
    Progress(ProgressSample),
    VideoDuration(f64),
    ModelLoading(String),
    Transcript(String),
    Language(String),
    StageError(ErrorKind, String),
    Succeeded(PathBuf, RunSummary),
    Cancelled,
    Finished,
}

/// Observer that records every notification
///
/// When `watch_dir` is set it also records, at `on_finished` time, whether
/// that directory still exists.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
    watch_dir: Option<PathBuf>,
    leftover_at_finish: Mutex<Option<bool>>,
}

impl RecordingObserver {
    pub fn watching(dir: PathBuf) -> Self {
        Self {
            watch_dir: Some(dir),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<RunState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(sample) => Some(sample.percent),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    pub fn leftover_at_finish(&self) -> Option<bool> {
        *self.leftover_at_finish.lock().unwrap()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl RunObserver for RecordingObserver {
    fn on_state_changed(&self, _run_id: &str, state: RunState) {
        self.push(Event::State(state));
    }

    fn on_progress(&self, _run_id: &str, sample: &ProgressSample) {
        self.push(Event::Progress(sample.clone()));
    }

    fn on_video_duration(&self, _run_id: &str, seconds: f64) {
        self.push(Event::VideoDuration(seconds));
    }

    fn on_model_loading(&self, _run_id: &str, model: &str) {
        self.push(Event::ModelLoading(model.to_string()));
    }

    fn on_transcript(&self, _run_id: &str, transcript: &str) {
        self.push(Event::Transcript(transcript.to_string()));
    }

    fn on_language_detected(&self, _run_id: &str, language: &str) {
        self.push(Event::Language(language.to_string()));
    }

    fn on_stage_error(&self, _run_id: &str, kind: ErrorKind, message: &str) {
        self.push(Event::StageError(kind, message.to_string()));
    }

    fn on_succeeded(&self, _run_id: &str, output: &Path, summary: &RunSummary) {
        self.push(Event::Succeeded(output.to_path_buf(), summary.clone()));
    }

    fn on_cancelled(&self, _run_id: &str) {
        self.push(Event::Cancelled);
    }

    fn on_finished(&self, _run_id: &str) {
        if let Some(dir) = &self.watch_dir {
            *self.leftover_at_finish.lock().unwrap() = Some(dir.exists());
        }
        self.push(Event::Finished);
    }
}
