//! Pipeline orchestrator
//!
//! Drives one `PipelineRun` through ExtractAudio → Transcribe → Translate →
//! Synthesize → [ExtendVideo] → Merge → Cleanup. Stages run strictly in
//! sequence on the calling task. Whatever happens (stage error, cancellation,
//! panic) the run's artifacts are purged once, the terminal notification is
//! sent, and `on_finished` is the last call the observer receives.

use futures::FutureExt;
use log::{debug, error, info, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::file_utils::{dubbed_output_path, ensure_directory, read_text_file};
use crate::gateway::Gateways;
use crate::metrics::Metrics;
use crate::pipeline::artifacts::{CleanupReport, TempArtifactSet};
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::error::{ErrorKind, Interruption, PipelineError};
use crate::pipeline::observer::{RunObserver, RunSummary};
use crate::pipeline::progress::ProgressEstimator;
use crate::pipeline::run::{should_extend_video, PipelineRun, RunState, Stage};

/// Name of the extracted audio inside the working directory
const EXTRACTED_AUDIO_NAME: &str = "audio.wav";
/// Name of the synthesized speech inside the working directory
const SPEECH_NAME: &str = "speech.mp3";

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded { output: PathBuf, summary: RunSummary },
    Failed(PipelineError),
    Cancelled,
}

impl RunOutcome {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded { .. } => "succeeded",
            RunOutcome::Failed(_) => "failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// Everything known about a run once it has finished
#[derive(Debug)]
pub struct RunReport {
    pub run: PipelineRun,
    pub outcome: RunOutcome,
    pub cleanup: CleanupReport,
}

/// Per-run mutable state threaded through the stages
struct RunContext {
    run: PipelineRun,
    artifacts: TempArtifactSet,
    progress: ProgressEstimator,
    observer: Arc<dyn RunObserver>,
    stage: Option<Stage>,
    stage_started: Instant,
    video_extended: bool,
}

impl RunContext {
    fn set_state(&mut self, next: RunState) -> Result<(), PipelineError> {
        self.run
            .transition(next)
            .map_err(|e| PipelineError::unexpected(self.stage, e.to_string()))?;
        self.observer.on_state_changed(&self.run.id, next);
        Ok(())
    }

    fn track(&mut self, stage: Stage, path: &Path) -> Result<(), PipelineError> {
        self.artifacts
            .track(path)
            .map_err(|e| PipelineError::unexpected(Some(stage), e.to_string()))
    }
}

/// Await `work` unless the run is cancelled first
///
/// On cancellation `work` is dropped, and with it any child process it spawned.
async fn unless_cancelled<T>(
    token: &CancellationToken,
    work: impl Future<Output = T>,
) -> Result<T, Interruption> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interruption::Cancelled),
        output = work => Ok(output),
    }
}

/// Runs dubbing pipelines against a fixed set of collaborators
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: Arc<PipelineConfig>,
    gateways: Gateways,
    metrics: Metrics,
}

impl PipelineOrchestrator {
    pub fn new(config: Arc<PipelineConfig>, gateways: Gateways, metrics: Metrics) -> Self {
        Self {
            config,
            gateways,
            metrics,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute `run` to a terminal state
    pub async fn run(&self, run: PipelineRun, observer: Arc<dyn RunObserver>) -> RunReport {
        let started = Instant::now();
        info!("Run {} started for {}", run.id, run.video_path.display());

        let mut ctx = RunContext {
            artifacts: TempArtifactSet::new(&self.config.temp_dir, &run.id),
            run,
            progress: ProgressEstimator::new(),
            observer,
            stage: None,
            stage_started: started,
            video_extended: false,
        };

        let result = AssertUnwindSafe(self.execute(&mut ctx)).catch_unwind().await;
        let interruption = match result {
            Ok(Ok(output)) => return self.finish_success(ctx, output, started).await,
            Ok(Err(interruption)) => interruption,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Run {} panicked: {}", ctx.run.id, detail);
                Interruption::Failed(PipelineError::unexpected(ctx.stage, detail))
            }
        };
        self.finish_interrupted(ctx, interruption, started).await
    }

    async fn execute(&self, ctx: &mut RunContext) -> Result<PathBuf, Interruption> {
        if ctx.run.cancellation_token().is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        if !ctx.run.video_path.is_file() {
            return Err(PipelineError::input_not_found(&ctx.run.video_path).into());
        }

        let audio = self.extract_audio(ctx).await?;
        let transcript = self.transcribe(ctx, &audio).await?;
        let translated = self.translate(ctx, &transcript).await?;
        let speech = self.synthesize(ctx, &translated).await?;

        let video = if should_extend_video(
            ctx.run.video_duration_seconds,
            ctx.run.synthesized_audio_duration_seconds,
        ) {
            self.extend_video(ctx).await?
        } else {
            ctx.run.video_path.clone()
        };

        self.merge(ctx, &video, &speech).await
    }

    /// Cancellation checkpoint, state change and start-of-band progress
    fn enter(&self, ctx: &mut RunContext, stage: Stage) -> Result<(), Interruption> {
        if ctx.run.cancellation_token().is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        ctx.stage = Some(stage);
        ctx.stage_started = Instant::now();
        ctx.set_state(stage.running_state())?;
        let sample = ctx.progress.stage_started(stage);
        ctx.observer.on_progress(&ctx.run.id, &sample);
        debug!("Run {}: {}", ctx.run.id, stage.label());
        Ok(())
    }

    async fn complete(&self, ctx: &mut RunContext, stage: Stage) {
        let sample = ctx.progress.stage_completed(stage);
        ctx.observer.on_progress(&ctx.run.id, &sample);
        self.metrics
            .record_stage(
                stage.as_str(),
                "success",
                ctx.stage_started.elapsed().as_secs_f64(),
            )
            .await;
    }

    async fn extract_audio(&self, ctx: &mut RunContext) -> Result<PathBuf, Interruption> {
        let stage = Stage::ExtractAudio;
        self.enter(ctx, stage)?;

        let work_dir = ctx
            .artifacts
            .prepare()
            .map_err(|e| {
                PipelineError::new(
                    ErrorKind::MediaTool,
                    stage,
                    format!("cannot create working directory: {}", e),
                )
            })?
            .to_path_buf();
        let audio = work_dir.join(EXTRACTED_AUDIO_NAME);
        ctx.track(stage, &audio)?;

        let media = &self.gateways.media;
        let video = ctx.run.video_path.clone();
        let token = ctx.run.cancellation_token();
        let (extracted, duration) = unless_cancelled(&token, async {
            tokio::join!(media.extract_audio(&video, &audio), media.probe_duration(&video))
        })
        .await?;
        extracted.map_err(|e| PipelineError::from_gateway(stage, e))?;

        ctx.run.video_duration_seconds = duration;
        ctx.progress.set_video_duration(duration);
        match duration {
            Some(seconds) => ctx.observer.on_video_duration(&ctx.run.id, seconds),
            None => warn!(
                "Run {}: video duration unknown, using default estimates",
                ctx.run.id
            ),
        }

        self.complete(ctx, stage).await;
        Ok(audio)
    }

    async fn transcribe(&self, ctx: &mut RunContext, audio: &Path) -> Result<String, Interruption> {
        let stage = Stage::Transcribe;
        self.enter(ctx, stage)?;

        let work_dir = ctx.artifacts.work_dir().to_path_buf();
        let transcriber = &self.gateways.transcriber;
        let transcript_path = transcriber.transcript_path(audio, &work_dir);
        ctx.track(stage, &transcript_path)?;

        if !transcriber.is_model_cached(&ctx.run.transcription_model) {
            info!(
                "Run {}: model {} is not cached, it is downloaded before transcribing",
                ctx.run.id, ctx.run.transcription_model
            );
            ctx.observer
                .on_model_loading(&ctx.run.id, &ctx.run.transcription_model);
        }

        let mut process = transcriber
            .launch(audio, &ctx.run.transcription_model, &work_dir)
            .await
            .map_err(|e| PipelineError::from_gateway(stage, e))?;

        let token = ctx.run.cancellation_token();
        let started = Instant::now();
        let exit = loop {
            if token.is_cancelled() {
                info!("Run {}: cancellation requested, stopping transcription", ctx.run.id);
                if let Err(e) = process.terminate(self.config.terminate_grace).await {
                    warn!("Run {}: could not stop transcription: {}", ctx.run.id, e);
                }
                return Err(Interruption::Cancelled);
            }

            match process.poll().await {
                Ok(Some(exit)) => break exit,
                Ok(None) => {}
                Err(e) => {
                    if let Err(stop) = process.terminate(self.config.terminate_grace).await {
                        warn!("Run {}: could not stop transcription: {}", ctx.run.id, stop);
                    }
                    return Err(PipelineError::from_gateway(stage, e).into());
                }
            }

            let sample = ctx.progress.transcription_sample(started.elapsed());
            ctx.observer.on_progress(&ctx.run.id, &sample);
            token.wait_timeout(self.config.poll_interval).await;
        };

        if !exit.success {
            let status = exit
                .code
                .map(|c| format!("status {}", c))
                .unwrap_or_else(|| "a signal".to_string());
            return Err(PipelineError::new(
                ErrorKind::Transcription,
                stage,
                format!("transcription exited with {}: {}", status, exit.stderr),
            )
            .into());
        }

        if !transcript_path.is_file() {
            return Err(PipelineError::new(
                ErrorKind::Transcription,
                stage,
                format!("transcript not found: {}", transcript_path.display()),
            )
            .into());
        }
        let transcript = read_text_file(&transcript_path)
            .map_err(|e| {
                PipelineError::new(
                    ErrorKind::Transcription,
                    stage,
                    format!("cannot read transcript: {}", e),
                )
            })?
            .trim()
            .to_string();
        if transcript.is_empty() {
            return Err(PipelineError::new(
                ErrorKind::Transcription,
                stage,
                "no speech was recognized",
            )
            .into());
        }

        ctx.observer
            .on_language_detected(&ctx.run.id, &ctx.run.source_language);
        ctx.observer.on_transcript(&ctx.run.id, &transcript);
        ctx.run.transcript = Some(transcript.clone());

        self.complete(ctx, stage).await;
        Ok(transcript)
    }

    async fn translate(
        &self,
        ctx: &mut RunContext,
        transcript: &str,
    ) -> Result<String, Interruption> {
        let stage = Stage::Translate;
        self.enter(ctx, stage)?;

        let token = ctx.run.cancellation_token();
        let translated = unless_cancelled(
            &token,
            self.gateways.translator.translate(
                transcript,
                &ctx.run.source_language,
                &ctx.run.target_language,
            ),
        )
        .await?
        .map_err(|e| PipelineError::from_gateway(stage, e))?;
        let translated = translated.trim().to_string();
        if translated.is_empty() {
            return Err(PipelineError::new(
                ErrorKind::Translation,
                stage,
                "translation came back empty",
            )
            .into());
        }
        ctx.run.translated_text = Some(translated.clone());

        self.complete(ctx, stage).await;
        Ok(translated)
    }

    async fn synthesize(&self, ctx: &mut RunContext, text: &str) -> Result<PathBuf, Interruption> {
        let stage = Stage::Synthesize;
        self.enter(ctx, stage)?;

        let synthesizer = &self.gateways.synthesizer;
        let speech = ctx.artifacts.work_dir().join(SPEECH_NAME);
        ctx.track(stage, &speech)?;
        if let Some(script) = synthesizer.script_path(&speech) {
            ctx.track(stage, &script)?;
        }

        let token = ctx.run.cancellation_token();
        let duration = unless_cancelled(
            &token,
            synthesizer.synthesize(
                text,
                &ctx.run.target_language,
                ctx.run.voice_id.as_deref(),
                &speech,
            ),
        )
        .await?
        .map_err(|e| PipelineError::from_gateway(stage, e))?;
        ctx.run.synthesized_audio_duration_seconds = duration;

        match (ctx.run.video_duration_seconds, duration) {
            (Some(video), Some(audio)) if audio > video => info!(
                "Run {}: dubbed audio is {:.2}s longer than the video",
                ctx.run.id,
                audio - video
            ),
            (Some(video), Some(audio)) => info!(
                "Run {}: dubbed audio is {:.2}s shorter than the video",
                ctx.run.id,
                video - audio
            ),
            _ => debug!("Run {}: durations not comparable", ctx.run.id),
        }

        self.complete(ctx, stage).await;
        Ok(speech)
    }

    async fn extend_video(&self, ctx: &mut RunContext) -> Result<PathBuf, Interruption> {
        let stage = Stage::ExtendVideo;
        self.enter(ctx, stage)?;

        let target = ctx.run.synthesized_audio_duration_seconds.ok_or_else(|| {
            PipelineError::unexpected(Some(stage), "extension requested without audio duration")
        })?;
        let file_name = ctx
            .run
            .video_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());
        let extended = ctx.artifacts.work_dir().join(format!("extended_{}", file_name));
        ctx.track(stage, &extended)?;

        let token = ctx.run.cancellation_token();
        unless_cancelled(
            &token,
            self.gateways
                .media
                .extend_video_duration(&ctx.run.video_path, target, &extended),
        )
        .await?
        .map_err(|e| PipelineError::from_gateway(stage, e))?;
        ctx.video_extended = true;

        self.complete(ctx, stage).await;
        Ok(extended)
    }

    async fn merge(
        &self,
        ctx: &mut RunContext,
        video: &Path,
        speech: &Path,
    ) -> Result<PathBuf, Interruption> {
        let stage = Stage::Merge;
        self.enter(ctx, stage)?;

        ensure_directory(&self.config.output_dir).map_err(|e| {
            PipelineError::new(
                ErrorKind::Merge,
                stage,
                format!("cannot create output directory: {}", e),
            )
        })?;
        let output = dubbed_output_path(
            &ctx.run.video_path,
            &self.config.output_dir,
            &ctx.run.target_language,
        );
        if output.parent() != Some(self.config.output_dir.as_path()) {
            return Err(PipelineError::new(
                ErrorKind::Merge,
                stage,
                format!(
                    "refusing to write {} outside {}",
                    output.display(),
                    self.config.output_dir.display()
                ),
            )
            .into());
        }

        let token = ctx.run.cancellation_token();
        unless_cancelled(
            &token,
            self.gateways.media.merge_audio_video(video, speech, &output),
        )
        .await?
        .map_err(|e| PipelineError::from_gateway(stage, e))?;

        if let Err(e) = ctx.artifacts.release(speech) {
            warn!(
                "Run {}: could not release {}: {}",
                ctx.run.id,
                speech.display(),
                e
            );
        }

        self.complete(ctx, stage).await;
        Ok(output)
    }

    async fn purge(&self, ctx: &mut RunContext) -> CleanupReport {
        let started = Instant::now();
        let report = ctx.artifacts.purge();
        for failure in &report.failures {
            warn!("Run {}: cleanup failure: {}", ctx.run.id, failure);
        }
        let status = if report.is_clean() { "success" } else { "partial" };
        self.metrics
            .record_stage(Stage::Cleanup.as_str(), status, started.elapsed().as_secs_f64())
            .await;
        self.metrics
            .record_cleanup_failures(report.failures.len())
            .await;
        report
    }

    async fn finish_success(
        &self,
        mut ctx: RunContext,
        output: PathBuf,
        started: Instant,
    ) -> RunReport {
        ctx.stage = Some(Stage::Cleanup);
        if let Err(e) = ctx.set_state(RunState::CleaningUp) {
            return self
                .finish_interrupted(ctx, Interruption::Failed(e), started)
                .await;
        }
        let cleanup = self.purge(&mut ctx).await;

        if let Err(e) = ctx.run.succeed(output.clone()) {
            error!("Run {}: {}", ctx.run.id, e);
        }
        let summary = RunSummary {
            transcript_words: ctx
                .run
                .transcript
                .as_deref()
                .map(|t| t.split_whitespace().count())
                .unwrap_or(0),
            video_duration_seconds: ctx.run.video_duration_seconds,
            synthesized_audio_duration_seconds: ctx.run.synthesized_audio_duration_seconds,
            video_extended: ctx.video_extended,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            cleanup_failures: cleanup.failures.clone(),
        };

        info!(
            "Run {} succeeded in {:.1}s: {}",
            ctx.run.id,
            summary.elapsed_seconds,
            output.display()
        );
        ctx.observer.on_state_changed(&ctx.run.id, RunState::Succeeded);
        ctx.observer.on_succeeded(&ctx.run.id, &output, &summary);
        ctx.observer.on_finished(&ctx.run.id);

        let outcome = RunOutcome::Succeeded { output, summary };
        self.metrics
            .record_run_finished(outcome.as_str(), started.elapsed().as_secs_f64())
            .await;
        RunReport {
            run: ctx.run,
            outcome,
            cleanup,
        }
    }

    async fn finish_interrupted(
        &self,
        mut ctx: RunContext,
        interruption: Interruption,
        started: Instant,
    ) -> RunReport {
        if let (Some(stage), Interruption::Failed(_)) = (ctx.stage, &interruption) {
            self.metrics
                .record_stage(
                    stage.as_str(),
                    "failed",
                    ctx.stage_started.elapsed().as_secs_f64(),
                )
                .await;
        }

        let terminal = match &interruption {
            Interruption::Failed(err) => {
                if let Err(e) = ctx.run.fail(err.to_string()) {
                    error!("Run {}: {}", ctx.run.id, e);
                }
                RunState::Failed
            }
            Interruption::Cancelled => {
                if let Err(e) = ctx.run.transition(RunState::Cancelled) {
                    error!("Run {}: {}", ctx.run.id, e);
                }
                RunState::Cancelled
            }
        };

        let cleanup = self.purge(&mut ctx).await;
        ctx.observer.on_state_changed(&ctx.run.id, terminal);

        let outcome = match interruption {
            Interruption::Failed(err) => {
                error!("Run {} failed: {}", ctx.run.id, err);
                ctx.observer
                    .on_stage_error(&ctx.run.id, err.kind, &err.detail);
                RunOutcome::Failed(err)
            }
            Interruption::Cancelled => {
                info!("Run {} cancelled", ctx.run.id);
                ctx.observer.on_cancelled(&ctx.run.id);
                RunOutcome::Cancelled
            }
        };
        ctx.observer.on_finished(&ctx.run.id);

        self.metrics
            .record_run_finished(outcome.as_str(), started.elapsed().as_secs_f64())
            .await;
        RunReport {
            run: ctx.run,
            outcome,
            cleanup,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with a non-string payload".to_string()
    }
}
