use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use super::fakes::{
    Event, FakeGateways, FakeMedia, FakeSynthesizer, FakeTranscriber, FakeTranslator, MediaCall,
    RecordingObserver, TranscriptionScript, TranslationScript,
};
use crate::config::PipelineConfig;
use crate::metrics::Metrics;
use crate::pipeline::error::ErrorKind;
use crate::pipeline::orchestrator::{PipelineOrchestrator, RunOutcome, RunReport};
use crate::pipeline::run::{DubbingRequest, PipelineRun, RunState, Stage};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const GRACE: Duration = Duration::from_millis(100);

struct Harness {
    root: TempDir,
    config: Arc<PipelineConfig>,
    video: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let input_dir = root.path().join("input");
        std::fs::create_dir_all(&input_dir).unwrap();
        let video = input_dir.join("talk.mp4");
        std::fs::write(&video, "not really a video").unwrap();

        let config = PipelineConfig {
            temp_dir: root.path().join("temp"),
            output_dir: root.path().join("output"),
            poll_interval: POLL_INTERVAL,
            terminate_grace: GRACE,
            ..PipelineConfig::default()
        };

        Self {
            root,
            config: Arc::new(config),
            video,
        }
    }

    fn request(&self) -> DubbingRequest {
        DubbingRequest {
            video_path: self.video.clone(),
            source_language: "en".to_string(),
            target_language: "ar".to_string(),
            voice_id: None,
            transcription_model: "medium".to_string(),
        }
    }

    fn new_run(&self, id: &str) -> PipelineRun {
        PipelineRun::new(id, self.request())
    }

    fn work_dir(&self, id: &str) -> PathBuf {
        self.config.temp_dir.join(id)
    }

    fn orchestrator(&self, fakes: &FakeGateways) -> PipelineOrchestrator {
        PipelineOrchestrator::new(self.config.clone(), fakes.gateways(), Metrics::disabled())
    }

    async fn run(
        &self,
        fakes: &FakeGateways,
        run: PipelineRun,
    ) -> (RunReport, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::watching(self.work_dir(&run.id)));
        let report = self.orchestrator(fakes).run(run, observer.clone()).await;
        (report, observer)
    }
}

fn assert_finished_once_and_last(observer: &RecordingObserver) {
    let events = observer.events();
    assert_eq!(observer.count(|e| *e == Event::Finished), 1);
    assert_eq!(events.last(), Some(&Event::Finished));

    let terminal = observer.count(|e| {
        matches!(
            e,
            Event::Succeeded(..) | Event::StageError(..) | Event::Cancelled
        )
    });
    assert_eq!(terminal, 1, "exactly one terminal notification: {:?}", events);
}

fn failure_kind(report: &RunReport) -> Option<ErrorKind> {
    match &report.outcome {
        RunOutcome::Failed(err) => Some(err.kind),
        _ => None,
    }
}

#[tokio::test]
async fn dubs_a_video_without_extension() {
    let harness = Harness::new();
    let fakes = FakeGateways::happy_path();
    let (report, observer) = harness.run(&fakes, harness.new_run("happy")).await;

    let expected_output = harness.config.output_dir.join("talk_ar.mp4");
    match &report.outcome {
        RunOutcome::Succeeded { output, summary } => {
            assert_eq!(output, &expected_output);
            assert_eq!(summary.transcript_words, 2);
            assert_eq!(summary.video_duration_seconds, Some(60.0));
            assert_eq!(summary.synthesized_audio_duration_seconds, Some(58.0));
            assert!(!summary.video_extended);
            assert!(summary.cleanup_failures.is_empty());
        }
        other => panic!("expected success, got {:?}", other),
    }

    assert_eq!(report.run.state(), RunState::Succeeded);
    assert_eq!(report.run.final_output_path(), Some(&expected_output));
    assert_eq!(report.run.transcript.as_deref(), Some("Hello world."));
    assert_eq!(report.run.translated_text.as_deref(), Some("مرحبا بالعالم."));
    assert!(expected_output.exists());

    assert_eq!(
        observer.states(),
        vec![
            RunState::ExtractingAudio,
            RunState::Transcribing,
            RunState::Translating,
            RunState::Synthesizing,
            RunState::Merging,
            RunState::CleaningUp,
            RunState::Succeeded,
        ]
    );
    assert!(!fakes
        .media
        .calls()
        .iter()
        .any(|c| matches!(c, MediaCall::Extend { .. })));

    let events = observer.events();
    assert!(events.contains(&Event::VideoDuration(60.0)));
    assert!(events.contains(&Event::Language("en".to_string())));
    assert!(events.contains(&Event::Transcript("Hello world.".to_string())));

    let requests = fakes.translator.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![("Hello world.".to_string(), "en".to_string(), "ar".to_string())]
    );

    assert!(!harness.work_dir("happy").exists());
    assert_eq!(observer.leftover_at_finish(), Some(false));
    assert!(report.cleanup.is_clean());
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn extends_the_video_when_speech_is_longer() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        media: Arc::new(FakeMedia::with_duration(Some(10.0))),
        synthesizer: Arc::new(FakeSynthesizer::with_duration(Some(12.5))),
        ..FakeGateways::happy_path()
    };
    let (report, observer) = harness.run(&fakes, harness.new_run("longer")).await;

    match &report.outcome {
        RunOutcome::Succeeded { summary, .. } => assert!(summary.video_extended),
        other => panic!("expected success, got {:?}", other),
    }
    assert!(observer.states().contains(&RunState::ExtendingVideo));

    let calls = fakes.media.calls();
    assert!(calls.contains(&MediaCall::Extend {
        target_seconds: 12.5
    }));
    let extended = harness.work_dir("longer").join("extended_talk.mp4");
    assert!(calls.contains(&MediaCall::Merge { video: extended }));

    assert!(!harness.work_dir("longer").exists());
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn shorter_speech_or_unknown_durations_skip_extension() {
    for (video, audio) in [(Some(10.0), Some(9.9)), (None, Some(12.5)), (Some(10.0), None)] {
        let harness = Harness::new();
        let fakes = FakeGateways {
            media: Arc::new(FakeMedia::with_duration(video)),
            synthesizer: Arc::new(FakeSynthesizer::with_duration(audio)),
            ..FakeGateways::happy_path()
        };
        let (report, observer) = harness.run(&fakes, harness.new_run("skip")).await;

        assert!(matches!(report.outcome, RunOutcome::Succeeded { .. }));
        assert!(!observer.states().contains(&RunState::ExtendingVideo));
        assert!(calls_merge_original(&fakes, &harness.video));
    }
}

fn calls_merge_original(fakes: &FakeGateways, video: &Path) -> bool {
    fakes.media.calls().contains(&MediaCall::Merge {
        video: video.to_path_buf(),
    })
}

#[tokio::test]
async fn missing_input_fails_before_any_artifact() {
    let harness = Harness::new();
    let fakes = FakeGateways::happy_path();
    let mut request = harness.request();
    request.video_path = harness.video.with_file_name("absent.mp4");
    let run = PipelineRun::new("missing", request);

    let (report, observer) = harness.run(&fakes, run).await;

    assert_eq!(failure_kind(&report), Some(ErrorKind::InputNotFound));
    assert_eq!(report.run.state(), RunState::Failed);
    assert!(report.run.error_detail().unwrap().contains("absent.mp4"));
    assert_eq!(observer.states(), vec![RunState::Failed]);
    assert!(fakes.media.calls().is_empty());
    assert!(!harness.work_dir("missing").exists());
    assert!(report.cleanup.removed.is_empty());
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn cancelling_before_start_creates_nothing() {
    let harness = Harness::new();
    let fakes = FakeGateways::happy_path();
    let run = harness.new_run("early");
    assert!(run.cancellation_token().cancel());

    let (report, observer) = harness.run(&fakes, run).await;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.run.state(), RunState::Cancelled);
    assert_eq!(observer.states(), vec![RunState::Cancelled]);
    assert!(fakes.media.calls().is_empty());
    assert!(!harness.config.temp_dir.join("early").exists());
    assert!(observer.percents().is_empty());
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn cancelling_during_transcription_terminates_the_process() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        transcriber: Arc::new(FakeTranscriber::new(TranscriptionScript::Hang)),
        ..FakeGateways::happy_path()
    };
    let run = harness.new_run("hang");
    let token = run.cancellation_token();
    let observer = Arc::new(RecordingObserver::watching(harness.work_dir("hang")));
    let orchestrator = harness.orchestrator(&fakes);

    let task = {
        let observer = observer.clone();
        tokio::spawn(async move { orchestrator.run(run, observer).await })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while !observer.states().contains(&RunState::Transcribing) {
        assert!(Instant::now() < deadline, "transcription never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Let a few polls happen so progress samples are emitted.
    tokio::time::sleep(POLL_INTERVAL * 3).await;

    let cancelled_at = Instant::now();
    assert!(token.cancel());
    let report = task.await.unwrap();
    let latency = cancelled_at.elapsed();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(fakes.transcriber.was_terminated());
    assert!(
        latency < POLL_INTERVAL + GRACE + Duration::from_millis(500),
        "cancellation took {:?}",
        latency
    );
    assert_eq!(observer.count(|e| matches!(e, Event::StageError(..))), 0);
    assert_eq!(observer.states().last(), Some(&RunState::Cancelled));
    assert!(!harness.work_dir("hang").exists());
    assert_eq!(observer.leftover_at_finish(), Some(false));
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn each_stage_failure_maps_to_its_kind_and_cleans_up() {
    let cases: Vec<(&str, ErrorKind, Box<dyn Fn(&mut FakeGateways)>)> = vec![
        (
            "extract",
            ErrorKind::MediaTool,
            Box::new(|f: &mut FakeGateways| {
                f.media = Arc::new(FakeMedia {
                    video_duration: Some(60.0),
                    fail_extract: true,
                    ..FakeMedia::default()
                })
            }),
        ),
        (
            "launch",
            ErrorKind::Transcription,
            Box::new(|f: &mut FakeGateways| {
                f.transcriber =
                    Arc::new(FakeTranscriber::new(TranscriptionScript::LaunchFailure))
            }),
        ),
        (
            "crash",
            ErrorKind::Transcription,
            Box::new(|f: &mut FakeGateways| f.transcriber = Arc::new(FakeTranscriber::new(TranscriptionScript::Crash))),
        ),
        (
            "no-transcript",
            ErrorKind::Transcription,
            Box::new(|f: &mut FakeGateways| {
                f.transcriber = Arc::new(FakeTranscriber::new(TranscriptionScript::NoOutput))
            }),
        ),
        (
            "translate",
            ErrorKind::Translation,
            Box::new(|f: &mut FakeGateways| f.translator = Arc::new(FakeTranslator::new(TranslationScript::Fail))),
        ),
        (
            "synthesize",
            ErrorKind::Synthesis,
            Box::new(|f: &mut FakeGateways| {
                f.synthesizer = Arc::new(FakeSynthesizer {
                    fail: true,
                    ..FakeSynthesizer::with_duration(Some(58.0))
                })
            }),
        ),
        (
            "extend",
            ErrorKind::VideoExtension,
            Box::new(|f: &mut FakeGateways| {
                f.media = Arc::new(FakeMedia {
                    video_duration: Some(10.0),
                    fail_extend: true,
                    ..FakeMedia::default()
                });
                f.synthesizer = Arc::new(FakeSynthesizer::with_duration(Some(12.5)));
            }),
        ),
        (
            "merge",
            ErrorKind::Merge,
            Box::new(|f: &mut FakeGateways| {
                f.media = Arc::new(FakeMedia {
                    video_duration: Some(60.0),
                    fail_merge: true,
                    ..FakeMedia::default()
                })
            }),
        ),
    ];

    for (name, kind, configure) in cases {
        let harness = Harness::new();
        let mut fakes = FakeGateways::happy_path();
        configure(&mut fakes);

        let (report, observer) = harness.run(&fakes, harness.new_run(name)).await;

        assert_eq!(failure_kind(&report), Some(kind), "case {}", name);
        assert_eq!(report.run.state(), RunState::Failed, "case {}", name);
        assert!(report.run.final_output_path().is_none(), "case {}", name);
        assert!(!harness.work_dir(name).exists(), "case {} left artifacts", name);
        assert_eq!(observer.leftover_at_finish(), Some(false), "case {}", name);
        assert!(
            !harness.config.output_dir.join("talk_ar.mp4").exists(),
            "case {}",
            name
        );
        assert_eq!(
            observer.count(|e| matches!(e, Event::StageError(k, _) if *k == kind)),
            1,
            "case {}",
            name
        );
        assert!(!observer.states().contains(&RunState::CleaningUp), "case {}", name);
        assert_finished_once_and_last(&observer);
    }
}

#[tokio::test]
async fn progress_never_goes_backwards() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        media: Arc::new(FakeMedia::with_duration(Some(10.0))),
        transcriber: Arc::new(FakeTranscriber::new(TranscriptionScript::Succeed {
            polls: 5,
            text: "Hello world.".to_string(),
        })),
        synthesizer: Arc::new(FakeSynthesizer::with_duration(Some(12.5))),
        ..FakeGateways::happy_path()
    };
    let (_report, observer) = harness.run(&fakes, harness.new_run("progress")).await;

    let percents = observer.percents();
    assert!(percents.len() > 10);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.first(), Some(&10));
    assert_eq!(percents.last(), Some(&100));

    let labels: Vec<String> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Progress(sample) => Some(sample.stage_label),
            _ => None,
        })
        .collect();
    assert!(labels.contains(&Stage::Transcribe.label().to_string()));
    assert!(labels.contains(&Stage::ExtendVideo.label().to_string()));
}

#[tokio::test]
async fn a_panicking_stage_is_reported_as_unexpected() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        translator: Arc::new(FakeTranslator::new(TranslationScript::Panic)),
        ..FakeGateways::happy_path()
    };
    let (report, observer) = harness.run(&fakes, harness.new_run("panic")).await;

    match &report.outcome {
        RunOutcome::Failed(err) => {
            assert_eq!(err.kind, ErrorKind::Unexpected);
            assert_eq!(err.stage, Some(Stage::Translate));
            assert!(err.detail.contains("translator exploded"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.run.state(), RunState::Failed);
    assert!(!harness.work_dir("panic").exists());
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn requested_voice_is_passed_through() {
    let harness = Harness::new();
    let fakes = FakeGateways::happy_path();
    let mut request = harness.request();
    request.voice_id = Some("ar-SA-ZariyahNeural".to_string());

    let (report, _observer) = harness
        .run(&fakes, PipelineRun::new("voice", request))
        .await;

    assert!(matches!(report.outcome, RunOutcome::Succeeded { .. }));
    let voices = fakes.synthesizer.voices.lock().unwrap().clone();
    assert_eq!(voices, vec![Some("ar-SA-ZariyahNeural".to_string())]);
}

#[tokio::test]
async fn target_language_cannot_place_files_outside_the_run() {
    let harness = Harness::new();
    let victim = harness.root.path().join("victim.mp3");
    std::fs::write(&victim, "someone else's file").unwrap();
    let fakes = FakeGateways::happy_path();
    let mut request = harness.request();
    request.target_language = "x/../../../victim".to_string();

    let (report, observer) = harness
        .run(&fakes, PipelineRun::new("escape", request))
        .await;

    assert_eq!(failure_kind(&report), Some(ErrorKind::Merge));
    assert!(report.run.error_detail().unwrap().contains("outside"));
    assert!(victim.exists());
    for removed in &report.cleanup.removed {
        assert!(
            removed.starts_with(harness.work_dir("escape")),
            "removed {}",
            removed.display()
        );
    }
    assert!(!fakes
        .media
        .calls()
        .iter()
        .any(|c| matches!(c, MediaCall::Merge { .. })));
    assert!(!harness.work_dir("escape").exists());
    assert_finished_once_and_last(&observer);
}

#[tokio::test]
async fn synthesis_side_file_is_tracked_and_removed() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        synthesizer: Arc::new(FakeSynthesizer {
            uses_script: true,
            ..FakeSynthesizer::with_duration(Some(58.0))
        }),
        ..FakeGateways::happy_path()
    };
    let (report, observer) = harness.run(&fakes, harness.new_run("script")).await;

    assert!(matches!(report.outcome, RunOutcome::Succeeded { .. }));
    let work_dir = harness.work_dir("script");
    assert!(report.cleanup.removed.contains(&work_dir.join("speech.txt")));
    assert!(!work_dir.exists());
    assert_eq!(observer.leftover_at_finish(), Some(false));
}

#[tokio::test]
async fn uncached_model_is_announced_before_transcription() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        transcriber: Arc::new(FakeTranscriber {
            model_cached: false,
            ..FakeTranscriber::succeeding("Hello world.")
        }),
        ..FakeGateways::happy_path()
    };
    let (report, observer) = harness.run(&fakes, harness.new_run("download")).await;

    assert!(matches!(report.outcome, RunOutcome::Succeeded { .. }));
    let events = observer.events();
    let loading = events
        .iter()
        .position(|e| *e == Event::ModelLoading("medium".to_string()))
        .expect("model loading notice");
    let transcript = events
        .iter()
        .position(|e| matches!(e, Event::Transcript(_)))
        .unwrap();
    assert!(loading < transcript);

    let cached = FakeGateways::happy_path();
    let (_report, observer) = harness.run(&cached, harness.new_run("cached")).await;
    assert_eq!(observer.count(|e| matches!(e, Event::ModelLoading(_))), 0);
}

#[tokio::test]
async fn cancelling_during_merge_does_not_wait_for_the_tool() {
    let harness = Harness::new();
    let fakes = FakeGateways {
        media: Arc::new(FakeMedia {
            video_duration: Some(60.0),
            stall_merge: true,
            ..FakeMedia::default()
        }),
        ..FakeGateways::happy_path()
    };
    let run = harness.new_run("stuck");
    let token = run.cancellation_token();
    let observer = Arc::new(RecordingObserver::watching(harness.work_dir("stuck")));
    let orchestrator = harness.orchestrator(&fakes);

    let task = {
        let observer = observer.clone();
        tokio::spawn(async move { orchestrator.run(run, observer).await })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while !observer.states().contains(&RunState::Merging) {
        assert!(Instant::now() < deadline, "merge never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(token.cancel());
    let report = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("cancellation waited for the merge")
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(observer.states().last(), Some(&RunState::Cancelled));
    assert!(!harness.work_dir("stuck").exists());
    assert_finished_once_and_last(&observer);
}
