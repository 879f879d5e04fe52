// Dubbing pipeline
//
// A run turns one video into a dubbed copy: extract the audio, transcribe it,
// translate the transcript, synthesize speech, pad the video if the speech is
// longer, and mux the new audio track in.

pub mod artifacts;
pub mod cancellation;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod progress;
pub mod run;

#[cfg(test)]
pub(crate) mod tests;

pub use artifacts::{CleanupReport, TempArtifactSet};
pub use cancellation::CancellationToken;
pub use error::{ErrorKind, PipelineError};
pub use observer::{NoopObserver, RunObserver, RunSummary};
pub use orchestrator::{PipelineOrchestrator, RunOutcome, RunReport};
pub use progress::{ProgressEstimator, ProgressSample};
pub use run::{DubbingRequest, PipelineRun, RunState, Stage};
