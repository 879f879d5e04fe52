// Dubbing API Library
//
// HTTP service that dubs videos: the audio track is transcribed, translated,
// re-spoken with text-to-speech and muxed back into the video. Runs are queued
// and executed one at a time by a cancellable pipeline.

pub mod config;
pub mod config_loader;
pub mod config_validator;
pub mod error;
pub mod file_utils;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod run_manager;

// Re-export common types for easier access
pub use config::{HandlerConfig, MetricsConfig, PipelineConfig};
pub use error::HandlerError;
pub use metrics::Metrics;
pub use models::{DubbingRequestBody, DubbingResponse, ErrorResponse};
pub use pipeline::{PipelineOrchestrator, RunObserver, RunOutcome};
pub use run_manager::{QueueError, RunManager};
