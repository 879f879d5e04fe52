// Dubbing API configuration
//
// This module contains configuration structures and constants for the dubbing service.
// It centralizes all configuration parameters and provides defaults from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default values for configuration
pub mod defaults {
    // Server settings
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: &str = "8181";
    pub const TIMEOUT_SECONDS: u64 = 480;
    pub const KEEPALIVE_SECONDS: u64 = 480;

    // Working and output directories
    pub const TEMP_DIR: &str = "./temp";
    pub const OUTPUT_DIR: &str = "./output";

    // External tools
    pub const FFMPEG_PATH: &str = "ffmpeg";
    pub const FFPROBE_PATH: &str = "ffprobe";
    pub const WHISPER_CMD: &str = "whisper";
    pub const EDGE_TTS_CMD: &str = "edge-tts";

    // Request defaults
    pub const TARGET_LANGUAGE: &str = "ar";
    pub const TRANSCRIPTION_MODEL: &str = "medium";

    // Per-call budgets of the media tool
    pub const EXTRACT_TIMEOUT_SECONDS: u64 = 300;
    pub const MERGE_TIMEOUT_SECONDS: u64 = 600;
    pub const EXTEND_TIMEOUT_SECONDS: u64 = 600;
    pub const PROBE_TIMEOUT_SECONDS: u64 = 30;
    pub const SYNTHESIS_TIMEOUT_SECONDS: u64 = 600;

    // Transcription supervision
    pub const POLL_INTERVAL_MS: u64 = 1000;
    pub const MAX_POLL_INTERVAL_MS: u64 = 1000;
    pub const TERMINATE_GRACE_SECONDS: u64 = 5;

    // Translation backend
    pub const TRANSLATION_API_URL: &str = "https://api.openai.com/v1/chat/completions";
    pub const TRANSLATION_MODEL: &str = "gpt-4o-mini";
    pub const TRANSLATION_CHUNK_CHARS: usize = 2000;
    pub const TRANSLATION_TIMEOUT_SECONDS: u64 = 120;
    pub const TRANSLATION_CHUNK_DELAY_MS: u64 = 1000;

    // Run record retention
    pub const RUN_RETENTION_HOURS: u64 = 48;
    pub const CLEANUP_INTERVAL_MINUTES: u64 = 60;

    // Security
    pub const ENABLE_AUTHORIZATION: bool = true;
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| String::from(default))
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// `WHISPER_CACHE_DIR`, or whisper's own default under the home directory
fn whisper_cache_dir() -> PathBuf {
    match env::var("WHISPER_CACHE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".cache")
            .join("whisper"),
    }
}

/// Tool paths and budgets of the dubbing pipeline
///
/// Built once at startup and shared read-only with the orchestrator.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Root of the per-run working directories
    pub temp_dir: PathBuf,
    /// Where dubbed videos are written
    pub output_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub whisper_command: String,
    /// Where whisper keeps downloaded models (`<dir>/<model>.pt`)
    pub whisper_cache_dir: PathBuf,
    /// Used when a request has no target language
    pub default_target_language: String,
    /// Used when a request has no transcription model
    pub default_transcription_model: String,
    pub extract_timeout: Duration,
    pub merge_timeout: Duration,
    pub extend_timeout: Duration,
    pub probe_timeout: Duration,
    /// Interval between transcription polls, capped at one second
    pub poll_interval: Duration,
    /// How long a terminated transcription may take to exit before it is killed
    pub terminate_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let poll_ms = env_parse("POLL_INTERVAL_MS", defaults::POLL_INTERVAL_MS)
            .clamp(1, defaults::MAX_POLL_INTERVAL_MS);

        Self {
            temp_dir: PathBuf::from(env_string("DUBBING_TMP_DIR", defaults::TEMP_DIR)),
            output_dir: PathBuf::from(env_string("DUBBING_OUTPUT_DIR", defaults::OUTPUT_DIR)),
            ffmpeg_path: env_string("FFMPEG_PATH", defaults::FFMPEG_PATH),
            ffprobe_path: env_string("FFPROBE_PATH", defaults::FFPROBE_PATH),
            whisper_command: env_string("WHISPER_CMD", defaults::WHISPER_CMD),
            whisper_cache_dir: whisper_cache_dir(),
            default_target_language: env_string(
                "DEFAULT_TARGET_LANGUAGE",
                defaults::TARGET_LANGUAGE,
            ),
            default_transcription_model: env_string(
                "DEFAULT_TRANSCRIPTION_MODEL",
                defaults::TRANSCRIPTION_MODEL,
            ),
            extract_timeout: Duration::from_secs(env_parse(
                "EXTRACT_TIMEOUT_SECONDS",
                defaults::EXTRACT_TIMEOUT_SECONDS,
            )),
            merge_timeout: Duration::from_secs(env_parse(
                "MERGE_TIMEOUT_SECONDS",
                defaults::MERGE_TIMEOUT_SECONDS,
            )),
            extend_timeout: Duration::from_secs(env_parse(
                "EXTEND_TIMEOUT_SECONDS",
                defaults::EXTEND_TIMEOUT_SECONDS,
            )),
            probe_timeout: Duration::from_secs(env_parse(
                "PROBE_TIMEOUT_SECONDS",
                defaults::PROBE_TIMEOUT_SECONDS,
            )),
            poll_interval: Duration::from_millis(poll_ms),
            terminate_grace: Duration::from_secs(env_parse(
                "TERMINATE_GRACE_SECONDS",
                defaults::TERMINATE_GRACE_SECONDS,
            )),
        }
    }
}

impl PipelineConfig {
    /// Ensures the working and output directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp_dir)?;
        std::fs::create_dir_all(&self.output_dir)
    }
}

/// Configuration of the chat-completion translator
#[derive(Clone, Debug)]
pub struct TranslatorConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Maximum characters sent in one request
    pub chunk_chars: usize,
    pub request_timeout: Duration,
    /// Pause between two chunk requests
    pub chunk_delay: Duration,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_url: env_string("TRANSLATION_API_URL", defaults::TRANSLATION_API_URL),
            api_key: env::var("TRANSLATION_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: env_string("TRANSLATION_MODEL", defaults::TRANSLATION_MODEL),
            chunk_chars: env_parse("TRANSLATION_CHUNK_CHARS", defaults::TRANSLATION_CHUNK_CHARS)
                .max(1),
            request_timeout: Duration::from_secs(env_parse(
                "TRANSLATION_TIMEOUT_SECONDS",
                defaults::TRANSLATION_TIMEOUT_SECONDS,
            )),
            chunk_delay: Duration::from_millis(defaults::TRANSLATION_CHUNK_DELAY_MS),
        }
    }
}

/// Configuration of the edge-tts synthesizer
#[derive(Clone, Debug)]
pub struct SynthesizerConfig {
    pub command: String,
    pub ffprobe_path: String,
    pub synthesis_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            command: env_string("EDGE_TTS_CMD", defaults::EDGE_TTS_CMD),
            ffprobe_path: env_string("FFPROBE_PATH", defaults::FFPROBE_PATH),
            synthesis_timeout: Duration::from_secs(env_parse(
                "SYNTHESIS_TIMEOUT_SECONDS",
                defaults::SYNTHESIS_TIMEOUT_SECONDS,
            )),
            probe_timeout: Duration::from_secs(env_parse(
                "PROBE_TIMEOUT_SECONDS",
                defaults::PROBE_TIMEOUT_SECONDS,
            )),
        }
    }
}

/// Configuration for the HTTP layer and the run registry
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub host: String,
    pub port: String,
    pub timeout_seconds: u64,
    pub keepalive_seconds: u64,
    /// Number of HTTP workers, 0 means one per CPU
    pub worker_number: usize,
    /// Terminal run records older than this are discarded
    pub run_retention: Duration,
    /// Interval of the retention sweep
    pub cleanup_interval: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            host: env_string("DUBBING_API_HOST", defaults::HOST),
            port: env_string("DUBBING_API_PORT", defaults::PORT),
            timeout_seconds: env_parse("DUBBING_API_TIMEOUT", defaults::TIMEOUT_SECONDS),
            keepalive_seconds: env_parse("DUBBING_API_KEEPALIVE", defaults::KEEPALIVE_SECONDS),
            worker_number: env_parse("HTTP_WORKER_NUMBER", 0),
            run_retention: Duration::from_secs(
                env_parse("RUN_RETENTION_HOURS", defaults::RUN_RETENTION_HOURS) * 3600,
            ),
            cleanup_interval: Duration::from_secs(
                env_parse("CLEANUP_INTERVAL_MINUTES", defaults::CLEANUP_INTERVAL_MINUTES).max(1)
                    * 60,
            ),
        }
    }
}

impl HandlerConfig {
    /// Effective number of HTTP workers
    pub fn workers(&self) -> usize {
        if self.worker_number == 0 {
            num_cpus::get()
        } else {
            self.worker_number
        }
    }
}

/// Whether bearer-token authorization is required
pub fn authorization_enabled() -> bool {
    env_parse("ENABLE_AUTHORIZATION", defaults::ENABLE_AUTHORIZATION)
}

/// Expected bearer token, if one is configured
pub fn api_token() -> Option<String> {
    env::var("DUBBING_API_TOKEN")
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Configuration for metrics collection and export
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Type of metrics exporter ("prometheus", "none")
    pub exporter_type: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            exporter_type: env::var("DUBBING_API_METRICS_BACKEND")
                .or_else(|_| env::var("METRICS_BACKEND"))
                .unwrap_or_else(|_| "none".to_string()),
        }
    }
}
