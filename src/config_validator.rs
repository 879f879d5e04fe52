// Configuration validation module for the dubbing API
//
// Schema-driven validation of every environment parameter the service reads.
// `CONFIG_PARAMS` is the single registry of names, types, defaults and ranges;
// the typed settings themselves are built in `config`.

use std::env;
use std::net::IpAddr;
use std::str::FromStr;

use log::{error, info, warn};
use thiserror::Error;

/// Configuration parameter types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigType {
    String,
    UnsignedInteger,
    Boolean,
    IpAddress,
    Port,
    Url,
    Enum(&'static [&'static str]),
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must be valid for application to start
    Standard, // Important but application can start with defaults
    Warning,  // Optional, generates warnings only
}

/// Configuration parameter definition
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: &'static str,
    pub description: &'static str,
    pub param_type: ConfigType,
    pub default_value: Option<&'static str>,
    pub validation_level: ValidationLevel,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
}

const fn param(
    name: &'static str,
    description: &'static str,
    param_type: ConfigType,
    default_value: Option<&'static str>,
    validation_level: ValidationLevel,
) -> ConfigParam {
    ConfigParam {
        name,
        description,
        param_type,
        default_value,
        validation_level,
        min_value: None,
        max_value: None,
    }
}

const fn ranged(
    name: &'static str,
    description: &'static str,
    default_value: &'static str,
    min: u64,
    max: u64,
) -> ConfigParam {
    ConfigParam {
        name,
        description,
        param_type: ConfigType::UnsignedInteger,
        default_value: Some(default_value),
        validation_level: ValidationLevel::Standard,
        min_value: Some(min),
        max_value: Some(max),
    }
}

const METRICS_BACKENDS: &[&str] = &["prometheus", "none", "disabled"];

/// Centralized configuration parameter registry
pub const CONFIG_PARAMS: &[ConfigParam] = &[
    // Server
    param("DUBBING_API_HOST", "Host IP address for the API server", ConfigType::IpAddress, Some("127.0.0.1"), ValidationLevel::Critical),
    param("DUBBING_API_PORT", "Port for the API server", ConfigType::Port, Some("8181"), ValidationLevel::Critical),
    ranged("DUBBING_API_TIMEOUT", "HTTP client disconnect timeout in seconds", "480", 1, 3600),
    ranged("DUBBING_API_KEEPALIVE", "Keep-alive timeout in seconds", "480", 1, 3600),
    ranged("HTTP_WORKER_NUMBER", "Number of HTTP workers (0 = use CPU cores)", "0", 0, 64),
    param("ENABLE_AUTHORIZATION", "Require a bearer token on every request", ConfigType::Boolean, Some("true"), ValidationLevel::Critical),
    param("DUBBING_API_TOKEN", "Expected bearer token; any token is accepted when unset", ConfigType::String, None, ValidationLevel::Warning),
    param("DUBBING_API_METRICS_BACKEND", "Metrics backend", ConfigType::Enum(METRICS_BACKENDS), Some("none"), ValidationLevel::Standard),
    // Directories
    param("DUBBING_TMP_DIR", "Root of the per-run working directories", ConfigType::String, Some("./temp"), ValidationLevel::Critical),
    param("DUBBING_OUTPUT_DIR", "Directory receiving dubbed videos", ConfigType::String, Some("./output"), ValidationLevel::Critical),
    // External tools
    param("FFMPEG_PATH", "ffmpeg executable", ConfigType::String, Some("ffmpeg"), ValidationLevel::Standard),
    param("FFPROBE_PATH", "ffprobe executable", ConfigType::String, Some("ffprobe"), ValidationLevel::Standard),
    param("WHISPER_CMD", "Whisper command line executable", ConfigType::String, Some("whisper"), ValidationLevel::Standard),
    param("WHISPER_CACHE_DIR", "Directory of downloaded whisper models", ConfigType::String, None, ValidationLevel::Standard),
    param("EDGE_TTS_CMD", "edge-tts executable", ConfigType::String, Some("edge-tts"), ValidationLevel::Standard),
    // Request defaults
    param("DEFAULT_TARGET_LANGUAGE", "Target language when a request names none", ConfigType::String, Some("ar"), ValidationLevel::Standard),
    param("DEFAULT_TRANSCRIPTION_MODEL", "Whisper model when a request names none", ConfigType::String, Some("medium"), ValidationLevel::Standard),
    // Timeouts
    ranged("EXTRACT_TIMEOUT_SECONDS", "Audio extraction timeout", "300", 1, 86400),
    ranged("MERGE_TIMEOUT_SECONDS", "Audio/video merge timeout", "600", 1, 86400),
    ranged("EXTEND_TIMEOUT_SECONDS", "Video extension timeout", "600", 1, 86400),
    ranged("PROBE_TIMEOUT_SECONDS", "Duration probe timeout", "30", 1, 3600),
    ranged("SYNTHESIS_TIMEOUT_SECONDS", "Speech synthesis timeout", "600", 1, 86400),
    ranged("POLL_INTERVAL_MS", "Transcription polling interval in milliseconds", "1000", 1, 1000),
    ranged("TERMINATE_GRACE_SECONDS", "Grace period before a stopped process is killed", "5", 0, 300),
    // Translation
    param("TRANSLATION_API_URL", "OpenAI-compatible chat completions endpoint", ConfigType::Url, Some("https://api.openai.com/v1/chat/completions"), ValidationLevel::Critical),
    param("TRANSLATION_API_KEY", "API key for the translation endpoint", ConfigType::String, None, ValidationLevel::Warning),
    param("TRANSLATION_MODEL", "Chat model used for translation", ConfigType::String, Some("gpt-4o-mini"), ValidationLevel::Standard),
    ranged("TRANSLATION_CHUNK_CHARS", "Longest text sent in one translation request", "2000", 100, 100000),
    ranged("TRANSLATION_TIMEOUT_SECONDS", "Timeout of one translation request", "120", 1, 3600),
    // Retention
    ranged("RUN_RETENTION_HOURS", "Hours a finished run stays queryable", "48", 1, 8760),
    ranged("CLEANUP_INTERVAL_MINUTES", "Minutes between retention sweeps", "60", 1, 10080),
];

/// Configuration validation errors with detailed context
#[derive(Error, Debug, Clone)]
#[error(
    "Configuration error in '{}' ({:?}): {} (value: '{}'){}",
    .field,
    .error_type,
    .message,
    .value,
    suggestion_suffix(.suggestion)
)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub error_type: ConfigErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" - Suggestion: {}", s))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErrorType {
    InvalidValue,
    InvalidFormat,
    InvalidRange,
    Missing,
}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Configuration validation results
#[derive(Debug, Default)]
pub struct ValidationResults {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResults {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn add(&mut self, level: ValidationLevel, error: ConfigValidationError) {
        match level {
            ValidationLevel::Critical | ValidationLevel::Standard => self.errors.push(error),
            ValidationLevel::Warning => self.warnings.push(error),
        }
    }

    pub fn print_summary(&self) {
        if !self.errors.is_empty() {
            error!(
                "Configuration validation found {} error(s):",
                self.errors.len()
            );
            for (i, err) in self.errors.iter().enumerate() {
                error!("  {}. {}", i + 1, err);
            }
        }

        if !self.warnings.is_empty() {
            warn!(
                "Configuration validation found {} warning(s):",
                self.warnings.len()
            );
            for (i, warning) in self.warnings.iter().enumerate() {
                warn!("  {}. {}", i + 1, warning);
            }
        }

        if self.is_valid() && self.warnings.is_empty() {
            info!("Configuration validation passed successfully");
        } else if self.is_valid() {
            info!(
                "Configuration validation passed with {} warning(s)",
                self.warnings.len()
            );
        }
    }
}

/// Helper functions for common validation patterns
pub mod validators {
    use super::*;

    fn invalid(
        field: &str,
        value: &str,
        error_type: ConfigErrorType,
        message: String,
        suggestion: &str,
    ) -> ConfigValidationError {
        ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            error_type,
            message,
            suggestion: Some(suggestion.to_string()),
        }
    }

    /// Validate boolean values from string
    pub fn validate_boolean(field: &str, value: &str) -> ValidationResult<bool> {
        // `config` parses with `bool::from_str`, so only these two spellings work
        value.parse::<bool>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Invalid boolean value".to_string(),
                "Use 'true' or 'false'",
            )
        })
    }

    /// Validate unsigned integer values with optional range
    pub fn validate_unsigned(
        field: &str,
        value: &str,
        min: Option<u64>,
        max: Option<u64>,
    ) -> ValidationResult<u64> {
        let parsed = value.parse::<u64>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid unsigned integer format".to_string(),
                "Use a valid positive integer number",
            )
        })?;

        if let Some(min) = min.filter(|min| parsed < *min) {
            return Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                format!("Value {} is below minimum {}", parsed, min),
                &format!("Use a value >= {}", min),
            ));
        }
        if let Some(max) = max.filter(|max| parsed > *max) {
            return Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                format!("Value {} is above maximum {}", parsed, max),
                &format!("Use a value <= {}", max),
            ));
        }
        Ok(parsed)
    }

    /// Validate enumerated values, case-insensitively
    pub fn validate_enum(field: &str, value: &str, valid_values: &[&str]) -> ValidationResult<String> {
        let lowered = value.to_lowercase();
        if valid_values.iter().any(|v| v.to_lowercase() == lowered) {
            Ok(value.to_string())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                format!("Invalid value, must be one of: {}", valid_values.join(", ")),
                &format!("Use one of: {}", valid_values.join(", ")),
            ))
        }
    }

    /// Validate IP address
    pub fn validate_ip_address(field: &str, value: &str) -> ValidationResult<IpAddr> {
        IpAddr::from_str(value).map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid IP address format".to_string(),
                "Use a valid IPv4 or IPv6 address (e.g., 127.0.0.1 or ::1)",
            )
        })
    }

    /// Validate port number
    pub fn validate_port(field: &str, value: &str) -> ValidationResult<u16> {
        match value.parse::<u16>() {
            Ok(0) => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                "Port number cannot be 0".to_string(),
                "Use a port between 1 and 65535",
            )),
            Ok(port) => Ok(port),
            Err(_) => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid port number format".to_string(),
                "Use a number between 1 and 65535",
            )),
        }
    }

    /// Validate an http(s) URL
    pub fn validate_url(field: &str, value: &str) -> ValidationResult<String> {
        let has_host = value
            .strip_prefix("https://")
            .or_else(|| value.strip_prefix("http://"))
            .map(|rest| !rest.is_empty() && !rest.starts_with('/'))
            .unwrap_or(false);
        if has_host {
            Ok(value.to_string())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid URL".to_string(),
                "Use an absolute http:// or https:// URL",
            ))
        }
    }

    /// Reject blank strings
    pub fn validate_non_empty(field: &str, value: &str) -> ValidationResult<String> {
        if value.trim().is_empty() {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Value must not be blank".to_string(),
                "Remove the variable to use the default",
            ))
        } else {
            Ok(value.to_string())
        }
    }
}

/// Configuration validator for the dubbing API
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate every registered parameter against the process environment
    pub fn validate_all() -> ValidationResults {
        info!("Starting configuration validation...");
        let results = Self::validate_with(|name| env::var(name).ok(), |_| true);
        results.print_summary();
        results
    }

    /// Quick validation for critical parameters only (fail-fast)
    pub fn validate_critical() -> Result<(), ValidationResults> {
        info!("Running critical configuration validation...");
        let results = Self::validate_with(
            |name| env::var(name).ok(),
            |param| param.validation_level == ValidationLevel::Critical,
        );
        if results.is_valid() {
            Ok(())
        } else {
            results.print_summary();
            Err(results)
        }
    }

    /// Validate the parameters selected by `filter`, reading values through `lookup`
    pub fn validate_with(
        lookup: impl Fn(&str) -> Option<String>,
        filter: impl Fn(&ConfigParam) -> bool,
    ) -> ValidationResults {
        let mut results = ValidationResults::default();

        for param in CONFIG_PARAMS.iter().filter(|p| filter(p)) {
            match lookup(param.name) {
                Some(value) => {
                    if let Err(error) = Self::validate_parameter(param, &value) {
                        results.add(param.validation_level, error);
                    }
                }
                None if param.default_value.is_none()
                    && param.validation_level == ValidationLevel::Warning =>
                {
                    results.add(
                        ValidationLevel::Warning,
                        ConfigValidationError {
                            field: param.name.to_string(),
                            value: String::new(),
                            error_type: ConfigErrorType::Missing,
                            message: format!("Not set: {}", param.description),
                            suggestion: Some(format!("Set {} if needed", param.name)),
                        },
                    );
                }
                None => {}
            }
        }

        Self::validate_cross_dependencies(&lookup, &mut results);
        results
    }

    /// Validate a single parameter value
    fn validate_parameter(param: &ConfigParam, value: &str) -> ValidationResult<()> {
        match param.param_type {
            ConfigType::String => validators::validate_non_empty(param.name, value).map(drop),
            ConfigType::UnsignedInteger => {
                validators::validate_unsigned(param.name, value, param.min_value, param.max_value)
                    .map(drop)
            }
            ConfigType::Boolean => validators::validate_boolean(param.name, value).map(drop),
            ConfigType::IpAddress => validators::validate_ip_address(param.name, value).map(drop),
            ConfigType::Port => validators::validate_port(param.name, value).map(drop),
            ConfigType::Url => validators::validate_url(param.name, value).map(drop),
            ConfigType::Enum(valid_values) => {
                validators::validate_enum(param.name, value, valid_values).map(drop)
            }
        }
    }

    /// Validate cross-parameter dependencies
    fn validate_cross_dependencies(
        lookup: &impl Fn(&str) -> Option<String>,
        results: &mut ValidationResults,
    ) {
        let authorization = lookup("ENABLE_AUTHORIZATION")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);
        if authorization && lookup("DUBBING_API_TOKEN").is_none() {
            results.add(
                ValidationLevel::Warning,
                ConfigValidationError {
                    field: "DUBBING_API_TOKEN".to_string(),
                    value: String::new(),
                    error_type: ConfigErrorType::Missing,
                    message: "Authorization is enabled but no token is configured".to_string(),
                    suggestion: Some(
                        "Set DUBBING_API_TOKEN or disable ENABLE_AUTHORIZATION".to_string(),
                    ),
                },
            );
        }
    }

    /// Generate a sample configuration file with all parameters and descriptions
    pub fn generate_sample_config() -> String {
        let mut output = String::new();
        output.push_str("# Dubbing API Configuration File\n");
        output.push_str("# Environment variables take precedence over this file\n");

        for param in CONFIG_PARAMS {
            output.push_str(&format!("\n# {}\n", param.description));
            match (param.default_value, param.param_type) {
                (Some(default), ConfigType::UnsignedInteger | ConfigType::Boolean | ConfigType::Port) => {
                    output.push_str(&format!("{} = {}\n", param.name, default));
                }
                (Some(default), _) => {
                    output.push_str(&format!("{} = \"{}\"\n", param.name, default));
                }
                (None, _) => output.push_str(&format!("# {} = \"\"\n", param.name)),
            }
        }
        output
    }
}
