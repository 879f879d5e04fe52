// Whisper CLI transcription launcher
//
// Runs `whisper <audio> --model <m> --output_format txt --output_dir <dir>`.
// Whisper names its output after the input file, so `recording.wav`
// becomes `<dir>/recording.txt`. Models are downloaded on first use into
// the cache directory as `<model>.pt`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::gateway::process::ChildProcess;
use crate::gateway::{GatewayError, TranscriptionEngine, TranscriptionProcess};

/// Transcription engine backed by the `whisper` command line tool
#[derive(Clone, Debug)]
pub struct WhisperCli {
    command_path: String,
    cache_dir: PathBuf,
}

impl WhisperCli {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            command_path: config.whisper_command.clone(),
            cache_dir: config.whisper_cache_dir.clone(),
        }
    }

    fn build_args(audio: &Path, model: &str, output_dir: &Path) -> Vec<String> {
        vec![
            audio.to_string_lossy().into_owned(),
            "--model".to_string(),
            model.to_string(),
            "--output_format".to_string(),
            "txt".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCli {
    async fn launch(
        &self,
        audio: &Path,
        model: &str,
        output_dir: &Path,
    ) -> Result<Box<dyn TranscriptionProcess>, GatewayError> {
        if model.trim().is_empty() {
            return Err(GatewayError::InvalidInput(
                "transcription model must not be empty".to_string(),
            ));
        }
        let args = Self::build_args(audio, model, output_dir);
        let process = ChildProcess::spawn("whisper transcription", &self.command_path, &args)?;
        Ok(Box::new(process))
    }

    fn transcript_path(&self, audio: &Path, output_dir: &Path) -> PathBuf {
        let stem = audio
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        output_dir.join(format!("{}.txt", stem))
    }

    fn is_model_cached(&self, model: &str) -> bool {
        self.cache_dir.join(format!("{}.pt", model)).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_is_named_after_audio() {
        let cli = WhisperCli::new(&PipelineConfig::default());
        let path = cli.transcript_path(Path::new("/tmp/run/audio.wav"), Path::new("/tmp/run"));
        assert_eq!(path, PathBuf::from("/tmp/run/audio.txt"));
    }

    #[test]
    fn arguments_select_model_and_text_output() {
        let args = WhisperCli::build_args(Path::new("a.wav"), "small", Path::new("out"));
        assert_eq!(
            args,
            vec!["a.wav", "--model", "small", "--output_format", "txt", "--output_dir", "out"]
        );
    }

    #[test]
    fn cached_models_are_found_in_cache_dir() {
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(cache.path().join("small.pt"), "weights").unwrap();
        let cli = WhisperCli::new(&PipelineConfig {
            whisper_cache_dir: cache.path().to_path_buf(),
            ..PipelineConfig::default()
        });

        assert!(cli.is_model_cached("small"));
        assert!(!cli.is_model_cached("large-v3"));
    }

    #[tokio::test]
    async fn empty_model_is_rejected() {
        let cli = WhisperCli::new(&PipelineConfig::default());
        let result = cli.launch(Path::new("a.wav"), " ", Path::new("out")).await;
        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
    }
}
