// edge-tts speech synthesis
//
// Runs `edge-tts --voice <v> --file <script> --write-media <out>` and measures
// the produced file with ffprobe. The text goes through a file because a long
// transcript does not fit in a single command line argument.

use async_trait::async_trait;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SynthesizerConfig;
use crate::gateway::ffmpeg::probe_media_duration;
use crate::gateway::process::run_with_timeout;
use crate::gateway::translator::clean_arabic_text;
use crate::gateway::{GatewayError, Synthesizer};

/// Voice used when nothing better is known
pub const FALLBACK_VOICE: &str = "en-US-JennyNeural";

/// Default voice for a language code, the English voice for anything unknown
pub fn default_voice(language: &str) -> &'static str {
    match language {
        "ar" => "ar-SA-HamedNeural",
        "fr" => "fr-FR-DeniseNeural",
        "es" => "es-ES-ElviraNeural",
        "de" => "de-DE-KatjaNeural",
        _ => FALLBACK_VOICE,
    }
}

/// Synthesizer backed by the `edge-tts` command line tool
#[derive(Clone, Debug)]
pub struct EdgeTtsSynthesizer {
    command: String,
    ffprobe: String,
    synthesis_timeout: Duration,
    probe_timeout: Duration,
}

impl EdgeTtsSynthesizer {
    pub fn new(config: &SynthesizerConfig) -> Self {
        Self {
            command: config.command.clone(),
            ffprobe: config.ffprobe_path.clone(),
            synthesis_timeout: config.synthesis_timeout,
            probe_timeout: config.probe_timeout,
        }
    }

    fn build_args(voice: &str, script: &Path, output: &Path) -> Vec<String> {
        vec![
            "--voice".to_string(),
            voice.to_string(),
            "--file".to_string(),
            script.to_string_lossy().into_owned(),
            "--write-media".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Synthesizer for EdgeTtsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        target_language: &str,
        voice: Option<&str>,
        output: &Path,
    ) -> Result<Option<f64>, GatewayError> {
        let text = if target_language == "ar" {
            clean_arabic_text(text)
        } else {
            text.trim().to_string()
        };
        if text.is_empty() {
            return Err(GatewayError::InvalidInput(
                "nothing to synthesize".to_string(),
            ));
        }

        let voice = match voice {
            Some(v) if !v.trim().is_empty() => v.to_string(),
            _ => default_voice(target_language).to_string(),
        };
        info!("Synthesizing {} characters with voice {}", text.chars().count(), voice);

        let script = self
            .script_path(output)
            .ok_or_else(|| GatewayError::InvalidInput(format!("bad output path: {}", output.display())))?;
        tokio::fs::write(&script, text.as_bytes()).await?;

        let args = Self::build_args(&voice, &script, output);
        run_with_timeout("edge-tts synthesis", &self.command, &args, self.synthesis_timeout).await?;

        if tokio::fs::metadata(output).await.is_err() {
            return Err(GatewayError::MissingOutput(output.to_path_buf()));
        }

        let duration = probe_media_duration(&self.ffprobe, output, self.probe_timeout).await;
        if duration.is_none() {
            warn!("Synthesized audio duration unknown: {}", output.display());
        }
        Ok(duration)
    }

    fn script_path(&self, output: &Path) -> Option<PathBuf> {
        output.file_name().map(|_| output.with_extension("txt"))
    }
}
