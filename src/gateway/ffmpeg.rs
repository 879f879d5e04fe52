// ffmpeg / ffprobe media tool
//
// Every call is a bounded external process; the timeouts come from the
// pipeline configuration.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::gateway::process::run_with_timeout;
use crate::gateway::{GatewayError, MediaTool};

/// Media tool backed by the ffmpeg and ffprobe binaries
#[derive(Clone, Debug)]
pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
    extract_timeout: Duration,
    merge_timeout: Duration,
    extend_timeout: Duration,
    probe_timeout: Duration,
}

impl FfmpegTool {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            extract_timeout: config.extract_timeout,
            merge_timeout: config.merge_timeout,
            extend_timeout: config.extend_timeout,
            probe_timeout: config.probe_timeout,
        }
    }

    fn path_arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    async fn ensure_output(output: &Path) -> Result<(), GatewayError> {
        if tokio::fs::metadata(output).await.is_err() {
            return Err(GatewayError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

/// Ask ffprobe for the container duration of `path`
///
/// Shared with the synthesizer, which measures its own output.
pub async fn probe_media_duration(ffprobe: &str, path: &Path, timeout: Duration) -> Option<f64> {
    let args = [
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().into_owned(),
    ];
    match run_with_timeout("ffprobe", ffprobe, &args, timeout).await {
        Ok(output) => parse_duration(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            warn!("Could not probe duration of {}: {}", path.display(), e);
            None
        }
    }
}

fn parse_duration(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), GatewayError> {
        if !video.exists() {
            return Err(GatewayError::InvalidInput(format!(
                "video not found: {}",
                video.display()
            )));
        }
        let args = [
            "-y".to_string(),
            "-i".to_string(),
            Self::path_arg(video),
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            "16000".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            Self::path_arg(output),
        ];
        run_with_timeout("ffmpeg audio extraction", &self.ffmpeg, &args, self.extract_timeout)
            .await?;
        Self::ensure_output(output).await?;
        info!("Extracted audio to {}", output.display());
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let duration = probe_media_duration(&self.ffprobe, path, self.probe_timeout).await;
        debug!("Probed {}: {:?}", path.display(), duration);
        duration
    }

    async fn merge_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), GatewayError> {
        for input in [video, audio] {
            if !input.exists() {
                return Err(GatewayError::InvalidInput(format!(
                    "merge input not found: {}",
                    input.display()
                )));
            }
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args = [
            "-y".to_string(),
            "-i".to_string(),
            Self::path_arg(video),
            "-i".to_string(),
            Self::path_arg(audio),
            "-c:v".to_string(),
            "copy".to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-shortest".to_string(),
            Self::path_arg(output),
        ];
        run_with_timeout("ffmpeg merge", &self.ffmpeg, &args, self.merge_timeout).await?;
        Self::ensure_output(output).await?;
        info!("Merged dubbed audio into {}", output.display());
        Ok(())
    }

    async fn extend_video_duration(
        &self,
        video: &Path,
        target_seconds: f64,
        output: &Path,
    ) -> Result<(), GatewayError> {
        if !target_seconds.is_finite() || target_seconds <= 0.0 {
            return Err(GatewayError::InvalidInput(format!(
                "invalid target duration: {}",
                target_seconds
            )));
        }
        // tpad clones the last frame; merge later trims to the audio with -shortest.
        let args = [
            "-y".to_string(),
            "-i".to_string(),
            Self::path_arg(video),
            "-vf".to_string(),
            format!("tpad=stop_mode=clone:stop_duration={:.3}", target_seconds),
            "-af".to_string(),
            "apad".to_string(),
            "-shortest".to_string(),
            Self::path_arg(output),
        ];
        run_with_timeout("ffmpeg video extension", &self.ffmpeg, &args, self.extend_timeout)
            .await?;
        Self::ensure_output(output).await?;
        info!(
            "Extended video to cover {:.2}s: {}",
            target_seconds,
            output.display()
        );
        Ok(())
    }
}
