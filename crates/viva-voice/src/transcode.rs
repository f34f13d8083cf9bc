//! Transcoding uploaded answers into the 16 kHz mono PCM16 WAV the STT engines expect.
//!
//! Scratch files live in a per-call `TempDir`; it is removed when dropped, so every
//! exit path (including a cancelled request) cleans up.

use crate::audio::{decode_wav, encode_wav, resample, TARGET_SAMPLE_RATE};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Normalizes arbitrary uploaded audio into 16 kHz mono PCM16 WAV bytes.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// `extension` is the upload's file extension (no dot), used as an input format hint.
    async fn to_wav(&self, input: &[u8], extension: &str) -> VoiceResult<Vec<u8>>;
}

/// Which transcoder to build at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscoderKind {
    #[default]
    Ffmpeg,
    /// In-process; accepts WAV uploads only.
    Wav,
}

/// Shells out to ffmpeg: `-ar 16000 -ac 1 -c:a pcm_s16le`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `ffmpeg -version` and return its first line.
    pub async fn probe(&self) -> VoiceResult<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VoiceError::Transcode(format!("{} not runnable: {}", self.binary.display(), e)))?;
        if !output.status.success() {
            return Err(VoiceError::Transcode(format!(
                "{} -version exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_wav(&self, input: &[u8], extension: &str) -> VoiceResult<Vec<u8>> {
        let scratch = tempfile::Builder::new().prefix("viva-answer-").tempdir()?;
        let input_path = scratch.path().join(format!("input.{}", extension));
        let output_path = scratch.path().join("normalized.wav");
        tokio::fs::write(&input_path, input).await?;

        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(&input_path)
            .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le"])
            .arg(&output_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VoiceError::Transcode(format!("failed to run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            let detail = tail.into_iter().rev().collect::<Vec<_>>().join(" | ");
            warn!("ffmpeg failed ({}): {}", output.status, detail);
            return Err(VoiceError::Transcode(format!("ffmpeg exited with {}: {}", output.status, detail)));
        }

        let wav = tokio::fs::read(&output_path).await?;
        info!(bytes = wav.len(), "ffmpeg conversion ok");
        Ok(wav)
    }
}

/// In-process transcoder for WAV uploads: mixdown to mono, resample to 16 kHz, re-encode PCM16.
#[derive(Debug, Clone, Default)]
pub struct WavTranscoder;

#[async_trait]
impl Transcoder for WavTranscoder {
    async fn to_wav(&self, input: &[u8], extension: &str) -> VoiceResult<Vec<u8>> {
        debug!(extension, bytes = input.len(), "normalizing WAV upload in-process");
        let pcm = decode_wav(input)
            .map_err(|e| VoiceError::Transcode(format!("not a readable WAV upload: {}", e)))?;
        let pcm = resample(&pcm, TARGET_SAMPLE_RATE)?;
        encode_wav(&pcm)
    }
}

/// Build the transcoder for `kind`.
pub fn create_transcoder(kind: TranscoderKind, ffmpeg_path: &str) -> Box<dyn Transcoder> {
    match kind {
        TranscoderKind::Ffmpeg => Box::new(FfmpegTranscoder::new(ffmpeg_path)),
        TranscoderKind::Wav => Box::new(WavTranscoder),
    }
}

/// Extension of an uploaded file name, lower-cased and restricted to short alphanumerics.
/// Falls back to "bin" so it is always safe inside paths and storage keys.
pub fn upload_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}
