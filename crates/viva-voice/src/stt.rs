//! **Speech-to-Text (STT)**: turn the normalized answer waveform into text.
//!
//! Implement `SttBackend` for local Whisper (whisper-rs) or a remote OpenAI-compatible
//! transcription API. The interview controller only sees the trait.

use crate::audio::{encode_wav, PcmAudio, TARGET_SAMPLE_RATE};
use crate::env::{env_first, env_or, env_value};
use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};

/// Backend for converting 16 kHz mono PCM to text.
pub trait SttBackend: Send + Sync {
    /// Transcribe one clip. Return an empty string if nothing was detected.
    fn transcribe(&self, audio: &PcmAudio) -> VoiceResult<String>;

    /// Short backend label for logs.
    fn name(&self) -> &'static str;
}

/// Which STT backend to build at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttKind {
    /// Whisper if a model is configured, else the remote API if a key is set, else placeholder.
    #[default]
    Auto,
    Whisper,
    OpenAi,
    Placeholder,
}

/// Placeholder STT: returns a fixed string. Use for exercising the interview loop without Whisper/API.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, audio: &PcmAudio) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[STT placeholder: {} samples, {:.1}s]",
            audio.samples.len(),
            audio.duration().as_secs_f32()
        ))
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// Production STT backend: OpenAI-compatible transcription API.
/// Uses `STT_API_URL` (e.g. https://api.openai.com/v1), `STT_API_KEY`, `STT_MODEL` (default whisper-1)
/// and optional `STT_LANGUAGE`.
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model: whisper-1 or gpt-4o-transcribe, etc.
    pub model: String,
    /// ISO-639-1 hint; None lets the API detect.
    pub language: Option<String>,
    client: reqwest::blocking::Client,
}

impl OpenAiStt {
    /// Build from environment: STT_API_URL, STT_API_KEY (or OPENAI_API_KEY), STT_MODEL, STT_LANGUAGE.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = env_or("STT_API_URL", "https://api.openai.com/v1");
        let api_key = env_first(&["STT_API_KEY", "OPENAI_API_KEY"])
            .ok_or_else(|| VoiceError::Config("STT requires STT_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = env_or("STT_MODEL", "whisper-1");
        let mut stt = Self::new(base_url, api_key, model)?;
        stt.language = env_value("STT_LANGUAGE");
        Ok(stt)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: None,
            client,
        })
    }
}

impl SttBackend for OpenAiStt {
    fn transcribe(&self, audio: &PcmAudio) -> VoiceResult<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }
        let wav = encode_wav(audio)?;
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("answer.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);
        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// -----------------------------------------------------------------------------
// Local Whisper STT (optional feature). Requires whisper.cpp/ggml.
// -----------------------------------------------------------------------------
#[cfg(feature = "whisper")]
mod whisper_stt {
    use super::*;
    use std::sync::Mutex;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Local Whisper STT: loads a ggml model (e.g. ggml-base.en.bin) and runs inference
    /// on CPU. Audio must be 16 kHz mono f32.
    pub struct WhisperStt {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
        language: String,
    }

    impl WhisperStt {
        /// Load the Whisper model from `model_path`.
        pub fn new(model_path: &str, language: &str) -> VoiceResult<Self> {
            let params = WhisperContextParameters::default();
            let context = WhisperContext::new_with_params(model_path, params)
                .map_err(|e| VoiceError::Stt(format!("Whisper load failed: {}", e)))?;
            let state = context
                .create_state()
                .map_err(|e| VoiceError::Stt(format!("Whisper state init failed: {}", e)))?;
            Ok(Self {
                context,
                state: Mutex::new(state),
                language: language.to_string(),
            })
        }

        /// Build from env: `WHISPER_MODEL_PATH` must point to a .bin model file.
        pub fn from_env() -> VoiceResult<Self> {
            let path = env_value("WHISPER_MODEL_PATH")
                .ok_or_else(|| VoiceError::Config("WHISPER_MODEL_PATH not set".to_string()))?;
            Self::new(&path, &env_or("STT_LANGUAGE", "en"))
        }
    }

    impl SttBackend for WhisperStt {
        fn transcribe(&self, audio: &PcmAudio) -> VoiceResult<String> {
            if audio.is_empty() {
                return Ok(String::new());
            }
            if audio.sample_rate != TARGET_SAMPLE_RATE {
                return Err(VoiceError::Stt(format!(
                    "Whisper expects {} Hz; got {} Hz",
                    TARGET_SAMPLE_RATE, audio.sample_rate
                )));
            }
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(Some(self.language.as_str()));

            let mut state = self
                .state
                .lock()
                .map_err(|e| VoiceError::Stt(format!("Whisper lock poisoned: {}", e)))?;
            state
                .full(&params, &audio.samples)
                .map_err(|e| VoiceError::Stt(format!("Whisper inference failed: {}", e)))?;
            let text = state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            Ok(text)
        }

        fn name(&self) -> &'static str {
            "whisper"
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_stt::WhisperStt;

/// Build the STT backend for `kind`. `Auto` priority: Whisper (feature + `WHISPER_MODEL_PATH`),
/// then the remote API (`STT_API_KEY` / `OPENAI_API_KEY`), then the placeholder.
pub fn create_stt(kind: SttKind) -> VoiceResult<Box<dyn SttBackend>> {
    match kind {
        SttKind::Placeholder => Ok(Box::new(PlaceholderStt::new())),
        SttKind::OpenAi => Ok(Box::new(OpenAiStt::from_env()?)),
        SttKind::Whisper => create_whisper(),
        SttKind::Auto => {
            if env_value("WHISPER_MODEL_PATH").is_some() {
                match create_whisper() {
                    Ok(w) => return Ok(w),
                    Err(e) => tracing::warn!("Whisper unavailable, falling back: {}", e),
                }
            }
            if let Ok(open) = OpenAiStt::from_env() {
                return Ok(Box::new(open));
            }
            Ok(Box::new(PlaceholderStt::new()))
        }
    }
}

#[cfg(feature = "whisper")]
fn create_whisper() -> VoiceResult<Box<dyn SttBackend>> {
    Ok(Box::new(whisper_stt::WhisperStt::from_env()?))
}

#[cfg(not(feature = "whisper"))]
fn create_whisper() -> VoiceResult<Box<dyn SttBackend>> {
    Err(VoiceError::Config(
        "built without the `whisper` feature".to_string(),
    ))
}
