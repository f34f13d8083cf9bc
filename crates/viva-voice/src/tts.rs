//! **Text-to-Speech (TTS)**: synthesize interview prompts into audio files.
//!
//! The controller caches whatever a backend returns under the backend's file
//! extension, so a backend must be deterministic enough for that to make sense.

use crate::audio::{encode_wav, PcmAudio, TARGET_SAMPLE_RATE};
use crate::env::{env_first, env_or};
use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Google translate TTS rejects longer `q` values; gTTS splits at 100 characters.
const GOOGLE_MAX_CHARS: usize = 100;

/// Backend that turns text into audio bytes.
pub trait TtsBackend: Send + Sync {
    /// Synthesize `text` spoken in `lang` (ISO-639-1, e.g. "en").
    fn synthesize(&self, text: &str, lang: &str) -> VoiceResult<Vec<u8>>;

    /// File extension of produced audio, without the dot.
    fn extension(&self) -> &'static str;

    /// MIME type of produced audio.
    fn content_type(&self) -> &'static str;
}

/// Which TTS backend to build at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsKind {
    /// Public translate endpoint, no key (what gTTS uses).
    #[default]
    Google,
    OpenAi,
    Placeholder,
}

/// Placeholder TTS: half a second of silence as WAV. Keeps the pipeline runnable offline.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str, _lang: &str) -> VoiceResult<Vec<u8>> {
        let silence = PcmAudio::new(vec![0.0; (TARGET_SAMPLE_RATE / 2) as usize], TARGET_SAMPLE_RATE);
        encode_wav(&silence)
    }

    fn extension(&self) -> &'static str {
        "wav"
    }

    fn content_type(&self) -> &'static str {
        "audio/wav"
    }
}

/// gTTS-compatible backend: Google translate's `translate_tts` endpoint, MP3 out.
/// Long prompts are split on whitespace and the MP3 segments concatenated.
#[derive(Debug, Clone)]
pub struct GoogleTranslateTts {
    /// Base URL, overridable via `GOOGLE_TTS_URL` for tests or mirrors.
    pub base_url: String,
    client: reqwest::blocking::Client,
}

impl GoogleTranslateTts {
    pub fn new(base_url: impl Into<String>) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("Mozilla/5.0 (viva-voice)")
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn from_env() -> VoiceResult<Self> {
        let base_url = env_or("GOOGLE_TTS_URL", "https://translate.google.com/translate_tts");
        Self::new(base_url)
    }
}

impl TtsBackend for GoogleTranslateTts {
    fn synthesize(&self, text: &str, lang: &str) -> VoiceResult<Vec<u8>> {
        let chunks = split_for_tts(text, GOOGLE_MAX_CHARS);
        if chunks.is_empty() {
            return Err(VoiceError::Tts("nothing to synthesize".to_string()));
        }
        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let res = self
                .client
                .get(&self.base_url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", lang),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .map_err(|e| VoiceError::Tts(e.to_string()))?;
            if !res.status().is_success() {
                let status = res.status();
                return Err(VoiceError::Tts(format!("translate_tts error {}", status)));
            }
            let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
            audio.extend_from_slice(&bytes);
        }
        Ok(audio)
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn content_type(&self) -> &'static str {
        "audio/mpeg"
    }
}

/// Production TTS backend: OpenAI-compatible `/audio/speech`.
/// Uses `TTS_API_URL`, `TTS_API_KEY` (or `OPENAI_API_KEY`), `TTS_MODEL` and `TTS_VOICE`.
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// alloy, echo, fable, onyx, nova, shimmer, etc.
    pub voice: String,
    client: reqwest::blocking::Client,
}

impl OpenAiTts {
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = env_or("TTS_API_URL", "https://api.openai.com/v1");
        let api_key = env_first(&["TTS_API_KEY", "OPENAI_API_KEY"])
            .ok_or_else(|| VoiceError::Config("TTS requires TTS_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = env_or("TTS_MODEL", "tts-1");
        let voice = env_or("TTS_VOICE", "alloy");
        Self::new(base_url, api_key, model, voice)
    }

    /// Create with explicit config (e.g. for tests or non-env wiring).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }
}

impl TtsBackend for OpenAiTts {
    // The speech endpoint infers language from the input text.
    fn synthesize(&self, text: &str, _lang: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::Tts("nothing to synthesize".to_string()));
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn content_type(&self) -> &'static str {
        "audio/mpeg"
    }
}

/// Build the TTS backend for `kind`.
pub fn create_tts(kind: TtsKind) -> VoiceResult<Box<dyn TtsBackend>> {
    Ok(match kind {
        TtsKind::Google => Box::new(GoogleTranslateTts::from_env()?),
        TtsKind::OpenAi => Box::new(OpenAiTts::from_env()?),
        TtsKind::Placeholder => Box::new(PlaceholderTts),
    })
}

/// Split on whitespace into chunks of at most `max_chars` characters.
/// A single word longer than `max_chars` becomes its own (oversized) chunk.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let extra = if current.is_empty() { 0 } else { 1 };
        if !current.is_empty() && current.chars().count() + extra + word.chars().count() > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
