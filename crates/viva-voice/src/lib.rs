//! # Viva Voice
//!
//! Audio collaborators for the interview controller. Everything here is a thin,
//! swappable backend behind a trait:
//!
//! ```text
//!  question text ──► TtsBackend ──► mp3/wav bytes ──► (cache + blob upload)
//!
//!  uploaded answer ──► Transcoder ──► 16 kHz mono WAV ──► PcmAudio
//!                                                           │
//!                                     SpeechEngine (lazy) ──► SttBackend ──► text
//! ```

pub mod audio;
pub mod engine;
pub mod env;
pub mod error;
pub mod stt;
pub mod transcode;
pub mod tts;

pub use audio::{decode_wav, encode_wav, resample, PcmAudio, TARGET_SAMPLE_RATE};
pub use engine::SpeechEngine;
pub use env::{env_first, env_or, env_value};
pub use error::{VoiceError, VoiceResult};
pub use stt::{create_stt, OpenAiStt, PlaceholderStt, SttBackend, SttKind};
#[cfg(feature = "whisper")]
pub use stt::WhisperStt;
pub use transcode::{
    create_transcoder, upload_extension, FfmpegTranscoder, Transcoder, TranscoderKind,
    WavTranscoder,
};
pub use tts::{create_tts, GoogleTranslateTts, OpenAiTts, PlaceholderTts, TtsBackend, TtsKind};
