//! Turning a normalized answer clip into text, with one retry on an empty result.

use crate::model::AnswerStatus;
use std::time::Duration;
use tracing::{debug, warn};
use viva_voice::{PcmAudio, SpeechEngine};

pub const NO_SPEECH_TEXT: &str = "(Could not detect speech)";
pub const FAILED_TEXT: &str = "(Transcription failed)";

/// Minimum clip lengths fed to the engine: the first pass, then the retry after an
/// empty result. Answers longer than a window are passed through whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionWindows {
    pub first_pass: Duration,
    pub retry: Duration,
}

impl Default for TranscriptionWindows {
    fn default() -> Self {
        Self {
            first_pass: Duration::from_secs(15),
            retry: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    pub status: AnswerStatus,
}

impl Transcription {
    fn ok(text: String) -> Self {
        Self { text, status: AnswerStatus::Ok }
    }

    fn error(text: &str) -> Self {
        Self {
            text: text.to_string(),
            status: AnswerStatus::Error,
        }
    }
}

/// Blocking. Never fails: engine errors and silence become an `error` transcription.
pub fn transcribe_answer(engine: &SpeechEngine, pcm: &PcmAudio, windows: TranscriptionWindows) -> Transcription {
    let backend = match engine.get() {
        Ok(b) => b,
        Err(e) => {
            warn!("speech engine unavailable: {}", e);
            return Transcription::error(FAILED_TEXT);
        }
    };

    let first = backend.transcribe(&pcm.pad_to_window(windows.first_pass));
    let text = match first {
        Ok(text) if !text.trim().is_empty() => return Transcription::ok(text.trim().to_string()),
        Ok(_) => {
            debug!(
                backend = backend.name(),
                retry_secs = windows.retry.as_secs(),
                "empty transcription, retrying with longer window"
            );
            backend.transcribe(&pcm.pad_to_window(windows.retry))
        }
        Err(e) => Err(e),
    };

    match text {
        Ok(text) if !text.trim().is_empty() => Transcription::ok(text.trim().to_string()),
        Ok(_) => Transcription::error(NO_SPEECH_TEXT),
        Err(e) => {
            warn!(backend = backend.name(), "transcription failed: {}", e);
            Transcription::error(FAILED_TEXT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use viva_voice::{SttBackend, VoiceError, VoiceResult};

    /// Replays scripted results and records each clip's duration.
    struct Scripted {
        replies: Mutex<VecDeque<VoiceResult<String>>>,
        seen: Arc<Mutex<Vec<Duration>>>,
    }

    impl SttBackend for Scripted {
        fn transcribe(&self, audio: &PcmAudio) -> VoiceResult<String> {
            self.seen.lock().unwrap().push(audio.duration());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn engine(replies: Vec<VoiceResult<String>>) -> (SpeechEngine, Arc<Mutex<Vec<Duration>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let backend = Scripted {
            replies: Mutex::new(replies.into()),
            seen: seen.clone(),
        };
        (SpeechEngine::with_backend(Arc::new(backend)), seen)
    }

    fn clip() -> PcmAudio {
        PcmAudio::new(vec![0.1; 16_000], 16_000)
    }

    #[test]
    fn first_pass_hit_does_not_retry() {
        let (engine, seen) = engine(vec![Ok(" five years ".to_string())]);
        let t = transcribe_answer(&engine, &clip(), TranscriptionWindows::default());
        assert_eq!(t, Transcription::ok("five years".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec![Duration::from_secs(15)]);
    }

    #[test]
    fn empty_result_retries_with_longer_window() {
        let (engine, seen) = engine(vec![Ok(String::new()), Ok("Bangalore".to_string())]);
        let t = transcribe_answer(&engine, &clip(), TranscriptionWindows::default());
        assert_eq!(t.status, AnswerStatus::Ok);
        assert_eq!(t.text, "Bangalore");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Duration::from_secs(15), Duration::from_secs(30)]
        );
    }

    #[test]
    fn long_answer_reaches_the_engine_whole() {
        // 20 s clip, silent for the first 16 s.
        let mut samples = vec![0.0; 16 * 16_000];
        samples.extend(vec![0.3; 4 * 16_000]);
        let long = PcmAudio::new(samples, 16_000);

        let seen = Arc::new(Mutex::new(Vec::new()));
        struct HearsTail(Arc<Mutex<Vec<Duration>>>);
        impl SttBackend for HearsTail {
            fn transcribe(&self, audio: &PcmAudio) -> VoiceResult<String> {
                self.0.lock().unwrap().push(audio.duration());
                let tail_start = 16 * audio.sample_rate as usize;
                let heard = audio.samples.iter().skip(tail_start).any(|s| *s != 0.0);
                Ok(if heard { "late start".to_string() } else { String::new() })
            }

            fn name(&self) -> &'static str {
                "hears-tail"
            }
        }
        let engine = SpeechEngine::with_backend(Arc::new(HearsTail(seen.clone())));

        let t = transcribe_answer(&engine, &long, TranscriptionWindows::default());
        assert_eq!(t, Transcription::ok("late start".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec![Duration::from_secs(20)]);
    }

    #[test]
    fn silence_twice_is_an_error_answer() {
        let (engine, _) = engine(vec![Ok(String::new()), Ok("  ".to_string())]);
        let t = transcribe_answer(&engine, &clip(), TranscriptionWindows::default());
        assert_eq!(t, Transcription::error(NO_SPEECH_TEXT));
    }

    #[test]
    fn engine_failure_is_recovered() {
        let (engine, seen) = engine(vec![Err(VoiceError::Stt("boom".to_string()))]);
        let t = transcribe_answer(&engine, &clip(), TranscriptionWindows::default());
        assert_eq!(t, Transcription::error(FAILED_TEXT));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
