//! PCM helpers: decode/encode WAV, pad audio to a transcription window,
//! and the mono/16 kHz normalization used when ffmpeg is not in the loop.

use crate::error::{VoiceError, VoiceResult};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Sample rate the transcription engines expect.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decoded mono PCM, samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Pad with trailing silence up to `window`. Clips already longer are left whole.
    pub fn pad_to_window(&self, window: Duration) -> PcmAudio {
        let target = (window.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let mut samples = self.samples.clone();
        if samples.len() < target {
            samples.resize(target, 0.0);
        }
        PcmAudio::new(samples, self.sample_rate)
    }
}

/// Decode WAV bytes into mono PCM. Multi-channel input is averaged down.
pub fn decode_wav(bytes: &[u8]) -> VoiceResult<PcmAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    let pcm = PcmAudio::new(samples, spec.sample_rate);
    debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        bits_per_sample = spec.bits_per_sample,
        frames = pcm.samples.len(),
        duration_secs = pcm.duration().as_secs_f32(),
        "decoded WAV"
    );
    Ok(pcm)
}

/// Encode mono PCM as 16-bit WAV bytes.
pub fn encode_wav(audio: &PcmAudio) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in &audio.samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * 32767.0).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Linear-interpolation resample. Good enough for speech going into STT.
pub fn resample(audio: &PcmAudio, target_rate: u32) -> VoiceResult<PcmAudio> {
    if target_rate == 0 || audio.sample_rate == 0 {
        return Err(VoiceError::Transcode("sample rate must be non-zero".to_string()));
    }
    if audio.sample_rate == target_rate || audio.is_empty() {
        return Ok(PcmAudio::new(audio.samples.clone(), target_rate));
    }
    let ratio = audio.sample_rate as f64 / target_rate as f64;
    let out_len = ((audio.samples.len() as f64) / ratio).floor() as usize;
    let last = audio.samples.len() - 1;
    let samples = (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = audio.samples[idx.min(last)];
            let b = audio.samples[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect();
    Ok(PcmAudio::new(samples, target_rate))
}
