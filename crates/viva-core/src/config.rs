//! Interview service configuration.
//!
//! Layers: built-in defaults, then a TOML file (`VIVA_CONFIG` or `config/interview.toml`,
//! if present), then `VIVA_*` environment variables (`VIVA_PORT=9000`,
//! `VIVA_STORE_MODE=dual`, `VIVA_CORS_ORIGINS=http://a,http://b`).
//! Secrets stay in the environment and are read by the backends themselves.

use crate::error::InterviewResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use viva_voice::{SttKind, TranscoderKind, TtsKind};

const DEFAULT_CONFIG_PATH: &str = "config/interview.toml";

/// How `start` resolves an email to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePolicy {
    /// Unknown emails get a fresh candidate.
    #[default]
    Permissive,
    /// Email must already be in the candidate registry.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Relational store only.
    #[default]
    Single,
    /// Relational store plus the sled document mirror and registry.
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    #[default]
    Local,
    Supabase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    pub bind_addr: String,
    pub port: u16,
    pub storage_path: PathBuf,
    pub static_dir: PathBuf,
    pub public_base_url: String,
    pub candidate_policy: CandidatePolicy,
    pub store_mode: StoreMode,
    pub enforce_question_index: bool,
    pub tts_backend: TtsKind,
    pub tts_lang: String,
    pub stt_backend: SttKind,
    pub transcoder: TranscoderKind,
    pub ffmpeg_path: String,
    pub blob_backend: BlobBackend,
    pub blob_bucket: String,
    pub first_pass_window_secs: u64,
    pub retry_window_secs: u64,
    pub preload_stt: bool,
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8000,
            storage_path: PathBuf::from("./data"),
            static_dir: PathBuf::from("./static"),
            public_base_url: "http://127.0.0.1:8000".to_string(),
            candidate_policy: CandidatePolicy::Permissive,
            store_mode: StoreMode::Single,
            enforce_question_index: false,
            tts_backend: TtsKind::Google,
            tts_lang: "en".to_string(),
            stt_backend: SttKind::Auto,
            transcoder: TranscoderKind::Ffmpeg,
            ffmpeg_path: "ffmpeg".to_string(),
            blob_backend: BlobBackend::Local,
            blob_bucket: "interview-audios".to_string(),
            first_pass_window_secs: 15,
            retry_window_secs: 30,
            preload_stt: false,
            max_upload_bytes: 25 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

impl InterviewConfig {
    /// Load from `VIVA_CONFIG` (or `config/interview.toml`) plus environment.
    pub fn load() -> InterviewResult<Self> {
        let path = std::env::var("VIVA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    /// Load with an explicit file (skipped when it does not exist) plus environment.
    pub fn load_from(path: Option<&Path>) -> InterviewResult<Self> {
        let defaults = config::Config::try_from(&InterviewConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path.filter(|p| p.exists()) {
            tracing::info!(path = %path.display(), "loading interview config file");
            builder = builder.add_source(config::File::from(path));
        }

        let built = builder
            .add_source(
                config::Environment::with_prefix("VIVA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?;

        let cfg: InterviewConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> InterviewResult<()> {
        use crate::error::InterviewError;
        if self.candidate_policy == CandidatePolicy::Strict && self.store_mode == StoreMode::Single {
            return Err(InterviewError::Config(
                "candidate_policy = strict needs the candidate registry; set store_mode = dual".to_string(),
            ));
        }
        if self.first_pass_window_secs == 0 || self.retry_window_secs == 0 {
            return Err(InterviewError::Config("transcription windows must be positive".to_string()));
        }
        if self.retry_window_secs <= self.first_pass_window_secs {
            return Err(InterviewError::Config(format!(
                "retry_window_secs ({}) must be longer than first_pass_window_secs ({})",
                self.retry_window_secs, self.first_pass_window_secs
            )));
        }
        Ok(())
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.storage_path.join("viva.sqlite")
    }

    pub fn document_path(&self) -> PathBuf {
        self.storage_path.join("documents")
    }

    /// Where synthesized question audio is cached (served under `/static`).
    pub fn question_audio_dir(&self) -> PathBuf {
        self.static_dir.clone()
    }

    /// Root of the local blob store (served under `/static/blobs`).
    pub fn local_blob_dir(&self) -> PathBuf {
        self.static_dir.join("blobs")
    }

    pub fn first_pass_window(&self) -> Duration {
        Duration::from_secs(self.first_pass_window_secs)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
