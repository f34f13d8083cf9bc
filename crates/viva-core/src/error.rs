//! Interview error taxonomy.

use thiserror::Error;
use viva_voice::VoiceError;

pub type InterviewResult<T> = Result<T, InterviewError>;

#[derive(Error, Debug)]
pub enum InterviewError {
    /// Unknown candidate, registry entry or session.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// Uploaded audio could not be normalized; aborts the submission.
    #[error("Audio transcoding failed: {0}")]
    Transcoding(#[source] VoiceError),

    #[error("Question index mismatch: session expects {expected}, got {got}")]
    QuestionIndexMismatch { expected: usize, got: usize },

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[source] VoiceError),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for InterviewError {
    fn from(err: rusqlite::Error) -> Self {
        InterviewError::Persistence(format!("sqlite: {}", err))
    }
}

impl From<sled::Error> for InterviewError {
    fn from(err: sled::Error) -> Self {
        InterviewError::Persistence(format!("sled: {}", err))
    }
}

impl From<serde_json::Error> for InterviewError {
    fn from(err: serde_json::Error) -> Self {
        InterviewError::Persistence(format!("document encoding: {}", err))
    }
}

impl From<config::ConfigError> for InterviewError {
    fn from(err: config::ConfigError) -> Self {
        InterviewError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for InterviewError {
    fn from(err: tokio::task::JoinError) -> Self {
        InterviewError::Internal(format!("blocking task failed: {}", err))
    }
}
