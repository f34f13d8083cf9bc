//! Records shared by both stores and the controller.

use crate::error::{InterviewError, InterviewResult};
use crate::questions::QUESTION_COUNT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candidate identifier. Restricted to `[A-Za-z0-9_-]` so it is safe in file names and blob keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    /// Parse an id from a request path. Anything malformed cannot name a candidate.
    pub fn parse(raw: &str) -> InterviewResult<Self> {
        let id = raw.trim();
        let valid = !id.is_empty()
            && id.len() <= 64
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(InterviewError::NotFound(format!("Candidate {} not found", raw.trim())))
        }
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: Option<String>,
    pub email: String,
}

/// Progress cursor through the question list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub candidate_id: CandidateId,
    /// Index of the next unanswered question.
    pub q_index: usize,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Ok,
    Error,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Ok => "ok",
            AnswerStatus::Error => "error",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AnswerStatus::Ok)
    }
}

impl fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerStatus {
    type Err = InterviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(AnswerStatus::Ok),
            "error" => Ok(AnswerStatus::Error),
            other => Err(InterviewError::Persistence(format!("unknown answer status {:?}", other))),
        }
    }
}

/// One submitted answer. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: String,
    pub candidate_id: CandidateId,
    pub question_index: usize,
    pub question: String,
    pub answer_text: String,
    pub status: AnswerStatus,
    pub answer_audio_url: String,
    pub created_at_ms: i64,
}

/// Lifecycle phase derived from session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum InterviewPhase {
    NotStarted,
    InProgress { q_index: usize },
    Finished,
}

impl InterviewPhase {
    pub fn of(session: Option<&Session>) -> Self {
        match session {
            None => InterviewPhase::NotStarted,
            Some(s) if s.q_index >= QUESTION_COUNT => InterviewPhase::Finished,
            Some(s) => InterviewPhase::InProgress { q_index: s.q_index },
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(q_index: usize) -> Session {
        Session {
            candidate_id: CandidateId::parse("c1").unwrap(),
            q_index,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn candidate_id_rejects_path_tricks() {
        assert!(CandidateId::parse("../etc").is_err());
        assert!(CandidateId::parse("").is_err());
        assert!(CandidateId::parse("a b").is_err());
        assert_eq!(CandidateId::parse("  66f1c0ffee ").unwrap().as_str(), "66f1c0ffee");
    }

    #[test]
    fn phase_follows_q_index() {
        assert_eq!(InterviewPhase::of(None), InterviewPhase::NotStarted);
        assert_eq!(
            InterviewPhase::of(Some(&session(2))),
            InterviewPhase::InProgress { q_index: 2 }
        );
        assert_eq!(InterviewPhase::of(Some(&session(6))), InterviewPhase::Finished);
    }

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!("ok".parse::<AnswerStatus>().unwrap(), AnswerStatus::Ok);
        assert_eq!(AnswerStatus::Error.to_string(), "error");
        assert!("pending".parse::<AnswerStatus>().is_err());
    }
}
