//! Document store (sled): candidate registry and per-candidate transcript documents.
//!
//! The registry is what `Strict` candidate policy resolves emails against. Transcript
//! documents mirror the relational answer log; writes are keyed by answer id so replaying
//! the outbox never duplicates an entry.

use crate::error::InterviewResult;
use crate::model::{AnswerRecord, AnswerStatus, Candidate, CandidateId};
use serde::{Deserialize, Serialize};
use std::path::Path;

const CANDIDATES_TREE: &str = "candidates";
const EMAIL_INDEX_TREE: &str = "candidates_by_email";
const TRANSCRIPTS_TREE: &str = "transcripts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEntry {
    pub answer_id: String,
    pub question_index: usize,
    pub question: String,
    pub answer: String,
    pub status: AnswerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptDoc {
    pub candidate_id: Option<CandidateId>,
    #[serde(default)]
    pub qa: Vec<QaEntry>,
}

pub struct DocumentStore {
    db: sled::Db,
}

fn email_key(email: &str) -> Vec<u8> {
    email.trim().to_lowercase().into_bytes()
}

impl DocumentStore {
    pub fn open(path: impl AsRef<Path>) -> InterviewResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Add or replace a registry entry.
    pub fn register_candidate(&self, candidate: &Candidate) -> InterviewResult<()> {
        let candidates = self.db.open_tree(CANDIDATES_TREE)?;
        let by_email = self.db.open_tree(EMAIL_INDEX_TREE)?;
        candidates.insert(candidate.id.as_str().as_bytes(), serde_json::to_vec(candidate)?)?;
        by_email.insert(email_key(&candidate.email), candidate.id.as_str().as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    pub fn find_candidate_by_email(&self, email: &str) -> InterviewResult<Option<Candidate>> {
        let by_email = self.db.open_tree(EMAIL_INDEX_TREE)?;
        let Some(id) = by_email.get(email_key(email))? else {
            return Ok(None);
        };
        let candidates = self.db.open_tree(CANDIDATES_TREE)?;
        match candidates.get(&id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Append a Q/A entry to the candidate's transcript. Returns false when the
    /// answer id was already present.
    pub fn push_qa(&self, answer: &AnswerRecord) -> InterviewResult<bool> {
        let tree = self.db.open_tree(TRANSCRIPTS_TREE)?;
        let key = answer.candidate_id.as_str().as_bytes();
        loop {
            let current = tree.get(key)?;
            let mut doc: TranscriptDoc = match &current {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => TranscriptDoc::default(),
            };
            if doc.qa.iter().any(|e| e.answer_id == answer.id) {
                return Ok(false);
            }
            doc.candidate_id = Some(answer.candidate_id.clone());
            doc.qa.push(QaEntry {
                answer_id: answer.id.clone(),
                question_index: answer.question_index,
                question: answer.question.clone(),
                answer: answer.answer_text.clone(),
                status: answer.status,
            });
            let next = serde_json::to_vec(&doc)?;
            match tree.compare_and_swap(key, current, Some(next))? {
                Ok(()) => {
                    tree.flush()?;
                    return Ok(true);
                }
                Err(_) => {
                    tracing::debug!(candidate_id = %answer.candidate_id, "transcript document changed underneath; retrying");
                }
            }
        }
    }

    pub fn transcript(&self, id: &CandidateId) -> InterviewResult<Option<TranscriptDoc>> {
        let tree = self.db.open_tree(TRANSCRIPTS_TREE)?;
        match tree.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
