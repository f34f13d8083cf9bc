//! Record fan-out: the relational store is authoritative; in dual mode answers are
//! mirrored into the document store through the outbox.

use crate::config::{CandidatePolicy, StoreMode};
use crate::document::DocumentStore;
use crate::error::{InterviewError, InterviewResult};
use crate::model::{AnswerRecord, Candidate, CandidateId};
use crate::relational::{OutboxEntry, SqliteStore};
use tracing::{info, warn};

/// Outbox rows loaded per query while reconciling.
const RECONCILE_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub mirrored: usize,
    pub already_present: usize,
    pub failed: usize,
}

pub struct Records {
    relational: SqliteStore,
    documents: Option<DocumentStore>,
}

impl Records {
    pub fn new(relational: SqliteStore, documents: Option<DocumentStore>) -> Self {
        Self { relational, documents }
    }

    pub fn relational(&self) -> &SqliteStore {
        &self.relational
    }

    pub fn documents(&self) -> Option<&DocumentStore> {
        self.documents.as_ref()
    }

    pub fn mode(&self) -> StoreMode {
        if self.documents.is_some() {
            StoreMode::Dual
        } else {
            StoreMode::Single
        }
    }

    /// Resolve `email` to a candidate under `policy`. Returns the candidate and whether
    /// a new one was minted.
    pub fn resolve_candidate(
        &self,
        policy: CandidatePolicy,
        email: &str,
        name: Option<&str>,
    ) -> InterviewResult<(Candidate, bool)> {
        match policy {
            CandidatePolicy::Strict => {
                let registry = self.documents.as_ref().ok_or_else(|| {
                    InterviewError::Config("strict candidate policy needs the document store".to_string())
                })?;
                let candidate = registry
                    .find_candidate_by_email(email)?
                    .ok_or_else(|| InterviewError::NotFound("Candidate not found".to_string()))?;
                if self.relational.insert_candidate(&candidate)? {
                    info!(candidate_id = %candidate.id, "copied registry candidate into relational store");
                }
                Ok((candidate, false))
            }
            CandidatePolicy::Permissive => {
                if let Some(existing) = self.relational.find_candidate_by_email(email)? {
                    return Ok((existing, false));
                }
                let candidate = Candidate {
                    id: CandidateId::generate(),
                    name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
                    email: email.trim().to_string(),
                };
                self.relational.insert_candidate(&candidate)?;
                info!(candidate_id = %candidate.id, "created candidate");
                Ok((candidate, true))
            }
        }
    }

    /// Append to the relational store, then mirror. Mirror failures stay in the outbox.
    pub fn append_answer(&self, answer: &AnswerRecord) -> InterviewResult<()> {
        let outbox_id = self.relational.append_answer(answer, self.documents.is_some())?;
        if let (Some(docs), Some(outbox_id)) = (self.documents.as_ref(), outbox_id) {
            match docs.push_qa(answer) {
                Ok(_) => self.relational.complete_mirror(outbox_id)?,
                Err(e) => {
                    warn!(answer_id = %answer.id, "document mirror failed, left in outbox: {}", e);
                    self.relational.record_mirror_attempt(outbox_id)?;
                }
            }
        }
        Ok(())
    }

    /// Replay every pending outbox row into the document store. Rows that fail stay
    /// queued for the next run; each row is tried at most once per call.
    pub fn reconcile(&self) -> InterviewResult<ReconcileReport> {
        self.reconcile_in_batches(RECONCILE_BATCH)
    }

    fn reconcile_in_batches(&self, batch: usize) -> InterviewResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let Some(docs) = self.documents.as_ref() else {
            return Ok(report);
        };
        let batch = batch.max(1);
        let mut after_id = 0;
        loop {
            let entries = self.relational.pending_mirrors(after_id, batch)?;
            let exhausted = entries.len() < batch;
            for entry in entries {
                after_id = entry.id;
                self.replay(docs, &entry, &mut report)?;
            }
            if exhausted {
                break;
            }
        }
        if report != ReconcileReport::default() {
            info!(
                mirrored = report.mirrored,
                already_present = report.already_present,
                failed = report.failed,
                "outbox reconciled"
            );
        }
        Ok(report)
    }

    fn replay(&self, docs: &DocumentStore, entry: &OutboxEntry, report: &mut ReconcileReport) -> InterviewResult<()> {
        match docs.push_qa(&entry.answer) {
            Ok(true) => {
                report.mirrored += 1;
                self.relational.complete_mirror(entry.id)
            }
            Ok(false) => {
                report.already_present += 1;
                self.relational.complete_mirror(entry.id)
            }
            Err(e) => {
                report.failed += 1;
                warn!(answer_id = %entry.answer.id, attempts = entry.attempts + 1, "outbox replay failed: {}", e);
                self.relational.record_mirror_attempt(entry.id)
            }
        }
    }

    /// Add a candidate to the registry (and the relational store, so ids line up).
    pub fn register_candidate(&self, email: &str, name: Option<&str>) -> InterviewResult<Candidate> {
        let registry = self.documents.as_ref().ok_or_else(|| {
            InterviewError::Config("registering candidates needs store_mode = dual".to_string())
        })?;
        let email = email.trim();
        if email.is_empty() {
            return Err(InterviewError::BadRequest("email is required".to_string()));
        }
        if let Some(existing) = registry.find_candidate_by_email(email)? {
            return Ok(existing);
        }
        let candidate = Candidate {
            id: CandidateId::generate(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            email: email.to_string(),
        };
        registry.register_candidate(&candidate)?;
        self.relational.insert_candidate(&candidate)?;
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now_ms, AnswerStatus};

    fn records(dual: bool) -> (tempfile::TempDir, Records) {
        let dir = tempfile::tempdir().unwrap();
        let sql = SqliteStore::new(dir.path().join("viva.sqlite")).unwrap();
        let docs = dual.then(|| DocumentStore::open(dir.path().join("docs")).unwrap());
        (dir, Records::new(sql, docs))
    }

    #[test]
    fn permissive_creates_once() {
        let (_dir, records) = records(false);
        let (a, created) = records
            .resolve_candidate(CandidatePolicy::Permissive, "x@example.com", Some("X"))
            .unwrap();
        assert!(created);
        let (b, created) = records
            .resolve_candidate(CandidatePolicy::Permissive, "X@example.com", None)
            .unwrap();
        assert!(!created);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn strict_requires_registry_entry() {
        let (_dir, records) = records(true);
        let err = records
            .resolve_candidate(CandidatePolicy::Strict, "ghost@example.com", None)
            .unwrap_err();
        assert!(matches!(err, InterviewError::NotFound(_)));

        let registered = records.register_candidate("real@example.com", Some("Real")).unwrap();
        let (found, created) = records
            .resolve_candidate(CandidatePolicy::Strict, "real@example.com", None)
            .unwrap();
        assert!(!created);
        assert_eq!(found.id, registered.id);
        assert!(records.relational().get_candidate(&found.id).unwrap().is_some());
    }

    #[test]
    fn dual_append_mirrors_and_clears_outbox() {
        let (_dir, records) = records(true);
        let (c, _) = records
            .resolve_candidate(CandidatePolicy::Permissive, "m@example.com", None)
            .unwrap();
        let answer = AnswerRecord {
            id: "ans-1".to_string(),
            candidate_id: c.id.clone(),
            question_index: 0,
            question: "q".to_string(),
            answer_text: "a".to_string(),
            status: AnswerStatus::Ok,
            answer_audio_url: String::new(),
            created_at_ms: now_ms(),
        };
        records.append_answer(&answer).unwrap();
        assert!(records.relational().pending_mirrors(0, 10).unwrap().is_empty());
        let doc = records.documents().unwrap().transcript(&c.id).unwrap().unwrap();
        assert_eq!(doc.qa.len(), 1);
        assert_eq!(records.reconcile().unwrap(), ReconcileReport::default());
    }

    fn answer(c: &Candidate, idx: usize) -> AnswerRecord {
        AnswerRecord {
            id: uuid::Uuid::new_v4().to_string(),
            candidate_id: c.id.clone(),
            question_index: idx,
            question: format!("q{}", idx),
            answer_text: format!("a{}", idx),
            status: AnswerStatus::Ok,
            answer_audio_url: String::new(),
            created_at_ms: now_ms(),
        }
    }

    fn candidate(records: &Records, email: &str) -> Candidate {
        records
            .resolve_candidate(CandidatePolicy::Permissive, email, None)
            .unwrap()
            .0
    }

    #[test]
    fn reconcile_replays_a_pending_answer_exactly_once() {
        let (_dir, records) = records(true);
        let c = candidate(&records, "n@example.com");
        // Written and queued, but the mirror never happened.
        let queued = answer(&c, 0);
        records.relational().append_answer(&queued, true).unwrap().unwrap();
        let docs = records.documents().unwrap();
        assert!(docs.transcript(&c.id).unwrap().is_none());

        let report = records.reconcile().unwrap();
        assert_eq!(report, ReconcileReport { mirrored: 1, already_present: 0, failed: 0 });
        assert!(records.relational().pending_mirrors(0, 10).unwrap().is_empty());
        let doc = docs.transcript(&c.id).unwrap().unwrap();
        assert_eq!(doc.qa.len(), 1);
        assert_eq!(doc.qa[0].answer, "a0");

        assert_eq!(records.reconcile().unwrap(), ReconcileReport::default());
        assert_eq!(docs.transcript(&c.id).unwrap().unwrap().qa.len(), 1);
    }

    #[test]
    fn reconcile_clears_rows_already_mirrored() {
        let (_dir, records) = records(true);
        let c = candidate(&records, "o@example.com");
        // Mirrored, but the outbox delete was lost.
        let pushed = answer(&c, 0);
        records.relational().append_answer(&pushed, true).unwrap().unwrap();
        assert!(records.documents().unwrap().push_qa(&pushed).unwrap());

        let report = records.reconcile().unwrap();
        assert_eq!(report, ReconcileReport { mirrored: 0, already_present: 1, failed: 0 });
        assert!(records.relational().pending_mirrors(0, 10).unwrap().is_empty());
        let doc = records.documents().unwrap().transcript(&c.id).unwrap().unwrap();
        assert_eq!(doc.qa.len(), 1);
    }

    #[test]
    fn reconcile_drains_backlogs_larger_than_a_batch() {
        let (_dir, records) = records(true);
        let c = candidate(&records, "p@example.com");
        for i in 0..5 {
            records.relational().append_answer(&answer(&c, i), true).unwrap();
        }

        let report = records.reconcile_in_batches(2).unwrap();
        assert_eq!(report.mirrored, 5);
        assert!(records.relational().pending_mirrors(0, 10).unwrap().is_empty());
        let doc = records.documents().unwrap().transcript(&c.id).unwrap().unwrap();
        assert_eq!(doc.qa.len(), 5);
    }
}
