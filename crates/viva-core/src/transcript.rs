//! Q/A transcript projection over a candidate's answer records.

use crate::model::{AnswerRecord, CandidateId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub candidate_id: CandidateId,
    /// `["Q: …", "A: …"]` pairs.
    pub qa: Vec<[String; 2]>,
    /// Same content as alternating lines.
    pub transcript: Vec<String>,
}

/// Build the transcript. Records are stably sorted by question index, so retries of one
/// question keep their submission order.
pub fn assemble(candidate_id: &CandidateId, records: &[AnswerRecord]) -> Transcript {
    let mut ordered: Vec<&AnswerRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.question_index);

    let qa: Vec<[String; 2]> = ordered
        .iter()
        .map(|r| [format!("Q: {}", r.question), format!("A: {}", r.answer_text)])
        .collect();
    let transcript = qa.iter().flat_map(|pair| pair.iter().cloned()).collect();

    Transcript {
        candidate_id: candidate_id.clone(),
        qa,
        transcript,
    }
}
