//! Viva core: the server-driven voice interview.
//!
//! A candidate starts an interview by email, then loops: fetch the next spoken
//! question, upload a recorded answer, repeat until all six questions have a usable
//! answer. The controller owns the session cursor; the client never advances it.
//!
//! ```text
//!  start ─► next_question ─► submit_answer ─┬─ ok ────► q_index + 1 ─► next_question …
//!                                           └─ error ─► same question again
//!  finish ─► session deleted, answers returned; get_answers keeps working
//! ```
//!
//! Storage is a SQLite relational store (authoritative) with an optional sled
//! document store holding the candidate registry and a mirrored transcript.

pub mod blob;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod locks;
pub mod model;
pub mod questions;
pub mod records;
pub mod relational;
pub mod transcript;
pub mod transcription;

pub use blob::{BlobStore, LocalBlobStore, SupabaseBlobStore};
pub use config::{BlobBackend, CandidatePolicy, InterviewConfig, StoreMode};
pub use controller::{
    AnswerUpload, Backends, ControllerSettings, FinishOutcome, InterviewController, NextQuestion, Progress,
    StartOutcome, SubmitOutcome,
};
pub use document::{DocumentStore, QaEntry, TranscriptDoc};
pub use error::{InterviewError, InterviewResult};
pub use model::{AnswerRecord, AnswerStatus, Candidate, CandidateId, InterviewPhase, Session};
pub use questions::{QUESTIONS, QUESTION_COUNT};
pub use records::{ReconcileReport, Records};
pub use relational::SqliteStore;
pub use transcript::Transcript;
pub use transcription::{TranscriptionWindows, FAILED_TEXT, NO_SPEECH_TEXT};
