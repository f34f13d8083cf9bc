//! Interview session controller: start, ask, answer, finish.
//!
//! Every session mutation for one candidate runs under that candidate's lock
//! ([`CandidateLocks`]). Synthesis and transcription are blocking and run on the
//! blocking pool; store calls are short and run inline.

use crate::blob::{BlobStore, LocalBlobStore, SupabaseBlobStore};
use crate::config::{BlobBackend, CandidatePolicy, InterviewConfig, StoreMode};
use crate::document::DocumentStore;
use crate::error::{InterviewError, InterviewResult};
use crate::locks::CandidateLocks;
use crate::model::{now_ms, AnswerRecord, AnswerStatus, CandidateId, InterviewPhase};
use crate::questions::{question, QUESTION_COUNT};
use crate::records::{ReconcileReport, Records};
use crate::relational::SqliteStore;
use crate::transcript::{assemble, Transcript};
use crate::transcription::{transcribe_answer, TranscriptionWindows};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use viva_voice::{
    create_transcoder, create_tts, decode_wav, upload_extension, SpeechEngine, Transcoder, TtsBackend,
};

/// Behavioural switches taken from [`InterviewConfig`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub candidate_policy: CandidatePolicy,
    pub enforce_question_index: bool,
    pub tts_lang: String,
    pub windows: TranscriptionWindows,
    /// Local cache of synthesized prompts, `q_{candidate}_{index}.{ext}`.
    pub question_audio_dir: PathBuf,
}

impl From<&InterviewConfig> for ControllerSettings {
    fn from(cfg: &InterviewConfig) -> Self {
        Self {
            candidate_policy: cfg.candidate_policy,
            enforce_question_index: cfg.enforce_question_index,
            tts_lang: cfg.tts_lang.clone(),
            windows: TranscriptionWindows {
                first_pass: cfg.first_pass_window(),
                retry: cfg.retry_window(),
            },
            question_audio_dir: cfg.question_audio_dir(),
        }
    }
}

/// The external collaborators.
pub struct Backends {
    pub tts: Arc<dyn TtsBackend>,
    pub stt: Arc<SpeechEngine>,
    pub transcoder: Box<dyn Transcoder>,
    pub blobs: Box<dyn BlobStore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub candidate_id: CandidateId,
    pub created: bool,
    pub resumed: bool,
    pub next_question_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextQuestion {
    Question {
        question_index: usize,
        question: String,
        audio_url: String,
    },
    Done,
}

/// An uploaded answer recording.
#[derive(Debug, Clone, Default)]
pub struct AnswerUpload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub answer_text: String,
    pub status: AnswerStatus,
    pub answer_audio_url: String,
    pub q_index: usize,
    pub next_question_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishOutcome {
    pub candidate_id: CandidateId,
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub candidate_id: CandidateId,
    /// `{"phase": "in_progress", "q_index": 2}` etc.
    #[serde(flatten)]
    pub phase: InterviewPhase,
    pub answered_ok: usize,
    pub total_questions: usize,
}

pub fn next_question_url(id: &CandidateId) -> String {
    format!("/question/{}", id)
}

pub struct InterviewController {
    settings: ControllerSettings,
    records: Records,
    tts: Arc<dyn TtsBackend>,
    stt: Arc<SpeechEngine>,
    transcoder: Box<dyn Transcoder>,
    blobs: Box<dyn BlobStore>,
    locks: CandidateLocks,
}

impl InterviewController {
    pub fn new(settings: ControllerSettings, records: Records, backends: Backends) -> Self {
        Self {
            settings,
            records,
            tts: backends.tts,
            stt: backends.stt,
            transcoder: backends.transcoder,
            blobs: backends.blobs,
            locks: CandidateLocks::new(),
        }
    }

    /// Build stores and backends from configuration. The STT engine is not loaded here.
    pub fn from_config(cfg: &InterviewConfig) -> InterviewResult<Self> {
        std::fs::create_dir_all(&cfg.storage_path)
            .map_err(|e| InterviewError::Config(format!("storage_path {}: {}", cfg.storage_path.display(), e)))?;

        let relational = SqliteStore::new(cfg.sqlite_path())?;
        let documents = match cfg.store_mode {
            StoreMode::Dual => Some(DocumentStore::open(cfg.document_path())?),
            StoreMode::Single => None,
        };
        if cfg.candidate_policy == CandidatePolicy::Strict && documents.is_none() {
            return Err(InterviewError::Config(
                "candidate_policy = strict needs store_mode = dual".to_string(),
            ));
        }

        let tts = create_tts(cfg.tts_backend).map_err(|e| InterviewError::Config(e.to_string()))?;
        let blobs: Box<dyn BlobStore> = match cfg.blob_backend {
            BlobBackend::Local => Box::new(LocalBlobStore::new(cfg.local_blob_dir(), &cfg.public_base_url)),
            BlobBackend::Supabase => Box::new(SupabaseBlobStore::from_env(&cfg.blob_bucket)?),
        };
        info!(
            store_mode = ?cfg.store_mode,
            candidate_policy = ?cfg.candidate_policy,
            tts = ?cfg.tts_backend,
            stt = ?cfg.stt_backend,
            transcoder = ?cfg.transcoder,
            blob = ?cfg.blob_backend,
            "interview controller configured"
        );

        Ok(Self::new(
            ControllerSettings::from(cfg),
            Records::new(relational, documents),
            Backends {
                tts: Arc::from(tts),
                stt: Arc::new(SpeechEngine::for_kind(cfg.stt_backend)),
                transcoder: create_transcoder(cfg.transcoder, &cfg.ffmpeg_path),
                blobs,
            },
        ))
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn speech_engine(&self) -> Arc<SpeechEngine> {
        self.stt.clone()
    }

    pub fn reconcile(&self) -> InterviewResult<ReconcileReport> {
        self.records.reconcile()
    }

    /// Candidate and email locks currently held or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Resolve the candidate and open (or reuse) their session.
    pub async fn start(&self, email: &str, name: Option<&str>) -> InterviewResult<StartOutcome> {
        let email = email.trim();
        if email.is_empty() {
            return Err(InterviewError::BadRequest("email is required".to_string()));
        }
        let email_key = format!("email:{}", email.to_lowercase());
        let _email_guard = self.locks.acquire(&email_key).await;
        self.open_session(email, name).await
    }

    async fn open_session(&self, email: &str, name: Option<&str>) -> InterviewResult<StartOutcome> {
        let (candidate, created) = self
            .records
            .resolve_candidate(self.settings.candidate_policy, email, name)?;

        let _guard = self.locks.acquire(candidate.id.as_str()).await;
        let store = self.records.relational();
        let resumed = match store.find_session(&candidate.id)? {
            Some(existing) => {
                debug!(candidate_id = %candidate.id, q_index = existing.q_index, "reusing live session");
                true
            }
            None => {
                store.insert_session(&candidate.id)?;
                false
            }
        };
        info!(candidate_id = %candidate.id, created, resumed, "interview started");

        Ok(StartOutcome {
            next_question_url: next_question_url(&candidate.id),
            candidate_id: candidate.id,
            created,
            resumed,
        })
    }

    /// The prompt at the session's cursor, synthesized once and uploaded.
    pub async fn next_question(&self, candidate_id: &str) -> InterviewResult<NextQuestion> {
        let id = CandidateId::parse(candidate_id)?;
        let _guard = self.locks.acquire(id.as_str()).await;

        let session = self
            .records
            .relational()
            .find_session(&id)?
            .ok_or_else(|| InterviewError::NotFound("Session not found".to_string()))?;
        let Some(text) = question(session.q_index) else {
            return Ok(NextQuestion::Done);
        };

        let audio = self.question_audio(&id, session.q_index, text).await?;
        let key = format!("{}/bot_q_{}.{}", id, session.q_index, self.tts.extension());
        let audio_url = self
            .blobs
            .upload(&key, audio, self.tts.content_type(), true)
            .await?;

        Ok(NextQuestion::Question {
            question_index: session.q_index,
            question: text.to_string(),
            audio_url,
        })
    }

    /// Cached prompt audio, synthesizing on a miss.
    async fn question_audio(&self, id: &CandidateId, index: usize, text: &str) -> InterviewResult<Vec<u8>> {
        let dir = &self.settings.question_audio_dir;
        let path = dir.join(format!("q_{}_{}.{}", id, index, self.tts.extension()));
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if !bytes.is_empty() {
                debug!(path = %path.display(), "question audio cache hit");
                return Ok(bytes);
            }
        }

        let tts = self.tts.clone();
        let (text, lang) = (text.to_string(), self.settings.tts_lang.clone());
        let bytes = tokio::task::spawn_blocking(move || tts.synthesize(&text, &lang))
            .await?
            .map_err(InterviewError::Synthesis)?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| InterviewError::Internal(format!("create {}: {}", dir.display(), e)))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| InterviewError::Internal(format!("write {}: {}", path.display(), e)))?;
        info!(candidate_id = %id, index, bytes = bytes.len(), "synthesized question audio");
        Ok(bytes)
    }

    /// Transcode, transcribe, store, and advance the cursor on a usable answer.
    pub async fn submit_answer(
        &self,
        candidate_id: &str,
        question_index: usize,
        upload: AnswerUpload,
    ) -> InterviewResult<SubmitOutcome> {
        let id = CandidateId::parse(candidate_id)?;
        let _guard = self.locks.acquire(id.as_str()).await;

        let store = self.records.relational();
        let session = store
            .find_session(&id)?
            .ok_or_else(|| InterviewError::NotFound("Session not found".to_string()))?;
        let question_text = question(question_index).ok_or_else(|| {
            InterviewError::BadRequest(format!(
                "question_index {} out of range (0..{})",
                question_index, QUESTION_COUNT
            ))
        })?;
        if question_index != session.q_index {
            if self.settings.enforce_question_index {
                return Err(InterviewError::QuestionIndexMismatch {
                    expected: session.q_index,
                    got: question_index,
                });
            }
            warn!(
                candidate_id = %id,
                expected = session.q_index,
                got = question_index,
                "answer submitted for a different question than the session cursor"
            );
        }

        let ext = upload_extension(upload.filename.as_deref());
        let wav = self
            .transcoder
            .to_wav(&upload.bytes, &ext)
            .await
            .map_err(InterviewError::Transcoding)?;
        let pcm = decode_wav(&wav).map_err(InterviewError::Transcoding)?;

        let engine = self.stt.clone();
        let windows = self.settings.windows;
        let transcription = tokio::task::spawn_blocking(move || transcribe_answer(&engine, &pcm, windows)).await?;

        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let answer_id = uuid::Uuid::new_v4().to_string();
        let key = format!("{}/{}.{}", id, answer_id, ext);
        let answer_audio_url = self.blobs.upload(&key, upload.bytes, &content_type, false).await?;

        let record = AnswerRecord {
            id: answer_id,
            candidate_id: id.clone(),
            question_index,
            question: question_text.to_string(),
            answer_text: transcription.text.clone(),
            status: transcription.status,
            answer_audio_url: answer_audio_url.clone(),
            created_at_ms: now_ms(),
        };
        self.records.append_answer(&record)?;

        let q_index = if transcription.status.is_ok() {
            let next = session.q_index + 1;
            store.set_q_index(&id, next)?;
            next
        } else {
            session.q_index
        };
        info!(
            candidate_id = %id,
            question_index,
            status = %transcription.status,
            q_index,
            "answer recorded"
        );

        Ok(SubmitOutcome {
            answer_text: transcription.text,
            status: transcription.status,
            answer_audio_url,
            q_index,
            next_question_url: next_question_url(&id),
        })
    }

    /// Close the session and return every answer recorded for the candidate.
    pub async fn finish(&self, candidate_id: &str) -> InterviewResult<FinishOutcome> {
        let id = CandidateId::parse(candidate_id)?;
        let _guard = self.locks.acquire(id.as_str()).await;

        let store = self.records.relational();
        if store.get_candidate(&id)?.is_none() {
            return Err(InterviewError::NotFound(format!("Candidate {} not found", id)));
        }
        let answers = store.list_answers(&id)?;
        let removed = store.delete_session(&id)?;
        info!(candidate_id = %id, answers = answers.len(), sessions_removed = removed, "interview finished");

        Ok(FinishOutcome { candidate_id: id, answers })
    }

    /// Q/A transcript; available before and after finish.
    pub fn transcript(&self, candidate_id: &str) -> InterviewResult<Transcript> {
        let id = CandidateId::parse(candidate_id)?;
        let answers = self.records.relational().list_answers(&id)?;
        Ok(assemble(&id, &answers))
    }

    pub fn progress(&self, candidate_id: &str) -> InterviewResult<Progress> {
        let id = CandidateId::parse(candidate_id)?;
        let store = self.records.relational();
        if store.get_candidate(&id)?.is_none() {
            return Err(InterviewError::NotFound(format!("Candidate {} not found", id)));
        }
        let session = store.find_session(&id)?;
        // No session but recorded answers: the candidate went through finish.
        let phase = match session {
            None if !store.list_answers(&id)?.is_empty() => InterviewPhase::Finished,
            _ => InterviewPhase::of(session.as_ref()),
        };
        Ok(Progress {
            phase,
            answered_ok: store.count_answers(&id, AnswerStatus::Ok)?,
            total_questions: QUESTION_COUNT,
            candidate_id: id,
        })
    }
}
