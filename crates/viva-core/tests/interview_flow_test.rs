//! End-to-end interview flows against real SQLite/sled stores in temp directories,
//! with in-process audio backends.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use viva_core::{
    AnswerStatus, AnswerUpload, Backends, CandidatePolicy, ControllerSettings, DocumentStore, InterviewController,
    InterviewError, InterviewPhase, LocalBlobStore, NextQuestion, Records, SqliteStore, TranscriptionWindows,
    NO_SPEECH_TEXT, QUESTIONS, QUESTION_COUNT,
};
use viva_voice::{
    encode_wav, PcmAudio, PlaceholderStt, PlaceholderTts, SpeechEngine, SttBackend, TtsBackend, VoiceResult,
    WavTranscoder,
};

/// Silent WAV prompts; counts how often synthesis runs.
#[derive(Default)]
struct CountingTts {
    calls: AtomicUsize,
}

impl TtsBackend for CountingTts {
    fn synthesize(&self, text: &str, lang: &str) -> VoiceResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PlaceholderTts.synthesize(text, lang)
    }

    fn extension(&self) -> &'static str {
        "wav"
    }

    fn content_type(&self) -> &'static str {
        "audio/wav"
    }
}

struct Harness {
    controller: InterviewController,
    tts: Arc<CountingTts>,
    _dir: tempfile::TempDir,
}

fn harness(
    root: tempfile::TempDir,
    stt: Arc<dyn SttBackend>,
    policy: CandidatePolicy,
    dual: bool,
    enforce_question_index: bool,
) -> Harness {
    let dir = root.path();
    let relational = SqliteStore::new(dir.join("viva.sqlite")).unwrap();
    let documents = dual.then(|| DocumentStore::open(dir.join("documents")).unwrap());
    let tts = Arc::new(CountingTts::default());
    let settings = ControllerSettings {
        candidate_policy: policy,
        enforce_question_index,
        tts_lang: "en".to_string(),
        windows: TranscriptionWindows::default(),
        question_audio_dir: dir.join("static"),
    };
    let backends = Backends {
        tts: tts.clone(),
        stt: Arc::new(SpeechEngine::with_backend(stt)),
        transcoder: Box::new(WavTranscoder),
        blobs: Box::new(LocalBlobStore::new(dir.join("static/blobs"), "http://localhost:8000")),
    };
    Harness {
        controller: InterviewController::new(settings, Records::new(relational, documents), backends),
        tts,
        _dir: root,
    }
}

fn speaking(reply: &str) -> Harness {
    harness(
        tempfile::tempdir().unwrap(),
        Arc::new(PlaceholderStt::with_response(reply)),
        CandidatePolicy::Permissive,
        false,
        false,
    )
}

fn answer_upload() -> AnswerUpload {
    let pcm = PcmAudio::new(vec![0.25; 8_000], 16_000);
    AnswerUpload {
        bytes: encode_wav(&pcm).unwrap(),
        filename: Some("answer.wav".to_string()),
        content_type: Some("audio/wav".to_string()),
    }
}

fn blob_count(root: &Path, candidate: &str) -> usize {
    std::fs::read_dir(root.join("static/blobs").join(candidate))
        .map(|d| d.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn six_answers_complete_the_interview() {
    let h = speaking("five years");
    let started = h.controller.start("asha@example.com", Some("Asha")).await.unwrap();
    assert!(started.created);
    let cid = started.candidate_id.as_str().to_string();
    assert_eq!(started.next_question_url, format!("/question/{}", cid));

    for i in 0..QUESTION_COUNT {
        match h.controller.next_question(&cid).await.unwrap() {
            NextQuestion::Question { question_index, question, audio_url } => {
                assert_eq!(question_index, i);
                assert_eq!(question, QUESTIONS[i]);
                assert_eq!(audio_url, format!("http://localhost:8000/static/blobs/{}/bot_q_{}.wav", cid, i));
            }
            NextQuestion::Done => panic!("finished early at {}", i),
        }
        let out = h.controller.submit_answer(&cid, i, answer_upload()).await.unwrap();
        assert_eq!(out.status, AnswerStatus::Ok);
        assert_eq!(out.answer_text, "five years");
        assert_eq!(out.q_index, i + 1);
    }

    assert_eq!(h.controller.next_question(&cid).await.unwrap(), NextQuestion::Done);
    assert_eq!(h.controller.next_question(&cid).await.unwrap(), NextQuestion::Done);

    let progress = h.controller.progress(&cid).unwrap();
    assert_eq!(progress.phase, InterviewPhase::Finished);
    assert_eq!(progress.answered_ok, QUESTION_COUNT);
}

#[tokio::test]
async fn repeated_next_question_synthesizes_once() {
    let h = speaking("yes");
    let cid = h.controller.start("b@example.com", None).await.unwrap().candidate_id;
    let first = h.controller.next_question(cid.as_str()).await.unwrap();
    let second = h.controller.next_question(cid.as_str()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.tts.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn start_reuses_the_live_session() {
    let h = speaking("Pune");
    let first = h.controller.start("c@example.com", None).await.unwrap();
    h.controller
        .submit_answer(first.candidate_id.as_str(), 0, answer_upload())
        .await
        .unwrap();
    let again = h.controller.start("C@example.com", None).await.unwrap();
    assert_eq!(again.candidate_id, first.candidate_id);
    assert!(!again.created);
    assert!(again.resumed);
    let progress = h.controller.progress(first.candidate_id.as_str()).unwrap();
    assert_eq!(progress.phase, InterviewPhase::InProgress { q_index: 1 });
}

#[tokio::test]
async fn silence_records_an_error_and_keeps_the_cursor() {
    let h = speaking("");
    let cid = h.controller.start("d@example.com", None).await.unwrap().candidate_id;
    let out = h.controller.submit_answer(cid.as_str(), 0, answer_upload()).await.unwrap();
    assert_eq!(out.status, AnswerStatus::Error);
    assert_eq!(out.answer_text, NO_SPEECH_TEXT);
    assert_eq!(out.q_index, 0);

    let finished = h.controller.finish(cid.as_str()).await.unwrap();
    assert_eq!(finished.answers.len(), 1);
    assert_eq!(finished.answers[0].status, AnswerStatus::Error);
}

#[tokio::test]
async fn finish_closes_the_session_but_keeps_answers() {
    let h = speaking("thirty days");
    let cid = h.controller.start("e@example.com", None).await.unwrap().candidate_id;
    h.controller.submit_answer(cid.as_str(), 0, answer_upload()).await.unwrap();
    h.controller.submit_answer(cid.as_str(), 1, answer_upload()).await.unwrap();

    assert_eq!(
        h.controller.progress(cid.as_str()).unwrap().phase,
        InterviewPhase::InProgress { q_index: 2 }
    );
    let finished = h.controller.finish(cid.as_str()).await.unwrap();
    assert_eq!(finished.answers.len(), 2);

    let progress = h.controller.progress(cid.as_str()).unwrap();
    assert_eq!(progress.phase, InterviewPhase::Finished);
    assert_eq!(progress.answered_ok, 2);

    let err = h.controller.next_question(cid.as_str()).await.unwrap_err();
    assert!(matches!(err, InterviewError::NotFound(_)));

    let transcript = h.controller.transcript(cid.as_str()).unwrap();
    assert_eq!(
        transcript.qa[0],
        [format!("Q: {}", QUESTIONS[0]), "A: thirty days".to_string()]
    );
    assert_eq!(transcript.transcript.len(), 4);
}

#[tokio::test]
async fn unknown_candidates() {
    let h = speaking("x");
    assert!(matches!(
        h.controller.finish("nobody").await.unwrap_err(),
        InterviewError::NotFound(_)
    ));
    assert!(matches!(
        h.controller.submit_answer("nobody", 0, answer_upload()).await.unwrap_err(),
        InterviewError::NotFound(_)
    ));
    assert!(h.controller.transcript("nobody").unwrap().qa.is_empty());
    assert!(matches!(
        h.controller.start("   ", None).await.unwrap_err(),
        InterviewError::BadRequest(_)
    ));
}

#[tokio::test]
async fn registered_candidate_without_answers_has_not_started() {
    let h = harness(
        tempfile::tempdir().unwrap(),
        Arc::new(PlaceholderStt::with_response("x")),
        CandidatePolicy::Strict,
        true,
        false,
    );
    let candidate = h
        .controller
        .records()
        .register_candidate("k@example.com", None)
        .unwrap();
    let progress = h.controller.progress(candidate.id.as_str()).unwrap();
    assert_eq!(progress.phase, InterviewPhase::NotStarted);
}

#[tokio::test]
async fn unknown_ids_leave_no_lock_entries() {
    let h = speaking("x");
    for i in 0..200 {
        let id = format!("bogus{}", i);
        assert!(matches!(
            h.controller.next_question(&id).await.unwrap_err(),
            InterviewError::NotFound(_)
        ));
        assert!(matches!(
            h.controller.submit_answer(&id, 0, answer_upload()).await.unwrap_err(),
            InterviewError::NotFound(_)
        ));
        assert!(h.controller.finish(&id).await.is_err());
    }
    assert_eq!(h.controller.active_locks(), 0);

    let cid = h.controller.start("l@example.com", None).await.unwrap().candidate_id;
    h.controller.next_question(cid.as_str()).await.unwrap();
    h.controller.submit_answer(cid.as_str(), 0, answer_upload()).await.unwrap();
    assert_eq!(h.controller.active_locks(), 0);
}

#[tokio::test]
async fn strict_policy_rejects_unregistered_email() {
    let h = harness(
        tempfile::tempdir().unwrap(),
        Arc::new(PlaceholderStt::with_response("ok")),
        CandidatePolicy::Strict,
        true,
        false,
    );
    let err = h.controller.start("ghost@example.com", None).await.unwrap_err();
    assert!(matches!(err, InterviewError::NotFound(_)));

    let registered = h
        .controller
        .records()
        .register_candidate("ravi@example.com", Some("Ravi"))
        .unwrap();
    let started = h.controller.start("ravi@example.com", None).await.unwrap();
    assert_eq!(started.candidate_id, registered.id);
    assert!(!started.created);
}

#[tokio::test]
async fn garbage_upload_fails_transcoding_without_side_effects() {
    let root = tempfile::tempdir().unwrap();
    let root_path = root.path().to_path_buf();
    let h = harness(
        root,
        Arc::new(PlaceholderStt::with_response("ok")),
        CandidatePolicy::Permissive,
        false,
        false,
    );
    let cid = h.controller.start("f@example.com", None).await.unwrap().candidate_id;
    let upload = AnswerUpload {
        bytes: b"definitely not audio".to_vec(),
        filename: Some("answer.webm".to_string()),
        content_type: Some("audio/webm".to_string()),
    };
    let err = h.controller.submit_answer(cid.as_str(), 0, upload).await.unwrap_err();
    assert!(matches!(err, InterviewError::Transcoding(_)));
    assert!(h.controller.transcript(cid.as_str()).unwrap().qa.is_empty());
    assert_eq!(blob_count(&root_path, cid.as_str()), 0);
}

#[tokio::test]
async fn question_index_checks() {
    let lenient = speaking("ok");
    let cid = lenient.controller.start("g@example.com", None).await.unwrap().candidate_id;
    assert!(matches!(
        lenient.controller.submit_answer(cid.as_str(), 6, answer_upload()).await.unwrap_err(),
        InterviewError::BadRequest(_)
    ));
    // Trusted by default: the answer is stored against index 3, the cursor still moves by one.
    let out = lenient.controller.submit_answer(cid.as_str(), 3, answer_upload()).await.unwrap();
    assert_eq!(out.q_index, 1);
    let transcript = lenient.controller.transcript(cid.as_str()).unwrap();
    assert_eq!(transcript.qa[0][0], format!("Q: {}", QUESTIONS[3]));

    let strict = harness(
        tempfile::tempdir().unwrap(),
        Arc::new(PlaceholderStt::with_response("ok")),
        CandidatePolicy::Permissive,
        false,
        true,
    );
    let cid = strict.controller.start("h@example.com", None).await.unwrap().candidate_id;
    let err = strict.controller.submit_answer(cid.as_str(), 2, answer_upload()).await.unwrap_err();
    assert!(matches!(err, InterviewError::QuestionIndexMismatch { expected: 0, got: 2 }));
}

#[tokio::test]
async fn dual_mode_mirrors_every_answer() {
    let h = harness(
        tempfile::tempdir().unwrap(),
        Arc::new(PlaceholderStt::with_response("Chennai")),
        CandidatePolicy::Permissive,
        true,
        false,
    );
    let cid = h.controller.start("i@example.com", None).await.unwrap().candidate_id;
    h.controller.submit_answer(cid.as_str(), 0, answer_upload()).await.unwrap();
    h.controller.submit_answer(cid.as_str(), 1, answer_upload()).await.unwrap();

    let docs = h.controller.records().documents().unwrap();
    let doc = docs.transcript(&cid).unwrap().unwrap();
    assert_eq!(doc.qa.len(), 2);
    assert_eq!(doc.qa[1].answer, "Chennai");

    let report = h.controller.reconcile().unwrap();
    assert_eq!(report.mirrored, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_lose_an_advance() {
    let h = Arc::new(speaking("ok"));
    let cid = h.controller.start("j@example.com", None).await.unwrap().candidate_id;

    let mut handles = Vec::new();
    for i in 0..3 {
        let h = h.clone();
        let cid = cid.clone();
        handles.push(tokio::spawn(async move {
            h.controller.submit_answer(cid.as_str(), i, answer_upload()).await.unwrap()
        }));
    }
    let mut cursors: Vec<usize> = Vec::new();
    for handle in handles {
        cursors.push(handle.await.unwrap().q_index);
    }
    cursors.sort_unstable();
    assert_eq!(cursors, vec![1, 2, 3]);

    let progress = h.controller.progress(cid.as_str()).unwrap();
    assert_eq!(progress.phase, InterviewPhase::InProgress { q_index: 3 });
    assert_eq!(progress.answered_ok, 3);
}
