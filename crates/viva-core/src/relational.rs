//! Relational record store (SQLite): candidates, sessions, answers and the mirror outbox.
//!
//! Source of truth for session progress and answer history. One connection per call,
//! so the store is `Clone + Send + Sync` without a pool.

use crate::error::InterviewResult;
use crate::model::{now_ms, AnswerRecord, AnswerStatus, Candidate, CandidateId, Session};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};

/// Answer waiting to be mirrored into the document store.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub attempts: i64,
    pub answer: AnswerRecord,
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl ToSql for AnswerStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AnswerStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for CandidateId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CandidateId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        CandidateId::parse(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

const ANSWER_COLUMNS: &str =
    "id, candidate_id, question_index, question, answer_text, status, answer_audio_url, created_at_ms";

fn answer_from_row(r: &Row<'_>) -> rusqlite::Result<AnswerRecord> {
    Ok(AnswerRecord {
        id: r.get(0)?,
        candidate_id: r.get(1)?,
        question_index: r.get::<_, i64>(2)? as usize,
        question: r.get(3)?,
        answer_text: r.get(4)?,
        status: r.get(5)?,
        answer_audio_url: r.get(6)?,
        created_at_ms: r.get(7)?,
    })
}

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        candidate_id: r.get(0)?,
        q_index: r.get::<_, i64>(1)? as usize,
        created_at_ms: r.get(2)?,
        updated_at_ms: r.get(3)?,
    })
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> InterviewResult<Self> {
        let this = Self { db_path };
        this.init()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init(&self) -> Result<(), rusqlite::Error> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                candidate_id TEXT PRIMARY KEY,
                name TEXT NULL,
                email TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_candidates_email ON candidates(email);

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                candidate_id TEXT NOT NULL,
                q_index INTEGER NOT NULL,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                FOREIGN KEY(candidate_id) REFERENCES candidates(candidate_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_candidate_id ON sessions(candidate_id);

            CREATE TABLE IF NOT EXISTS answers (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                candidate_id TEXT NOT NULL,
                question_index INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer_text TEXT NOT NULL,
                status TEXT NOT NULL,
                answer_audio_url TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                FOREIGN KEY(candidate_id) REFERENCES candidates(candidate_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_answers_candidate_id ON answers(candidate_id, question_index);

            CREATE TABLE IF NOT EXISTS mirror_outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                answer_id TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL,
                FOREIGN KEY(answer_id) REFERENCES answers(id) ON DELETE CASCADE
            );
            "#,
        )?;
        Ok(())
    }

    // -- candidates ---------------------------------------------------------

    pub fn find_candidate_by_email(&self, email: &str) -> InterviewResult<Option<Candidate>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT candidate_id, name, email FROM candidates
                 WHERE lower(email) = lower(?1) ORDER BY created_at_ms ASC LIMIT 1",
                params![email.trim()],
                |r| {
                    Ok(Candidate {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        email: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_candidate(&self, id: &CandidateId) -> InterviewResult<Option<Candidate>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT candidate_id, name, email FROM candidates WHERE candidate_id = ?1",
                params![id],
                |r| {
                    Ok(Candidate {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        email: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Insert if absent. Returns true when a row was written.
    pub fn insert_candidate(&self, candidate: &Candidate) -> InterviewResult<bool> {
        let conn = self.open()?;
        let n = conn.execute(
            "INSERT OR IGNORE INTO candidates (candidate_id, name, email, created_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![candidate.id, candidate.name, candidate.email.trim(), now_ms()],
        )?;
        Ok(n > 0)
    }

    // -- sessions -----------------------------------------------------------

    /// Oldest live session for the candidate.
    pub fn find_session(&self, id: &CandidateId) -> InterviewResult<Option<Session>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT candidate_id, q_index, created_at_ms, updated_at_ms FROM sessions
                 WHERE candidate_id = ?1 ORDER BY id ASC LIMIT 1",
                params![id],
                session_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_session(&self, id: &CandidateId) -> InterviewResult<Session> {
        let ts = now_ms();
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (candidate_id, q_index, created_at_ms, updated_at_ms)
             VALUES (?1, 0, ?2, ?3)",
            params![id, ts, ts],
        )?;
        Ok(Session {
            candidate_id: id.clone(),
            q_index: 0,
            created_at_ms: ts,
            updated_at_ms: ts,
        })
    }

    /// Returns false when the candidate has no session.
    pub fn set_q_index(&self, id: &CandidateId, q_index: usize) -> InterviewResult<bool> {
        let conn = self.open()?;
        let n = conn.execute(
            "UPDATE sessions SET q_index = ?1, updated_at_ms = ?2 WHERE candidate_id = ?3",
            params![q_index as i64, now_ms(), id],
        )?;
        Ok(n > 0)
    }

    pub fn delete_session(&self, id: &CandidateId) -> InterviewResult<usize> {
        let conn = self.open()?;
        let n = conn.execute("DELETE FROM sessions WHERE candidate_id = ?1", params![id])?;
        Ok(n)
    }

    // -- answers ------------------------------------------------------------

    /// Append an answer; with `queue_mirror` an outbox row is written in the same transaction.
    pub fn append_answer(&self, answer: &AnswerRecord, queue_mirror: bool) -> InterviewResult<Option<i64>> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO answers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", ANSWER_COLUMNS),
            params![
                answer.id,
                answer.candidate_id,
                answer.question_index as i64,
                answer.question,
                answer.answer_text,
                answer.status,
                answer.answer_audio_url,
                answer.created_at_ms,
            ],
        )?;
        let outbox_id = if queue_mirror {
            tx.execute(
                "INSERT INTO mirror_outbox (answer_id, attempts, created_at_ms) VALUES (?1, 0, ?2)",
                params![answer.id, now_ms()],
            )?;
            Some(tx.last_insert_rowid())
        } else {
            None
        };
        tx.commit()?;
        Ok(outbox_id)
    }

    /// All answers for a candidate, by question index then submission order.
    pub fn list_answers(&self, id: &CandidateId) -> InterviewResult<Vec<AnswerRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM answers WHERE candidate_id = ?1 ORDER BY question_index ASC, seq ASC",
            ANSWER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![id], answer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_answers(&self, id: &CandidateId, status: AnswerStatus) -> InterviewResult<usize> {
        let conn = self.open()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM answers WHERE candidate_id = ?1 AND status = ?2",
            params![id, status],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    // -- outbox -------------------------------------------------------------

    /// Up to `limit` outbox rows with id greater than `after_id`, oldest first.
    pub fn pending_mirrors(&self, after_id: i64, limit: usize) -> InterviewResult<Vec<OutboxEntry>> {
        let conn = self.open()?;
        let columns = ANSWER_COLUMNS
            .split(", ")
            .map(|c| format!("a.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT o.id, o.attempts, {} FROM mirror_outbox o
             JOIN answers a ON a.id = o.answer_id
             WHERE o.id > ?1
             ORDER BY o.id ASC LIMIT ?2",
            columns
        ))?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], |r| {
                Ok(OutboxEntry {
                    id: r.get(0)?,
                    attempts: r.get(1)?,
                    answer: AnswerRecord {
                        id: r.get(2)?,
                        candidate_id: r.get(3)?,
                        question_index: r.get::<_, i64>(4)? as usize,
                        question: r.get(5)?,
                        answer_text: r.get(6)?,
                        status: r.get(7)?,
                        answer_audio_url: r.get(8)?,
                        created_at_ms: r.get(9)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn complete_mirror(&self, outbox_id: i64) -> InterviewResult<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM mirror_outbox WHERE id = ?1", params![outbox_id])?;
        Ok(())
    }

    pub fn record_mirror_attempt(&self, outbox_id: i64) -> InterviewResult<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE mirror_outbox SET attempts = attempts + 1 WHERE id = ?1",
            params![outbox_id],
        )?;
        Ok(())
    }
}
