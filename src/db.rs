//! Database module for the triage desk
//!
//! Provides persistence for sessions, their working state, the classifier
//! audit log, department reference data and user medical history.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session already completed: {0}")]
    SessionClosed(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(SEED_DEPARTMENTS)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    /// Cheap round trip used by the health endpoint
    pub fn ping(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Get a session owned by `user_id`. Sessions of other users are
    /// indistinguishable from missing ones.
    pub fn get_session(&self, session_id: &str, user_id: &str) -> DbResult<ChatSession> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT session_id, user_id, status, is_emergency, final_department, final_urgency,
                    started_at, ended_at
             FROM chat_sessions WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id],
            |row| {
                Ok(ChatSession {
                    session_id: row.get(0)?,
                    user_id: row.get(1)?,
                    status: row.get(2)?,
                    is_emergency: row.get(3)?,
                    final_department: row.get(4)?,
                    final_urgency: row.get(5)?,
                    started_at: parse_datetime(&row.get::<_, String>(6)?),
                    ended_at: row.get::<_, Option<String>>(7)?.as_deref().map(parse_datetime),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::SessionNotFound(session_id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// Get the working state of a session, if any was ever written
    pub fn get_state(&self, session_id: &str) -> DbResult<Option<SessionState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT session_id, symptoms_collected, questions_asked, ml_confidence,
                        predicted_department, updated_at
                 FROM session_state WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionState {
                        session_id: row.get(0)?,
                        symptoms_collected: json_column(row, 1)?,
                        questions_asked: json_column(row, 2)?,
                        ml_confidence: row.get(3)?,
                        predicted_department: row.get(4)?,
                        updated_at: parse_datetime(&row.get::<_, String>(5)?),
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Most recent sessions of a user, newest first
    pub fn list_sessions(&self, user_id: &str, limit: u32) -> DbResult<Vec<SessionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT cs.session_id, cs.started_at, cs.ended_at, cs.final_department,
                    cs.final_urgency, cs.is_emergency, cs.status,
                    ss.predicted_department, ss.symptoms_collected
             FROM chat_sessions cs
             LEFT JOIN session_state ss ON ss.session_id = cs.session_id
             WHERE cs.user_id = ?1
             ORDER BY cs.started_at DESC, cs.rowid DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user_id, limit], |row| {
            let symptoms = match row.get::<_, Option<String>>(8)? {
                Some(_) => json_column(row, 8)?,
                None => Default::default(),
            };
            Ok(SessionSummary {
                session_id: row.get(0)?,
                started_at: parse_datetime(&row.get::<_, String>(1)?),
                ended_at: row.get::<_, Option<String>>(2)?.as_deref().map(parse_datetime),
                final_department: row.get(3)?,
                final_urgency: row.get(4)?,
                is_emergency: row.get(5)?,
                status: row.get(6)?,
                predicted_department: row.get(7)?,
                symptoms_collected: symptoms,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Reference Data ====================

    /// All department mappings in lookup order
    pub fn department_mappings(&self) -> DbResult<Vec<DepartmentMapping>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT department_name, specialization, urgency_level
             FROM department_mapping ORDER BY mapping_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DepartmentMapping {
                department_name: row.get(0)?,
                specialization: row.get(1)?,
                urgency_level: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Medical history on file for a user
    pub fn medical_history(&self, user_id: &str) -> DbResult<Option<MedicalHistory>> {
        let conn = self.conn()?;
        let history = conn
            .query_row(
                "SELECT chronic_diseases, genetic_diseases, is_skipped
                 FROM user_medical_history WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(MedicalHistory {
                        chronic_diseases: row.get(0)?,
                        genetic_diseases: row.get(1)?,
                        is_skipped: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(history)
    }

    /// Store or replace a user's medical history
    #[cfg(test)]
    pub fn save_medical_history(&self, user_id: &str, history: &MedicalHistory) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_medical_history (user_id, chronic_diseases, genetic_diseases, is_skipped, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                chronic_diseases = excluded.chronic_diseases,
                genetic_diseases = excluded.genetic_diseases,
                is_skipped = excluded.is_skipped,
                updated_at = excluded.updated_at",
            params![
                user_id,
                history.chronic_diseases,
                history.genetic_diseases,
                history.is_skipped,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ==================== Turn Commit ====================

    /// Apply every write of one turn in a single transaction.
    ///
    /// A session patch only applies to an active session; patching a
    /// completed one fails with [`DbError::SessionClosed`] and nothing from
    /// the turn is written.
    pub fn commit_turn(&self, commit: &TurnCommit) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        if let Some(session) = &commit.new_session {
            insert_session(&tx, session)?;
        }
        if let Some(patch) = &commit.state_patch {
            upsert_state(&tx, &commit.session_id, patch, now)?;
        }
        for entry in &commit.prediction_logs {
            append_prediction_log(&tx, &commit.session_id, entry, now)?;
        }
        if let Some(patch) = &commit.session_patch {
            update_session(&tx, &commit.session_id, patch)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Prediction audit rows for a session, oldest first
    #[cfg(test)]
    pub fn prediction_logs(&self, session_id: &str) -> DbResult<Vec<PredictionLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT input_vector, confidence, predicted_condition, suggested_symptoms
             FROM ml_predictions WHERE session_id = ?1 ORDER BY prediction_id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(PredictionLogEntry {
                input_vector: json_column(row, 0)?,
                confidence: row.get(1)?,
                predicted_condition: row.get(2)?,
                suggested_symptoms: json_column(row, 3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn insert_session(conn: &Connection, session: &ChatSession) -> DbResult<()> {
    conn.execute(
        "INSERT INTO chat_sessions (session_id, user_id, status, is_emergency, final_department,
                                    final_urgency, started_at, ended_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            session.session_id,
            session.user_id,
            session.status,
            session.is_emergency,
            session.final_department,
            session.final_urgency,
            session.started_at.to_rfc3339(),
            session.ended_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn update_session(conn: &Connection, session_id: &str, patch: &SessionPatch) -> DbResult<()> {
    let updated = conn.execute(
        "UPDATE chat_sessions SET
            is_emergency = COALESCE(?2, is_emergency),
            final_department = COALESCE(?3, final_department),
            final_urgency = COALESCE(?4, final_urgency),
            status = COALESCE(?5, status),
            ended_at = COALESCE(?6, ended_at)
         WHERE session_id = ?1 AND status = 'active'",
        params![
            session_id,
            patch.is_emergency,
            patch.final_department,
            patch.final_urgency,
            patch.status,
            patch.ended_at.map(|t| t.to_rfc3339()),
        ],
    )?;

    if updated == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM chat_sessions WHERE session_id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        return Err(if exists {
            DbError::SessionClosed(session_id.to_string())
        } else {
            DbError::SessionNotFound(session_id.to_string())
        });
    }
    Ok(())
}

fn upsert_state(
    conn: &Connection,
    session_id: &str,
    patch: &StatePatch,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let symptoms = patch
        .symptoms_collected
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let asked = patch
        .questions_asked
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO session_state (session_id, symptoms_collected, questions_asked, ml_confidence,
                                    predicted_department, updated_at)
         VALUES (?1, COALESCE(?2, '[]'), COALESCE(?3, '[]'), COALESCE(?4, 0), ?5, ?6)
         ON CONFLICT(session_id) DO UPDATE SET
            symptoms_collected = COALESCE(?2, symptoms_collected),
            questions_asked = COALESCE(?3, questions_asked),
            ml_confidence = COALESCE(?4, ml_confidence),
            predicted_department = COALESCE(?5, predicted_department),
            updated_at = ?6",
        params![
            session_id,
            symptoms,
            asked,
            patch.ml_confidence,
            patch.predicted_department,
            now.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn append_prediction_log(
    conn: &Connection,
    session_id: &str,
    entry: &PredictionLogEntry,
    now: DateTime<Utc>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO ml_predictions (session_id, input_vector, confidence, predicted_condition,
                                     suggested_symptoms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_id,
            serde_json::to_string(&entry.input_vector)?,
            entry.confidence,
            entry.predicted_condition,
            serde_json::to_string(&entry.suggested_symptoms)?,
            now.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Unreadable timestamps fall back to the current time.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(value = %s, error = %e, "Unparseable timestamp in database");
            Utc::now()
        }
    }
}
