//! Database schema and record types

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chat_sessions (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    is_emergency BOOLEAN NOT NULL DEFAULT 0,
    final_department TEXT,
    final_urgency TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT,

    CHECK ((status = 'completed') = (ended_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, started_at DESC);

CREATE TABLE IF NOT EXISTS session_state (
    session_id TEXT PRIMARY KEY,
    symptoms_collected TEXT NOT NULL DEFAULT '[]',
    questions_asked TEXT NOT NULL DEFAULT '[]',
    ml_confidence REAL NOT NULL DEFAULT 0,
    predicted_department TEXT,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES chat_sessions(session_id)
);

CREATE TABLE IF NOT EXISTS ml_predictions (
    prediction_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    input_vector TEXT NOT NULL,
    confidence REAL NOT NULL,
    predicted_condition TEXT NOT NULL,
    suggested_symptoms TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES chat_sessions(session_id)
);

CREATE INDEX IF NOT EXISTS idx_ml_predictions_session ON ml_predictions(session_id);

CREATE TABLE IF NOT EXISTS department_mapping (
    mapping_id INTEGER PRIMARY KEY AUTOINCREMENT,
    department_name TEXT NOT NULL UNIQUE,
    specialization TEXT NOT NULL DEFAULT '',
    urgency_level TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_medical_history (
    user_id TEXT PRIMARY KEY,
    chronic_diseases TEXT,
    genetic_diseases TEXT,
    is_skipped BOOLEAN NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
";

/// Default department table, keyed on the classifier's condition names.
/// Row order is lookup order for partial matches.
pub const SEED_DEPARTMENTS: &str = r"
INSERT OR IGNORE INTO department_mapping (department_name, specialization, urgency_level) VALUES
    ('Cardiology', 'heart attack, hypertension, varicose veins', 'HIGH'),
    ('Neurology', 'paralysis (brain hemorrhage), migraine, cervical spondylosis, (vertigo) paroymsal  positional vertigo', 'HIGH'),
    ('Pulmonology', 'bronchial asthma, pneumonia, tuberculosis', 'HIGH'),
    ('Hepatology', 'hepatitis a, hepatitis b, hepatitis c, hepatitis d, hepatitis e, alcoholic hepatitis, chronic cholestasis', 'HIGH'),
    ('Infectious Disease', 'malaria, dengue, typhoid, aids, chicken pox', 'HIGH'),
    ('Gastroenterology', 'gerd, peptic ulcer diseae, gastroenteritis, jaundice, dimorphic hemmorhoids(piles)', 'MEDIUM'),
    ('Endocrinology', 'diabetes, hypothyroidism, hyperthyroidism, hypoglycemia', 'MEDIUM'),
    ('Urology', 'urinary tract infection', 'MEDIUM'),
    ('Rheumatology', 'arthritis, osteoarthristis', 'LOW'),
    ('Dermatology', 'fungal infection, acne, psoriasis, impetigo', 'LOW'),
    ('Allergy and Immunology', 'allergy, drug reaction', 'LOW'),
    ('General Medicine', 'common cold', 'LOW');
";

/// Error for unknown textual enum values
#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(ParseLabelError {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

/// Triage urgency level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Emergency,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "LOW",
            Urgency::Medium => "MEDIUM",
            Urgency::High => "HIGH",
            Urgency::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Urgency::Low),
            "MEDIUM" => Ok(Urgency::Medium),
            "HIGH" => Ok(Urgency::High),
            "EMERGENCY" => Ok(Urgency::Emergency),
            _ => Err(ParseLabelError {
                kind: "urgency level",
                value: s.to_string(),
            }),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(SessionStatus);
text_column!(Urgency);

/// One triage conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub is_emergency: bool,
    pub final_department: Option<String>,
    pub final_urgency: Option<Urgency>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// A fresh, active session
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            status: SessionStatus::Active,
            is_emergency: false,
            final_department: None,
            final_urgency: None,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Working memory for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub session_id: String,
    pub symptoms_collected: BTreeSet<String>,
    pub questions_asked: Vec<String>,
    pub ml_confidence: f64,
    pub predicted_department: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit row for one classifier call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionLogEntry {
    pub input_vector: BTreeMap<String, u8>,
    pub confidence: f64,
    pub predicted_condition: String,
    pub suggested_symptoms: Vec<String>,
}

/// Reference row mapping conditions onto a department
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentMapping {
    pub department_name: String,
    pub specialization: String,
    pub urgency_level: Urgency,
}

/// Chronic/genetic background forwarded to the classifier
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicalHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chronic_diseases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genetic_diseases: Option<String>,
    #[serde(default)]
    pub is_skipped: bool,
}

/// Row returned by session listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub final_department: Option<String>,
    pub final_urgency: Option<Urgency>,
    pub is_emergency: bool,
    pub status: SessionStatus,
    pub predicted_department: Option<String>,
    pub symptoms_collected: BTreeSet<String>,
}

/// Partial update of a chat session. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub is_emergency: Option<bool>,
    pub final_department: Option<String>,
    pub final_urgency: Option<Urgency>,
    pub status: Option<SessionStatus>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// Close a session as an emergency
    pub fn emergency(department: &str, now: DateTime<Utc>) -> Self {
        Self {
            is_emergency: Some(true),
            final_department: Some(department.to_string()),
            final_urgency: Some(Urgency::Emergency),
            status: Some(SessionStatus::Completed),
            ended_at: Some(now),
        }
    }

    /// Close a session with a resolved department
    pub fn completed(department: impl Into<String>, urgency: Urgency, now: DateTime<Utc>) -> Self {
        Self {
            is_emergency: None,
            final_department: Some(department.into()),
            final_urgency: Some(urgency),
            status: Some(SessionStatus::Completed),
            ended_at: Some(now),
        }
    }
}

/// Partial update of session state. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub symptoms_collected: Option<BTreeSet<String>>,
    pub questions_asked: Option<Vec<String>>,
    pub ml_confidence: Option<f64>,
    pub predicted_department: Option<String>,
}

/// Every write produced by one turn, applied all-or-nothing
#[derive(Debug, Clone, PartialEq)]
pub struct TurnCommit {
    pub session_id: String,
    pub new_session: Option<ChatSession>,
    pub session_patch: Option<SessionPatch>,
    pub state_patch: Option<StatePatch>,
    pub prediction_logs: Vec<PredictionLogEntry>,
}

impl TurnCommit {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            new_session: None,
            session_patch: None,
            state_patch: None,
            prediction_logs: Vec::new(),
        }
    }

    /// Mutable access to the state patch, creating it on first use
    pub fn state_patch_mut(&mut self) -> &mut StatePatch {
        self.state_patch.get_or_insert_with(StatePatch::default)
    }
}
