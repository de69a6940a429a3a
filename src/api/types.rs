//! API request and response types

use crate::db::SessionSummary;
use serde::{Deserialize, Serialize};

/// Default and bounds for `GET /api/chat/sessions?limit=`
pub const DEFAULT_SESSION_LIMIT: u32 = 20;
pub const MAX_SESSION_LIMIT: u32 = 100;

/// Request to open a session
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub raw_symptoms: String,
}

/// Answer to a follow-up question
#[derive(Debug, Deserialize)]
pub struct ContinueRequest {
    pub session_id: String,
    pub symptom_token: String,
    pub has_symptom: bool,
    #[serde(default)]
    pub severity: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub limit: Option<u32>,
}

impl SessionsQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_SESSION_LIMIT)
            .clamp(1, MAX_SESSION_LIMIT)
    }
}

/// Response with a user's sessions
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Response for the health probe
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            retryable: None,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = Some(true);
        self
    }
}
