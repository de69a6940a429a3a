//! Trait abstractions for engine I/O
//!
//! These traits enable testing the engine with in-memory implementations.

use crate::db::{
    ChatSession, Database, DbError, DepartmentMapping, MedicalHistory, SessionState, SessionSummary,
    TurnCommit,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Storage failures as seen by the engine
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session was completed by someone else before this turn committed
    #[error("Session already completed: {0}")]
    SessionClosed(String),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Backend(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionClosed(id) => StoreError::SessionClosed(id),
            DbError::SessionNotFound(id) => StoreError::NotFound(id),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Storage for sessions and their working state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Session owned by `user_id`, if any
    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>, StoreError>;

    async fn get_state(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;

    async fn list_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionSummary>, StoreError>;

    async fn medical_history(&self, user_id: &str) -> Result<Option<MedicalHistory>, StoreError>;

    /// Department reference rows in lookup order
    async fn department_mappings(&self) -> Result<Vec<DepartmentMapping>, StoreError>;

    /// Apply all writes of a turn atomically. A session patch against a
    /// completed session fails with [`StoreError::SessionClosed`].
    async fn commit_turn(&self, commit: &TurnCommit) -> Result<(), StoreError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>, StoreError> {
        (**self).get_session(session_id, user_id).await
    }

    async fn get_state(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        (**self).get_state(session_id).await
    }

    async fn list_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionSummary>, StoreError> {
        (**self).list_sessions(user_id, limit).await
    }

    async fn medical_history(&self, user_id: &str) -> Result<Option<MedicalHistory>, StoreError> {
        (**self).medical_history(user_id).await
    }

    async fn department_mappings(&self) -> Result<Vec<DepartmentMapping>, StoreError> {
        (**self).department_mappings().await
    }

    async fn commit_turn(&self, commit: &TurnCommit) -> Result<(), StoreError> {
        (**self).commit_turn(commit).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as a SessionStore
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>, StoreError> {
        match self.db.get_session(session_id, user_id) {
            Ok(session) => Ok(Some(session)),
            Err(DbError::SessionNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_state(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.db.get_state(session_id)?)
    }

    async fn list_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionSummary>, StoreError> {
        Ok(self.db.list_sessions(user_id, limit)?)
    }

    async fn medical_history(&self, user_id: &str) -> Result<Option<MedicalHistory>, StoreError> {
        Ok(self.db.medical_history(user_id)?)
    }

    async fn department_mappings(&self) -> Result<Vec<DepartmentMapping>, StoreError> {
        Ok(self.db.department_mappings()?)
    }

    async fn commit_turn(&self, commit: &TurnCommit) -> Result<(), StoreError> {
        Ok(self.db.commit_turn(commit)?)
    }
}
