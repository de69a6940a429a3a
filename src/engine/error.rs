//! Engine error types

use super::traits::StoreError;
use crate::classifier::ClassifierError;
use crate::state_machine::TransitionError;
use thiserror::Error;

/// Why a turn was aborted. No turn that fails commits anything.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("{0}")]
    Validation(String),
    /// Also used for sessions owned by someone else and completed sessions
    #[error("Session not found")]
    NotFound,
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(#[from] ClassifierError),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for TriageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SessionClosed(_) | StoreError::NotFound(_) => TriageError::NotFound,
            StoreError::Backend(message) => TriageError::Persistence(message),
        }
    }
}

impl From<TransitionError> for TriageError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NoSymptoms
            | TransitionError::BlankToken
            | TransitionError::SeverityOutOfRange(_) => TriageError::Validation(e.to_string()),
            TransitionError::SessionClosed => TriageError::NotFound,
            TransitionError::EmptyPrediction => {
                TriageError::ClassifierUnavailable(ClassifierError::invalid_response(e.to_string()))
            }
            TransitionError::InvalidTransition(message) => TriageError::Internal(message),
        }
    }
}
