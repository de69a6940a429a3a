//! Classifier error types

use thiserror::Error;

/// Classifier error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ClassifierError {
    pub kind: ClassifierErrorKind,
    pub message: String,
}

impl ClassifierError {
    pub fn new(kind: ClassifierErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ClassifierErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ClassifierErrorKind::Network, message)
    }

    pub fn status(code: u16, body: &str) -> Self {
        Self::new(
            ClassifierErrorKind::Status,
            format!("Classifier returned HTTP {code}: {body}"),
        )
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ClassifierErrorKind::InvalidResponse, message)
    }
}

/// Why the classifier could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierErrorKind {
    /// No answer within the configured timeout
    Timeout,
    /// Connection refused, reset, DNS failure
    Network,
    /// Non-2xx reply
    Status,
    /// Undecodable body or an empty prediction list
    InvalidResponse,
}

impl ClassifierErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Status => "status",
            Self::InvalidResponse => "invalid_response",
        }
    }
}
