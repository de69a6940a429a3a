//! Symptom classifier abstraction
//!
//! The classifier ranks candidate conditions for the symptoms collected so
//! far and suggests the next symptom to ask about.

mod error;
mod http;
mod types;

pub use error::{ClassifierError, ClassifierErrorKind};
pub use http::HttpClassifier;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default classifier base URL
pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:5001";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Connection settings for the classifier service
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CLASSIFIER_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CLASSIFIER_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("CLASSIFIER_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map_or(defaults.timeout, Duration::from_millis),
        }
    }
}

/// Common interface for classifier backends
#[async_trait]
pub trait ClassifierService: Send + Sync {
    /// Rank conditions for the given symptom context
    async fn predict(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError>;

    /// Where requests go, for logs
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: ClassifierService + ?Sized> ClassifierService for Arc<T> {
    async fn predict(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError> {
        (**self).predict(request).await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Logging wrapper for classifier services
pub struct LoggingClassifier {
    inner: Arc<dyn ClassifierService>,
    endpoint: String,
}

impl LoggingClassifier {
    pub fn new(inner: Arc<dyn ClassifierService>) -> Self {
        let endpoint = inner.endpoint().to_string();
        Self { inner, endpoint }
    }
}

#[async_trait]
impl ClassifierService for LoggingClassifier {
    async fn predict(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError> {
        let start = std::time::Instant::now();
        let result = self.inner.predict(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    endpoint = %self.endpoint,
                    duration_ms = %duration.as_millis(),
                    collected = request.collected_symptoms.len(),
                    denied = request.denied_symptoms.len(),
                    top_confidence = response.top().map_or(0.0, |p| p.confidence),
                    is_final = response.is_final,
                    "Classifier request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    "Classifier request failed"
                );
            }
        }

        result
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
