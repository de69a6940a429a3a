//! HTTP classifier client

use super::{ClassifierConfig, ClassifierError, ClassifierRequest, ClassifierResponse, ClassifierService};
use async_trait::async_trait;
use reqwest::Client;

/// Classifier reached over `POST {base_url}/predict`
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/predict", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ClassifierService for HttpClassifier {
    async fn predict(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::timeout(format!("Request timeout: {e}"))
                } else {
                    ClassifierError::network(format!("Connection failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::timeout(format!("Response timeout: {e}"))
            } else {
                ClassifierError::network(format!("Failed to read response: {e}"))
            }
        })?;

        if !status.is_success() {
            return Err(ClassifierError::status(status.as_u16(), &body));
        }

        let parsed: ClassifierResponse = serde_json::from_str(&body).map_err(|e| {
            ClassifierError::invalid_response(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        if parsed.predictions.is_empty() {
            return Err(ClassifierError::invalid_response("Classifier returned no predictions"));
        }

        Ok(parsed)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
