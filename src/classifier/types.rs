//! Classifier wire types

use crate::db::MedicalHistory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRequest {
    /// Affirmed symptom token → severity (1..=5)
    pub collected_symptoms: BTreeMap<String, u8>,
    pub denied_symptoms: Vec<String>,
    pub question_counter: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<MedicalHistory>,
}

/// One ranked candidate condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub disease: String,
    /// Percentage, 0-100
    pub confidence: f64,
}

/// Follow-up question suggested by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextQuestion {
    pub token: String,
    pub text: String,
}

/// Reply to `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResponse {
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub next_question: Option<NextQuestion>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub medical_history_note: Option<String>,
}

impl ClassifierResponse {
    /// Highest-ranked prediction
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }
}
