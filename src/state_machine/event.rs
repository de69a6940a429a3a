//! Events that can occur in a triage session

use crate::classifier::ClassifierResponse;
use std::collections::BTreeSet;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// Opening complaint, already normalized
    SymptomsReported { tokens: BTreeSet<String> },

    /// Answer to a follow-up question
    SymptomAnswered {
        token: String,
        has_symptom: bool,
        severity: Option<u8>,
    },

    /// Classifier answered a prediction request
    PredictionReceived { response: ClassifierResponse },
}
