//! Effects produced by state transitions

use crate::classifier::{NextQuestion, Prediction};
use crate::db::PredictionLogEntry;
use std::collections::BTreeMap;

/// Classifier inputs derived from the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    pub collected: BTreeMap<String, u8>,
    pub denied: Vec<String>,
    pub question_counter: usize,
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist the ledger's symptom set and asked questions
    PersistLedger,

    /// Close the session as an emergency
    Escalate,

    /// Ask the classifier for a prediction
    RequestPrediction(PredictionInput),

    /// Append to the prediction log and update the running confidence
    RecordPrediction(PredictionLogEntry),

    /// Close the session with the predicted condition
    Conclude { condition: String, confidence: f64 },

    /// Reply with the next follow-up question
    AskNext {
        predictions: Vec<Prediction>,
        next_question: NextQuestion,
        medical_history_note: Option<String>,
        confidence: f64,
    },
}
