//! Pure state transition function

use super::state::{Phase, SymptomLedger, TriageState, ANSWER_SEVERITY, MAX_SEVERITY, MIN_SEVERITY};
use super::{Effect, Event, PredictionInput};
use crate::classifier::ClassifierResponse;
use crate::db::PredictionLogEntry;
use crate::triage::is_emergency;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TriageState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TriageState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("No recognizable symptoms were provided")]
    NoSymptoms,
    #[error("Symptom token must not be blank")]
    BlankToken,
    #[error("Severity must be between {MIN_SEVERITY} and {MAX_SEVERITY}, got {0}")]
    SeverityOutOfRange(u8),
    #[error("Session is already closed")]
    SessionClosed,
    #[error("Classifier returned no predictions")]
    EmptyPrediction,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; every side
/// effect is described by the returned [`Effect`]s.
pub fn transition(state: &TriageState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state.phase, event) {
        // Terminal phases absorb everything
        (Phase::Emergency | Phase::Concluded, _) => Err(TransitionError::SessionClosed),

        (Phase::Intake, Event::SymptomsReported { tokens }) => {
            if tokens.is_empty() {
                return Err(TransitionError::NoSymptoms);
            }
            Ok(after_ledger_update(SymptomLedger::opening(&tokens)))
        }

        (
            Phase::Active,
            Event::SymptomAnswered {
                token,
                has_symptom,
                severity,
            },
        ) => {
            let token = token.trim().to_lowercase();
            if !token.chars().any(char::is_alphanumeric) {
                return Err(TransitionError::BlankToken);
            }
            if let Some(s) = severity {
                if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&s) {
                    return Err(TransitionError::SeverityOutOfRange(s));
                }
            }

            // a denial only records the question; affirmed symptoms are never retracted
            let mut ledger = state.ledger.clone();
            if has_symptom {
                ledger.affirm(&token, severity.unwrap_or(ANSWER_SEVERITY));
            }
            ledger.mark_asked(&token);

            Ok(after_ledger_update(ledger))
        }

        (Phase::AwaitingPrediction, Event::PredictionReceived { response }) => {
            handle_prediction(state, response)
        }

        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in phase {phase:?}"
        ))),
    }
}

/// Emergency screening runs before anything is sent to the classifier.
fn after_ledger_update(ledger: SymptomLedger) -> TransitionResult {
    if is_emergency(ledger.collected().keys()) {
        return TransitionResult::new(TriageState {
            phase: Phase::Emergency,
            ledger,
        })
        .with_effect(Effect::PersistLedger)
        .with_effect(Effect::Escalate);
    }

    let input = PredictionInput {
        collected: ledger.collected().clone(),
        denied: ledger.denied(),
        question_counter: ledger.question_counter(),
    };

    TransitionResult::new(TriageState {
        phase: Phase::AwaitingPrediction,
        ledger,
    })
    .with_effect(Effect::PersistLedger)
    .with_effect(Effect::RequestPrediction(input))
}

fn handle_prediction(
    state: &TriageState,
    response: ClassifierResponse,
) -> Result<TransitionResult, TransitionError> {
    let top = response.top().cloned().ok_or(TransitionError::EmptyPrediction)?;

    let log = Effect::RecordPrediction(PredictionLogEntry {
        input_vector: state.ledger.collected().clone(),
        confidence: top.confidence,
        predicted_condition: top.disease.clone(),
        suggested_symptoms: response
            .next_question
            .iter()
            .map(|q| q.token.clone())
            .collect(),
    });

    // A non-final answer without a question leaves nothing to ask; close it.
    match response.next_question {
        Some(next_question) if !response.is_final => {
            Ok(TransitionResult::new(state.with_phase(Phase::Active))
                .with_effect(log)
                .with_effect(Effect::AskNext {
                    predictions: response.predictions,
                    next_question,
                    medical_history_note: response.medical_history_note,
                    confidence: top.confidence,
                }))
        }
        _ => Ok(TransitionResult::new(state.with_phase(Phase::Concluded))
            .with_effect(log)
            .with_effect(Effect::Conclude {
                condition: top.disease,
                confidence: top.confidence,
            })),
    }
}
