//! Turn executor
//!
//! Drives the pure state machine for one turn, executes its effects and
//! commits everything the turn produced in one store call.

use super::error::TriageError;
use super::response::TurnResponse;
use super::traits::SessionStore;
use crate::classifier::{ClassifierRequest, ClassifierService};
use crate::db::{ChatSession, SessionPatch, SessionSummary, TurnCommit};
use crate::state_machine::{transition, Effect, Event, SymptomLedger, TriageState};
use crate::triage::emergency::{matching_phrase, EMERGENCY_DEPARTMENT};
use crate::triage::{normalize_symptoms, resolve_department};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;

/// Confidence recorded for sessions closed as emergencies
const EMERGENCY_CONFIDENCE: f64 = 100.0;

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// One async mutex per session with a turn in flight
#[derive(Default)]
pub struct SessionLocks {
    inner: StdMutex<LockMap>,
}

impl SessionLocks {
    /// Register interest in `session_id`. The entry lives as long as some
    /// slot for it does, even when the turn is dropped mid-await.
    pub fn slot(&self, session_id: &str) -> SessionSlot<'_> {
        let lock = Arc::clone(self.map().entry(session_id.to_string()).or_default());
        SessionSlot {
            locks: self,
            session_id: session_id.to_string(),
            lock,
        }
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map().len()
    }
}

/// A claim on one session's mutex
pub struct SessionSlot<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    lock: Arc<Mutex<()>>,
}

impl SessionSlot<'_> {
    /// Wait until no other turn holds this session
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for SessionSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map();
        // only the map and this slot still point at the mutex
        if map
            .get(&self.session_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2)
        {
            map.remove(&self.session_id);
        }
    }
}

/// Everything one turn accumulates before it commits
struct Turn {
    user_id: String,
    commit: TurnCommit,
    response: Option<TurnResponse>,
}

impl Turn {
    fn new(session_id: &str, user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            commit: TurnCommit::new(session_id),
            response: None,
        }
    }

    fn session_id(&self) -> &str {
        &self.commit.session_id
    }
}

/// Triage session engine
pub struct TriageEngine<S, C> {
    store: S,
    classifier: C,
    locks: SessionLocks,
}

impl<S, C> TriageEngine<S, C>
where
    S: SessionStore,
    C: ClassifierService,
{
    pub fn new(store: S, classifier: C) -> Self {
        Self {
            store,
            classifier,
            locks: SessionLocks::default(),
        }
    }

    /// Open a session from a free-text complaint
    pub async fn start(&self, user_id: &str, raw_symptoms: &str) -> Result<TurnResponse, TriageError> {
        let tokens = normalize_symptoms(raw_symptoms);
        let session_id = uuid::Uuid::new_v4().to_string();

        let mut turn = Turn::new(&session_id, user_id);
        turn.commit.new_session = Some(ChatSession::new(&session_id, user_id, Utc::now()));

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            symptoms = tokens.len(),
            "Starting triage session"
        );

        let state = self
            .run(&mut turn, TriageState::intake(), Event::SymptomsReported { tokens })
            .await?;
        self.store.commit_turn(&turn.commit).await?;

        if state.phase.is_terminal() {
            tracing::info!(session_id = %session_id, phase = ?state.phase, "Session closed on first turn");
        }
        turn.response
            .ok_or_else(|| TriageError::Internal("Turn produced no response".to_string()))
    }

    /// Record the answer to a follow-up question
    pub async fn continue_session(
        &self,
        session_id: &str,
        user_id: &str,
        symptom_token: &str,
        has_symptom: bool,
        severity: Option<u8>,
    ) -> Result<TurnResponse, TriageError> {
        let slot = self.locks.slot(session_id);
        let _turn = slot.lock().await;
        self.continue_locked(session_id, user_id, symptom_token, has_symptom, severity)
            .await
    }

    async fn continue_locked(
        &self,
        session_id: &str,
        user_id: &str,
        symptom_token: &str,
        has_symptom: bool,
        severity: Option<u8>,
    ) -> Result<TurnResponse, TriageError> {
        let session = self
            .store
            .get_session(session_id, user_id)
            .await?
            .filter(ChatSession::is_active)
            .ok_or(TriageError::NotFound)?;
        let stored = self
            .store
            .get_state(&session.session_id)
            .await?
            .ok_or(TriageError::NotFound)?;

        let ledger = SymptomLedger::restore(&stored.symptoms_collected, &stored.questions_asked);
        let mut turn = Turn::new(session_id, user_id);
        let event = Event::SymptomAnswered {
            token: symptom_token.to_string(),
            has_symptom,
            severity,
        };

        let state = self.run(&mut turn, TriageState::resume(ledger), event).await?;
        self.store.commit_turn(&turn.commit).await?;

        if state.phase.is_terminal() {
            tracing::info!(session_id = %session_id, phase = ?state.phase, "Session closed");
        }
        turn.response
            .ok_or_else(|| TriageError::Internal("Turn produced no response".to_string()))
    }

    /// Most recent sessions of a user
    pub async fn list_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionSummary>, TriageError> {
        Ok(self.store.list_sessions(user_id, limit).await?)
    }

    /// Feed `event` and every event its effects generate through the state machine
    async fn run(&self, turn: &mut Turn, initial: TriageState, event: Event) -> Result<TriageState, TriageError> {
        let mut state = initial;
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = transition(&state, current_event)?;
            state = result.new_state;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(turn, &state, effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(state)
    }

    async fn execute_effect(
        &self,
        turn: &mut Turn,
        state: &TriageState,
        effect: Effect,
    ) -> Result<Option<Event>, TriageError> {
        match effect {
            Effect::PersistLedger => {
                let patch = turn.commit.state_patch_mut();
                patch.symptoms_collected = Some(state.ledger.symptom_set());
                patch.questions_asked = Some(state.ledger.asked().to_vec());
                Ok(None)
            }

            Effect::Escalate => {
                let phrase = state
                    .ledger
                    .collected()
                    .keys()
                    .find_map(|token| matching_phrase(token));
                tracing::warn!(
                    session_id = %turn.session_id(),
                    phrase = ?phrase,
                    "Emergency symptom reported"
                );
                let now = Utc::now();
                turn.commit.session_patch = Some(SessionPatch::emergency(EMERGENCY_DEPARTMENT, now));
                let patch = turn.commit.state_patch_mut();
                patch.ml_confidence = Some(EMERGENCY_CONFIDENCE);
                patch.predicted_department = Some(EMERGENCY_DEPARTMENT.to_string());
                turn.response = Some(TurnResponse::emergency(turn.session_id()));
                Ok(None)
            }

            Effect::RequestPrediction(input) => {
                let medical_history = self.store.medical_history(&turn.user_id).await?;
                let request = ClassifierRequest {
                    collected_symptoms: input.collected,
                    denied_symptoms: input.denied,
                    question_counter: input.question_counter,
                    medical_history,
                };
                let response = self.classifier.predict(&request).await?;
                Ok(Some(Event::PredictionReceived { response }))
            }

            Effect::RecordPrediction(entry) => {
                let patch = turn.commit.state_patch_mut();
                patch.ml_confidence = Some(entry.confidence);
                patch.predicted_department = Some(entry.predicted_condition.clone());
                turn.commit.prediction_logs.push(entry);
                Ok(None)
            }

            Effect::Conclude {
                condition,
                confidence,
            } => {
                let mappings = self.store.department_mappings().await?;
                let resolution = resolve_department(&condition, confidence, &mappings);
                tracing::info!(
                    session_id = %turn.session_id(),
                    condition = %condition,
                    confidence,
                    department = %resolution.department,
                    urgency = %resolution.urgency,
                    matched = resolution.matched,
                    "Session concluded"
                );
                turn.commit.session_patch = Some(SessionPatch::completed(
                    resolution.department.clone(),
                    resolution.urgency,
                    Utc::now(),
                ));
                turn.response = Some(TurnResponse::concluded(
                    turn.session_id(),
                    &condition,
                    &resolution,
                    confidence,
                ));
                Ok(None)
            }

            Effect::AskNext {
                predictions,
                next_question,
                medical_history_note,
                confidence,
            } => {
                tracing::debug!(
                    session_id = %turn.session_id(),
                    next = %next_question.token,
                    confidence,
                    "Asking follow-up question"
                );
                turn.response = Some(TurnResponse::question(
                    turn.session_id(),
                    predictions,
                    next_question,
                    medical_history_note,
                    confidence,
                ));
                Ok(None)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &SessionLocks {
        &self.locks
    }
}
