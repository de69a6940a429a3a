//! Mock implementations for testing
//!
//! These mocks enable engine testing without real I/O.

use super::traits::*;
use crate::classifier::{
    ClassifierError, ClassifierRequest, ClassifierResponse, ClassifierService, NextQuestion, Prediction,
};
use crate::db::{
    ChatSession, DepartmentMapping, MedicalHistory, PredictionLogEntry, SessionState, SessionStatus,
    SessionSummary, TurnCommit, Urgency,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Classifier
// ============================================================================

/// Mock classifier that returns queued responses
pub struct MockClassifier {
    responses: Mutex<VecDeque<Result<ClassifierResponse, ClassifierError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<ClassifierRequest>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: ClassifierResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: ClassifierError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<ClassifierRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClassifierError::network("No mock response queued")))
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierService for MockClassifier {
    async fn predict(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError> {
        self.next(request)
    }

    fn endpoint(&self) -> &str {
        "mock://classifier"
    }
}

/// Mock classifier that sleeps before answering
pub struct DelayedMockClassifier {
    pub inner: MockClassifier,
    delay: Duration,
}

impl DelayedMockClassifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockClassifier::new(),
            delay,
        }
    }
}

#[async_trait]
impl ClassifierService for DelayedMockClassifier {
    async fn predict(&self, request: &ClassifierRequest) -> Result<ClassifierResponse, ClassifierError> {
        tokio::time::sleep(self.delay).await;
        self.inner.next(request)
    }

    fn endpoint(&self) -> &str {
        "mock://delayed-classifier"
    }
}

/// Non-final reply with a follow-up question
pub fn ask(disease: &str, confidence: f64, next_token: &str) -> ClassifierResponse {
    ClassifierResponse {
        predictions: vec![
            Prediction {
                disease: disease.to_string(),
                confidence,
            },
            Prediction {
                disease: "Common Cold".to_string(),
                confidence: (100.0 - confidence) / 2.0,
            },
        ],
        next_question: Some(NextQuestion {
            token: next_token.to_string(),
            text: format!("Are you experiencing '{}'?", next_token.replace('_', " ")),
        }),
        is_final: false,
        medical_history_note: None,
    }
}

/// Final reply
pub fn conclude(disease: &str, confidence: f64) -> ClassifierResponse {
    ClassifierResponse {
        predictions: vec![Prediction {
            disease: disease.to_string(),
            confidence,
        }],
        next_question: None,
        is_final: true,
        medical_history_note: None,
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Clone, Default)]
struct Tables {
    sessions: Vec<ChatSession>,
    states: HashMap<String, SessionState>,
    logs: Vec<(String, PredictionLogEntry)>,
    histories: HashMap<String, MedicalHistory>,
    mappings: Vec<DepartmentMapping>,
}

/// In-memory store with the same commit semantics as the database
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: Vec<DepartmentMapping>) -> Self {
        let store = Self::default();
        store.tables.lock().unwrap().mappings = mappings;
        store
    }

    pub fn set_medical_history(&self, user_id: &str, history: MedicalHistory) {
        self.tables
            .lock()
            .unwrap()
            .histories
            .insert(user_id.to_string(), history);
    }

    /// Make every following commit fail with a backend error
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn session(&self, session_id: &str) -> Option<ChatSession> {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub fn state(&self, session_id: &str) -> Option<SessionState> {
        self.tables.lock().unwrap().states.get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().unwrap().sessions.len()
    }

    pub fn prediction_logs(&self, session_id: &str) -> Vec<PredictionLogEntry> {
        self.tables
            .lock()
            .unwrap()
            .logs
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

fn apply(tables: &mut Tables, commit: &TurnCommit) -> Result<(), StoreError> {
    let id = &commit.session_id;
    let now = Utc::now();

    if let Some(session) = &commit.new_session {
        tables.sessions.push(session.clone());
    }
    if !tables.sessions.iter().any(|s| &s.session_id == id) {
        return Err(StoreError::NotFound(id.clone()));
    }

    if let Some(patch) = &commit.state_patch {
        let state = tables.states.entry(id.clone()).or_insert_with(|| SessionState {
            session_id: id.clone(),
            symptoms_collected: Default::default(),
            questions_asked: Vec::new(),
            ml_confidence: 0.0,
            predicted_department: None,
            updated_at: now,
        });
        if let Some(symptoms) = &patch.symptoms_collected {
            state.symptoms_collected.clone_from(symptoms);
        }
        if let Some(asked) = &patch.questions_asked {
            state.questions_asked.clone_from(asked);
        }
        if let Some(confidence) = patch.ml_confidence {
            state.ml_confidence = confidence;
        }
        if let Some(department) = &patch.predicted_department {
            state.predicted_department = Some(department.clone());
        }
        state.updated_at = now;
    }

    for entry in &commit.prediction_logs {
        tables.logs.push((id.clone(), entry.clone()));
    }

    if let Some(patch) = &commit.session_patch {
        let session = tables
            .sessions
            .iter_mut()
            .find(|s| &s.session_id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !session.is_active() {
            return Err(StoreError::SessionClosed(id.clone()));
        }
        if let Some(flag) = patch.is_emergency {
            session.is_emergency = flag;
        }
        if let Some(department) = &patch.final_department {
            session.final_department = Some(department.clone());
        }
        if let Some(urgency) = patch.final_urgency {
            session.final_urgency = Some(urgency);
        }
        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(ended_at) = patch.ended_at {
            session.ended_at = Some(ended_at);
        }
    }

    Ok(())
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.session_id == session_id && s.user_id == user_id)
            .cloned())
    }

    async fn get_state(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.state(session_id))
    }

    async fn list_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionSummary>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .take(limit as usize)
            .map(|s| {
                let state = tables.states.get(&s.session_id);
                SessionSummary {
                    session_id: s.session_id.clone(),
                    started_at: s.started_at,
                    ended_at: s.ended_at,
                    final_department: s.final_department.clone(),
                    final_urgency: s.final_urgency,
                    is_emergency: s.is_emergency,
                    status: s.status,
                    predicted_department: state.and_then(|st| st.predicted_department.clone()),
                    symptoms_collected: state.map(|st| st.symptoms_collected.clone()).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn medical_history(&self, user_id: &str) -> Result<Option<MedicalHistory>, StoreError> {
        Ok(self.tables.lock().unwrap().histories.get(user_id).cloned())
    }

    async fn department_mappings(&self) -> Result<Vec<DepartmentMapping>, StoreError> {
        Ok(self.tables.lock().unwrap().mappings.clone())
    }

    async fn commit_turn(&self, commit: &TurnCommit) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        // apply to a copy so a failed commit leaves nothing behind
        let mut next = tables.clone();
        apply(&mut next, commit)?;
        *tables = next;
        Ok(())
    }
}

pub fn mapping(department: &str, specialization: &str, urgency: Urgency) -> DepartmentMapping {
    DepartmentMapping {
        department_name: department.to_string(),
        specialization: specialization.to_string(),
        urgency_level: urgency,
    }
}

// ============================================================================
// Engine scenarios
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierErrorKind;
    use crate::db::Database;
    use crate::engine::response::EMERGENCY_MESSAGE;
    use crate::engine::{TriageEngine, TriageError};

    type TestEngine = TriageEngine<Arc<InMemoryStore>, Arc<MockClassifier>>;

    fn engine() -> (TestEngine, Arc<InMemoryStore>, Arc<MockClassifier>) {
        let store = Arc::new(InMemoryStore::with_mappings(vec![
            mapping("Neurology", "migraine, paralysis (brain hemorrhage)", Urgency::High),
            mapping("Hepatology", "hepatitis a, alcoholic hepatitis", Urgency::High),
            mapping("General Medicine", "common cold", Urgency::Low),
        ]));
        let classifier = Arc::new(MockClassifier::new());
        let engine = TriageEngine::new(Arc::clone(&store), Arc::clone(&classifier));
        (engine, store, classifier)
    }

    #[tokio::test]
    async fn test_start_with_emergency_never_calls_classifier() {
        let (engine, store, classifier) = engine();

        let response = engine.start("user-1", "I have chest pain and sweating").await.unwrap();

        assert!(response.is_emergency);
        assert!(response.is_final);
        assert_eq!(response.urgency_level, Some(Urgency::Emergency));
        assert_eq!(response.recommended_department.as_deref(), Some("Emergency Medicine"));
        assert_eq!(response.message.as_deref(), Some(EMERGENCY_MESSAGE));
        assert!(classifier.recorded_requests().is_empty());
        assert!(store.prediction_logs(&response.session_id).is_empty());

        let session = store.session(&response.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.is_emergency);
        assert_eq!(session.final_urgency, Some(Urgency::Emergency));
        assert!(session.ended_at.is_some());
        let state = store.state(&response.session_id).unwrap();
        assert!(state.symptoms_collected.contains("chest"));
        assert_eq!(state.predicted_department.as_deref(), Some("Emergency Medicine"));
    }

    #[tokio::test]
    async fn test_denied_follow_up_is_asked_not_collected() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        classifier.queue_response(ask("Migraine", 60.0, "vomiting"));

        let first = engine.start("user-1", "mild headache and fatigue").await.unwrap();
        assert!(!first.is_final);
        assert!(!first.is_emergency);
        assert_eq!(first.next_question.as_ref().map(|q| q.token.as_str()), Some("nausea"));
        assert_eq!(first.current_confidence, Some(45.0));

        let second = engine
            .continue_session(&first.session_id, "user-1", "nausea", false, None)
            .await
            .unwrap();
        assert_eq!(second.next_question.map(|q| q.token), Some("vomiting".to_string()));

        let state = store.state(&first.session_id).unwrap();
        assert_eq!(state.questions_asked, vec!["nausea"]);
        assert!(!state.symptoms_collected.contains("nausea"));
        assert!((state.ml_confidence - 60.0).abs() < f64::EPSILON);
        assert_eq!(state.predicted_department.as_deref(), Some("Migraine"));

        let requests = classifier.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].question_counter, 0);
        assert!(requests[0].denied_symptoms.is_empty());
        assert_eq!(requests[0].collected_symptoms.get("headache"), Some(&2));
        assert_eq!(requests[1].denied_symptoms, vec!["nausea"]);
        assert_eq!(requests[1].question_counter, 1);

        let logs = store.prediction_logs(&first.session_id);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].suggested_symptoms, vec!["nausea"]);
    }

    #[tokio::test]
    async fn test_denying_opening_symptom_does_not_retract_it() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        classifier.queue_response(ask("Migraine", 50.0, "vomiting"));

        let first = engine.start("user-1", "headache").await.unwrap();
        engine
            .continue_session(&first.session_id, "user-1", "headache", false, None)
            .await
            .unwrap();

        let state = store.state(&first.session_id).unwrap();
        assert!(state.symptoms_collected.contains("headache"));
        assert_eq!(state.questions_asked, vec!["headache"]);

        let requests = classifier.recorded_requests();
        assert!(requests[1].collected_symptoms.contains_key("headache"));
        assert!(requests[1].denied_symptoms.is_empty());
    }

    #[tokio::test]
    async fn test_affirmed_answer_uses_given_or_default_severity() {
        let (engine, _store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        classifier.queue_response(ask("Migraine", 55.0, "vomiting"));
        classifier.queue_response(ask("Migraine", 65.0, "blurred_vision"));

        let first = engine.start("user-1", "headache").await.unwrap();
        engine
            .continue_session(&first.session_id, "user-1", "nausea", true, Some(4))
            .await
            .unwrap();
        engine
            .continue_session(&first.session_id, "user-1", "vomiting", true, None)
            .await
            .unwrap();

        let last = classifier.recorded_requests().pop().unwrap();
        assert_eq!(last.collected_symptoms.get("vomiting"), Some(&3));
        // severities are not stored; resumed symptoms come back at the restored default
        assert_eq!(last.collected_symptoms.get("nausea"), Some(&2));
        assert_eq!(last.question_counter, 2);
    }

    #[tokio::test]
    async fn test_final_prediction_resolves_department() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(conclude("Migraine", 91.0));

        let response = engine.start("user-1", "headache, blurred vision").await.unwrap();

        assert!(response.is_final);
        assert_eq!(response.recommended_department.as_deref(), Some("Neurology"));
        assert_eq!(response.urgency_level, Some(Urgency::High));
        assert_eq!(response.confidence, Some(91.0));
        assert_eq!(
            response.message.as_deref(),
            Some("Our preliminary diagnosis is Migraine. We recommend consulting Neurology. Urgency level: HIGH.")
        );

        let session = store.session(&response.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.final_department.as_deref(), Some("Neurology"));
        assert!(!session.is_emergency);
    }

    #[tokio::test]
    async fn test_unmatched_condition_falls_back_to_general_medicine() {
        let (engine, _store, classifier) = engine();
        classifier.queue_response(conclude("unmatched_disease_xyz", 85.0));
        let response = engine.start("user-1", "headache").await.unwrap();
        assert_eq!(response.recommended_department.as_deref(), Some("General Medicine"));
        assert_eq!(response.urgency_level, Some(Urgency::Medium));
        assert!(response
            .message
            .as_deref()
            .is_some_and(|m| m.contains("unmatched disease xyz")));
    }

    #[tokio::test]
    async fn test_empty_complaint_is_rejected() {
        let (engine, store, classifier) = engine();
        let err = engine.start("user-1", "?! a b").await.unwrap_err();
        assert!(matches!(err, TriageError::Validation(_)));
        assert_eq!(store.session_count(), 0);
        assert!(classifier.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_on_start_leaves_no_session() {
        let (engine, store, classifier) = engine();
        classifier.queue_error(ClassifierError::timeout("too slow"));

        let err = engine.start("user-1", "headache").await.unwrap_err();
        assert!(matches!(
            err,
            TriageError::ClassifierUnavailable(ClassifierError {
                kind: ClassifierErrorKind::Timeout,
                ..
            })
        ));
        assert_eq!(store.session_count(), 0);
        assert!(engine.list_sessions("user-1", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_on_continue_leaves_state_unchanged() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        let first = engine.start("user-1", "headache").await.unwrap();
        let before = store.state(&first.session_id).unwrap();

        classifier.queue_error(ClassifierError::status(500, "boom"));
        let err = engine
            .continue_session(&first.session_id, "user-1", "nausea", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::ClassifierUnavailable(_)));

        assert_eq!(store.state(&first.session_id).unwrap(), before);
        assert_eq!(store.prediction_logs(&first.session_id).len(), 1);
        assert!(store.session(&first.session_id).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        store.fail_commits(true);
        let err = engine.start("user-1", "headache").await.unwrap_err();
        assert!(matches!(err, TriageError::Persistence(_)));
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_other_users_and_unknown_sessions_are_not_found() {
        let (engine, _store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        let first = engine.start("user-1", "headache").await.unwrap();

        let err = engine
            .continue_session(&first.session_id, "user-2", "nausea", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::NotFound));

        let err = engine
            .continue_session("no-such-session", "user-1", "nausea", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::NotFound));
        assert_eq!(classifier.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_completed_session_rejects_further_turns() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        classifier.queue_response(conclude("Migraine", 92.0));

        let first = engine.start("user-1", "headache").await.unwrap();
        let done = engine
            .continue_session(&first.session_id, "user-1", "nausea", true, None)
            .await
            .unwrap();
        assert!(done.is_final);
        let closed = store.session(&first.session_id).unwrap();

        let err = engine
            .continue_session(&first.session_id, "user-1", "fever", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::NotFound));
        assert_eq!(store.session(&first.session_id).unwrap(), closed);
        assert_eq!(classifier.recorded_requests().len(), 2);
        assert_eq!(engine.locks().len(), 0);
    }

    #[tokio::test]
    async fn test_emergency_answer_closes_session() {
        let (engine, store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "altered_sensorium"));
        let first = engine.start("user-1", "headache").await.unwrap();

        let response = engine
            .continue_session(&first.session_id, "user-1", "altered_sensorium", true, Some(5))
            .await
            .unwrap();
        assert!(response.is_emergency);
        assert_eq!(classifier.recorded_requests().len(), 1);

        let state = store.state(&first.session_id).unwrap();
        assert!(state.symptoms_collected.contains("altered_sensorium"));
        assert_eq!(state.questions_asked, vec!["altered_sensorium"]);
    }

    #[tokio::test]
    async fn test_invalid_answers_are_validation_errors() {
        let (engine, _store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        let first = engine.start("user-1", "headache").await.unwrap();

        for (token, severity) in [("   ", None), ("_", None), ("nausea", Some(0)), ("nausea", Some(9))] {
            let err = engine
                .continue_session(&first.session_id, "user-1", token, true, severity)
                .await
                .unwrap_err();
            assert!(matches!(err, TriageError::Validation(_)), "{token:?} {severity:?}");
        }
        assert_eq!(classifier.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_medical_history_is_forwarded() {
        let (engine, store, classifier) = engine();
        let history = MedicalHistory {
            chronic_diseases: Some("diabetes".to_string()),
            genetic_diseases: None,
            is_skipped: false,
        };
        store.set_medical_history("user-1", history.clone());
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));

        engine.start("user-1", "headache").await.unwrap();
        assert_eq!(classifier.recorded_requests()[0].medical_history, Some(history));
    }

    #[tokio::test]
    async fn test_concurrent_continues_serialize() {
        let store = Arc::new(InMemoryStore::new());
        let classifier = Arc::new(DelayedMockClassifier::new(Duration::from_millis(50)));
        classifier.inner.queue_response(ask("Migraine", 40.0, "nausea"));
        classifier.inner.queue_response(ask("Migraine", 50.0, "fever"));
        classifier.inner.queue_response(ask("Migraine", 60.0, "chills"));
        let engine = Arc::new(TriageEngine::new(Arc::clone(&store), Arc::clone(&classifier)));

        let first = engine.start("user-1", "headache").await.unwrap();

        let a = {
            let engine = Arc::clone(&engine);
            let id = first.session_id.clone();
            tokio::spawn(async move { engine.continue_session(&id, "user-1", "nausea", true, None).await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            let id = first.session_id.clone();
            tokio::spawn(async move { engine.continue_session(&id, "user-1", "fever", false, None).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // no lost update: both answers survive
        let state = store.state(&first.session_id).unwrap();
        assert_eq!(state.questions_asked.len(), 2);
        assert!(state.questions_asked.contains(&"nausea".to_string()));
        assert!(state.questions_asked.contains(&"fever".to_string()));
        assert!(state.symptoms_collected.contains("nausea"));

        // the later turn saw the earlier one's commit
        let requests = classifier.inner.recorded_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].question_counter, 2);
    }

    #[tokio::test]
    async fn test_cancelled_turn_frees_its_lock_entry() {
        let store = Arc::new(InMemoryStore::new());
        let classifier = Arc::new(DelayedMockClassifier::new(Duration::from_millis(500)));
        classifier.inner.queue_response(ask("Migraine", 40.0, "nausea"));
        classifier.inner.queue_response(ask("Migraine", 50.0, "fever"));
        let engine = Arc::new(TriageEngine::new(Arc::clone(&store), Arc::clone(&classifier)));

        let first = engine.start("user-1", "headache").await.unwrap();
        let before = store.state(&first.session_id).unwrap();

        let turn = {
            let engine = Arc::clone(&engine);
            let id = first.session_id.clone();
            tokio::spawn(async move { engine.continue_session(&id, "user-1", "nausea", true, None).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.locks().len(), 1);

        // client went away while the classifier was thinking
        turn.abort();
        assert!(turn.await.unwrap_err().is_cancelled());

        assert_eq!(engine.locks().len(), 0);
        assert_eq!(store.state(&first.session_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_lock_entry_survives_while_a_turn_waits() {
        let (engine, _store, _classifier) = engine();
        let locks = engine.locks();

        let holder = locks.slot("s-1");
        let held = holder.lock().await;
        let waiter = locks.slot("s-1");
        drop(held);
        drop(holder);
        assert_eq!(locks.len(), 1);

        drop(waiter);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first() {
        let (engine, _store, classifier) = engine();
        classifier.queue_response(ask("Migraine", 45.0, "nausea"));
        let older = engine.start("user-1", "headache").await.unwrap();
        let newer = engine.start("user-1", "chest pain").await.unwrap();

        let sessions = engine.list_sessions("user-1", 20).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, newer.session_id);
        assert!(sessions[0].is_emergency);
        assert_eq!(sessions[1].session_id, older.session_id);
        assert_eq!(sessions[1].predicted_department.as_deref(), Some("Migraine"));

        assert_eq!(engine.list_sessions("user-1", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_over_sqlite_store() {
        let store = DatabaseStore::new(Database::open_in_memory().unwrap());
        let classifier = Arc::new(MockClassifier::new());
        classifier.queue_response(ask("Alcoholic_hepatitis", 55.0, "yellowish_skin"));
        classifier.queue_response(conclude("Alcoholic_hepatitis", 88.0));
        let engine = TriageEngine::new(store.clone(), Arc::clone(&classifier));

        let first = engine.start("user-1", "abdominal pain, vomiting").await;
        // "pain" trips the emergency screen
        assert!(first.unwrap().is_emergency);

        let first = engine.start("user-1", "vomiting, dark urine").await.unwrap();
        let done = engine
            .continue_session(&first.session_id, "user-1", "yellowish_skin", true, Some(3))
            .await
            .unwrap();
        assert_eq!(done.recommended_department.as_deref(), Some("Hepatology"));
        assert_eq!(done.urgency_level, Some(Urgency::High));

        let sessions = engine.list_sessions("user-1", 20).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Completed));

        let err = engine
            .continue_session(&first.session_id, "user-1", "fever", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::NotFound));
    }
}
