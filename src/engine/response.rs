//! Turn results returned to callers

use crate::classifier::{NextQuestion, Prediction};
use crate::db::Urgency;
use crate::triage::emergency::EMERGENCY_DEPARTMENT;
use crate::triage::DepartmentResolution;
use serde::Serialize;

pub const EMERGENCY_MESSAGE: &str = "EMERGENCY: Please seek immediate medical attention!";

/// Outcome of one turn. Absent optionals are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub is_emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency_level: Option<Urgency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<NextQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_predictions: Option<Vec<Prediction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_history_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub is_final: bool,
}

impl TurnResponse {
    fn base(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            is_emergency: false,
            urgency_level: None,
            recommended_department: None,
            message: None,
            next_question: None,
            current_confidence: None,
            top_predictions: None,
            medical_history_note: None,
            confidence: None,
            is_final: false,
        }
    }

    pub fn emergency(session_id: &str) -> Self {
        Self {
            is_emergency: true,
            urgency_level: Some(Urgency::Emergency),
            recommended_department: Some(EMERGENCY_DEPARTMENT.to_string()),
            message: Some(EMERGENCY_MESSAGE.to_string()),
            is_final: true,
            ..Self::base(session_id)
        }
    }

    pub fn question(
        session_id: &str,
        predictions: Vec<Prediction>,
        next_question: NextQuestion,
        medical_history_note: Option<String>,
        confidence: f64,
    ) -> Self {
        Self {
            next_question: Some(next_question),
            current_confidence: Some(confidence),
            top_predictions: Some(predictions),
            medical_history_note,
            ..Self::base(session_id)
        }
    }

    pub fn concluded(
        session_id: &str,
        condition: &str,
        resolution: &DepartmentResolution,
        confidence: f64,
    ) -> Self {
        let readable = condition.replace('_', " ");
        Self {
            urgency_level: Some(resolution.urgency),
            recommended_department: Some(resolution.department.clone()),
            message: Some(format!(
                "Our preliminary diagnosis is {readable}. We recommend consulting {}. Urgency level: {}.",
                resolution.department, resolution.urgency
            )),
            confidence: Some(confidence),
            is_final: true,
            ..Self::base(session_id)
        }
    }
}
