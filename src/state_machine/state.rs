//! Triage state types

use std::collections::{BTreeMap, BTreeSet};

/// Severity given to symptoms named in the opening complaint
pub const INITIAL_SEVERITY: u8 = 2;

/// Severity given to stored symptoms when a session is resumed. Severities
/// are not persisted, only the symptom set.
pub const RESTORED_SEVERITY: u8 = 2;

/// Severity given to an affirmed follow-up answer that names none
pub const ANSWER_SEVERITY: u8 = 3;

/// Inclusive bounds of the classifier's severity scale
pub const MIN_SEVERITY: u8 = 1;
pub const MAX_SEVERITY: u8 = 5;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing reported yet
    Intake,
    /// Waiting for the user's answer to a follow-up question
    Active,
    /// Symptoms recorded, classifier consulted
    AwaitingPrediction,
    /// Closed because an emergency phrase was reported
    Emergency,
    /// Closed with a resolved department
    Concluded,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Emergency | Phase::Concluded)
    }
}

/// Affirmed symptoms with severities plus every token asked about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymptomLedger {
    collected: BTreeMap<String, u8>,
    asked: Vec<String>,
}

impl SymptomLedger {
    /// Ledger for a brand-new session
    pub fn opening(tokens: &BTreeSet<String>) -> Self {
        Self {
            collected: tokens
                .iter()
                .map(|t| (t.clone(), INITIAL_SEVERITY))
                .collect(),
            asked: Vec::new(),
        }
    }

    /// Rebuild a ledger from stored session state
    pub fn restore(collected: &BTreeSet<String>, asked: &[String]) -> Self {
        let mut ledger = Self {
            collected: collected
                .iter()
                .map(|t| (t.clone(), RESTORED_SEVERITY))
                .collect(),
            asked: Vec::with_capacity(asked.len()),
        };
        for token in asked {
            ledger.mark_asked(token);
        }
        ledger
    }

    pub fn affirm(&mut self, token: &str, severity: u8) {
        self.collected.insert(token.to_string(), severity);
    }

    /// Record that `token` was asked about; repeats are ignored
    pub fn mark_asked(&mut self, token: &str) {
        if !self.asked.iter().any(|t| t == token) {
            self.asked.push(token.to_string());
        }
    }

    pub fn collected(&self) -> &BTreeMap<String, u8> {
        &self.collected
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Affirmed tokens without severities, as stored
    pub fn symptom_set(&self) -> BTreeSet<String> {
        self.collected.keys().cloned().collect()
    }

    /// Asked tokens the user did not affirm, in asking order
    pub fn denied(&self) -> Vec<String> {
        self.asked
            .iter()
            .filter(|t| !self.collected.contains_key(*t))
            .cloned()
            .collect()
    }

    pub fn question_counter(&self) -> usize {
        self.asked.len()
    }
}

/// Full state of one session as seen by the transition function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageState {
    pub phase: Phase,
    pub ledger: SymptomLedger,
}

impl TriageState {
    /// State of a session that has not been created yet
    pub fn intake() -> Self {
        Self {
            phase: Phase::Intake,
            ledger: SymptomLedger::default(),
        }
    }

    /// State of a stored, still-active session
    pub fn resume(ledger: SymptomLedger) -> Self {
        Self {
            phase: Phase::Active,
            ledger,
        }
    }

    pub fn with_phase(&self, phase: Phase) -> Self {
        Self {
            phase,
            ledger: self.ledger.clone(),
        }
    }
}
