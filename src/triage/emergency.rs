//! Emergency screening
//!
//! Matching is deliberately loose: a token trips the check when it contains an
//! emergency phrase *or* is contained in one. That over-triggers on fragments
//! such as "pain" or "chest", which is the intended bias.

/// Canonical phrases that end a session as an emergency.
pub const EMERGENCY_PHRASES: &[&str] = &[
    "chest pain",
    "severe chest pain",
    "breathlessness",
    "severe breathlessness",
    "unconscious",
    "unconsciousness",
    "severe bleeding",
    "blood in sputum",
    "altered sensorium",
    "paralysis",
    "stroke",
    "seizure",
    "cardiac arrest",
    "heart attack",
    "difficulty breathing",
    "cannot breathe",
];

/// Department and urgency recorded for every emergency outcome.
pub const EMERGENCY_DEPARTMENT: &str = "Emergency Medicine";

/// Returns true if any affirmed token matches any emergency phrase.
pub fn is_emergency<I, S>(affirmed: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    affirmed
        .into_iter()
        .any(|token| token_matches(token.as_ref()))
}

/// Returns the first phrase a token matches, for logging.
/// Tokens with no letters or digits never match.
pub fn matching_phrase(token: &str) -> Option<&'static str> {
    if !token.chars().any(char::is_alphanumeric) {
        return None;
    }
    let spaced = token.replace('_', " ");
    let spaced = spaced.trim();
    EMERGENCY_PHRASES
        .iter()
        .copied()
        .find(|phrase| contains_either_way(token, phrase) || contains_either_way(spaced, phrase))
}

fn token_matches(token: &str) -> bool {
    matching_phrase(token).is_some()
}

fn contains_either_way(token: &str, phrase: &str) -> bool {
    token.contains(phrase) || phrase.contains(token)
}
