//! Free-text symptom normalization

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Tokens this short carry no symptom meaning ("i", "a", "of", ...).
const MIN_TOKEN_LEN: usize = 3;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s,]").expect("Invalid symptom filter pattern"));

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+").expect("Invalid symptom separator pattern"));

/// Turn a free-text complaint into a set of lowercase symptom tokens.
///
/// Underscores and hyphens become word breaks, everything outside
/// `[a-z0-9]`, whitespace and commas is dropped, and tokens of two characters
/// or fewer are discarded. An empty result is not an error here; callers
/// decide whether that is acceptable.
pub fn normalize_symptoms(raw: &str) -> BTreeSet<String> {
    let lowered = raw.to_lowercase().replace(['_', '-'], " ");
    let cleaned = DISALLOWED.replace_all(&lowered, "");

    SEPARATORS
        .split(&cleaned)
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}
