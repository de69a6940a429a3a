//! Condition → department resolution

use crate::db::{DepartmentMapping, Urgency};

/// Department used when no mapping row matches.
pub const FALLBACK_DEPARTMENT: &str = "General Medicine";

/// Unmatched predictions at or above this confidence are still worth a
/// medium-urgency visit.
pub const FALLBACK_MEDIUM_CONFIDENCE: f64 = 80.0;

/// Outcome of a department lookup
#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentResolution {
    pub department: String,
    pub urgency: Urgency,
    /// False when the fallback was used
    pub matched: bool,
}

/// Map a predicted condition to a department and urgency.
///
/// Lookup is case-insensitive and reads `_` in the condition as a space. A
/// row whose department name equals the condition wins outright; otherwise
/// the first row (in mapping order) whose specialization contains the
/// condition is used. A blank condition matches nothing.
pub fn resolve_department(
    condition: &str,
    confidence: f64,
    mappings: &[DepartmentMapping],
) -> DepartmentResolution {
    let needle = condition.replace('_', " ").trim().to_lowercase();

    let found = if needle.is_empty() {
        None
    } else {
        mappings
            .iter()
            .find(|m| m.department_name.to_lowercase() == needle)
            .or_else(|| {
                mappings
                    .iter()
                    .find(|m| m.specialization.to_lowercase().contains(&needle))
            })
    };

    match found {
        Some(mapping) => DepartmentResolution {
            department: mapping.department_name.clone(),
            urgency: mapping.urgency_level,
            matched: true,
        },
        None => DepartmentResolution {
            department: FALLBACK_DEPARTMENT.to_string(),
            urgency: if confidence >= FALLBACK_MEDIUM_CONFIDENCE {
                Urgency::Medium
            } else {
                Urgency::Low
            },
            matched: false,
        },
    }
}
