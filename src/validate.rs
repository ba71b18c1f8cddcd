//! Declarative per-collection document validation.
//!
//! Rules run on write payloads before the dispatcher issues the store
//! call. They are conditional on field presence — a missing field never
//! fails a rule (required-field enforcement belongs to the store's own
//! schema). Every applicable rule is evaluated so the caller sees all
//! violations at once.

use crate::ast::Value;

/// One field constraint for one collection.
pub struct Rule {
    pub collection: &'static str,
    pub field: &'static str,
    /// Returns true when the present field value is acceptable.
    pub check: fn(&Value) -> bool,
    pub message: &'static str,
}

/// Numeric range check. Non-numeric values pass; type enforcement is
/// the store's job, not the rule table's.
fn in_range(v: &Value, min: f64, max: f64) -> bool {
    v.as_f64().is_none_or(|n| n >= min && n <= max)
}

/// The rule table. Collections without entries always validate.
pub static RULES: &[Rule] = &[
    Rule {
        collection: "courses",
        field: "price",
        check: |v| v.as_f64().is_none_or(|n| n >= 0.0),
        message: "Price cannot be negative",
    },
    Rule {
        collection: "courses",
        field: "rating",
        check: |v| in_range(v, 0.0, 5.0),
        message: "Rating must be between 0 and 5",
    },
    Rule {
        collection: "courses",
        field: "duration_hours",
        check: |v| v.as_f64().is_none_or(|n| n > 0.0),
        message: "Duration must be positive",
    },
    Rule {
        collection: "reviews",
        field: "rating",
        check: |v| in_range(v, 0.0, 5.0),
        message: "Rating must be between 0 and 5",
    },
    Rule {
        collection: "enrollments",
        field: "progress_percent",
        check: |v| in_range(v, 0.0, 100.0),
        message: "Progress must be between 0 and 100",
    },
    Rule {
        collection: "enrollments",
        field: "final_grade",
        // Explicitly-null grades are allowed (course not finished).
        check: |v| matches!(v, Value::Null) || in_range(v, 0.0, 100.0),
        message: "Final grade must be between 0 and 100",
    },
    Rule {
        collection: "payments",
        field: "amount",
        check: |v| v.as_f64().is_none_or(|n| n >= 0.0),
        message: "Payment amount cannot be negative",
    },
];

/// Check a candidate document against the rules for `collection`.
///
/// Returns every violated rule message; an empty list means valid.
pub fn validate(doc: &Value, collection: &str) -> Vec<String> {
    let mut violations = Vec::new();
    for rule in RULES {
        if rule.collection != collection {
            continue;
        }
        if let Some(field_value) = doc.get(rule.field) {
            if !(rule.check)(field_value) {
                violations.push(rule.message.to_string());
            }
        }
    }
    violations
}
