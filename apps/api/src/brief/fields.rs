//! Brief field schema — the ordered list of required fields and the
//! conversation step derived from them.

use serde::{Deserialize, Serialize};

use crate::brief::context::BriefContext;

/// The four required brief fields, in the order they are collected.
///
/// The ordering is a product decision: purpose is asked before audience,
/// core message last. Do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefField {
    Subject,
    Purpose,
    Audience,
    CoreMessage,
}

pub const FIELD_ORDER: [BriefField; 4] = [
    BriefField::Subject,
    BriefField::Purpose,
    BriefField::Audience,
    BriefField::CoreMessage,
];

impl BriefField {
    pub fn as_str(&self) -> &'static str {
        match self {
            BriefField::Subject => "subject",
            BriefField::Purpose => "purpose",
            BriefField::Audience => "audience",
            BriefField::CoreMessage => "core_message",
        }
    }
}

/// Conversation step. Stored as a string (`initial`, `collecting_<field>`,
/// `complete`) but handled as a closed enum so an invalid step is
/// unrepresentable in the turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Welcome,
    Collecting(BriefField),
    Complete,
}

impl Step {
    pub fn as_storage_str(&self) -> String {
        match self {
            Step::Welcome => "initial".to_string(),
            Step::Collecting(field) => format!("collecting_{}", field.as_str()),
            Step::Complete => "complete".to_string(),
        }
    }

    /// Parses a stored step string. Unknown values fall back to `Welcome`
    /// so legacy rows never break a turn.
    pub fn from_storage_str(s: &str) -> Step {
        match s {
            "complete" => Step::Complete,
            "collecting_subject" => Step::Collecting(BriefField::Subject),
            "collecting_purpose" => Step::Collecting(BriefField::Purpose),
            "collecting_audience" => Step::Collecting(BriefField::Audience),
            "collecting_core_message" => Step::Collecting(BriefField::CoreMessage),
            _ => Step::Welcome,
        }
    }
}

/// Returns the first field in `FIELD_ORDER` that is still unset, or `None`
/// when the brief is complete.
pub fn next_missing_field(context: &BriefContext) -> Option<BriefField> {
    FIELD_ORDER
        .into_iter()
        .find(|field| context.get(*field).is_none())
}

/// Derives the step for a context: collecting the next missing field, or
/// complete when all four are present.
pub fn derive_step(context: &BriefContext) -> Step {
    match next_missing_field(context) {
        Some(field) => Step::Collecting(field),
        None => Step::Complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_missing_field_empty_context_is_subject() {
        let context = BriefContext::default();
        assert_eq!(next_missing_field(&context), Some(BriefField::Subject));
    }

    #[test]
    fn test_next_missing_field_returns_earliest_gap() {
        // Purpose is unset even though audience (a later field) is present.
        let context = BriefContext {
            subject: Some("x".to_string()),
            audience: Some("y".to_string()),
            ..Default::default()
        };
        assert_eq!(next_missing_field(&context), Some(BriefField::Purpose));
    }

    #[test]
    fn test_next_missing_field_empty_string_counts_as_missing() {
        let context = BriefContext {
            subject: Some("x".to_string()),
            purpose: Some("".to_string()),
            ..Default::default()
        };
        assert_eq!(next_missing_field(&context), Some(BriefField::Purpose));
    }

    #[test]
    fn test_next_missing_field_none_when_all_present() {
        let context = full_context();
        assert_eq!(next_missing_field(&context), None);
        assert_eq!(derive_step(&context), Step::Complete);
    }

    #[test]
    fn test_field_order_is_fixed() {
        let names: Vec<&str> = FIELD_ORDER.iter().map(|f| f.as_str()).collect();
        assert_eq!(names, ["subject", "purpose", "audience", "core_message"]);
    }

    #[test]
    fn test_step_storage_round_trip() {
        for step in [
            Step::Welcome,
            Step::Collecting(BriefField::Subject),
            Step::Collecting(BriefField::Purpose),
            Step::Collecting(BriefField::Audience),
            Step::Collecting(BriefField::CoreMessage),
            Step::Complete,
        ] {
            assert_eq!(Step::from_storage_str(&step.as_storage_str()), step);
        }
    }

    #[test]
    fn test_unknown_step_string_parses_as_welcome() {
        assert_eq!(Step::from_storage_str("subject_definition"), Step::Welcome);
        assert_eq!(Step::from_storage_str(""), Step::Welcome);
    }

    fn full_context() -> BriefContext {
        BriefContext {
            subject: Some("Q3 results".to_string()),
            purpose: Some("secure budget approval".to_string()),
            audience: Some("the board".to_string()),
            core_message: Some("we beat forecast".to_string()),
            ..Default::default()
        }
    }
}
