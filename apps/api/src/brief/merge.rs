//! Merge policy — applies an extraction result to the stored context.
//!
//! Rules, in order:
//! 1. Off-topic turns change no brief fields and leave the step alone
//!    (language may still refresh from the latest detection).
//! 2. Brief fields are first-write-wins: a populated field is never
//!    overwritten by ordinary extraction.
//! 3. Language is always overwritten when the extractor detected one — the
//!    user may switch languages mid-conversation.
//! 4. The step is recomputed against the post-merge context, so the next
//!    question never repeats a just-answered field.

use crate::brief::context::BriefContext;
use crate::brief::extract::ExtractionResult;
use crate::brief::fields::{derive_step, next_missing_field, BriefField, Step, FIELD_ORDER};

/// The sparse set of updates actually applied this turn. `None` fields are
/// left untouched by `apply` and by the persistence write.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub is_off_topic: bool,
    pub step: Step,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub purpose: Option<String>,
    pub audience: Option<String>,
    pub core_message: Option<String>,
    pub structure: Option<String>,
}

impl TurnOutcome {
    /// Overlays this outcome onto a context. Only provided values are
    /// written; nothing is ever nulled out.
    pub fn apply(&self, context: &mut BriefContext) {
        for field in FIELD_ORDER {
            if let Some(value) = self.field_update(field) {
                context.set(field, value.to_string());
            }
        }
        if let Some(structure) = &self.structure {
            context.structure = Some(structure.clone());
        }
        if let Some(language) = &self.language {
            context.language = Some(language.clone());
        }
        context.set_step(self.step);
    }

    /// True when the outcome changes anything beyond re-stating the step.
    pub fn has_updates(&self) -> bool {
        self.language.is_some()
            || self.structure.is_some()
            || FIELD_ORDER.iter().any(|f| self.field_update(*f).is_some())
    }

    fn field_update(&self, field: BriefField) -> Option<&str> {
        match field {
            BriefField::Subject => self.subject.as_deref(),
            BriefField::Purpose => self.purpose.as_deref(),
            BriefField::Audience => self.audience.as_deref(),
            BriefField::CoreMessage => self.core_message.as_deref(),
        }
    }
}

/// Computes the turn outcome for an extraction against the current context.
pub fn merge(context: &BriefContext, extraction: &ExtractionResult) -> TurnOutcome {
    if extraction.is_off_topic {
        // No brief field changes, step unchanged. Language may still update.
        return TurnOutcome {
            is_off_topic: true,
            step: context.step(),
            language: extraction.language.clone(),
            subject: None,
            purpose: None,
            audience: None,
            core_message: None,
            structure: None,
        };
    }

    let mut outcome = TurnOutcome {
        is_off_topic: false,
        step: context.step(),
        language: extraction.language.clone(),
        subject: first_write(context.get(BriefField::Subject), &extraction.subject),
        purpose: first_write(context.get(BriefField::Purpose), &extraction.purpose),
        audience: first_write(context.get(BriefField::Audience), &extraction.audience),
        core_message: first_write(
            context.get(BriefField::CoreMessage),
            &extraction.core_message,
        ),
        structure: first_write(context.structure.as_deref(), &extraction.structure),
    };

    // Step must reflect the post-merge state, not the pre-merge state.
    let mut merged = context.clone();
    outcome.apply(&mut merged);
    outcome.step = derive_step(&merged);
    outcome
}

/// Builds the outcome for a session kickoff: start collecting the first
/// missing field and adopt the client's language hint, bypassing extraction.
pub fn kickoff(context: &BriefContext, language_hint: Option<String>) -> TurnOutcome {
    TurnOutcome {
        is_off_topic: false,
        step: next_missing_field(context)
            .map(Step::Collecting)
            .unwrap_or(Step::Complete),
        language: language_hint,
        subject: None,
        purpose: None,
        audience: None,
        core_message: None,
        structure: None,
    }
}

fn first_write(current: Option<&str>, extracted: &Option<String>) -> Option<String> {
    match (current, extracted) {
        (None, Some(value)) if !value.trim().is_empty() => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_context() -> BriefContext {
        BriefContext {
            step: Step::Complete.as_storage_str(),
            language: Some("en".to_string()),
            subject: Some("Q3 results".to_string()),
            purpose: Some("secure budget approval".to_string()),
            audience: Some("the board".to_string()),
            core_message: Some("we beat forecast".to_string()),
            ..Default::default()
        }
    }

    fn extraction_with(subject: &str, audience: &str) -> ExtractionResult {
        ExtractionResult {
            subject: Some(subject.to_string()),
            audience: Some(audience.to_string()),
            language: Some("en".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_off_topic_preserves_every_field_and_step() {
        let context = BriefContext {
            step: "collecting_purpose".to_string(),
            subject: Some("Q3 results".to_string()),
            language: Some("en".to_string()),
            ..Default::default()
        };
        let extraction = ExtractionResult {
            is_off_topic: true,
            ..Default::default()
        };

        let outcome = merge(&context, &extraction);
        let mut merged = context.clone();
        outcome.apply(&mut merged);

        assert!(outcome.is_off_topic);
        assert_eq!(merged.subject, context.subject);
        assert_eq!(merged.step(), context.step());
        assert_eq!(merged.language, context.language);
    }

    #[test]
    fn test_first_write_wins_per_field() {
        let context = BriefContext {
            subject: Some("original subject".to_string()),
            ..Default::default()
        };
        let extraction = extraction_with("hijacked subject", "board");

        let outcome = merge(&context, &extraction);
        assert_eq!(outcome.subject, None);
        assert_eq!(outcome.audience.as_deref(), Some("board"));

        let mut merged = context.clone();
        outcome.apply(&mut merged);
        assert_eq!(merged.subject.as_deref(), Some("original subject"));
    }

    #[test]
    fn test_language_always_overwritten() {
        let context = BriefContext {
            language: Some("en".to_string()),
            ..Default::default()
        };
        let extraction = ExtractionResult {
            language: Some("ko".to_string()),
            ..Default::default()
        };

        let outcome = merge(&context, &extraction);
        assert_eq!(outcome.language.as_deref(), Some("ko"));
    }

    #[test]
    fn test_language_updates_even_on_off_topic_turn() {
        let context = BriefContext {
            language: Some("en".to_string()),
            ..Default::default()
        };
        let extraction = ExtractionResult {
            is_off_topic: true,
            language: Some("ja".to_string()),
            ..Default::default()
        };

        let outcome = merge(&context, &extraction);
        assert!(outcome.is_off_topic);
        assert_eq!(outcome.language.as_deref(), Some("ja"));
    }

    #[test]
    fn test_step_reflects_post_merge_state() {
        // Scenario A: subject and audience arrive together on an empty
        // context; the next step must be purpose, not subject.
        let context = BriefContext::default();
        let outcome = merge(&context, &extraction_with("Q3 results", "board"));

        assert_eq!(outcome.step, Step::Collecting(BriefField::Purpose));
        assert_eq!(outcome.subject.as_deref(), Some("Q3 results"));
        assert_eq!(outcome.audience.as_deref(), Some("board"));
        assert_eq!(outcome.purpose, None);
    }

    #[test]
    fn test_step_complete_when_all_fields_present() {
        let context = full_context();
        let outcome = merge(&context, &ExtractionResult::default());
        assert_eq!(outcome.step, Step::Complete);
    }

    #[test]
    fn test_removing_any_field_steps_back_to_collecting_it() {
        for field in FIELD_ORDER {
            let mut context = full_context();
            match field {
                BriefField::Subject => context.subject = None,
                BriefField::Purpose => context.purpose = None,
                BriefField::Audience => context.audience = None,
                BriefField::CoreMessage => context.core_message = None,
            }
            let outcome = merge(&context, &ExtractionResult::default());
            assert_eq!(outcome.step, Step::Collecting(field));
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let context = BriefContext::default();
        let extraction = extraction_with("Q3 results", "board");

        let first = merge(&context, &extraction);
        let mut merged = context.clone();
        first.apply(&mut merged);

        // Re-applying the same extraction is a no-op: the fields are now
        // populated, so first-write-wins suppresses every update.
        let second = merge(&merged, &extraction);
        assert_eq!(second.subject, None);
        assert_eq!(second.audience, None);
        assert_eq!(second.step, first.step);

        let mut merged_again = merged.clone();
        second.apply(&mut merged_again);
        assert_eq!(merged_again, merged);
    }

    #[test]
    fn test_structure_is_first_write_wins_but_never_gates_step() {
        let context = BriefContext::default();
        let extraction = ExtractionResult {
            structure: Some("problem-solution".to_string()),
            ..Default::default()
        };
        let outcome = merge(&context, &extraction);
        assert_eq!(outcome.structure.as_deref(), Some("problem-solution"));
        // Structure alone does not advance collection.
        assert_eq!(outcome.step, Step::Collecting(BriefField::Subject));
    }

    #[test]
    fn test_kickoff_targets_first_missing_field() {
        let outcome = kickoff(&BriefContext::default(), Some("ko".to_string()));
        assert_eq!(outcome.step, Step::Collecting(BriefField::Subject));
        assert_eq!(outcome.language.as_deref(), Some("ko"));
        assert!(!outcome.is_off_topic);
    }

    #[test]
    fn test_kickoff_on_prefilled_session_skips_known_fields() {
        let context = BriefContext {
            subject: Some("Q3 results".to_string()),
            ..Default::default()
        };
        let outcome = kickoff(&context, None);
        assert_eq!(outcome.step, Step::Collecting(BriefField::Purpose));
    }

    #[test]
    fn test_has_updates() {
        let empty = merge(&BriefContext::default(), &ExtractionResult::default());
        assert!(!empty.has_updates());

        let with_field = merge(
            &BriefContext::default(),
            &extraction_with("Q3 results", "board"),
        );
        assert!(with_field.has_updates());
    }
}
