//! Combined topic classifier + context extractor.
//!
//! One structured model call per turn judges whether the user's message is
//! on-topic and, if so, pulls any new brief field values out of it. The
//! model's output is never trusted blindly: it is validated against the
//! per-field length bounds and rejected when malformed. A failed or invalid
//! call degrades to "no updates, on-topic" so the conversation continues.

use serde::Deserialize;
use tracing::warn;

use crate::brief::context::BriefContext;
use crate::brief::prompts::{build_extraction_prompt, EXTRACTION_SYSTEM};
use crate::llm_client::LlmClient;

/// Max characters for subject, purpose, audience, and structure.
const MAX_SHORT_FIELD_CHARS: usize = 255;
/// Max characters for the core message.
const MAX_CORE_MESSAGE_CHARS: usize = 2000;
/// Max characters for the language code.
const MAX_LANGUAGE_CHARS: usize = 10;

/// One extra attempt after the first invalid/failed call.
const MAX_EXTRACTION_ATTEMPTS: u32 = 2;

/// Validated output of one extraction call. When `is_off_topic` is true no
/// field values are present — off-topic detection takes precedence over
/// anything the model may have extracted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub is_off_topic: bool,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub purpose: Option<String>,
    pub audience: Option<String>,
    pub core_message: Option<String>,
    pub structure: Option<String>,
}

/// Raw model output, before validation.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    is_off_topic: bool,
    language: Option<String>,
    subject: Option<String>,
    purpose: Option<String>,
    audience: Option<String>,
    core_message: Option<String>,
    structure: Option<String>,
}

/// Tagged result of one extraction attempt, per the validate-or-fallback
/// policy: a malformed object must never flow into the merge logic.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Ok(ExtractionResult),
    Invalid(String),
    CallFailed(String),
}

/// Runs the classifier/extractor and always yields a usable result.
///
/// Invalid or failed calls are retried once and then fall back to the empty
/// on-topic result, logged but never fatal to the turn.
pub async fn extract_or_default(
    llm: &LlmClient,
    context: &BriefContext,
    last_question: &str,
    answer: &str,
) -> ExtractionResult {
    for attempt in 1..=MAX_EXTRACTION_ATTEMPTS {
        match classify_and_extract(llm, context, last_question, answer).await {
            ExtractionOutcome::Ok(result) => return result,
            ExtractionOutcome::Invalid(reason) => {
                warn!("Extraction attempt {attempt} returned invalid data: {reason}");
            }
            ExtractionOutcome::CallFailed(reason) => {
                warn!("Extraction attempt {attempt} failed: {reason}");
            }
        }
    }
    warn!("Extraction degraded to empty result; continuing turn with unchanged context");
    ExtractionResult::default()
}

/// One classifier/extractor call, validated.
pub async fn classify_and_extract(
    llm: &LlmClient,
    context: &BriefContext,
    last_question: &str,
    answer: &str,
) -> ExtractionOutcome {
    let prompt = build_extraction_prompt(context, last_question, answer);
    let raw: RawExtraction = match llm.call_json(&prompt, EXTRACTION_SYSTEM).await {
        Ok(raw) => raw,
        Err(e) => return ExtractionOutcome::CallFailed(e.to_string()),
    };
    match validate(raw) {
        Ok(result) => ExtractionOutcome::Ok(result),
        Err(reason) => ExtractionOutcome::Invalid(reason),
    }
}

/// Enforces the extraction schema bounds and normalizes blank values away.
fn validate(raw: RawExtraction) -> Result<ExtractionResult, String> {
    let language = bounded("language", raw.language, MAX_LANGUAGE_CHARS)?;

    // Off-topic takes precedence: drop any field values the model produced
    // anyway, keeping only the language detection.
    if raw.is_off_topic {
        return Ok(ExtractionResult {
            is_off_topic: true,
            language,
            ..Default::default()
        });
    }

    Ok(ExtractionResult {
        is_off_topic: false,
        language,
        subject: bounded("subject", raw.subject, MAX_SHORT_FIELD_CHARS)?,
        purpose: bounded("purpose", raw.purpose, MAX_SHORT_FIELD_CHARS)?,
        audience: bounded("audience", raw.audience, MAX_SHORT_FIELD_CHARS)?,
        core_message: bounded("core_message", raw.core_message, MAX_CORE_MESSAGE_CHARS)?,
        structure: bounded("structure", raw.structure, MAX_SHORT_FIELD_CHARS)?,
    })
}

fn bounded(
    name: &str,
    value: Option<String>,
    max_chars: usize,
) -> Result<Option<String>, String> {
    match value {
        None => Ok(None),
        Some(v) => {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let chars = trimmed.chars().count();
            if chars > max_chars {
                return Err(format!("{name} exceeds {max_chars} chars ({chars})"));
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawExtraction {
        RawExtraction {
            is_off_topic: false,
            language: None,
            subject: None,
            purpose: None,
            audience: None,
            core_message: None,
            structure: None,
        }
    }

    #[test]
    fn test_validate_accepts_in_bounds_fields() {
        let result = validate(RawExtraction {
            language: Some("en".to_string()),
            subject: Some("Q3 results".to_string()),
            audience: Some("board".to_string()),
            ..raw()
        })
        .unwrap();
        assert_eq!(result.subject.as_deref(), Some("Q3 results"));
        assert_eq!(result.audience.as_deref(), Some("board"));
        assert_eq!(result.language.as_deref(), Some("en"));
        assert!(!result.is_off_topic);
    }

    #[test]
    fn test_validate_rejects_overlong_subject() {
        let result = validate(RawExtraction {
            subject: Some("x".repeat(256)),
            ..raw()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_core_message_has_wider_bound() {
        let ok = validate(RawExtraction {
            core_message: Some("y".repeat(2000)),
            ..raw()
        });
        assert!(ok.is_ok());

        let too_long = validate(RawExtraction {
            core_message: Some("y".repeat(2001)),
            ..raw()
        });
        assert!(too_long.is_err());
    }

    #[test]
    fn test_validate_rejects_overlong_language_code() {
        let result = validate(RawExtraction {
            language: Some("x".repeat(11)),
            ..raw()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_normalizes_blank_to_none() {
        let result = validate(RawExtraction {
            subject: Some("   ".to_string()),
            purpose: Some("".to_string()),
            ..raw()
        })
        .unwrap();
        assert_eq!(result.subject, None);
        assert_eq!(result.purpose, None);
    }

    #[test]
    fn test_validate_trims_values() {
        let result = validate(RawExtraction {
            subject: Some("  launch plan  ".to_string()),
            ..raw()
        })
        .unwrap();
        assert_eq!(result.subject.as_deref(), Some("launch plan"));
    }

    #[test]
    fn test_off_topic_drops_extracted_fields() {
        // Even if the model extracts values alongside is_off_topic, they
        // must not survive validation.
        let result = validate(RawExtraction {
            is_off_topic: true,
            subject: Some("the weather".to_string()),
            language: Some("en".to_string()),
            ..raw()
        })
        .unwrap();
        assert!(result.is_off_topic);
        assert_eq!(result.subject, None);
        assert_eq!(result.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_bound_is_chars_not_bytes() {
        // 255 Hangul syllables are 765 UTF-8 bytes but still in bounds.
        let result = validate(RawExtraction {
            subject: Some("가".repeat(255)),
            ..raw()
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_raw_extraction_defaults_off_topic_false() {
        let parsed: RawExtraction =
            serde_json::from_str(r#"{"subject": "AI"}"#).unwrap();
        assert!(!parsed.is_off_topic);
        assert_eq!(parsed.subject.as_deref(), Some("AI"));
    }
}
