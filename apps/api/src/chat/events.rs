//! Wire shapes for one chat turn: the inbound message list with its ordered
//! parts, and the outbound SSE event sequence.
//!
//! Inbound parts are kept as raw JSON values — the turn pipeline only reads
//! `text` parts and the `data-start-session` kickoff signal; every other
//! part type passes through untouched when the message is persisted.

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::brief::context::BriefContext;
use crate::llm_client::Usage;

/// Request body of the turn endpoint.
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Value>,
}

impl InboundMessage {
    /// Concatenated text of all `text` parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect()
    }

    /// Returns the kickoff signal if this message carries one: a
    /// `data-start-session` part, with its optional raw language hint
    /// (e.g. `ko-KR`).
    pub fn kickoff(&self) -> Option<Kickoff> {
        let part = self
            .parts
            .iter()
            .find(|p| p.get("type").and_then(Value::as_str) == Some("data-start-session"))?;
        Some(Kickoff {
            lang: part
                .get("data")
                .and_then(|d| d.get("lang"))
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}

/// Client-sent marker for a fresh session start, distinct from an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Kickoff {
    pub lang: Option<String>,
}

/// Suggestion candidates plus the one-off "these are just examples" notice.
/// The notice is a first-class output, never folded into the candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionData {
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub notice: String,
}

impl SuggestionData {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.notice.is_empty()
    }
}

/// One event on the outbound turn stream, in emission order: an optional
/// context update, any number of text deltas, an optional suggestion event,
/// then a single finish (or error) event.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    SessionContext(BriefContext),
    TextDelta(String),
    Suggestion(SuggestionData),
    Error(String),
    Finish {
        text: String,
        finish_reason: Option<String>,
        usage: Option<Usage>,
    },
}

impl TurnEvent {
    pub fn into_sse(self) -> Event {
        let (name, data) = match self {
            TurnEvent::SessionContext(context) => {
                ("session-context", json!({ "context": context }))
            }
            TurnEvent::TextDelta(delta) => ("text-delta", json!({ "delta": delta })),
            TurnEvent::Suggestion(suggestion) => ("suggestion", json!(suggestion)),
            TurnEvent::Error(message) => ("error", json!({ "message": message })),
            TurnEvent::Finish {
                text,
                finish_reason,
                usage,
            } => (
                "finish",
                json!({
                    "text": text,
                    "finish_reason": finish_reason,
                    "usage": usage,
                }),
            ),
        };
        Event::default()
            .event(name)
            .json_data(&data)
            .unwrap_or_else(|_| Event::default().event(name))
    }
}

/// Builds the stored `content` object for a message: `{"parts": [...]}`.
pub fn message_content(parts: Vec<Value>) -> Value {
    json!({ "parts": parts })
}

/// A `text` message part.
pub fn text_part(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

/// A `data-suggestion` message part.
pub fn suggestion_part(suggestion: &SuggestionData) -> Value {
    json!({ "type": "data-suggestion", "data": suggestion })
}

/// A `data-session-context` message part carrying the post-merge snapshot.
pub fn session_context_part(context: &BriefContext) -> Value {
    json!({ "type": "data-session-context", "data": context })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_concatenates_only_text_parts() {
        let message: InboundMessage = serde_json::from_value(json!({
            "role": "user",
            "parts": [
                { "type": "text", "text": "Hello " },
                { "type": "data-something", "data": { "x": 1 } },
                { "type": "text", "text": "world" }
            ]
        }))
        .unwrap();
        assert_eq!(message.text(), "Hello world");
    }

    #[test]
    fn test_kickoff_detected_with_language_hint() {
        let message: InboundMessage = serde_json::from_value(json!({
            "role": "user",
            "parts": [
                { "type": "data-start-session", "data": { "lang": "ko-KR" } }
            ]
        }))
        .unwrap();
        let kickoff = message.kickoff().unwrap();
        assert_eq!(kickoff.lang.as_deref(), Some("ko-KR"));
    }

    #[test]
    fn test_kickoff_absent_for_plain_answer() {
        let message: InboundMessage = serde_json::from_value(json!({
            "role": "user",
            "parts": [{ "type": "text", "text": "investors" }]
        }))
        .unwrap();
        assert_eq!(message.kickoff(), None);
    }

    #[test]
    fn test_kickoff_without_lang_hint() {
        let message: InboundMessage = serde_json::from_value(json!({
            "role": "user",
            "parts": [{ "type": "data-start-session" }]
        }))
        .unwrap();
        let kickoff = message.kickoff().unwrap();
        assert_eq!(kickoff.lang, None);
    }

    #[test]
    fn test_message_content_wraps_parts_in_order() {
        let suggestion = SuggestionData {
            candidates: vec!["a".to_string()],
            notice: "just examples".to_string(),
        };
        let content = message_content(vec![
            text_part("answer"),
            suggestion_part(&suggestion),
        ]);
        let parts = content["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "data-suggestion");
        assert_eq!(parts[1]["data"]["notice"], "just examples");
    }

    #[test]
    fn test_suggestion_data_is_empty() {
        assert!(SuggestionData::default().is_empty());
        assert!(!SuggestionData {
            candidates: vec![],
            notice: "n".to_string()
        }
        .is_empty());
    }
}
