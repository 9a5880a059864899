//! Turn orchestrator — one user message in, one streamed assistant reply out.
//!
//! Flow: load context → kickoff or extract+merge → persist merged context →
//! stream the reply while suggestions generate concurrently → persist the
//! exchange transactionally → emit the finish event.
//!
//! The context is fully merged and persisted before either prompt is built,
//! so both the reply and the suggestions read post-merge state. The reply
//! stream never waits for suggestions; suggestions are joined only before
//! the assistant message is written, degrading to empty on failure.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::brief::context::BriefContext;
use crate::brief::extract::extract_or_default;
use crate::brief::merge::{kickoff, merge, TurnOutcome};
use crate::brief::prompts::{
    build_question_prompt, build_suggestions_prompt, reply_system, suggestion_system,
};
use crate::chat::events::{
    message_content, session_context_part, suggestion_part, text_part, SuggestionData,
    TurnEvent, TurnRequest,
};
use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::session::language::parse_language;
use crate::state::AppState;

/// Max suggestion candidates kept from one suggestions call.
const MAX_SUGGESTION_CANDIDATES: usize = 5;
/// Max characters per suggestion candidate.
const MAX_CANDIDATE_CHARS: usize = 255;
/// Max characters for the suggestions notice.
const MAX_NOTICE_CHARS: usize = 300;

type EventSender = mpsc::UnboundedSender<Result<Event, Infallible>>;

pub type TurnStream = Sse<UnboundedReceiverStream<Result<Event, Infallible>>>;

/// Runs one turn for a session and returns the SSE response.
pub async fn run_turn(
    state: AppState,
    session_id: Uuid,
    request: TurnRequest,
) -> Result<TurnStream, AppError> {
    let session = state
        .store
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
    let context = session.context();

    let last_user = request
        .messages
        .last()
        .filter(|m| m.role == "user")
        .ok_or_else(|| AppError::Validation("Request carries no user message".to_string()))?
        .clone();
    let user_text = last_user.text();
    let last_question = match request.messages.len().checked_sub(2) {
        Some(i) => request.messages[i].text(),
        None => String::new(),
    };

    // Kickoff signals bypass extraction entirely; a normal answer goes
    // through the combined classifier/extractor.
    let outcome: TurnOutcome = match last_user.kickoff() {
        Some(signal) => {
            info!("Session {session_id}: kickoff (lang hint {:?})", signal.lang);
            let hint = signal.lang.map(|raw| parse_language(Some(&raw), "en"));
            kickoff(&context, hint.or_else(|| context.language.clone()))
        }
        None => {
            let extraction =
                extract_or_default(&state.llm, &context, &last_question, &user_text).await;
            merge(&context, &extraction)
        }
    };

    let mut merged = context.clone();
    outcome.apply(&mut merged);
    let context_changed = outcome.has_updates() || merged.step != context.step;

    info!(
        "Session {session_id}: step {} -> {} (off_topic={})",
        context.step, merged.step, outcome.is_off_topic
    );

    // Persist before any prompt is built: both generators read post-merge
    // state, and a crash after this point loses no collected field.
    state.store.update_context(session_id, &merged).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(stream_turn(
        state,
        session_id,
        tx,
        merged,
        outcome.is_off_topic,
        user_text,
        last_user.parts,
        context_changed,
    ));

    Ok(Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// The streaming half of the turn: emits events into the SSE channel and
/// persists the exchange once the reply completes. Send failures mean the
/// client disconnected; everything in flight is then abandoned and the
/// partial exchange is not persisted — the session resumes from its last
/// committed state.
#[allow(clippy::too_many_arguments)]
async fn stream_turn(
    state: AppState,
    session_id: Uuid,
    tx: EventSender,
    merged: BriefContext,
    is_off_topic: bool,
    user_text: String,
    user_parts: Vec<serde_json::Value>,
    context_changed: bool,
) {
    if context_changed {
        let event = TurnEvent::SessionContext(merged.clone());
        if tx.send(Ok(event.into_sse())).is_err() {
            return;
        }
    }

    // Suggestions run concurrently with the reply and push their own event
    // the moment they resolve — before, during, or after reply streaming.
    let suggestions_handle = tokio::spawn(generate_suggestions(
        state.llm.clone(),
        merged.clone(),
        is_off_topic,
        tx.clone(),
    ));

    let question_prompt = build_question_prompt(
        &merged,
        Some(user_text.as_str()).filter(|t| !t.is_empty()),
        is_off_topic,
    );
    let system = reply_system(merged.language.as_deref());

    let reply = state
        .llm
        .call_stream(&question_prompt, &system, |delta| {
            tx.send(Ok(TurnEvent::TextDelta(delta.to_string()).into_sse()))
                .is_ok()
        })
        .await;

    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            error!("Session {session_id}: reply generation failed: {e}");
            suggestions_handle.abort();
            let _ = tx.send(Ok(
                TurnEvent::Error("Reply generation failed".to_string()).into_sse()
            ));
            return;
        }
    };

    if !reply.completed {
        // Client went away mid-stream; skip persistence, best-effort.
        warn!("Session {session_id}: client disconnected mid-reply, exchange not persisted");
        suggestions_handle.abort();
        return;
    }

    // Suggestions must be final before the assistant message is written so
    // the persisted record carries them. A panicked task degrades to empty.
    let suggestions = suggestions_handle.await.unwrap_or_default();

    let mut user_parts = user_parts;
    if context_changed {
        user_parts.push(session_context_part(&merged));
    }
    let user_content = message_content(user_parts);
    let assistant_content = message_content(vec![
        text_part(&reply.text),
        suggestion_part(&suggestions),
    ]);
    let metadata = json!({
        "finish_reason": reply.finish_reason,
        "usage": reply.usage,
    });

    if let Err(e) = state
        .store
        .finalize_turn(session_id, &user_content, &assistant_content, &metadata)
        .await
    {
        error!("Session {session_id}: failed to persist exchange: {e}");
        let _ = tx.send(Ok(TurnEvent::Error(
            "The exchange could not be saved".to_string(),
        )
        .into_sse()));
    }

    let _ = tx.send(Ok(TurnEvent::Finish {
        text: reply.text,
        finish_reason: reply.finish_reason,
        usage: reply.usage,
    }
    .into_sse()));
}

/// Generates suggestions for the turn and emits the suggestion event as
/// soon as they resolve. Off-topic turns and failures yield empty data and
/// no event; the main reply is never blocked or failed by this path.
async fn generate_suggestions(
    llm: LlmClient,
    context: BriefContext,
    is_off_topic: bool,
    tx: EventSender,
) -> SuggestionData {
    if is_off_topic {
        return SuggestionData::default();
    }
    let Some(prompt) = build_suggestions_prompt(&context) else {
        return SuggestionData::default();
    };
    let system = suggestion_system(context.language.as_deref());

    let suggestions = match llm.call_json::<SuggestionData>(&prompt, &system).await {
        Ok(raw) => sanitize_suggestions(raw),
        Err(e) => {
            warn!("Suggestions generation failed: {e}");
            SuggestionData::default()
        }
    };

    if !suggestions.is_empty() {
        let _ = tx.send(Ok(TurnEvent::Suggestion(suggestions.clone()).into_sse()));
    }
    suggestions
}

/// Clamps model-produced suggestions to the schema bounds instead of
/// trusting them: blank or overlong candidates are dropped, the list is
/// capped, and an overlong notice is truncated.
fn sanitize_suggestions(raw: SuggestionData) -> SuggestionData {
    let candidates: Vec<String> = raw
        .candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && c.chars().count() <= MAX_CANDIDATE_CHARS)
        .take(MAX_SUGGESTION_CANDIDATES)
        .collect();
    let notice = if raw.notice.chars().count() > MAX_NOTICE_CHARS {
        raw.notice.chars().take(MAX_NOTICE_CHARS).collect()
    } else {
        raw.notice.trim().to_string()
    };
    SuggestionData { candidates, notice }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_drops_blank_and_overlong_candidates() {
        let raw = SuggestionData {
            candidates: vec![
                "  Company executives  ".to_string(),
                "".to_string(),
                "x".repeat(256),
                "University students".to_string(),
            ],
            notice: "These are just examples — type your own.".to_string(),
        };
        let clean = sanitize_suggestions(raw);
        assert_eq!(
            clean.candidates,
            vec!["Company executives", "University students"]
        );
    }

    #[test]
    fn test_sanitize_caps_candidate_count() {
        let raw = SuggestionData {
            candidates: (0..8).map(|i| format!("candidate {i}")).collect(),
            notice: "pick one or type your own".to_string(),
        };
        let clean = sanitize_suggestions(raw);
        assert_eq!(clean.candidates.len(), MAX_SUGGESTION_CANDIDATES);
    }

    #[test]
    fn test_sanitize_truncates_overlong_notice() {
        let raw = SuggestionData {
            candidates: vec![],
            notice: "n".repeat(400),
        };
        let clean = sanitize_suggestions(raw);
        assert_eq!(clean.notice.chars().count(), MAX_NOTICE_CHARS);
    }
}
