//! HTTP handlers for the session API.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header::ACCEPT_LANGUAGE,
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::brief::prompts::{greeting_system, GREETING_PROMPT};
use crate::chat::events::{message_content, text_part, TurnRequest};
use crate::chat::turn::{run_turn, TurnStream};
use crate::errors::AppError;
use crate::models::message::MessageView;
use crate::models::session::SessionRow;
use crate::session::language::parse_language;
use crate::session::store::NewSessionRequest;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionRow>,
}

#[derive(Serialize)]
pub struct SessionDetailResponse {
    pub session: SessionRow,
    pub messages: Vec<MessageView>,
}

/// POST /api/session/new
///
/// Creates a session (optionally pre-filled from the body), generates the
/// greeting in the resolved language, and stores it as the first assistant
/// message. An empty body is accepted.
pub async fn handle_new_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionRow>, AppError> {
    let init: NewSessionRequest = if body.is_empty() {
        NewSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?
    };

    let session = state.store.create_session(&init).await?;

    // Language: explicit body value wins, then the Accept-Language header.
    let accept_language = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());
    let language = session
        .language
        .clone()
        .unwrap_or_else(|| parse_language(accept_language, "en"));

    let greeting = state
        .llm
        .call(GREETING_PROMPT, &greeting_system(&language))
        .await
        .map_err(|e| AppError::Llm(format!("Greeting generation failed: {e}")))?;

    state
        .store
        .append_message(
            session.id,
            "assistant",
            &message_content(vec![text_part(&greeting.text)]),
            None,
        )
        .await?;

    Ok(Json(session))
}

/// GET /api/session
pub async fn handle_list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.store.list_sessions().await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// GET /api/session/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let session = state
        .store
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
    let messages = state
        .store
        .get_messages(session_id)
        .await?
        .into_iter()
        .map(MessageView::from)
        .collect();
    Ok(Json(SessionDetailResponse { session, messages }))
}

/// POST /api/session/:id
///
/// The turn endpoint. Responds with an SSE stream of session-context,
/// text-delta, suggestion, and finish events.
pub async fn handle_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Result<TurnStream, AppError> {
    run_turn(state, session_id, request).await
}
