//! Session store — all `chat_session` / `chat_message` persistence.
//!
//! Passed explicitly into handlers and the turn pipeline; there is no
//! ambient database handle. The final writes of a turn (user message,
//! assistant message, updated-at touch) run in a single transaction so the
//! context never desyncs from the message history.

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::brief::context::BriefContext;
use crate::models::message::MessageRow;
use crate::models::session::SessionRow;

/// Optional initial field values accepted at session creation.
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionRequest {
    pub step: Option<String>,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub purpose: Option<String>,
    pub audience: Option<String>,
    pub core_message: Option<String>,
    pub outline: Option<String>,
    pub structure: Option<String>,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_session(
        &self,
        init: &NewSessionRequest,
    ) -> Result<SessionRow, sqlx::Error> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO chat_session
                (id, step, language, subject, purpose, audience, core_message,
                 outline, structure, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(init.step.as_deref().unwrap_or("initial"))
        .bind(&init.language)
        .bind(&init.subject)
        .bind(&init.purpose)
        .bind(&init.audience)
        .bind(&init.core_message)
        .bind(&init.outline)
        .bind(&init.structure)
        .fetch_one(&self.pool)
        .await
    }

    /// Latest 50 sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>, sqlx::Error> {
        sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM chat_session ORDER BY created_at DESC LIMIT 50",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRow>, sqlx::Error> {
        sqlx::query_as::<_, SessionRow>("SELECT * FROM chat_session WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_messages(&self, session_id: Uuid) -> Result<Vec<MessageRow>, sqlx::Error> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM chat_message WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Writes the merged context back. The caller passes the full post-merge
    /// context, so fields not updated this turn retain their stored value —
    /// a previously stored value is never nulled out by a turn.
    pub async fn update_context(
        &self,
        session_id: Uuid,
        context: &BriefContext,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE chat_session
            SET step = $2, language = $3, subject = $4, purpose = $5,
                audience = $6, core_message = $7, structure = $8,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(&context.step)
        .bind(&context.language)
        .bind(&context.subject)
        .bind(&context.purpose)
        .bind(&context.audience)
        .bind(&context.core_message)
        .bind(&context.structure)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &Value,
        metadata: Option<&Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO chat_message (id, session_id, role, content, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists the completed exchange: user message first, then the
    /// assistant message, then the session touch — one transaction.
    pub async fn finalize_turn(
        &self,
        session_id: Uuid,
        user_content: &Value,
        assistant_content: &Value,
        assistant_metadata: &Value,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_message (id, session_id, role, content, metadata)
            VALUES ($1, $2, 'user', $3, NULL)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(user_content)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chat_message (id, session_id, role, content, metadata)
            VALUES ($1, $2, 'assistant', $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(assistant_content)
        .bind(assistant_metadata)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_session SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }
}
