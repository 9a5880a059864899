use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One `chat_message` row. `content` is the stored `{"parts": [...]}`
/// object; `metadata` carries finish reason and token usage for assistant
/// messages.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Message shape returned by the session-detail endpoint: the stored parts
/// unwrapped from the content envelope.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub role: String,
    pub parts: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl From<MessageRow> for MessageView {
    fn from(row: MessageRow) -> Self {
        let parts = row
            .content
            .get("parts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        MessageView {
            id: row.id,
            role: row.role,
            parts,
            created_at: row.created_at,
            metadata: row.metadata,
        }
    }
}
