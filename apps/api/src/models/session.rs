use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::brief::context::BriefContext;
use crate::brief::fields::Step;

/// One `chat_session` row: the brief context plus session bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub step: Option<String>,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub purpose: Option<String>,
    pub audience: Option<String>,
    pub core_message: Option<String>,
    pub outline: Option<String>,
    pub structure: Option<String>,
    pub status: String,
}

impl SessionRow {
    /// The brief context held by this row.
    pub fn context(&self) -> BriefContext {
        BriefContext {
            step: self
                .step
                .clone()
                .unwrap_or_else(|| Step::Welcome.as_storage_str()),
            language: self.language.clone(),
            subject: self.subject.clone(),
            purpose: self.purpose.clone(),
            audience: self.audience.clone(),
            core_message: self.core_message.clone(),
            structure: self.structure.clone(),
            outline: self.outline.clone(),
        }
    }
}
