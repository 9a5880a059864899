//! The mutable brief being assembled for one session.

use serde::{Deserialize, Serialize};

use crate::brief::fields::{BriefField, Step};

/// Session-scoped brief state. One instance per chat session, loaded from
/// the `chat_session` row at the start of a turn and written back after the
/// merge step.
///
/// `outline` is persisted for the downstream slide builder but is never
/// touched by extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BriefContext {
    #[serde(default = "default_step")]
    pub step: String,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub purpose: Option<String>,
    pub audience: Option<String>,
    pub core_message: Option<String>,
    pub structure: Option<String>,
    pub outline: Option<String>,
}

fn default_step() -> String {
    Step::Welcome.as_storage_str()
}

impl BriefContext {
    /// Returns the value of a required field, treating blank strings as
    /// unset.
    pub fn get(&self, field: BriefField) -> Option<&str> {
        let value = match field {
            BriefField::Subject => self.subject.as_deref(),
            BriefField::Purpose => self.purpose.as_deref(),
            BriefField::Audience => self.audience.as_deref(),
            BriefField::CoreMessage => self.core_message.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, field: BriefField, value: String) {
        match field {
            BriefField::Subject => self.subject = Some(value),
            BriefField::Purpose => self.purpose = Some(value),
            BriefField::Audience => self.audience = Some(value),
            BriefField::CoreMessage => self.core_message = Some(value),
        }
    }

    pub fn step(&self) -> Step {
        Step::from_storage_str(&self.step)
    }

    pub fn set_step(&mut self, step: Step) {
        self.step = step.as_storage_str();
    }
}
