use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Reschedule,
    Cancel,
    Query,
    SmallTalk,
    Error,
}

/// Structured result of interpreting one free-text message.
/// Ephemeral: never persisted, one per inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub action: Action,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub target_appointment_id: Option<i64>,
    #[serde(default)]
    pub reply_text: String,
}

impl Intent {
    /// Error intent carrying a user-facing message. Used by the extractor
    /// whenever the provider call or the response parse fails.
    pub fn error(reply_text: impl Into<String>) -> Self {
        Self {
            action: Action::Error,
            title: None,
            start_time: None,
            subject: None,
            duration_minutes: None,
            recurrence_rule: None,
            target_appointment_id: None,
            reply_text: reply_text.into(),
        }
    }
}
