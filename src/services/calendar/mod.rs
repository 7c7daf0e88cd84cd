pub mod google;

use async_trait::async_trait;

use crate::models::Appointment;

/// Outcome of the mirrored mutation, reported back to the user as a fixed
/// suffix. Explicit tri-state: "no credential" is never inferred from a
/// failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStatus {
    NotLinked,
    Synced,
    Failed,
}

impl MirrorStatus {
    pub fn suffix(&self) -> &'static str {
        match self {
            MirrorStatus::NotLinked => {
                "Google Calendar is not linked yet. Visit /auth/google/start to connect it."
            }
            MirrorStatus::Synced => "Synced with Google Calendar.",
            MirrorStatus::Failed => {
                "Saved locally, but syncing with Google Calendar failed."
            }
        }
    }
}

/// Best-effort replication of local appointment mutations to an external
/// calendar. Every operation may fail independently; callers must not treat
/// a failure as fatal to the local mutation they already committed.
#[async_trait]
pub trait CalendarMirror: Send + Sync {
    /// Creates the remote event and returns its provider-assigned id.
    async fn create_event(
        &self,
        token_blob: &str,
        appointment: &Appointment,
    ) -> anyhow::Result<String>;

    /// Pushes the appointment's current state to the remote event named by
    /// its `external_event_id`. Callers only invoke this when that id is set.
    async fn update_event(&self, token_blob: &str, appointment: &Appointment)
        -> anyhow::Result<()>;

    async fn delete_event(&self, token_blob: &str, event_id: &str) -> anyhow::Result<()>;
}
