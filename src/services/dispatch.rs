use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::db::queries;
use crate::models::{Action, Appointment, AppointmentStatus, CredentialToken, Intent, NewAppointment};
use crate::services::ai::extractor::{self, GENERIC_APOLOGY};
use crate::services::calendar::MirrorStatus;
use crate::state::AppState;

pub const MSG_MISSING_DATETIME: &str =
    "I couldn't identify the date and time. Could you be more specific?";
pub const MSG_MISSING_RESCHEDULE: &str =
    "To reschedule I need the appointment ID and the new date/time.";
pub const MSG_MISSING_CANCEL: &str = "To cancel I need the appointment ID.";

const DATETIME_FMT: &str = "%d/%m/%Y %H:%M";
const DATE_FMT: &str = "%d/%m/%Y";

/// Full pipeline for one inbound message: extract the intent, then run the
/// dispatch state machine. Memoryless across turns; everything durable
/// lives in the store.
pub async fn process_message(
    state: &Arc<AppState>,
    from: &str,
    text: &str,
) -> anyhow::Result<String> {
    let now = Utc::now().with_timezone(&state.config.reference_timezone());
    let intent = extractor::extract_intent(state.llm.as_ref(), text, now).await;

    tracing::info!(from = %from, action = ?intent.action, "dispatching intent");

    dispatch_intent(state, from, intent, now.date_naive()).await
}

/// The action-dispatch core. Validates the intent, performs the local
/// mutation, then attempts the mirrored mutation, and composes the single
/// user-facing reply. The local mutation always runs first; when it fails
/// the mirror call is never attempted.
pub async fn dispatch_intent(
    state: &Arc<AppState>,
    owner_id: &str,
    intent: Intent,
    today: NaiveDate,
) -> anyhow::Result<String> {
    let token = {
        let db = state.db.lock().unwrap();
        queries::get_token(&db, &state.config.owner_user_id)?
    };

    match intent.action {
        Action::Create => {
            let Some(start_time) = intent.start_time else {
                return Ok(reply_or(intent.reply_text, MSG_MISSING_DATETIME));
            };

            let new = NewAppointment {
                owner_id: owner_id.to_string(),
                title: intent.title.unwrap_or_else(|| "Appointment".to_string()),
                start_time,
                duration_minutes: intent.duration_minutes.unwrap_or(60),
                subject: intent.subject.unwrap_or_default(),
                recurrence_rule: intent.recurrence_rule,
            };

            let mut appointment = {
                let db = state.db.lock().unwrap();
                queries::create_appointment(&db, &new)?
            };

            let status = mirror_create(state, &mut appointment, token.as_ref()).await;

            Ok(format!(
                "Appointment booked! ID {}: {} on {}. {}",
                appointment.id,
                appointment.title,
                appointment.start_time.format(DATETIME_FMT),
                status.suffix(),
            ))
        }

        Action::Reschedule => {
            let (Some(id), Some(start_time)) = (intent.target_appointment_id, intent.start_time)
            else {
                return Ok(reply_or(intent.reply_text, MSG_MISSING_RESCHEDULE));
            };

            let updated = {
                let db = state.db.lock().unwrap();
                match queries::get_appointment(&db, id)? {
                    Some(a) if a.status == AppointmentStatus::Scheduled => {
                        queries::update_start_time(&db, id, start_time)?.then_some(a)
                    }
                    _ => None,
                }
            };

            let Some(mut appointment) = updated else {
                return Ok(not_found(id));
            };
            appointment.start_time = start_time;

            // A linked appointment gets an update; an unlinked one gets a
            // retroactive create, the only post-create path that may still
            // set external_event_id.
            let status = if appointment.external_event_id.is_some() {
                mirror_update(state, &appointment, token.as_ref()).await
            } else {
                mirror_create(state, &mut appointment, token.as_ref()).await
            };

            Ok(format!(
                "Appointment {} rescheduled to {}. {}",
                appointment.id,
                appointment.start_time.format(DATETIME_FMT),
                status.suffix(),
            ))
        }

        Action::Cancel => {
            let Some(id) = intent.target_appointment_id else {
                return Ok(reply_or(intent.reply_text, MSG_MISSING_CANCEL));
            };

            let cancelled = {
                let db = state.db.lock().unwrap();
                match queries::get_appointment(&db, id)? {
                    Some(a) if a.status == AppointmentStatus::Scheduled => {
                        queries::cancel_appointment(&db, id)?.then_some(a)
                    }
                    _ => None,
                }
            };

            let Some(appointment) = cancelled else {
                return Ok(not_found(id));
            };

            let status = match (&token, &appointment.external_event_id) {
                (None, _) => MirrorStatus::NotLinked,
                (Some(t), Some(event_id)) => mirror_delete(state, event_id, t).await,
                // Nothing to remove remotely: a no-op success.
                (Some(_), None) => MirrorStatus::Synced,
            };

            Ok(format!(
                "Appointment {} cancelled. {}",
                appointment.id,
                status.suffix(),
            ))
        }

        Action::Query => {
            let date = intent.start_time.map(|t| t.date()).unwrap_or(today);
            let items = {
                let db = state.db.lock().unwrap();
                queries::list_for_day(&db, owner_id, date)?
            };

            if items.is_empty() {
                return Ok(format!("No appointments for {}.", date.format(DATE_FMT)));
            }

            let mut lines = vec![format!("Appointments for {}:", date.format(DATE_FMT))];
            for a in &items {
                lines.push(format!(
                    "ID {}: {} ({}) at {}",
                    a.id,
                    a.title,
                    a.subject,
                    a.start_time.format("%H:%M"),
                ));
            }
            Ok(lines.join("\n"))
        }

        Action::SmallTalk | Action::Error => Ok(reply_or(intent.reply_text, GENERIC_APOLOGY)),
    }
}

fn reply_or(reply: String, fallback: &str) -> String {
    if reply.trim().is_empty() {
        fallback.to_string()
    } else {
        reply
    }
}

fn not_found(id: i64) -> String {
    format!("Appointment with ID {id} was not found.")
}

async fn mirror_create(
    state: &Arc<AppState>,
    appointment: &mut Appointment,
    token: Option<&CredentialToken>,
) -> MirrorStatus {
    let Some(token) = token else {
        return MirrorStatus::NotLinked;
    };

    match state
        .calendar
        .create_event(&token.token_blob, appointment)
        .await
    {
        Ok(event_id) => {
            let linked = {
                let db = state.db.lock().unwrap();
                queries::set_external_event_id(&db, appointment.id, &event_id).unwrap_or(false)
            };
            if linked {
                appointment.external_event_id = Some(event_id);
            }
            MirrorStatus::Synced
        }
        Err(e) => {
            tracing::warn!(error = %e, id = appointment.id, "calendar mirror create failed");
            MirrorStatus::Failed
        }
    }
}

async fn mirror_update(
    state: &Arc<AppState>,
    appointment: &Appointment,
    token: Option<&CredentialToken>,
) -> MirrorStatus {
    let Some(token) = token else {
        return MirrorStatus::NotLinked;
    };

    match state
        .calendar
        .update_event(&token.token_blob, appointment)
        .await
    {
        Ok(()) => MirrorStatus::Synced,
        Err(e) => {
            tracing::warn!(error = %e, id = appointment.id, "calendar mirror update failed");
            MirrorStatus::Failed
        }
    }
}

async fn mirror_delete(state: &Arc<AppState>, event_id: &str, token: &CredentialToken) -> MirrorStatus {
    match state.calendar.delete_event(&token.token_blob, event_id).await {
        Ok(()) => MirrorStatus::Synced,
        Err(e) => {
            tracing::warn!(error = %e, event_id = %event_id, "calendar mirror delete failed");
            MirrorStatus::Failed
        }
    }
}
