use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Appointment, AppointmentStatus, CredentialToken, NewAppointment};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn now_str() -> String {
    Utc::now().naive_utc().format(DATETIME_FMT).to_string()
}

fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn parse_appointment_row(row: &Row) -> rusqlite::Result<Appointment> {
    let start_time: String = row.get(3)?;
    let status: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Appointment {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        start_time: parse_datetime(&start_time),
        duration_minutes: row.get(4)?,
        subject: row.get(5)?,
        recurrence_rule: row.get(6)?,
        external_event_id: row.get(7)?,
        status: AppointmentStatus::from_str(&status),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const APPOINTMENT_COLUMNS: &str = "id, owner_id, title, start_time, duration_minutes, subject, \
     recurrence_rule, external_event_id, status, created_at, updated_at";

// ── Appointments ──

pub fn create_appointment(
    conn: &Connection,
    new: &NewAppointment,
) -> rusqlite::Result<Appointment> {
    let now = now_str();
    conn.execute(
        "INSERT INTO appointments (owner_id, title, start_time, duration_minutes, subject, recurrence_rule, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'scheduled', ?7, ?7)",
        params![
            new.owner_id,
            new.title,
            new.start_time.format(DATETIME_FMT).to_string(),
            new.duration_minutes,
            new.subject,
            new.recurrence_rule,
            now,
        ],
    )?;

    let id = conn.last_insert_rowid();
    let now = parse_datetime(&now);
    Ok(Appointment {
        id,
        owner_id: new.owner_id.clone(),
        title: new.title.clone(),
        start_time: new.start_time,
        duration_minutes: new.duration_minutes,
        subject: new.subject.clone(),
        recurrence_rule: new.recurrence_rule.clone(),
        external_event_id: None,
        status: AppointmentStatus::Scheduled,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_appointment(conn: &Connection, id: i64) -> rusqlite::Result<Option<Appointment>> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        parse_appointment_row,
    )
    .optional()
}

/// Scheduled appointments for one owner on one day, ascending start time.
/// Cancelled rows never appear here.
pub fn list_for_day(
    conn: &Connection,
    owner_id: &str,
    date: NaiveDate,
) -> rusqlite::Result<Vec<Appointment>> {
    let day_start = format!("{} 00:00:00", date.format("%Y-%m-%d"));
    let day_end = format!("{} 23:59:59", date.format("%Y-%m-%d"));

    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE owner_id = ?1 AND start_time >= ?2 AND start_time <= ?3 AND status = 'scheduled'
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![owner_id, day_start, day_end], parse_appointment_row)?;
    rows.collect()
}

pub fn update_start_time(
    conn: &Connection,
    id: i64,
    start_time: NaiveDateTime,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET start_time = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'scheduled'",
        params![start_time.format(DATETIME_FMT).to_string(), now_str(), id],
    )?;
    Ok(count > 0)
}

/// Links an appointment to its mirrored calendar event. First successful
/// mirror-create wins: a row that already carries an event id is left alone.
pub fn set_external_event_id(
    conn: &Connection,
    id: i64,
    event_id: &str,
) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET external_event_id = ?1, updated_at = ?2
         WHERE id = ?3 AND external_event_id IS NULL",
        params![event_id, now_str(), id],
    )?;
    Ok(count > 0)
}

/// Soft delete. Returns false when the row is missing or already cancelled.
pub fn cancel_appointment(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = 'cancelled', updated_at = ?1 WHERE id = ?2 AND status = 'scheduled'",
        params![now_str(), id],
    )?;
    Ok(count > 0)
}

// ── Credential tokens ──

pub fn save_token(conn: &Connection, owner_id: &str, token_blob: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tokens (owner_id, token_blob, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(owner_id) DO UPDATE SET
           token_blob = excluded.token_blob,
           updated_at = excluded.updated_at",
        params![owner_id, token_blob, now_str()],
    )?;
    Ok(())
}

pub fn get_token(conn: &Connection, owner_id: &str) -> rusqlite::Result<Option<CredentialToken>> {
    conn.query_row(
        "SELECT owner_id, token_blob FROM tokens WHERE owner_id = ?1",
        params![owner_id],
        |row| {
            Ok(CredentialToken {
                owner_id: row.get(0)?,
                token_blob: row.get(1)?,
            })
        },
    )
    .optional()
}

pub fn delete_token(conn: &Connection, owner_id: &str) -> rusqlite::Result<bool> {
    let count = conn.execute("DELETE FROM tokens WHERE owner_id = ?1", params![owner_id])?;
    Ok(count > 0)
}
