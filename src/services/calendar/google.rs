use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::CalendarMirror;
use crate::models::Appointment;

const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// The credential blob persisted in the token store. Assembled by the OAuth
/// callback and deserialized on every mirror call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
    pub expiry: Option<DateTime<Utc>>,
}

pub struct GoogleCalendarMirror {
    timezone: String,
    client: reqwest::Client,
}

impl GoogleCalendarMirror {
    pub fn new(timezone: String) -> Self {
        Self {
            timezone,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Returns a usable access token, refreshing transparently when the
    /// stored one has expired. The refreshed token lives only for this
    /// request; the stored blob is replaced on the next OAuth callback.
    async fn ensure_access_token(&self, token_blob: &str) -> anyhow::Result<String> {
        let cred: StoredCredential =
            serde_json::from_str(token_blob).context("stored credential blob is malformed")?;

        let expired = cred
            .expiry
            .map(|t| t <= Utc::now() + chrono::Duration::seconds(60))
            .unwrap_or(false);

        if !expired {
            return Ok(cred.access_token);
        }

        let refresh_token = cred
            .refresh_token
            .as_deref()
            .context("access token expired and no refresh token stored")?;

        let resp = self
            .client
            .post(&cred.token_uri)
            .form(&[
                ("client_id", cred.client_id.as_str()),
                ("client_secret", cred.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("failed to call token endpoint for refresh")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse token refresh response")?;

        if !status.is_success() {
            anyhow::bail!("token refresh failed ({}): {}", status, data);
        }

        data["access_token"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing access_token in refresh response"))
    }
}

#[async_trait]
impl CalendarMirror for GoogleCalendarMirror {
    async fn create_event(
        &self,
        token_blob: &str,
        appointment: &Appointment,
    ) -> anyhow::Result<String> {
        let access_token = self.ensure_access_token(token_blob).await?;
        let payload = event_payload(appointment, &self.timezone);

        let resp = self
            .client
            .post(EVENTS_URL)
            .bearer_auth(&access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to call Google Calendar insert")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Google Calendar insert response")?;

        if !status.is_success() {
            anyhow::bail!("Google Calendar insert error ({}): {}", status, data);
        }

        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing event id in insert response"))
    }

    async fn update_event(
        &self,
        token_blob: &str,
        appointment: &Appointment,
    ) -> anyhow::Result<()> {
        let event_id = appointment
            .external_event_id
            .as_deref()
            .context("appointment has no external event id")?;

        let access_token = self.ensure_access_token(token_blob).await?;
        let payload = event_payload(appointment, &self.timezone);

        self.client
            .patch(format!("{EVENTS_URL}/{event_id}"))
            .bearer_auth(&access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to call Google Calendar patch")?
            .error_for_status()
            .context("Google Calendar patch returned error")?;

        Ok(())
    }

    async fn delete_event(&self, token_blob: &str, event_id: &str) -> anyhow::Result<()> {
        let access_token = self.ensure_access_token(token_blob).await?;

        let resp = self
            .client
            .delete(format!("{EVENTS_URL}/{event_id}"))
            .bearer_auth(&access_token)
            .send()
            .await
            .context("failed to call Google Calendar delete")?;

        // An event already deleted on the remote side is fine.
        if resp.status() == StatusCode::NOT_FOUND || resp.status() == StatusCode::GONE {
            return Ok(());
        }

        resp.error_for_status()
            .context("Google Calendar delete returned error")?;
        Ok(())
    }
}

fn event_payload(appointment: &Appointment, timezone: &str) -> serde_json::Value {
    let mut payload = json!({
        "summary": appointment.title,
        "description": appointment.subject,
        "start": {
            "dateTime": appointment.start_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "timeZone": timezone,
        },
        "end": {
            "dateTime": appointment.end_time().format("%Y-%m-%dT%H:%M:%S").to_string(),
            "timeZone": timezone,
        },
    });

    if let Some(rule) = &appointment.recurrence_rule {
        payload["recurrence"] = json!([format!("RRULE:FREQ={rule}")]);
    }

    payload
}

// ── OAuth linking flow ──

/// Application OAuth client credentials, decoded from the base64 blob the
/// deployment environment carries (the "web" section of a Google
/// credentials.json).
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

pub fn load_client_config(credentials_base64: &str) -> anyhow::Result<OAuthClientConfig> {
    anyhow::ensure!(
        !credentials_base64.is_empty(),
        "GOOGLE_CREDENTIALS_BASE64 is not set"
    );

    let raw = base64::engine::general_purpose::STANDARD
        .decode(credentials_base64)
        .context("credentials blob is not valid base64")?;
    let info: serde_json::Value =
        serde_json::from_slice(&raw).context("credentials blob is not valid JSON")?;
    let web = &info["web"];

    let field = |name: &str| -> anyhow::Result<String> {
        web[name]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("credentials blob missing web.{name}"))
    };

    Ok(OAuthClientConfig {
        client_id: field("client_id")?,
        client_secret: field("client_secret")?,
        auth_uri: field("auth_uri")?,
        token_uri: field("token_uri")?,
    })
}

pub fn consent_url(config: &OAuthClientConfig, redirect_uri: &str) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&include_granted_scopes=true",
        config.auth_uri,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(CALENDAR_SCOPE),
    )
}

/// Exchanges an authorization code for tokens and returns the serialized
/// credential blob to upsert into the token store.
pub async fn exchange_code(
    config: &OAuthClientConfig,
    code: &str,
    redirect_uri: &str,
) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default();

    let resp = client
        .post(&config.token_uri)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .context("failed to call token endpoint")?;

    let status = resp.status();
    let data: serde_json::Value = resp
        .json()
        .await
        .context("failed to parse token endpoint response")?;

    if !status.is_success() {
        anyhow::bail!("code exchange failed ({}): {}", status, data);
    }

    let access_token = data["access_token"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing access_token in token response"))?
        .to_string();
    let refresh_token = data["refresh_token"].as_str().map(|s| s.to_string());
    let expiry = data["expires_in"]
        .as_i64()
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

    let credential = StoredCredential {
        access_token,
        refresh_token,
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
        token_uri: config.token_uri.clone(),
        expiry,
    };

    serde_json::to_string(&credential).context("failed to serialize credential blob")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::NaiveDateTime;

    fn appointment(recurrence: Option<&str>) -> Appointment {
        let now = chrono::Utc::now().naive_utc();
        Appointment {
            id: 1,
            owner_id: "+5562999990000".to_string(),
            title: "Dentist".to_string(),
            start_time: NaiveDateTime::parse_from_str("2025-06-16 15:00", "%Y-%m-%d %H:%M")
                .unwrap(),
            duration_minutes: 30,
            subject: "Cleaning".to_string(),
            recurrence_rule: recurrence.map(|s| s.to_string()),
            external_event_id: None,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_event_payload_times_and_timezone() {
        let payload = event_payload(&appointment(None), "America/Sao_Paulo");
        assert_eq!(payload["summary"], "Dentist");
        assert_eq!(payload["description"], "Cleaning");
        assert_eq!(payload["start"]["dateTime"], "2025-06-16T15:00:00");
        assert_eq!(payload["end"]["dateTime"], "2025-06-16T15:30:00");
        assert_eq!(payload["start"]["timeZone"], "America/Sao_Paulo");
        assert!(payload.get("recurrence").is_none());
    }

    #[test]
    fn test_event_payload_recurrence() {
        let payload = event_payload(&appointment(Some("WEEKLY")), "America/Sao_Paulo");
        assert_eq!(payload["recurrence"][0], "RRULE:FREQ=WEEKLY");
    }

    #[test]
    fn test_load_client_config() {
        let raw = serde_json::json!({
            "web": {
                "client_id": "cid",
                "client_secret": "secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
            }
        });
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw.to_string());

        let config = load_client_config(&encoded).unwrap();
        assert_eq!(config.client_id, "cid");
        assert_eq!(config.token_uri, "https://oauth2.googleapis.com/token");

        let url = consent_url(&config, "http://localhost:8000/auth/google/callback");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_load_client_config_rejects_garbage() {
        assert!(load_client_config("").is_err());
        assert!(load_client_config("not base64!!!").is_err());
    }
}
