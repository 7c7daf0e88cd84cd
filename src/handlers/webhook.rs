use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::services::ai::extractor::GENERIC_APOLOGY;
use crate::services::dispatch;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Meta webhook verification handshake: echo the challenge as plain text
/// when the static verify token matches.
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match (params.mode.as_deref(), params.verify_token.as_deref()) {
        (Some("subscribe"), Some(token)) if token == state.config.verify_token => {
            (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
        }
        (Some(_), Some(_)) => {
            tracing::warn!("webhook verification with wrong token");
            (StatusCode::FORBIDDEN, "Verification token mismatch").into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "Missing parameters").into_response(),
    }
}

fn validate_meta_signature(app_secret: &str, signature_header: &str, body: &[u8]) -> bool {
    let Some(signature) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected == signature
}

/// Pulls the first inbound text message out of a Cloud API envelope.
/// Anything else (status callbacks, non-text messages, unexpected shapes)
/// yields None and is acknowledged without processing.
fn extract_text_message(payload: &serde_json::Value) -> Option<(String, String)> {
    let message = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?
        .get("messages")?
        .get(0)?;

    let from = message.get("from")?.as_str()?.to_string();
    let body = message.get("text")?.get("body")?.as_str()?.to_string();

    Some((from, body))
}

/// Message delivery. Acknowledgement-first: the payload is validated and
/// handed to a background task, and the 200 response carries no information
/// about the outcome of processing.
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Validate signature over the raw body (skip if app secret is empty — dev mode)
    if !state.config.app_secret.is_empty() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !validate_meta_signature(&state.config.app_secret, signature, &body) {
            tracing::warn!("invalid webhook signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            // No reliable sender to notify: drop it.
            tracing::warn!(error = %e, "unparseable webhook payload, ignoring");
            return ack();
        }
    };

    let Some((from, text)) = extract_text_message(&payload) else {
        tracing::debug!("webhook payload carries no text message, ignoring");
        return ack();
    };

    tracing::info!(from = %from, "incoming WhatsApp message");

    // The upstream provider enforces a short response budget; processing
    // (LLM call, calendar round trips, outbound send) runs detached.
    tokio::spawn(async move {
        handle_message(state, from, text).await;
    });

    ack()
}

async fn handle_message(state: Arc<AppState>, from: String, text: String) {
    let reply = match dispatch::process_message(&state, &from, &text).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, from = %from, "message processing failed");
            GENERIC_APOLOGY.to_string()
        }
    };

    if let Err(e) = state.messaging.send_message(&from, &reply).await {
        tracing::error!(error = %e, to = %from, "failed to send reply");
    }
}

fn ack() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_payload(from: &str, body: &str) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [{
                            "from": from,
                            "id": "wamid.X",
                            "type": "text",
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        })
    }

    #[test]
    fn test_extract_text_message() {
        let payload = message_payload("+5562999990000", "Schedule a meeting tomorrow");
        let (from, body) = extract_text_message(&payload).unwrap();
        assert_eq!(from, "+5562999990000");
        assert_eq!(body, "Schedule a meeting tomorrow");
    }

    #[test]
    fn test_extract_ignores_status_callbacks() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{ "id": "wamid.X", "status": "delivered" }]
                    }
                }]
            }]
        });
        assert!(extract_text_message(&payload).is_none());
    }

    #[test]
    fn test_extract_ignores_non_text_messages() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{
                            "from": "+5562999990000",
                            "type": "image",
                            "image": { "id": "media-1" }
                        }]
                    }
                }]
            }]
        });
        assert!(extract_text_message(&payload).is_none());
    }

    #[test]
    fn test_extract_ignores_empty_object() {
        assert!(extract_text_message(&json!({})).is_none());
    }

    #[test]
    fn test_signature_validation() {
        let body = br#"{"entry":[]}"#;

        let mut mac = Hmac::<Sha256>::new_from_slice(b"app-secret").unwrap();
        mac.update(body);
        let good = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(validate_meta_signature("app-secret", &good, body));
        assert!(!validate_meta_signature("other-secret", &good, body));
        assert!(!validate_meta_signature("app-secret", "sha256=deadbeef", body));
        assert!(!validate_meta_signature("app-secret", "no-prefix", body));
    }
}
