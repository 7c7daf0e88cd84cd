use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::calendar::google;
use crate::state::AppState;

fn redirect_uri(state: &AppState) -> String {
    format!("{}/auth/google/callback", state.config.external_url)
}

/// Sends the user agent to Google's consent screen.
pub async fn start_google_auth(
    State(state): State<Arc<AppState>>,
) -> Result<Redirect, AppError> {
    let config = google::load_client_config(&state.config.google_credentials_base64)
        .map_err(|e| AppError::Config(e.to_string()))?;

    let url = google::consent_url(&config, &redirect_uri(&state));
    Ok(Redirect::temporary(&url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: String,
}

/// Exchanges the authorization code and upserts the credential blob for the
/// fixed owning identity.
pub async fn google_auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, AppError> {
    let config = google::load_client_config(&state.config.google_credentials_base64)
        .map_err(|e| AppError::Config(e.to_string()))?;

    let blob = google::exchange_code(&config, &params.code, &redirect_uri(&state))
        .await
        .map_err(|e| AppError::OAuth(e.to_string()))?;

    {
        let db = state.db.lock().unwrap();
        queries::save_token(&db, &state.config.owner_user_id, &blob)?;
    }

    tracing::info!(owner = %state.config.owner_user_id, "Google Calendar linked");

    Ok(Json(json!({
        "message": "Google Calendar linked successfully. You can close this window."
    })))
}
