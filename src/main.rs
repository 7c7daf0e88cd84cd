use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use agendabot::config::AppConfig;
use agendabot::db;
use agendabot::handlers;
use agendabot::services::ai::openai::OpenAiProvider;
use agendabot::services::calendar::google::GoogleCalendarMirror;
use agendabot::services::messaging::whatsapp::WhatsAppProvider;
use agendabot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    anyhow::ensure!(
        !config.openai_api_key.is_empty(),
        "OPENAI_API_KEY must be set"
    );
    if config.google_credentials_base64.is_empty() {
        tracing::warn!("GOOGLE_CREDENTIALS_BASE64 not set, calendar linking is disabled");
    }

    let conn = db::init_db(&config.database_url)?;

    let llm = OpenAiProvider::new(config.openai_api_key.clone(), config.openai_model.clone());
    let messaging = WhatsAppProvider::new(
        config.whatsapp_access_token.clone(),
        config.whatsapp_phone_number_id.clone(),
    );
    let calendar = GoogleCalendarMirror::new(config.timezone.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        llm: Box::new(llm),
        messaging: Box::new(messaging),
        calendar: Box::new(calendar),
    });

    let app = Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/webhook/whatsapp", get(handlers::webhook::verify_webhook))
        .route("/webhook/whatsapp", post(handlers::webhook::receive_webhook))
        .route("/auth/google/start", get(handlers::auth::start_google_auth))
        .route(
            "/auth/google/callback",
            get(handlers::auth::google_auth_callback),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
