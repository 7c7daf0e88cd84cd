use std::env;

use chrono_tz::Tz;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Static secret echoed back during the Meta webhook verification handshake.
    pub verify_token: String,
    /// App secret used to validate X-Hub-Signature-256; empty skips validation (dev mode).
    pub app_secret: String,
    pub whatsapp_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// Base64-encoded Google OAuth client credentials (the "web" section of credentials.json).
    pub google_credentials_base64: String,
    /// Public base URL of this deployment, used to build the OAuth redirect URI.
    pub external_url: String,
    pub timezone: String,
    /// The single owning identity the calendar credential is stored under.
    pub owner_user_id: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "agendabot.db".to_string()),
            verify_token: env::var("WHATSAPP_VERIFY_TOKEN").unwrap_or_default(),
            app_secret: env::var("WHATSAPP_APP_SECRET").unwrap_or_default(),
            whatsapp_access_token: env::var("WHATSAPP_ACCESS_TOKEN").unwrap_or_default(),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            google_credentials_base64: env::var("GOOGLE_CREDENTIALS_BASE64").unwrap_or_default(),
            external_url: env::var("EXTERNAL_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            timezone: env::var("TIMEZONE").unwrap_or_else(|_| "America/Sao_Paulo".to_string()),
            owner_user_id: env::var("OWNER_USER_ID").unwrap_or_else(|_| "main_user".to_string()),
        }
    }

    /// Reference timezone all appointment times are interpreted in.
    pub fn reference_timezone(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::America::Sao_Paulo)
    }
}
