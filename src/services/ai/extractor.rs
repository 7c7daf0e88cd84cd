use chrono::DateTime;
use chrono_tz::Tz;

use crate::models::Intent;
use crate::services::ai::LlmProvider;

pub const GENERIC_APOLOGY: &str =
    "Sorry, I had a technical problem processing your request. Please try again in a moment.";

const SYSTEM_PROMPT: &str = r#"You are a scheduling assistant for a WhatsApp user. Analyze the message and extract the scheduling action and its parameters.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "action": "create|reschedule|cancel|query|small_talk|error",
  "title": "short appointment label or null",
  "start_time": "ISO 8601 local datetime like 2025-06-16T14:30:00, or null",
  "subject": "free-text description extracted from the message, or null",
  "duration_minutes": 60,
  "recurrence_rule": "WEEKLY or similar token if the user asked for recurrence, else null",
  "target_appointment_id": null,
  "reply_text": "A short friendly reply to the user describing what you understood"
}

Rules:
- Resolve relative dates ("tomorrow", "next Tuesday") against the current date/time given below.
- If no time of day is given for a create, use 09:00.
- duration_minutes defaults to 60 when not stated.
- "reschedule" and "cancel" require target_appointment_id; if the user did not give an ID, still use that action and ask for the ID in reply_text.
- If the user asks to create an appointment but no date is resolvable, use action "error" and ask for the date in reply_text.
- "query" is for listing appointments; put the requested day in start_time when one is mentioned.
- "small_talk" is for greetings and anything that is not a scheduling request.
- Write reply_text in the user's language.
"#;

/// Turns free text into a structured intent. Never fails past this
/// boundary: provider errors and unparseable replies both come back as an
/// error intent carrying a generic apology.
pub async fn extract_intent(llm: &dyn LlmProvider, message: &str, now: DateTime<Tz>) -> Intent {
    let system = format!(
        "{SYSTEM_PROMPT}\nCurrent date/time: {} ({})",
        now.format("%Y-%m-%d %H:%M:%S"),
        now.format("%A"),
    );

    let response = match llm.chat(&system, message).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "intent extraction call failed");
            return Intent::error(GENERIC_APOLOGY);
        }
    };

    parse_intent_response(&response)
}

fn parse_intent_response(response: &str) -> Intent {
    // Try direct parse first
    if let Ok(intent) = serde_json::from_str::<Intent>(response) {
        return intent;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(intent) = serde_json::from_str::<Intent>(cleaned) {
        return intent;
    }

    // Try to find a JSON object in the response
    if let Some(start) = cleaned.find('{') {
        if let Some(end) = cleaned.rfind('}') {
            if let Ok(intent) = serde_json::from_str::<Intent>(&cleaned[start..=end]) {
                return intent;
            }
        }
    }

    tracing::warn!("failed to parse LLM response as intent JSON");
    Intent::error(GENERIC_APOLOGY)
}
