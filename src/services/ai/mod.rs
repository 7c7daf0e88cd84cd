pub mod extractor;
pub mod openai;

use async_trait::async_trait;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One-shot completion. Each inbound message is interpreted on its own,
    /// so there is no conversation history to carry.
    async fn chat(&self, system_prompt: &str, user_message: &str) -> anyhow::Result<String>;
}
