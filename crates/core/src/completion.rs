//! CompletionService trait: the opaque text-completion backend.
//!
//! The planner sends one prompt and gets text back. Everything about the
//! model (provider, temperature, auth) lives behind this trait.
//!
//! Implementations: OpenAI-compatible, Gemini (`cortex-providers`).

use async_trait::async_trait;
use crate::error::CompletionError;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// A human-readable name for this service (e.g., "openai", "gemini").
    fn name(&self) -> &str;

    /// Send a prompt and get the raw completion text.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError>;
}
