//! LLM provider traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GenerateParams, Message};

/// A single chat-completion backend (OpenAI, xAI, ...).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name as used in task/subscription records.
    fn name(&self) -> &str;

    /// Run a chat completion and return the assistant text.
    async fn chat(&self, messages: &[Message], params: &GenerateParams) -> Result<String>;
}

/// Direct generation: routes a `(provider, model, messages)` call to the
/// right backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, provider: &str, model: &str, messages: &[Message]) -> Result<String>;
}
