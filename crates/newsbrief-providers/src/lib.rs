//! # NewsBrief Providers
//!
//! LLM access for NewsBrief.
//!
//! Every supported backend (OpenAI, xAI, Anthropic, DeepSeek, Groq,
//! OpenRouter, Ollama, custom endpoints) is handled by a single
//! `OpenAiCompatibleProvider`. `ProviderRouter` dispatches direct generation
//! calls by provider name and `AiSummarizer` builds structured briefs on top.

pub mod openai_compatible;
pub mod provider_registry;
pub mod router;
pub mod summarizer;

use newsbrief_core::config::LlmConfig;
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::Provider;

pub use router::ProviderRouter;
pub use summarizer::AiSummarizer;

/// Create a single provider by name.
///
/// `custom:<url>` names create an ad-hoc endpoint; everything else must be in
/// the registry.
pub fn create_provider(
    name: &str,
    config: &LlmConfig,
    client: reqwest::Client,
) -> Result<Box<dyn Provider>> {
    if name.starts_with("custom:") {
        let key = config.providers.get(name).map(|s| s.api_key.clone());
        return Ok(Box::new(openai_compatible::OpenAiCompatibleProvider::custom(
            name, key, client,
        )));
    }

    let registry = provider_registry::get_provider_config(name)
        .ok_or_else(|| BriefError::ProviderNotFound(name.into()))?;
    Ok(Box::new(
        openai_compatible::OpenAiCompatibleProvider::from_registry(
            registry,
            config.providers.get(registry.name),
            client,
        ),
    ))
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}
