//! Routes direct generation calls to the provider named in a task record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use newsbrief_core::config::LlmConfig;
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::{Generator, Provider};
use newsbrief_core::types::{GenerateParams, Message};

use crate::provider_registry::{all_provider_names, canonical_name};

/// Provider-agnostic chat entry point: `(provider, model, messages) -> text`.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    config: LlmConfig,
    client: reqwest::Client,
}

impl ProviderRouter {
    /// Build every registry provider up front, sharing one HTTP client.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("NewsBrief/1.0")
            .build()
            .map_err(|e| BriefError::Http(format!("HTTP client: {e}")))?;

        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for name in all_provider_names() {
            let provider = crate::create_provider(name, config, client.clone())?;
            providers.insert(name.to_string(), Arc::from(provider));
        }
        tracing::info!("🧠 Provider router ready ({} providers)", providers.len());

        Ok(Self {
            providers,
            config: config.clone(),
            client,
        })
    }

    /// Build a router from explicit providers (used by tests and embedders).
    pub fn with_providers(config: &LlmConfig, providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.name().to_string(), p))
                .collect(),
            config: config.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        if let Some(p) = self.providers.get(canonical_name(name)) {
            return Ok(p.clone());
        }
        if name.starts_with("custom:") {
            let p = crate::create_provider(name, &self.config, self.client.clone())?;
            return Ok(Arc::from(p));
        }
        Err(BriefError::ProviderNotFound(name.to_string()))
    }
}

#[async_trait]
impl Generator for ProviderRouter {
    async fn generate(&self, provider: &str, model: &str, messages: &[Message]) -> Result<String> {
        let backend = self.resolve(provider)?;
        let params = GenerateParams {
            model: model.to_string(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        backend.chat(messages, &params).await
    }
}
