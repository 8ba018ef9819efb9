//! Unified OpenAI-compatible provider.
//!
//! A single struct that handles chat completions for every OpenAI-compatible
//! API. Providers differ only by endpoint URL, auth style, and API key.

use async_trait::async_trait;
use newsbrief_core::config::ProviderSettings;
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::Provider;
use newsbrief_core::types::{GenerateParams, Message};
use serde_json::{Value, json};

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// A provider that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    /// Provider name (e.g., "openai", "xai").
    name: String,
    /// API key for authentication.
    api_key: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    base_url: String,
    /// Path for chat completions (e.g., "/chat/completions").
    chat_path: String,
    auth_style: AuthStyle,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config plus optional settings.
    ///
    /// Resolution order:
    /// - API key: `settings.api_key` > env vars > empty
    /// - Base URL: `settings.endpoint` > env override > registry default
    pub fn from_registry(
        registry: &ProviderConfig,
        settings: Option<&ProviderSettings>,
        client: reqwest::Client,
    ) -> Self {
        let api_key = settings
            .map(|s| s.api_key.clone())
            .filter(|k| !k.is_empty())
            .or_else(|| {
                registry
                    .env_keys
                    .iter()
                    .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
            })
            .unwrap_or_default();

        let base_url = settings
            .map(|s| s.endpoint.clone())
            .filter(|e| !e.is_empty())
            .or_else(|| {
                registry.base_url_env.and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
            })
            .unwrap_or_else(|| registry.base_url.to_string());

        Self {
            name: registry.name.to_string(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_path: registry.chat_path.to_string(),
            auth_style: registry.auth_style,
            client,
        }
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, api_key: Option<String>, client: reqwest::Client) -> Self {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = api_key
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("CUSTOM_API_KEY").ok())
            .unwrap_or_default();

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Self {
            name: endpoint.to_string(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            auth_style,
            client,
        }
    }

    /// Full chat completions URL.
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }
}

/// Build the request body in the standard OpenAI format.
pub(crate) fn build_body(messages: &[Message], params: &GenerateParams) -> Value {
    json!({
        "model": params.model,
        "messages": messages,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
    })
}

/// Pull the assistant text out of a chat-completions response.
pub(crate) fn extract_content(json: &Value) -> Option<String> {
    json["choices"]
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(String::from)
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, messages: &[Message], params: &GenerateParams) -> Result<String> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(BriefError::ApiKeyMissing(self.name.clone()));
        }

        let url = self.chat_url();
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&build_body(messages, params));
        let req = self.apply_auth(req);

        let resp = req.send().await.map_err(|e| {
            BriefError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BriefError::Provider(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| BriefError::Http(e.to_string()))?;

        let content = extract_content(&json).ok_or_else(|| {
            BriefError::Provider(format!("{} returned no message content", self.name))
        })?;

        tracing::debug!(
            "🧠 {} completion: {} chars (model={})",
            self.name,
            content.len(),
            params.model
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_registry::get_provider_config;

    fn params() -> GenerateParams {
        GenerateParams {
            model: "gpt-4".into(),
            temperature: 0.15,
            max_tokens: 800,
        }
    }

    #[test]
    fn test_build_body() {
        let body = build_body(&[Message::system("sys"), Message::user("hi")], &params());
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_extract_content() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(extract_content(&json).as_deref(), Some("hello"));
        assert!(extract_content(&json!({"choices": []})).is_none());
        assert!(extract_content(&json!({"choices": [{"message": {"content": null}}]})).is_none());
    }

    #[test]
    fn test_settings_override_endpoint_and_key() {
        let registry = get_provider_config("openai").unwrap();
        let settings = ProviderSettings {
            api_key: "sk-test".into(),
            endpoint: "http://localhost:9999/v1/".into(),
        };
        let p = OpenAiCompatibleProvider::from_registry(
            registry,
            Some(&settings),
            reqwest::Client::new(),
        );
        assert_eq!(p.chat_url(), "http://localhost:9999/v1/chat/completions");
        assert_eq!(p.api_key, "sk-test");
    }

    #[test]
    fn test_custom_endpoint() {
        let p = OpenAiCompatibleProvider::custom(
            "custom:https://llm.internal/v1/",
            Some("k".into()),
            reqwest::Client::new(),
        );
        assert_eq!(p.chat_url(), "https://llm.internal/v1/chat/completions");
        assert_eq!(p.auth_style, AuthStyle::Bearer);
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let registry = get_provider_config("openai").unwrap();
        let settings = ProviderSettings::default();
        let mut p =
            OpenAiCompatibleProvider::from_registry(registry, Some(&settings), reqwest::Client::new());
        p.api_key.clear();
        let err = p.chat(&[Message::user("x")], &params()).await.unwrap_err();
        assert!(matches!(err, BriefError::ApiKeyMissing(_)));
    }
}
