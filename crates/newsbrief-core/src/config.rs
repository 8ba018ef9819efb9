//! NewsBrief configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{BriefError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BriefConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl BriefConfig {
    /// Load config from `$NEWSBRIEF_CONFIG` or the default path, falling back
    /// to defaults when no file exists. Environment overrides are applied.
    pub fn load() -> Result<Self> {
        let path = std::env::var("NEWSBRIEF_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific path (no environment overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BriefError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BriefError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BriefError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the NewsBrief home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".newsbrief")
    }

    /// Apply secrets and deployment settings from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get("ACTION_SECRET") {
            self.scheduler.secret = secret;
        }
        if let Some(url) = get("NEWSBRIEF_SITE_URL").or_else(|| get("NEXT_PUBLIC_SITE_URL")) {
            self.scheduler.site_url = url;
        }
        if let Some(key) = get("NEWSAPI_KEY") {
            self.news.api_key = key;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.default_model = model;
        }
        if let Some(password) = get("SMTP_PASSWORD") {
            self.channel.email.get_or_insert_with(Default::default).password = password;
        }
        if let Some(from) = get("FROM_EMAIL") {
            self.channel.email.get_or_insert_with(Default::default).from_email = from;
        }
        if let Some(token) = get("WHATSAPP_ACCESS_TOKEN") {
            self.channel
                .whatsapp
                .get_or_insert_with(Default::default)
                .access_token = token;
        }
        if let Some(phone_id) = get("WHATSAPP_PHONE_NUMBER_ID") {
            self.channel
                .whatsapp
                .get_or_insert_with(Default::default)
                .phone_number_id = phone_id;
        }
    }
}

/// Gateway (HTTP server) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Dispatch cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pre-shared secret expected in the `x-scheduler-secret` header.
    /// Empty means the trigger endpoint rejects every request.
    #[serde(default)]
    pub secret: String,
    /// Public base URL used to build unsubscribe links.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Requests with at most this many words are treated as search queries.
    #[serde(default = "default_short_request_words")]
    pub short_request_words: usize,
    /// Number of articles fetched per group.
    #[serde(default = "default_article_page_size")]
    pub article_page_size: usize,
    #[serde(default = "default_max_concurrent_groups")]
    pub max_concurrent_groups: usize,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

fn default_site_url() -> String { "http://localhost:3000".into() }
fn default_short_request_words() -> usize { 8 }
fn default_article_page_size() -> usize { 5 }
fn default_max_concurrent_groups() -> usize { 4 }
fn default_fetch_timeout() -> u64 { 15 }
fn default_generate_timeout() -> u64 { 60 }
fn default_send_timeout() -> u64 { 20 }
fn default_store_timeout() -> u64 { 5 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            site_url: default_site_url(),
            short_request_words: default_short_request_words(),
            article_page_size: default_article_page_size(),
            max_concurrent_groups: default_max_concurrent_groups(),
            fetch_timeout_secs: default_fetch_timeout(),
            generate_timeout_secs: default_generate_timeout(),
            send_timeout_secs: default_send_timeout(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Per-provider overrides, keyed by provider name (`[llm.providers.openai]`).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

fn default_provider() -> String { "openai".into() }
fn default_model() -> String { "gpt-4".into() }
fn default_temperature() -> f32 { 0.15 }
fn default_max_tokens() -> u32 { 800 }
fn default_request_timeout() -> u64 { 20 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            providers: BTreeMap::new(),
        }
    }
}

/// Credentials and endpoint override for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
}

/// News search configuration (NewsAPI.org `everything` endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_news_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_news_timeout")]
    pub timeout_secs: u64,
}

fn default_news_endpoint() -> String { "https://newsapi.org/v2/everything".into() }
fn default_language() -> String { "en".into() }
fn default_sort_by() -> String { "publishedAt".into() }
fn default_news_timeout() -> u64 { 10 }

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_news_endpoint(),
            language: default_language(),
            sort_by: default_sort_by(),
            timeout_secs: default_news_timeout(),
        }
    }
}

/// Outbound channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub email: Option<EmailChannelConfig>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port_cfg")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn bool_true() -> bool { true }
fn default_smtp_port_cfg() -> u16 { 587 }
fn default_from_email() -> String { "no-reply@example.com".into() }
fn default_from_name() -> String { "NewsBrief".into() }

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: String::new(),
            smtp_port: default_smtp_port_cfg(),
            username: String::new(),
            password: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppChannelConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_graph_version")]
    pub api_version: String,
}

fn default_graph_version() -> String { "v21.0".into() }

impl Default for WhatsAppChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access_token: String::new(),
            phone_number_id: String::new(),
            api_version: default_graph_version(),
        }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.newsbrief/newsbrief.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BriefConfig::default();
        assert_eq!(config.llm.default_provider, "openai");
        assert_eq!(config.llm.default_model, "gpt-4");
        assert_eq!(config.scheduler.short_request_words, 8);
        assert_eq!(config.scheduler.article_page_size, 5);
        assert!(config.scheduler.secret.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [scheduler]
            secret = "s3cret"
            short_request_words = 12

            [llm]
            default_provider = "xai"
            default_model = "grok-3"

            [llm.providers.xai]
            api_key = "xai-key"

            [channel.email]
            smtp_host = "smtp.example.com"
        "#;

        let config: BriefConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.secret, "s3cret");
        assert_eq!(config.scheduler.short_request_words, 12);
        assert_eq!(config.scheduler.article_page_size, 5);
        assert_eq!(config.llm.default_provider, "xai");
        assert_eq!(config.llm.providers["xai"].api_key, "xai-key");
        let email = config.channel.email.unwrap();
        assert_eq!(email.smtp_port, 587);
        assert!(email.enabled);
        assert!(config.channel.whatsapp.is_none());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: BriefConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.news.endpoint, "https://newsapi.org/v2/everything");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ACTION_SECRET", "from-env"),
            ("NEWSAPI_KEY", "news-key"),
            ("NEXT_PUBLIC_SITE_URL", "https://brief.example.com"),
            ("WHATSAPP_ACCESS_TOKEN", "wa-token"),
            ("OPENAI_MODEL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = BriefConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.scheduler.secret, "from-env");
        assert_eq!(config.news.api_key, "news-key");
        assert_eq!(config.scheduler.site_url, "https://brief.example.com");
        assert_eq!(config.channel.whatsapp.unwrap().access_token, "wa-token");
        // Empty values are ignored.
        assert_eq!(config.llm.default_model, "gpt-4");
        assert!(config.channel.email.is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = std::env::temp_dir().join("newsbrief-test-config");
        let path = dir.join("config.toml");
        let mut config = BriefConfig::default();
        config.gateway.port = 8088;
        config.save_to(&path).unwrap();
        let loaded = BriefConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 8088);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = BriefConfig::home_dir();
        assert!(home.to_string_lossy().contains("newsbrief"));
    }
}
