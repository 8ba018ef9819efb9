//! WhatsApp Business Cloud API channel.
//!
//! Sends plain-text briefs through the official WhatsApp Business Platform.
//! Requires: Access Token + Phone Number ID from Meta Business Suite.

use async_trait::async_trait;
use newsbrief_core::config::WhatsAppChannelConfig;
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::Notifier;
use newsbrief_core::types::{DeliveryChannel, OutgoingMessage};
use serde_json::{Value, json};

const GRAPH_BASE: &str = "https://graph.facebook.com";

/// WhatsApp text sender.
pub struct WhatsAppNotifier {
    config: WhatsAppChannelConfig,
    base_url: String,
    client: reqwest::Client,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppChannelConfig) -> Result<Self> {
        if config.access_token.is_empty() {
            return Err(BriefError::Config(
                "WhatsApp access_token not configured".into(),
            ));
        }
        if config.phone_number_id.is_empty() {
            return Err(BriefError::Config(
                "WhatsApp phone_number_id not configured".into(),
            ));
        }
        tracing::info!("📱 WhatsApp channel ready: phone id {}", config.phone_number_id);
        Ok(Self {
            config,
            base_url: GRAPH_BASE.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Point the notifier at another Graph API host (local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url, self.config.api_version, self.config.phone_number_id
        )
    }
}

/// Cloud API wants bare digits; accept `whatsapp:+15551234567` style too.
pub fn normalize_recipient(to: &str) -> String {
    let to = to.trim();
    let to = to.strip_prefix("whatsapp:").unwrap_or(to);
    to.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn text_body(to: &str, text: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": {
            "preview_url": false,
            "body": text
        }
    })
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Whatsapp
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let to = normalize_recipient(&message.to);
        if to.is_empty() {
            return Err(BriefError::Channel(format!(
                "Invalid WhatsApp recipient '{}'",
                message.to
            )));
        }

        let response = self
            .client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .header("Content-Type", "application/json")
            .json(&text_body(&to, &message.text))
            .send()
            .await
            .map_err(|e| BriefError::Channel(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BriefError::Channel(format!(
                "WhatsApp API error {}: {}",
                status, error_text
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| BriefError::Channel(format!("Invalid WhatsApp response: {e}")))?;
        let msg_id = result["messages"][0]["id"].as_str().unwrap_or("unknown");

        tracing::info!("📤 WhatsApp message sent: {} → {}", msg_id, to);
        Ok(())
    }
}
