//! Email channel: SMTP delivery of HTML briefs via async lettre.
//!
//! Each brief goes out as multipart/alternative with a plain-text part derived
//! from the rendered content and the HTML newsletter body.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use newsbrief_core::config::EmailChannelConfig;
use newsbrief_core::error::{BriefError, Result};
use newsbrief_core::traits::Notifier;
use newsbrief_core::types::{DeliveryChannel, OutgoingMessage};

/// SMTP email sender.
pub struct EmailNotifier {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: &EmailChannelConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(BriefError::Config("Email smtp_host not configured".into()));
        }

        let from = build_from(config)?;
        let username = if config.username.is_empty() {
            config.from_email.clone()
        } else {
            config.username.clone()
        };
        let creds = Credentials::new(username, config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| BriefError::Channel(format!("SMTP relay: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        tracing::info!("📧 Email channel ready: {} via {}", config.from_email, config.smtp_host);
        Ok(Self { from, mailer })
    }

    fn build_message(&self, message: &OutgoingMessage) -> Result<LettreMessage> {
        build_message(&self.from, message)
    }
}

fn build_from(config: &EmailChannelConfig) -> Result<Mailbox> {
    format!("{} <{}>", config.from_name, config.from_email)
        .parse()
        .map_err(|e| BriefError::Config(format!("Invalid from address: {e}")))
}

fn build_message(from: &Mailbox, message: &OutgoingMessage) -> Result<LettreMessage> {
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| BriefError::Channel(format!("Invalid to '{}': {e}", message.to)))?;

    LettreMessage::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.as_str())
        .multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            message.html.clone(),
        ))
        .map_err(|e| BriefError::Channel(format!("Build email: {e}")))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> DeliveryChannel {
        DeliveryChannel::Email
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let email = self.build_message(message)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| BriefError::Channel(format!("SMTP send: {e}")))?;
        tracing::info!("📤 Email sent to: {}", message.to);
        Ok(())
    }
}
