//! # NewsBrief Channels
//! Outbound delivery channels. Each implements `newsbrief_core::traits::Notifier`.

pub mod email;
pub mod whatsapp;

pub use email::EmailNotifier;
pub use whatsapp::WhatsAppNotifier;
