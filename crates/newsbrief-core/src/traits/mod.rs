//! Collaborator traits the dispatch cycle is written against.
//!
//! Every external dependency (LLM, news search, channel senders) is reached
//! through one of these, so the cycle can run against test doubles.

pub mod content;
pub mod notifier;
pub mod provider;

pub use content::{NewsSource, Summarizer};
pub use notifier::Notifier;
pub use provider::{Generator, Provider};
