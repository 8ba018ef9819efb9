//! # NewsBrief Core
//!
//! Shared building blocks for every NewsBrief crate: configuration, the error
//! type, the wire-level types passed between collaborators, and the traits
//! that the dispatch cycle is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::BriefConfig;
pub use error::{BriefError, Result};
