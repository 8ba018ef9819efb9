//! # NewsBrief Gateway
//!
//! axum HTTP surface over the dispatch cycle and the brief store.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
