//! # NewsBrief News
//!
//! Content-fetch collaborator: searches recent articles for a query.

pub mod newsapi;

pub use newsapi::NewsApiClient;
