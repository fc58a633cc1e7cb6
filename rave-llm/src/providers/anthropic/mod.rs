//! Anthropic (Claude) provider implementation

pub mod client;
pub mod types;

pub use client::AnthropicClient;

/// Value sent in the `anthropic-version` header.
pub const API_VERSION: &str = "2023-06-01";
