//! OpenAI provider implementation
//!
//! Also serves any OpenAI-compatible endpoint (Groq).

pub mod client;
pub mod types;

pub use client::OpenAiClient;
