//! Google Gemini provider implementation

pub mod client;
pub mod types;

pub use client::GeminiClient;
