//! Error types for RAVE operations

use crate::{AgentFunction, EntityKind, ProviderKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// One provider's failure inside a multi-provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// LLM provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No API key configured for {provider}")]
    CredentialMissing { provider: ProviderKind },

    #[error("Provider {provider} is not registered")]
    ProviderNotConfigured { provider: ProviderKind },

    #[error("Request to {provider} failed with status {status}: {body}")]
    Http {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("Network error calling {provider}: {message}")]
    Network {
        provider: ProviderKind,
        message: String,
    },

    #[error("Request to {provider} timed out after {after_ms}ms")]
    Timeout { provider: ProviderKind, after_ms: u64 },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse {
        provider: ProviderKind,
        reason: String,
    },

    #[error("All {} providers failed: {}", .failures.len(), join_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },
}

impl LlmError {
    /// Provider the error is attributed to, if it is a single-provider error.
    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            LlmError::CredentialMissing { provider }
            | LlmError::ProviderNotConfigured { provider }
            | LlmError::Http { provider, .. }
            | LlmError::Network { provider, .. }
            | LlmError::Timeout { provider, .. }
            | LlmError::InvalidResponse { provider, .. } => Some(*provider),
            LlmError::AllProvidersFailed { .. } => None,
        }
    }
}

/// Failure to recover structured data from a model reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No JSON value found in reply")]
    NotFound,

    #[error("Malformed JSON in reply: {reason}")]
    Malformed { raw: String, reason: String },
}

/// Prompt template errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Unresolved prompt placeholders: {}", .names.join(", "))]
    MissingPlaceholders { names: Vec<String> },

    #[error("Failed to serialize prompt value for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("{entity} {id} version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        entity: EntityKind,
        id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("{entity} {id} is in an invalid state: {reason}")]
    InvalidState {
        entity: EntityKind,
        id: Uuid,
        reason: String,
    },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: EntityKind, id: Uuid },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Unknown action '{action}' for {function}")]
    UnknownAction {
        function: AgentFunction,
        action: String,
        valid: Vec<String>,
    },
}

/// Master error type for all RAVE errors.
#[derive(Debug, Clone, Error)]
pub enum RaveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for RAVE operations.
pub type RaveResult<T> = Result<T, RaveError>;

// =============================================================================
// TESTS
// =============================================================================
