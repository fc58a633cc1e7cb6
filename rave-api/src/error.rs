//! Error Types for RAVE API
//!
//! Every failure leaves the server as the same envelope:
//! `{ "success": false, "error": "<message>", "code": "<CODE>", "details"?: {...} }`
//! with the status taken from [`ErrorCode::status_code`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rave_core::{
    AgentFunction, ConfigError, ExtractionError, LlmError, RaveError, StorageError,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request body is not usable JSON
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field value is out of range or of the wrong type
    InvalidValue,

    /// `action` is missing or not offered by the function
    UnknownAction,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// No agent function by that name
    FunctionNotFound,

    /// Requested record does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Record with the same identifier already exists
    EntityAlreadyExists,

    /// Optimistic concurrency check failed
    VersionConflict,

    /// Operation conflicts with the record's current state
    StateConflict,

    // ========================================================================
    // Upstream Errors (502, 503, 504)
    // ========================================================================
    /// A provider rejected the call or replied with garbage
    ProviderFailed,

    /// Every provider in a fan-out failed
    AllProvidersFailed,

    /// A model reply held no usable JSON
    ExtractionFailed,

    /// The provider needed for this action has no credential
    ProviderUnavailable,

    /// A provider did not answer in time
    ProviderTimeout,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    ConfigurationError,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidValue
            | ErrorCode::UnknownAction => StatusCode::BAD_REQUEST,

            ErrorCode::FunctionNotFound | ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists
            | ErrorCode::VersionConflict
            | ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::ProviderFailed
            | ErrorCode::AllProvidersFailed
            | ErrorCode::ExtractionFailed => StatusCode::BAD_GATEWAY,

            ErrorCode::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::ConfigurationError
            | ErrorCode::DatabaseError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Wire form of the error.
    pub fn envelope(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        });
        if let (Some(details), Value::Object(map)) = (&self.details, &mut body) {
            map.insert("details".to_string(), details.clone());
        }
        body
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, status = status.as_u16(), error = %self.message, "Request failed");
        } else {
            tracing::debug!(code = %self.code, status = status.as_u16(), error = %self.message, "Request rejected");
        }
        (status, Json(self.envelope())).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM RAVE ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        match err {
            ValidationError::RequiredFieldMissing { field } => {
                ApiError::new(ErrorCode::MissingField, message).with_details(json!({ "field": field }))
            }
            ValidationError::InvalidValue { field, .. } => {
                ApiError::new(ErrorCode::InvalidValue, message).with_details(json!({ "field": field }))
            }
            ValidationError::UnknownFunction { .. } => {
                let valid: Vec<&str> = AgentFunction::ALL.iter().map(|f| f.as_db_str()).collect();
                ApiError::new(ErrorCode::FunctionNotFound, message)
                    .with_details(json!({ "valid_functions": valid }))
            }
            ValidationError::UnknownAction { valid, .. } => {
                ApiError::new(ErrorCode::UnknownAction, message)
                    .with_details(json!({ "valid_actions": valid }))
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::NotFound { entity, id } => ApiError::new(ErrorCode::EntityNotFound, message)
                .with_details(json!({ "entity": entity.to_string(), "id": id })),
            StorageError::VersionConflict {
                expected, actual, ..
            } => ApiError::new(ErrorCode::VersionConflict, message)
                .with_details(json!({ "expected": expected, "actual": actual })),
            StorageError::InvalidState { .. } => ApiError::new(ErrorCode::StateConflict, message),
            StorageError::AlreadyExists { .. } => {
                ApiError::new(ErrorCode::EntityAlreadyExists, message)
            }
            StorageError::Backend { .. } | StorageError::LockPoisoned => {
                // Full detail stays in the log; clients get a generic message.
                tracing::error!(error = %message, "Storage failure");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        let message = err.to_string();
        match err {
            LlmError::AllProvidersFailed { failures } => {
                ApiError::new(ErrorCode::AllProvidersFailed, message)
                    .with_details(json!({ "failures": failures }))
            }
            LlmError::Timeout { provider, after_ms } => {
                ApiError::new(ErrorCode::ProviderTimeout, message)
                    .with_details(json!({ "provider": provider, "after_ms": after_ms }))
            }
            LlmError::CredentialMissing { provider } | LlmError::ProviderNotConfigured { provider } => {
                ApiError::new(ErrorCode::ProviderUnavailable, message)
                    .with_details(json!({ "provider": provider }))
            }
            LlmError::Http { provider, .. }
            | LlmError::Network { provider, .. }
            | LlmError::InvalidResponse { provider, .. } => {
                ApiError::new(ErrorCode::ProviderFailed, message)
                    .with_details(json!({ "provider": provider }))
            }
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        ApiError::new(ErrorCode::ExtractionFailed, err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigurationError, err.to_string())
    }
}

impl From<RaveError> for ApiError {
    fn from(err: RaveError) -> Self {
        match err {
            RaveError::Validation(e) => e.into(),
            RaveError::Storage(e) => e.into(),
            RaveError::Llm(e) => e.into(),
            RaveError::Extraction(e) => e.into(),
            RaveError::Config(e) => e.into(),
            RaveError::Prompt(e) => ApiError::internal_error(e.to_string()),
        }
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
