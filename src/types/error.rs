//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//!
//! ## Fatal vs. degraded
//!
//! - **Fatal**: `Validation`, `UpstreamModel`, `CreditExhausted` (plus cancellation and
//!   infrastructure failures) abort the run and leave the prior version untouched.
//! - **Degraded**: image, enrichment and parse fallbacks never surface as `Err`; they
//!   are collected as `PipelineWarning`s next to a still-usable result.
//!
//! Model endpoint failures carry an [`ErrorCategory`] so callers (and logs) can tell a
//! rate limit from an auth failure without string matching.

use std::time::Duration;
use thiserror::Error;

use super::analysis::PipelineStage;

// =============================================================================
// Error Categories
// =============================================================================

/// Category of a model endpoint failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited by the upstream service
    RateLimit,
    /// Prompt or image too large for the model
    TokenLimit,
    /// Authentication failed
    Auth,
    /// Network/connectivity issues
    Network,
    /// Service unavailable or model not found
    Unavailable,
    /// Invalid request
    BadRequest,
    /// Response could not be interpreted
    ParseError,
    /// Temporary server issues
    Transient,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// =============================================================================
// Model Error
// =============================================================================

/// Failure reported by a model endpoint client
#[derive(Debug, Clone)]
pub struct ModelError {
    pub category: ErrorCategory,
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for ModelError {}

impl ModelError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
        }
    }
}

/// Maps transport-level failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status code returned by a model endpoint
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ModelError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400 => ErrorCategory::BadRequest,
            413 => ErrorCategory::TokenLimit,
            404 => ErrorCategory::Unavailable,
            500 | 502 | 503 | 504 => ErrorCategory::Transient,
            _ => ErrorCategory::Unknown,
        };
        ModelError::with_provider(category, message, provider)
    }

    /// Classify a reqwest transport error
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> ModelError {
        let category = if err.is_timeout() || err.is_connect() {
            ErrorCategory::Network
        } else if err.is_decode() {
            ErrorCategory::ParseError
        } else if let Some(status) = err.status() {
            return Self::classify_http_status(status.as_u16(), &err.to_string(), provider);
        } else {
            ErrorCategory::Unknown
        };
        ModelError::with_provider(category, err.to_string(), provider)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Structured validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Field or component that failed validation
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
        }
    }

    /// Add field context
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field missing or empty
    MissingField,
    /// Invalid format
    Format,
    /// Value out of range
    Range,
    /// Consistency check failed
    Consistency,
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum CaseError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Model Errors
    // -------------------------------------------------------------------------
    /// Raw endpoint failure, before the orchestrator attributes it to a stage
    #[error("Model endpoint error: {0}")]
    Model(ModelError),

    /// Reasoning or research stage failed or returned an unusable shape
    #[error("Upstream model failed during {stage}: {message}")]
    UpstreamModel {
        stage: PipelineStage,
        message: String,
    },

    #[error("Image {index} analysis failed: {message}")]
    ImageAnalysis { index: usize, message: String },

    // -------------------------------------------------------------------------
    // Run Control
    // -------------------------------------------------------------------------
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: PipelineStage },

    #[error("Insufficient credits for user {user_id}: {required} required")]
    CreditExhausted { user_id: String, required: u32 },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Validation(ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ModelError> for CaseError {
    fn from(err: ModelError) -> Self {
        CaseError::Model(err)
    }
}

impl From<ValidationError> for CaseError {
    fn from(err: ValidationError) -> Self {
        CaseError::Validation(err)
    }
}

pub type Result<T> = std::result::Result<T, CaseError>;

impl CaseError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn upstream(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self::UpstreamModel {
            stage,
            message: message.into(),
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(
            ValidationError::new(ValidationErrorKind::MissingField, message).with_field(field),
        )
    }

    /// Whether this error aborts a run (as opposed to degrading it)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ImageAnalysis { .. })
    }

    /// Pipeline stage the error is attributed to, if any
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::UpstreamModel { stage, .. } | Self::Cancelled { stage } => Some(*stage),
            Self::ImageAnalysis { .. } => Some(PipelineStage::ImageAnalysis),
            Self::Validation(_) => Some(PipelineStage::Validation),
            Self::CreditExhausted { .. } => Some(PipelineStage::CreditCheck),
            _ => None,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| CaseError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| CaseError::Storage(format!("{}: {}", f().into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let server_error = ErrorClassifier::classify_http_status(503, "Server error", "test");
        assert_eq!(server_error.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::with_provider(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");

        let err_no_provider = ModelError::new(ErrorCategory::Network, "Connection failed");
        assert_eq!(err_no_provider.to_string(), "[NETWORK] Connection failed");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CaseError::validation("case_text", "empty").is_fatal());
        assert!(CaseError::upstream(PipelineStage::Reasoning, "boom").is_fatal());
        assert!(
            CaseError::CreditExhausted {
                user_id: "u1".into(),
                required: 2
            }
            .is_fatal()
        );
        assert!(
            !CaseError::ImageAnalysis {
                index: 3,
                message: "bad".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_stage_attribution() {
        let err = CaseError::upstream(PipelineStage::Research, "502");
        assert_eq!(err.stage(), Some(PipelineStage::Research));
        assert!(err.to_string().contains("research"));
        assert_eq!(CaseError::Config("x".into()).stage(), None);
    }
}
