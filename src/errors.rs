//! Error types for the silent authentication crate.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Main error type for the silent authentication crate.
///
/// Expected domain failures (unknown user, machine mismatch, ...) are not
/// errors; they are reported as typed failure results carrying a stable
/// [`AuthErrorCode`](crate::results::AuthErrorCode). This enum covers
/// validation failures and unexpected collaborator faults.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Input validation errors (empty ids, expired contexts, ...)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Context-mutation entry points surface failures with this variant so
    /// callers can tell them apart from plain validation failures.
    #[error("Context operation failed: {message}")]
    Context { message: String },

    /// User directory errors
    #[error("Directory error: {message}")]
    Directory { message: String },

    /// Token generation/validation errors
    #[error("Crypto error: {message}")]
    Crypto { message: String },

    /// Preference store errors
    #[error("Preference store error: {message}")]
    Preference { message: String },

    /// Audit sink errors
    #[error("Audit sink error: {message}")]
    Audit { message: String },

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new context-operation error
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
        }
    }

    /// Create a new directory error
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a new preference store error
    pub fn preference(message: impl Into<String>) -> Self {
        Self::Preference {
            message: message.into(),
        }
    }

    /// Create a new audit sink error
    pub fn audit(message: impl Into<String>) -> Self {
        Self::Audit {
            message: message.into(),
        }
    }
}
