//! Tagged outcome types returned by the authentication flows.
//!
//! Expected domain failures are returned, not thrown: every login/switch/
//! create flow produces an [`AuthenticationResult`] whose
//! [`AuthErrorCode`] lets callers branch without error handling.

use crate::profile::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable error codes surfaced by authentication and switch flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthErrorCode {
    UserNotFound,
    UserInactive,
    MachineIdMismatch,
    UsernameExists,
    EmailExists,
    InvalidUserId,
    InvalidMachineId,
    SessionCreationFailed,
    UserCreationFailed,
    InternalError,
    AuthFailed,
}

impl AuthErrorCode {
    /// Stable wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserInactive => "USER_INACTIVE",
            Self::MachineIdMismatch => "MACHINE_ID_MISMATCH",
            Self::UsernameExists => "USERNAME_EXISTS",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::InvalidUserId => "INVALID_USER_ID",
            Self::InvalidMachineId => "INVALID_MACHINE_ID",
            Self::SessionCreationFailed => "SESSION_CREATION_FAILED",
            Self::UserCreationFailed => "USER_CREATION_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::AuthFailed => "AUTH_FAILED",
        }
    }
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a login, switch, or session-creation flow.
///
/// Created fresh per call and never persisted.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// Whether the flow succeeded.
    pub success: bool,

    /// Resolved user profile on success.
    pub user: Option<UserProfile>,

    /// Issued session token on success.
    pub session_token: Option<String>,

    /// Expiration of the issued token.
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the flow created a new user.
    pub is_new_user: bool,

    /// Error code on failure.
    pub error_code: Option<AuthErrorCode>,

    /// Human-readable error message on failure.
    pub error_message: Option<String>,
}

impl AuthenticationResult {
    /// Build a successful result.
    pub fn success(
        user: UserProfile,
        session_token: String,
        expires_at: DateTime<Utc>,
        is_new_user: bool,
    ) -> Self {
        Self {
            success: true,
            user: Some(user),
            session_token: Some(session_token),
            expires_at: Some(expires_at),
            is_new_user,
            error_code: None,
            error_message: None,
        }
    }

    /// Build a failed result with a stable code and message.
    pub fn failure(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            session_token: None,
            expires_at: None,
            is_new_user: false,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    /// Resolved user id, if the flow succeeded.
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Outcome of validating a session token.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionValidationResult {
    /// Whether the token is valid right now.
    pub is_valid: bool,

    /// Whether the token failed specifically because it expired.
    pub is_expired: bool,

    /// User id encoded in the token, when resolvable.
    pub user_id: Option<String>,

    /// Token expiration, when resolvable.
    pub expires_at: Option<DateTime<Utc>>,

    /// Human-readable failure reason.
    pub failure_reason: Option<String>,
}

impl SessionValidationResult {
    /// Build a valid result for the given user and expiration.
    pub fn valid(user_id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            is_valid: true,
            is_expired: false,
            user_id: Some(user_id.into()),
            expires_at: Some(expires_at),
            failure_reason: None,
        }
    }

    /// Build an expired result.
    pub fn expired(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_expired: true,
            user_id: None,
            expires_at: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// Build an invalid (non-expiry) result.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_expired: false,
            user_id: None,
            expires_at: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Outcome of renewing a session token.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRefreshResult {
    /// Whether the refresh produced a usable token.
    pub success: bool,

    /// Current token after the refresh. Identical to the input token when
    /// the remaining lifetime was above the near-expiry threshold.
    pub session_token: Option<String>,

    /// Expiration of the returned token.
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether a new token was minted.
    pub renewed: bool,

    /// Human-readable failure reason.
    pub failure_reason: Option<String>,
}

impl SessionRefreshResult {
    /// Build a result that keeps the existing token.
    pub fn unchanged(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            session_token: Some(token.into()),
            expires_at: Some(expires_at),
            renewed: false,
            failure_reason: None,
        }
    }

    /// Build a result carrying a freshly minted token.
    pub fn renewed(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            session_token: Some(token.into()),
            expires_at: Some(expires_at),
            renewed: true,
            failure_reason: None,
        }
    }

    /// Build a failed result.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            session_token: None,
            expires_at: None,
            renewed: false,
            failure_reason: Some(reason.into()),
        }
    }
}
