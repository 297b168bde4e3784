//! Configuration for the silent authentication service.

use crate::errors::{AuthError, Result};
use std::time::Duration;

/// Configuration for [`SilentAuthService`](crate::service::SilentAuthService)
/// and the context cache that sits on top of it.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Full lifetime of a newly minted session token.
    pub session_lifetime: Duration,

    /// Remaining-lifetime cutoff below which a refresh mints a new token.
    /// A session with more remaining lifetime than this is returned unchanged.
    pub near_expiry_threshold: Duration,

    /// Base name used when generating usernames for newly created users.
    pub username_base: String,

    /// Upper bound on username-collision retries during user creation.
    pub max_username_attempts: u32,
}

impl AuthConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full session token lifetime.
    pub fn session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    /// Set the near-expiry threshold used by session refresh.
    pub fn near_expiry_threshold(mut self, threshold: Duration) -> Self {
        self.near_expiry_threshold = threshold;
        self
    }

    /// Set the base name for generated usernames.
    pub fn username_base(mut self, base: impl Into<String>) -> Self {
        self.username_base = base.into();
        self
    }

    /// Set the username-collision retry cap.
    pub fn max_username_attempts(mut self, attempts: u32) -> Self {
        self.max_username_attempts = attempts;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.session_lifetime.is_zero() {
            return Err(AuthError::validation("session lifetime must be non-zero"));
        }
        if self.near_expiry_threshold >= self.session_lifetime {
            return Err(AuthError::validation(
                "near-expiry threshold must be shorter than the session lifetime",
            ));
        }
        if self.username_base.trim().is_empty() {
            return Err(AuthError::validation("username base must not be empty"));
        }
        if self.max_username_attempts == 0 {
            return Err(AuthError::validation(
                "username attempt cap must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(24 * 60 * 60),
            near_expiry_threshold: Duration::from_secs(2 * 60 * 60),
            username_base: "user".to_string(),
            max_username_attempts: 100,
        }
    }
}
