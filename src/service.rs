//! Silent authentication service.
//!
//! Resolves or creates the default user for a machine identity, switches
//! between users bound to a machine, and issues/validates/refreshes the
//! stateless session tokens that back the user context cache.

use crate::audit::{AuditEventType, AuditRecord, AuditSink};
use crate::config::AuthConfig;
use crate::directory::UserDirectory;
use crate::errors::{AuthError, Result};
use crate::profile::{UserProfile, MACHINE_ID_CATEGORY, MACHINE_ID_KEY};
use crate::results::{
    AuthErrorCode, AuthenticationResult, SessionRefreshResult, SessionValidationResult,
};
use crate::tokens::SessionTokenProvider;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A live session entry, as reported by [`SilentAuthService::get_active_sessions`].
///
/// No server-side session registry exists in this subsystem, so the listing
/// is always empty; the type documents the shape a real registry would
/// return.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub user_id: String,
    pub machine_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Credential-free authentication keyed by machine identity.
///
/// All login/switch/create flows return an [`AuthenticationResult`]; expected
/// domain failures carry a stable [`AuthErrorCode`] and unexpected
/// collaborator faults are mapped to `INTERNAL_ERROR` at the boundary.
pub struct SilentAuthService {
    config: AuthConfig,
    directory: Arc<dyn UserDirectory>,
    tokens: Arc<dyn SessionTokenProvider>,
    audit: Arc<dyn AuditSink>,
}

impl SilentAuthService {
    /// Create a new service over the given collaborators.
    pub fn new(
        config: AuthConfig,
        directory: Arc<dyn UserDirectory>,
        tokens: Arc<dyn SessionTokenProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            directory,
            tokens,
            audit,
        })
    }

    /// The configuration this service runs with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Resolve the user bound to `machine_id`, creating one when none exists.
    ///
    /// When one or more active users are bound to the machine, the
    /// default-flagged user is preferred, else the first match. When none
    /// exist, a new profile is created with a generated username and bound
    /// to the machine; profile creation and machine binding are treated as
    /// one logical step.
    pub async fn get_or_create_default_user(&self, machine_id: &str) -> AuthenticationResult {
        if machine_id.trim().is_empty() {
            return AuthenticationResult::failure(
                AuthErrorCode::InvalidMachineId,
                "machine id is required",
            );
        }

        match self.resolve_or_create(machine_id).await {
            Ok(result) => result,
            Err(err) => {
                error!("silent login failed for machine '{}': {}", machine_id, err);
                AuthenticationResult::failure(
                    AuthErrorCode::InternalError,
                    "internal error during silent login",
                )
            }
        }
    }

    async fn resolve_or_create(&self, machine_id: &str) -> Result<AuthenticationResult> {
        debug!("resolving default user for machine '{}'", machine_id);

        let mut candidates = self
            .directory
            .find_active_users_by_metadata(MACHINE_ID_CATEGORY, MACHINE_ID_KEY, machine_id)
            .await?;

        if !candidates.is_empty() {
            let index = candidates.iter().position(|u| u.is_default).unwrap_or(0);
            let mut user = candidates.remove(index);

            user.last_login_at = Some(Utc::now());
            self.directory.update_user(&user).await?;

            let (token, expires_at) = self.issue_session(&user.id, machine_id).await?;

            self.record_audit(
                AuditRecord::success(
                    AuditEventType::LoginSuccess,
                    "get_or_create_default_user",
                    "silent login for existing user",
                )
                .user(&user.id)
                .machine(machine_id),
            )
            .await;

            info!("silent login for user '{}' on '{}'", user.id, machine_id);
            return Ok(AuthenticationResult::success(user, token, expires_at, false));
        }

        self.create_machine_user(machine_id).await
    }

    async fn create_machine_user(&self, machine_id: &str) -> Result<AuthenticationResult> {
        let username = match self.generate_username().await? {
            Some(name) => name,
            None => {
                warn!(
                    "exhausted {} username candidates for machine '{}'",
                    self.config.max_username_attempts, machine_id
                );
                self.record_audit(
                    AuditRecord::failure(
                        AuditEventType::LoginFailure,
                        "get_or_create_default_user",
                        "could not generate a unique username",
                        AuthErrorCode::UserCreationFailed,
                    )
                    .machine(machine_id)
                    .with_extra("attempts", self.config.max_username_attempts.to_string()),
                )
                .await;
                return Ok(AuthenticationResult::failure(
                    AuthErrorCode::UserCreationFailed,
                    "could not generate a unique username",
                ));
            }
        };

        let mut profile = UserProfile::new(&username);
        profile.is_default = true;
        profile.last_login_at = Some(Utc::now());

        self.directory.add_user(&profile).await?;

        // Binding is part of the same logical step as the profile write; a
        // failed binding must not leave an orphaned profile reported as a
        // successful login.
        if let Err(err) = self
            .directory
            .set_user_metadata(&profile.id, MACHINE_ID_CATEGORY, MACHINE_ID_KEY, machine_id)
            .await
        {
            warn!(
                "machine binding failed for new user '{}': {}; deactivating",
                profile.id, err
            );
            profile.is_active = false;
            if let Err(err) = self.directory.update_user(&profile).await {
                warn!("could not deactivate orphaned user '{}': {}", profile.id, err);
            }
            self.record_audit(
                AuditRecord::failure(
                    AuditEventType::LoginFailure,
                    "get_or_create_default_user",
                    "failed to bind new user to machine",
                    AuthErrorCode::UserCreationFailed,
                )
                .user(&profile.id)
                .machine(machine_id)
                .with_extra("username", &username),
            )
            .await;
            return Ok(AuthenticationResult::failure(
                AuthErrorCode::UserCreationFailed,
                "failed to bind new user to machine",
            ));
        }
        profile.set_machine_binding(machine_id);

        self.record_audit(
            AuditRecord::success(
                AuditEventType::UserCreated,
                "get_or_create_default_user",
                format!("created user '{username}' for machine"),
            )
            .user(&profile.id)
            .machine(machine_id),
        )
        .await;

        let (token, expires_at) = self.issue_session(&profile.id, machine_id).await?;

        info!(
            "created user '{}' ('{}') for machine '{}'",
            profile.id, username, machine_id
        );
        Ok(AuthenticationResult::success(
            profile, token, expires_at, true,
        ))
    }

    /// Generate a unique username, bounded by the configured attempt cap.
    async fn generate_username(&self) -> Result<Option<String>> {
        let base = self.config.username_base.as_str();
        for attempt in 0..self.config.max_username_attempts {
            let candidate = if attempt == 0 {
                base.to_string()
            } else {
                format!("{base}{attempt}")
            };
            if !self.directory.username_exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Switch to another user bound to the same machine.
    pub async fn switch_user(
        &self,
        target_user_id: &str,
        machine_id: &str,
    ) -> AuthenticationResult {
        if target_user_id.trim().is_empty() {
            return AuthenticationResult::failure(
                AuthErrorCode::InvalidUserId,
                "user id is required",
            );
        }
        if machine_id.trim().is_empty() {
            return AuthenticationResult::failure(
                AuthErrorCode::InvalidMachineId,
                "machine id is required",
            );
        }

        match self.switch_user_inner(target_user_id, machine_id).await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    "user switch to '{}' failed on '{}': {}",
                    target_user_id, machine_id, err
                );
                AuthenticationResult::failure(
                    AuthErrorCode::InternalError,
                    "internal error during user switch",
                )
            }
        }
    }

    async fn switch_user_inner(
        &self,
        target_user_id: &str,
        machine_id: &str,
    ) -> Result<AuthenticationResult> {
        let mut user = match self.directory.get_user(target_user_id).await? {
            Some(user) => user,
            None => {
                self.record_switch_rejection(
                    target_user_id,
                    machine_id,
                    AuthErrorCode::UserNotFound,
                    "switch target does not exist",
                )
                .await;
                return Ok(AuthenticationResult::failure(
                    AuthErrorCode::UserNotFound,
                    format!("user '{target_user_id}' does not exist"),
                ));
            }
        };

        if !user.is_active {
            self.record_switch_rejection(
                target_user_id,
                machine_id,
                AuthErrorCode::UserInactive,
                "switch target is deactivated",
            )
            .await;
            return Ok(AuthenticationResult::failure(
                AuthErrorCode::UserInactive,
                format!("user '{target_user_id}' is deactivated"),
            ));
        }

        // A mismatch must not mutate any session or profile state.
        if !user.is_bound_to(machine_id) {
            self.record_switch_rejection(
                target_user_id,
                machine_id,
                AuthErrorCode::MachineIdMismatch,
                "switch target is not bound to this machine",
            )
            .await;
            return Ok(AuthenticationResult::failure(
                AuthErrorCode::MachineIdMismatch,
                format!("user '{target_user_id}' is not bound to this machine"),
            ));
        }

        user.last_login_at = Some(Utc::now());
        self.directory.update_user(&user).await?;

        let (token, expires_at) = self.issue_session(&user.id, machine_id).await?;

        self.record_audit(
            AuditRecord::success(
                AuditEventType::UserSwitched,
                "switch_user",
                "user switched",
            )
            .user(&user.id)
            .machine(machine_id),
        )
        .await;

        info!("switched to user '{}' on '{}'", user.id, machine_id);
        Ok(AuthenticationResult::success(user, token, expires_at, false))
    }

    /// Validate a session token against the crypto provider and the user
    /// directory.
    ///
    /// Pure with respect to process state; safe for unbounded concurrency.
    pub async fn validate_session(
        &self,
        token: &str,
        machine_id: &str,
    ) -> SessionValidationResult {
        if token.trim().is_empty() {
            return SessionValidationResult::invalid("session token is required");
        }
        if machine_id.trim().is_empty() {
            return SessionValidationResult::invalid("machine id is required");
        }

        let validation = match self.tokens.validate_token(token, machine_id).await {
            Ok(validation) => validation,
            Err(err) => {
                error!("token validation errored: {}", err);
                return SessionValidationResult::invalid("internal error during validation");
            }
        };

        if validation.is_expired {
            return SessionValidationResult::expired("session expired");
        }
        if !validation.is_valid {
            let reason = validation
                .failure_reason
                .unwrap_or_else(|| "invalid token".to_string());
            return SessionValidationResult::invalid(reason);
        }

        // The token checked out; the encoded user must still exist and be
        // active before the session counts as valid.
        let user_id = match validation.user_id {
            Some(user_id) => user_id,
            None => return SessionValidationResult::invalid("token carries no user id"),
        };
        let expires_at = match validation.expires_at {
            Some(expires_at) => expires_at,
            None => return SessionValidationResult::invalid("token carries no expiration"),
        };

        match self.directory.get_user(&user_id).await {
            Ok(Some(user)) if user.is_active => SessionValidationResult::valid(user_id, expires_at),
            Ok(_) => SessionValidationResult::invalid("user not found or disabled"),
            Err(err) => {
                error!("directory lookup failed during validation: {}", err);
                SessionValidationResult::invalid("internal error during validation")
            }
        }
    }

    /// Renew a session token when it is close to expiry.
    ///
    /// A token with more remaining lifetime than the near-expiry threshold is
    /// returned unchanged; otherwise a new token with a full lifetime is
    /// minted for the same user and machine.
    pub async fn refresh_session(&self, token: &str, machine_id: &str) -> SessionRefreshResult {
        let validation = self.validate_session(token, machine_id).await;
        if !validation.is_valid {
            let reason = validation
                .failure_reason
                .unwrap_or_else(|| "invalid session".to_string());
            return SessionRefreshResult::failure(reason);
        }

        // Both fields are always populated on a valid result.
        let user_id = validation.user_id.unwrap_or_default();
        let expires_at = match validation.expires_at {
            Some(expires_at) => expires_at,
            None => return SessionRefreshResult::failure("session carries no expiration"),
        };

        let remaining = expires_at - Utc::now();
        if remaining > self.near_expiry_threshold() {
            debug!(
                "session for '{}' has {}s remaining; no renewal needed",
                user_id,
                remaining.num_seconds()
            );
            return SessionRefreshResult::unchanged(token, expires_at);
        }

        match self.issue_session(&user_id, machine_id).await {
            Ok((new_token, new_expires_at)) => {
                self.record_audit(
                    AuditRecord::success(
                        AuditEventType::SessionRefreshed,
                        "refresh_session",
                        "session refreshed",
                    )
                    .user(&user_id)
                    .machine(machine_id),
                )
                .await;

                info!("refreshed session for user '{}'", user_id);
                SessionRefreshResult::renewed(new_token, new_expires_at)
            }
            Err(err) => {
                error!("session renewal failed for '{}': {}", user_id, err);
                SessionRefreshResult::failure("session renewal failed")
            }
        }
    }

    /// Mint a session for an explicit user.
    pub async fn create_user_session(
        &self,
        user_id: &str,
        machine_id: &str,
    ) -> AuthenticationResult {
        if user_id.trim().is_empty() {
            return AuthenticationResult::failure(
                AuthErrorCode::InvalidUserId,
                "user id is required",
            );
        }
        if machine_id.trim().is_empty() {
            return AuthenticationResult::failure(
                AuthErrorCode::InvalidMachineId,
                "machine id is required",
            );
        }

        let user = match self.directory.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return AuthenticationResult::failure(
                    AuthErrorCode::UserNotFound,
                    format!("user '{user_id}' does not exist"),
                );
            }
            Err(err) => {
                error!("directory lookup failed during session creation: {}", err);
                return AuthenticationResult::failure(
                    AuthErrorCode::InternalError,
                    "internal error during session creation",
                );
            }
        };

        if !user.is_active {
            return AuthenticationResult::failure(
                AuthErrorCode::UserInactive,
                format!("user '{user_id}' is deactivated"),
            );
        }

        match self.issue_session(user_id, machine_id).await {
            Ok((token, expires_at)) => {
                self.record_audit(
                    AuditRecord::success(
                        AuditEventType::SessionCreated,
                        "create_user_session",
                        "session created",
                    )
                    .user(user_id)
                    .machine(machine_id),
                )
                .await;

                AuthenticationResult::success(user, token, expires_at, false)
            }
            Err(err) => {
                error!("session creation failed for '{}': {}", user_id, err);
                AuthenticationResult::failure(
                    AuthErrorCode::SessionCreationFailed,
                    "could not mint a session token",
                )
            }
        }
    }

    /// End a session. Returns whether the token identified a live session.
    pub async fn end_user_session(&self, token: &str, machine_id: &str) -> bool {
        let validation = self.validate_session(token, machine_id).await;
        let user_id = match validation.user_id {
            Some(user_id) if validation.is_valid => user_id,
            _ => {
                debug!(
                    "end_user_session rejected: {}",
                    validation
                        .failure_reason
                        .as_deref()
                        .unwrap_or("invalid session")
                );
                return false;
            }
        };

        self.record_audit(
            AuditRecord::success(AuditEventType::Logout, "end_user_session", "user logged out")
                .user(&user_id)
                .machine(machine_id),
        )
        .await;

        info!("ended session for user '{}'", user_id);
        true
    }

    /// All active users bound to the given machine.
    ///
    /// An empty machine id yields an empty list, not an error.
    pub async fn get_available_users(&self, machine_id: &str) -> Result<Vec<UserProfile>> {
        if machine_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.directory
            .find_active_users_by_metadata(MACHINE_ID_CATEGORY, MACHINE_ID_KEY, machine_id)
            .await
    }

    /// Sessions currently live in this process.
    ///
    /// Always empty: tokens are stateless and no session registry exists.
    /// A deployment needing this listing must add an explicit session table.
    pub async fn get_active_sessions(&self) -> Vec<ActiveSession> {
        Vec::new()
    }

    /// Mint a token with the full configured lifetime.
    async fn issue_session(
        &self,
        user_id: &str,
        machine_id: &str,
    ) -> Result<(String, DateTime<Utc>)> {
        let expires_at = Utc::now() + self.session_lifetime();
        let token = self
            .tokens
            .generate_token(user_id, machine_id, expires_at)
            .await
            .map_err(|err| AuthError::crypto(format!("token generation failed: {err}")))?;
        Ok((token, expires_at))
    }

    fn session_lifetime(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.session_lifetime)
            .unwrap_or_else(|_| ChronoDuration::hours(24))
    }

    /// Near-expiry threshold as a chrono duration.
    pub(crate) fn near_expiry_threshold(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.near_expiry_threshold)
            .unwrap_or_else(|_| ChronoDuration::hours(2))
    }

    /// Record a rejected switch attempt.
    async fn record_switch_rejection(
        &self,
        target_user_id: &str,
        machine_id: &str,
        code: AuthErrorCode,
        detail: &str,
    ) {
        self.record_audit(
            AuditRecord::failure(AuditEventType::LoginFailure, "switch_user", detail, code)
                .user(target_user_id)
                .machine(machine_id),
        )
        .await;
    }

    /// Best-effort audit delivery: a failing append never alters the
    /// primary operation's outcome.
    async fn record_audit(&self, record: AuditRecord) {
        if let Err(err) = self.audit.append(record).await {
            warn!("audit append failed: {}", err);
        }
    }
}
