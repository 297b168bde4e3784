//! Process-local current-user context cache.
//!
//! Holds at most one resolved context per process and serves it to
//! concurrent callers as an immutable snapshot behind an `Arc`. All I/O
//! (directory, crypto, audit, preference store) happens before the swap of
//! the held reference, so the critical section is O(1) and readers never
//! block on a writer's I/O.

use crate::audit::{AuditEventType, AuditRecord, AuditSink};
use crate::directory::UserDirectory;
use crate::errors::{AuthError, Result};
use crate::preferences::PreferenceStore;
use crate::profile::UserProfile;
use crate::results::AuthenticationResult;
use crate::service::SilentAuthService;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Two-level preference cache: category -> key -> value.
pub type PreferenceCache = HashMap<String, HashMap<String, Value>>;

/// What kind of change a [`ContextChangedEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextChangeKind {
    UserLogin,
    UserSwitch,
    ContextRefresh,
    UserLogout,
}

/// Notification emitted when the current context changes.
#[derive(Debug, Clone)]
pub struct ContextChangedEvent {
    /// Snapshot before the change, if any.
    pub old: Option<Arc<UserContext>>,
    /// Snapshot after the change, if any.
    pub new: Option<Arc<UserContext>>,
    /// Kind of change.
    pub kind: ContextChangeKind,
}

/// Notification emitted when a preference is written through the cache.
#[derive(Debug, Clone)]
pub struct PreferenceChangedEvent {
    pub user_id: String,
    pub category: String,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// The process-local cache entry for the active user.
///
/// Exposed to callers only as a fully-constructed snapshot; the held
/// reference is replaced wholesale on switch and refresh, so no caller
/// observes piecemeal field updates. The preference cache is the one
/// interior-mutable part and is owned by this snapshot alone.
#[derive(Debug)]
pub struct UserContext {
    /// Id of the active user.
    pub user_id: String,
    /// Resolved profile.
    pub profile: UserProfile,
    /// Session token backing this context.
    pub session_token: String,
    /// Process-local session identifier.
    pub session_id: String,
    /// When the session token expires.
    pub session_expires_at: DateTime<Utc>,
    /// Machine this context was resolved for.
    pub machine_id: String,
    /// Whether the user is the machine's default user.
    pub is_default_user: bool,
    /// When this snapshot was built.
    pub last_updated: DateTime<Utc>,
    preferences: RwLock<PreferenceCache>,
}

impl UserContext {
    /// Build a context snapshot with an empty preference cache.
    pub fn new(
        profile: UserProfile,
        session_token: impl Into<String>,
        session_expires_at: DateTime<Utc>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: profile.id.clone(),
            is_default_user: profile.is_default,
            profile,
            session_token: session_token.into(),
            session_id: Uuid::new_v4().to_string(),
            session_expires_at,
            machine_id: machine_id.into(),
            last_updated: Utc::now(),
            preferences: RwLock::new(PreferenceCache::new()),
        }
    }

    /// Whether the backing session has already expired.
    pub fn is_expired(&self) -> bool {
        self.session_expires_at <= Utc::now()
    }

    /// Read a cached preference value.
    pub fn cached_preference(&self, category: &str, key: &str) -> Option<Value> {
        self.preferences
            .read()
            .unwrap()
            .get(category)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// Cache a preference value, returning the previous one.
    pub fn cache_preference(&self, category: &str, key: &str, value: Value) -> Option<Value> {
        self.preferences
            .write()
            .unwrap()
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value)
    }

    /// Number of cached preference entries across all categories.
    pub fn cached_preference_count(&self) -> usize {
        self.preferences
            .read()
            .unwrap()
            .values()
            .map(HashMap::len)
            .sum()
    }

    /// Categories currently present in the cache.
    pub fn cached_categories(&self) -> Vec<String> {
        self.preferences.read().unwrap().keys().cloned().collect()
    }

    fn with_preferences(mut self, cache: PreferenceCache) -> Self {
        self.preferences = RwLock::new(cache);
        self
    }

    fn snapshot_preferences(&self) -> PreferenceCache {
        self.preferences.read().unwrap().clone()
    }
}

type ContextObserver = Box<dyn Fn(&ContextChangedEvent) + Send + Sync>;
type PreferenceObserver = Box<dyn Fn(&PreferenceChangedEvent) + Send + Sync>;

/// Thread-safe holder of the single current user context.
///
/// Reads are O(1) clone-of-`Arc` under a read lock; mutations do their I/O
/// first and contend only on the final reference swap. Change observers run
/// synchronously inside the swap's critical section, so they see events in
/// exactly the order the state changed; handlers must be fast and must not
/// call back into the cache.
pub struct UserContextCache {
    auth: Arc<SilentAuthService>,
    directory: Arc<dyn UserDirectory>,
    preferences: Arc<dyn PreferenceStore>,
    audit: Arc<dyn AuditSink>,
    current: RwLock<Option<Arc<UserContext>>>,
    context_observers: Mutex<Vec<ContextObserver>>,
    preference_observers: Mutex<Vec<PreferenceObserver>>,
}

impl UserContextCache {
    /// Create an empty cache over the given collaborators.
    pub fn new(
        auth: Arc<SilentAuthService>,
        directory: Arc<dyn UserDirectory>,
        preferences: Arc<dyn PreferenceStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            auth,
            directory,
            preferences,
            audit,
            current: RwLock::new(None),
            context_observers: Mutex::new(Vec::new()),
            preference_observers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to context-changed notifications.
    pub fn on_context_changed<F>(&self, observer: F)
    where
        F: Fn(&ContextChangedEvent) + Send + Sync + 'static,
    {
        self.context_observers
            .lock()
            .unwrap()
            .push(Box::new(observer));
    }

    /// Subscribe to preference-changed notifications.
    pub fn on_preference_changed<F>(&self, observer: F)
    where
        F: Fn(&PreferenceChangedEvent) + Send + Sync + 'static,
    {
        self.preference_observers
            .lock()
            .unwrap()
            .push(Box::new(observer));
    }

    /// Current snapshot, if a context is active. Never blocks on I/O.
    pub fn current_context(&self) -> Option<Arc<UserContext>> {
        self.current.read().unwrap().clone()
    }

    /// Id of the active user, if any.
    pub fn current_user_id(&self) -> Option<String> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|ctx| ctx.user_id.clone())
    }

    /// Whether a context is currently active.
    pub fn has_active_context(&self) -> bool {
        self.current.read().unwrap().is_some()
    }

    /// Install `context` as the current snapshot.
    ///
    /// Rejects contexts with an empty user id or an already-expired session.
    /// Emits a `UserLogin`-tagged event; on overwrite the event carries the
    /// replaced snapshot.
    pub async fn set_current_context(&self, context: UserContext) -> Result<()> {
        if context.user_id.trim().is_empty() {
            return Err(AuthError::validation("context user id is required"));
        }
        if context.is_expired() {
            return Err(AuthError::validation("context session is already expired"));
        }

        self.record_audit(
            AuditRecord::success(
                AuditEventType::LoginSuccess,
                "set_current_context",
                "user context established",
            )
            .user(&context.user_id)
            .machine(&context.machine_id),
        )
        .await;

        let new = Arc::new(context);
        {
            let mut guard = self.current.write().unwrap();
            let old = guard.replace(Arc::clone(&new));
            self.notify_context(&ContextChangedEvent {
                old,
                new: Some(Arc::clone(&new)),
                kind: ContextChangeKind::UserLogin,
            });
        }

        info!("context set for user '{}'", new.user_id);
        Ok(())
    }

    /// Switch the current context to another user on the same machine.
    ///
    /// Delegates to the authentication service with the machine id recorded
    /// in the current context. On success the new snapshot starts with an
    /// empty preference cache; nothing cached for the previous user leaks
    /// across the switch. Domain failures are returned inside the
    /// [`AuthenticationResult`] and leave the current context untouched.
    pub async fn switch_context(&self, target_user_id: &str) -> Result<AuthenticationResult> {
        if target_user_id.trim().is_empty() {
            return Err(AuthError::validation("target user id is required"));
        }

        let current = self
            .current_context()
            .ok_or_else(|| AuthError::context("no active user context to switch from"))?;

        let result = self
            .auth
            .switch_user(target_user_id, &current.machine_id)
            .await;
        if !result.success {
            debug!(
                "switch to '{}' rejected: {}",
                target_user_id,
                result.error_message.as_deref().unwrap_or("unknown")
            );
            return Ok(result);
        }

        let context = match self.context_from_result(&result, &current.machine_id) {
            Some(context) => context,
            None => {
                return Err(AuthError::context(
                    "switch succeeded but returned no session",
                ));
            }
        };

        let new = Arc::new(context);
        {
            let mut guard = self.current.write().unwrap();
            let old = guard.replace(Arc::clone(&new));
            self.notify_context(&ContextChangedEvent {
                old,
                new: Some(Arc::clone(&new)),
                kind: ContextChangeKind::UserSwitch,
            });
        }

        info!("context switched to user '{}'", new.user_id);
        Ok(result)
    }

    /// Remove the current snapshot, if any.
    pub async fn clear_current_context(&self) {
        let old = {
            let mut guard = self.current.write().unwrap();
            let old = guard.take();
            if old.is_some() {
                self.notify_context(&ContextChangedEvent {
                    old: old.clone(),
                    new: None,
                    kind: ContextChangeKind::UserLogout,
                });
            }
            old
        };

        if let Some(old) = old {
            self.record_audit(
                AuditRecord::success(
                    AuditEventType::Logout,
                    "clear_current_context",
                    "user context cleared",
                )
                .user(&old.user_id)
                .machine(&old.machine_id),
            )
            .await;
            info!("context cleared for user '{}'", old.user_id);
        }
    }

    /// Rebuild the current snapshot from fresh collaborator state.
    ///
    /// Reloads the profile (clearing the context when the user no longer
    /// exists), renews the session when it is near expiry (best-effort: a
    /// failed renewal keeps the old token), and reloads every cached
    /// preference category from the store.
    pub async fn refresh_current_context(&self) -> Result<()> {
        let current = match self.current_context() {
            Some(current) => current,
            None => return Ok(()),
        };

        let profile = self
            .directory
            .get_user(&current.user_id)
            .await
            .map_err(|err| AuthError::context(format!("profile reload failed: {err}")))?;
        let profile = match profile {
            Some(profile) => profile,
            None => {
                warn!(
                    "user '{}' disappeared; clearing current context",
                    current.user_id
                );
                self.clear_if_current(&current).await;
                return Ok(());
            }
        };

        let mut session_token = current.session_token.clone();
        let mut session_expires_at = current.session_expires_at;
        let mut session_id = current.session_id.clone();
        if session_expires_at - Utc::now() <= self.auth.near_expiry_threshold() {
            let refresh = self
                .auth
                .refresh_session(&current.session_token, &current.machine_id)
                .await;
            match (refresh.success, refresh.session_token, refresh.expires_at) {
                (true, Some(token), Some(expires_at)) => {
                    if token != session_token {
                        session_id = Uuid::new_v4().to_string();
                    }
                    session_token = token;
                    session_expires_at = expires_at;
                }
                _ => {
                    // Best-effort renewal: keep the old token rather than
                    // failing the whole refresh.
                    warn!(
                        "session renewal failed during refresh: {}",
                        refresh.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }

        let mut cache = current.snapshot_preferences();
        for category in current.cached_categories() {
            match self
                .preferences
                .get_category(&current.user_id, &category)
                .await
            {
                Ok(entries) => {
                    cache.insert(category, entries);
                }
                Err(err) => {
                    warn!("could not reload preference category '{category}': {err}");
                }
            }
        }

        let mut context = UserContext::new(
            profile,
            session_token,
            session_expires_at,
            current.machine_id.clone(),
        )
        .with_preferences(cache);
        context.session_id = session_id;

        let new = Arc::new(context);
        {
            let mut guard = self.current.write().unwrap();
            // A switch or clear may have replaced the slot while this
            // refresh was doing I/O; the rebuild is stale then and must
            // not win over the newer state.
            let still_current = guard
                .as_ref()
                .is_some_and(|live| Arc::ptr_eq(live, &current));
            if !still_current {
                debug!("context changed during refresh; discarding rebuild");
                return Ok(());
            }
            let old = guard.replace(Arc::clone(&new));
            self.notify_context(&ContextChangedEvent {
                old,
                new: Some(Arc::clone(&new)),
                kind: ContextChangeKind::ContextRefresh,
            });
        }

        debug!("context refreshed for user '{}'", new.user_id);
        Ok(())
    }

    /// Remove the current snapshot only when it is still `expected`.
    async fn clear_if_current(&self, expected: &Arc<UserContext>) {
        let old = {
            let mut guard = self.current.write().unwrap();
            let still_current = guard
                .as_ref()
                .is_some_and(|live| Arc::ptr_eq(live, expected));
            if !still_current {
                return;
            }
            let old = guard.take();
            self.notify_context(&ContextChangedEvent {
                old: old.clone(),
                new: None,
                kind: ContextChangeKind::UserLogout,
            });
            old
        };

        if let Some(old) = old {
            self.record_audit(
                AuditRecord::success(
                    AuditEventType::Logout,
                    "refresh_current_context",
                    "user context cleared",
                )
                .user(&old.user_id)
                .machine(&old.machine_id),
            )
            .await;
            info!("context cleared for user '{}'", old.user_id);
        }
    }

    /// Read a preference for the active user, falling back to `default`
    /// when no context is active, the value is absent, or the store fails.
    pub async fn get_preference<T>(&self, category: &str, key: &str, default: T) -> T
    where
        T: DeserializeOwned,
    {
        let context = match self.current_context() {
            Some(context) => context,
            None => return default,
        };

        if let Some(value) = context.cached_preference(category, key) {
            return serde_json::from_value(value).unwrap_or(default);
        }

        match self.preferences.get(&context.user_id, category, key).await {
            Ok(Some(value)) => {
                context.cache_preference(category, key, value.clone());
                serde_json::from_value(value).unwrap_or(default)
            }
            Ok(None) => default,
            Err(err) => {
                warn!("preference read failed for '{category}/{key}': {err}");
                default
            }
        }
    }

    /// Write a preference for the active user.
    ///
    /// The store write happens first; only on success is the cache updated
    /// and a [`PreferenceChangedEvent`] emitted.
    pub async fn set_preference<T>(&self, category: &str, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let context = self
            .current_context()
            .ok_or_else(|| AuthError::context("no active user context"))?;

        let json = serde_json::to_value(value)?;
        self.preferences
            .set(&context.user_id, category, key, json.clone())
            .await?;

        let old_value = context.cache_preference(category, key, json.clone());
        self.notify_preference(&PreferenceChangedEvent {
            user_id: context.user_id.clone(),
            category: category.to_string(),
            key: key.to_string(),
            old_value,
            new_value: json,
        });

        Ok(())
    }

    fn context_from_result(
        &self,
        result: &AuthenticationResult,
        machine_id: &str,
    ) -> Option<UserContext> {
        let profile = result.user.clone()?;
        let token = result.session_token.clone()?;
        let expires_at = result.expires_at?;
        Some(UserContext::new(profile, token, expires_at, machine_id))
    }

    fn notify_context(&self, event: &ContextChangedEvent) {
        for observer in self.context_observers.lock().unwrap().iter() {
            observer(event);
        }
    }

    fn notify_preference(&self, event: &PreferenceChangedEvent) {
        for observer in self.preference_observers.lock().unwrap().iter() {
            observer(event);
        }
    }

    /// Best-effort audit delivery, mirroring the service's policy.
    async fn record_audit(&self, record: AuditRecord) {
        if let Err(err) = self.audit.append(record).await {
            warn!("audit append failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn context_snapshot_starts_with_empty_cache() {
        let profile = UserProfile::new("alice");
        let context = UserContext::new(
            profile,
            "token",
            Utc::now() + ChronoDuration::hours(1),
            "M1",
        );
        assert_eq!(context.cached_preference_count(), 0);
        assert!(!context.is_expired());
    }

    #[test]
    fn cache_preference_returns_previous_value() {
        let profile = UserProfile::new("alice");
        let context = UserContext::new(
            profile,
            "token",
            Utc::now() + ChronoDuration::hours(1),
            "M1",
        );

        assert_eq!(
            context.cache_preference("Editor", "theme", Value::from("dark")),
            None
        );
        assert_eq!(
            context.cache_preference("Editor", "theme", Value::from("light")),
            Some(Value::from("dark"))
        );
        assert_eq!(
            context.cached_preference("Editor", "theme"),
            Some(Value::from("light"))
        );
    }

    #[test]
    fn expired_session_is_reported() {
        let profile = UserProfile::new("alice");
        let context = UserContext::new(
            profile,
            "token",
            Utc::now() - ChronoDuration::minutes(1),
            "M1",
        );
        assert!(context.is_expired());
    }
}
