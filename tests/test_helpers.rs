//! Shared harness for integration tests.
#![allow(dead_code)]

use silent_auth::testing::{MemoryAuditSink, MockPreferenceStore, MockUserDirectory};
use silent_auth::{
    AuthConfig, AuthenticationResult, JwtSessionTokens, SilentAuthService, UserContext,
    UserContextCache, UserProfile,
};
use std::sync::Arc;

pub const TEST_SECRET: &[u8] = b"integration-test-secret";

/// A fully wired service + cache over mock collaborators.
pub struct Harness {
    pub directory: Arc<MockUserDirectory>,
    pub prefs: Arc<MockPreferenceStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub tokens: Arc<JwtSessionTokens>,
    pub auth: Arc<SilentAuthService>,
    pub cache: Arc<UserContextCache>,
}

pub fn harness() -> Harness {
    harness_with(AuthConfig::default(), MockUserDirectory::new())
}

pub fn harness_with(config: AuthConfig, directory: MockUserDirectory) -> Harness {
    let directory = Arc::new(directory);
    let prefs = Arc::new(MockPreferenceStore::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let tokens = Arc::new(JwtSessionTokens::new_hmac(TEST_SECRET, "silent-auth"));

    let auth = Arc::new(
        SilentAuthService::new(
            config,
            directory.clone(),
            tokens.clone(),
            audit.clone(),
        )
        .expect("valid test config"),
    );
    let cache = Arc::new(UserContextCache::new(
        auth.clone(),
        directory.clone(),
        prefs.clone(),
        audit.clone(),
    ));

    Harness {
        directory,
        prefs,
        audit,
        tokens,
        auth,
        cache,
    }
}

/// A profile bound to the given machine.
pub fn bound_user(username: &str, machine_id: &str) -> UserProfile {
    let mut profile = UserProfile::new(username);
    profile.set_machine_binding(machine_id);
    profile
}

/// Build a context snapshot from a successful authentication result.
pub fn context_from(result: &AuthenticationResult, machine_id: &str) -> UserContext {
    UserContext::new(
        result.user.clone().expect("result has user"),
        result.session_token.clone().expect("result has token"),
        result.expires_at.expect("result has expiry"),
        machine_id,
    )
}

/// Silent-login on `machine_id` and install the resulting context.
pub async fn login(harness: &Harness, machine_id: &str) -> AuthenticationResult {
    let result = harness.auth.get_or_create_default_user(machine_id).await;
    assert!(result.success, "silent login failed: {:?}", result);
    harness
        .cache
        .set_current_context(context_from(&result, machine_id))
        .await
        .expect("context install succeeds");
    result
}
