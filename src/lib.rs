/*!
# Silent Auth

Credential-free authentication for shared desktop-style machines, plus a
thread-safe process-local cache of the current user context.

Users are resolved (or created) from a machine identifier, receive signed,
stateless session tokens, and are served to concurrent callers as immutable
context snapshots. Sessions are validated lazily and refreshed only when they
approach expiry; there are no background timers.

## Quick Start

```rust,no_run
use silent_auth::{
    AuthConfig, JwtSessionTokens, SilentAuthService, UserContext, UserContextCache,
};
use silent_auth::testing::{MemoryAuditSink, MockPreferenceStore, MockUserDirectory};
use std::sync::Arc;

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
let directory = Arc::new(MockUserDirectory::new());
let tokens = Arc::new(JwtSessionTokens::new_hmac(b"your-secret-key", "my-app"));
let audit = Arc::new(MemoryAuditSink::new());
let prefs = Arc::new(MockPreferenceStore::new());

let auth = Arc::new(SilentAuthService::new(
    AuthConfig::default(),
    directory.clone(),
    tokens,
    audit.clone(),
)?);

// Silent login: resolve or create the user bound to this machine.
let result = auth.get_or_create_default_user("machine-01").await;
assert!(result.success);

// Cache the resolved context for the rest of the process.
let cache = UserContextCache::new(auth, directory, prefs, audit);
let context = UserContext::new(
    result.user.unwrap(),
    result.session_token.unwrap(),
    result.expires_at.unwrap(),
    "machine-01",
);
cache.set_current_context(context).await?;

let theme: String = cache.get_preference("Editor", "theme", "dark".to_string()).await;
# Ok(())
# }
```
*/

pub mod audit;
pub mod config;
pub mod context;
pub mod directory;
pub mod errors;
pub mod preferences;
pub mod profile;
pub mod results;
pub mod service;
pub mod testing;
pub mod tokens;

pub use audit::{AuditEventType, AuditRecord, AuditSink};
pub use config::AuthConfig;
pub use context::{
    ContextChangeKind, ContextChangedEvent, PreferenceCache, PreferenceChangedEvent, UserContext,
    UserContextCache,
};
pub use directory::{UserDirectory, UserPage};
pub use errors::{AuthError, Result};
pub use preferences::PreferenceStore;
pub use profile::{
    SecuritySettings, UserMetadataEntry, UserProfile, MACHINE_ID_CATEGORY, MACHINE_ID_KEY,
};
pub use results::{
    AuthErrorCode, AuthenticationResult, SessionRefreshResult, SessionValidationResult,
};
pub use service::{ActiveSession, SilentAuthService};
pub use tokens::{JwtSessionTokens, SessionTokenProvider, TokenValidation};
