//! User directory collaborator trait.

use crate::errors::Result;
use crate::profile::UserProfile;
use async_trait::async_trait;

/// One page of a user listing.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<UserProfile>,
    pub total: u64,
}

/// Persistence contract for user profiles and their metadata bindings.
///
/// Implementations own the profiles; this subsystem only reads them and
/// mutates active/default flags, last-activity bookkeeping, and metadata
/// entries through the operations below.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a profile by id.
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// All active users carrying a metadata entry equal to
    /// `(category, key, value)`. Used to resolve machine bindings;
    /// binding uniqueness is a soft invariant enforced by this lookup,
    /// not a storage constraint.
    async fn find_active_users_by_metadata(
        &self,
        category: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<UserProfile>>;

    /// Persist a new profile.
    async fn add_user(&self, profile: &UserProfile) -> Result<()>;

    /// Persist changes to an existing profile.
    async fn update_user(&self, profile: &UserProfile) -> Result<()>;

    /// Whether a username is already taken.
    async fn username_exists(&self, username: &str) -> Result<bool>;

    /// Paged listing of all users.
    async fn list_users(&self, offset: u64, limit: u64) -> Result<UserPage>;

    /// Set a metadata entry on a user, replacing any existing entry with the
    /// same category and key.
    async fn set_user_metadata(
        &self,
        user_id: &str,
        category: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;
}
