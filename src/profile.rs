//! User profile and machine-binding value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata category under which machine bindings are stored.
pub const MACHINE_ID_CATEGORY: &str = "System";

/// Metadata key under which machine bindings are stored.
pub const MACHINE_ID_KEY: &str = "MachineId";

/// A user identity record owned by the user directory.
///
/// This subsystem mutates active/default flags and metadata entries through
/// the directory; it never deletes a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique user identifier.
    pub id: String,
    /// Unique username.
    pub username: String,
    /// Email address, if known.
    pub email: Option<String>,
    /// Whether the user may authenticate.
    pub is_active: bool,
    /// Whether this user is the preferred selection for its machine.
    pub is_default: bool,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
    /// Last successful silent login or switch.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Key/value metadata entries, including machine bindings.
    pub metadata: Vec<UserMetadataEntry>,
    /// Security settings for this user.
    pub security: SecuritySettings,
}

/// A single metadata entry attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadataEntry {
    pub category: String,
    pub key: String,
    pub value: String,
}

/// Security settings carried on a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Name of the authentication method in effect.
    pub auth_method: String,
    /// Session timeout in minutes.
    pub session_timeout_minutes: u32,
    /// Whether two-factor authentication is enabled.
    pub two_factor_enabled: bool,
    /// When the password was last changed, if ever.
    pub password_changed_at: Option<DateTime<Utc>>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            auth_method: "machine".to_string(),
            session_timeout_minutes: 24 * 60,
            two_factor_enabled: false,
            password_changed_at: None,
        }
    }
}

impl UserProfile {
    /// Create a new active profile with a generated id.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            email: None,
            is_active: true,
            is_default: false,
            created_at: Utc::now(),
            last_login_at: None,
            metadata: Vec::new(),
            security: SecuritySettings::default(),
        }
    }

    /// Machine identifier bound to this profile, if any.
    pub fn machine_id(&self) -> Option<&str> {
        self.metadata
            .iter()
            .find(|entry| entry.category == MACHINE_ID_CATEGORY && entry.key == MACHINE_ID_KEY)
            .map(|entry| entry.value.as_str())
    }

    /// Attach or replace the machine binding on this profile.
    pub fn set_machine_binding(&mut self, machine_id: impl Into<String>) {
        let machine_id = machine_id.into();
        if let Some(entry) = self
            .metadata
            .iter_mut()
            .find(|entry| entry.category == MACHINE_ID_CATEGORY && entry.key == MACHINE_ID_KEY)
        {
            entry.value = machine_id;
        } else {
            self.metadata.push(UserMetadataEntry {
                category: MACHINE_ID_CATEGORY.to_string(),
                key: MACHINE_ID_KEY.to_string(),
                value: machine_id,
            });
        }
    }

    /// Whether this profile is bound to the given machine.
    pub fn is_bound_to(&self, machine_id: &str) -> bool {
        self.machine_id() == Some(machine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_binding_round_trip() {
        let mut profile = UserProfile::new("alice");
        assert_eq!(profile.machine_id(), None);

        profile.set_machine_binding("M1");
        assert_eq!(profile.machine_id(), Some("M1"));
        assert!(profile.is_bound_to("M1"));
        assert!(!profile.is_bound_to("M2"));

        // Rebinding replaces the existing entry instead of stacking.
        profile.set_machine_binding("M2");
        assert_eq!(profile.machine_id(), Some("M2"));
        assert_eq!(
            profile
                .metadata
                .iter()
                .filter(|e| e.key == MACHINE_ID_KEY)
                .count(),
            1
        );
    }
}
