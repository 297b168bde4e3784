//! Testing utilities for the silent authentication crate.
//!
//! Mock implementations of the collaborator traits, with failure injection,
//! so applications built on this crate can test against the same contracts
//! the crate itself is tested against.

use crate::audit::{AuditEventType, AuditRecord, AuditSink};
use crate::directory::{UserDirectory, UserPage};
use crate::errors::{AuthError, Result};
use crate::preferences::PreferenceStore;
use crate::profile::UserProfile;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory user directory with failure injection.
#[derive(Default)]
pub struct MockUserDirectory {
    users: DashMap<String, UserProfile>,
    fail_all: AtomicBool,
    fail_metadata_writes: AtomicBool,
}

impl MockUserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory that fails every operation.
    pub fn new_failing() -> Self {
        let directory = Self::new();
        directory.fail_all.store(true, Ordering::SeqCst);
        directory
    }

    /// Preload a profile.
    pub fn with_user(self, profile: UserProfile) -> Self {
        self.users.insert(profile.id.clone(), profile);
        self
    }

    /// Make only metadata writes fail from now on.
    pub fn fail_metadata_writes(&self) {
        self.fail_metadata_writes.store(true, Ordering::SeqCst);
    }

    /// Number of stored profiles.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AuthError::directory("mock directory configured to fail"));
        }
        Ok(())
    }

    fn sorted_users(&self) -> Vec<UserProfile> {
        let mut users: Vec<UserProfile> =
            self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.check_available()?;
        Ok(self.users.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn find_active_users_by_metadata(
        &self,
        category: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<UserProfile>> {
        self.check_available()?;
        Ok(self
            .sorted_users()
            .into_iter()
            .filter(|user| {
                user.is_active
                    && user
                        .metadata
                        .iter()
                        .any(|e| e.category == category && e.key == key && e.value == value)
            })
            .collect())
    }

    async fn add_user(&self, profile: &UserProfile) -> Result<()> {
        self.check_available()?;
        self.users.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update_user(&self, profile: &UserProfile) -> Result<()> {
        self.check_available()?;
        if !self.users.contains_key(&profile.id) {
            return Err(AuthError::directory(format!(
                "user '{}' does not exist",
                profile.id
            )));
        }
        self.users.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.users.iter().any(|entry| entry.username == username))
    }

    async fn list_users(&self, offset: u64, limit: u64) -> Result<UserPage> {
        self.check_available()?;
        let users = self.sorted_users();
        let total = users.len() as u64;
        let users = users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(UserPage { users, total })
    }

    async fn set_user_metadata(
        &self,
        user_id: &str,
        category: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.check_available()?;
        if self.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(AuthError::directory(
                "mock directory configured to fail metadata writes",
            ));
        }
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::directory(format!("user '{user_id}' does not exist")))?;
        if let Some(entry) = user
            .metadata
            .iter_mut()
            .find(|e| e.category == category && e.key == key)
        {
            entry.value = value.to_string();
        } else {
            user.metadata.push(crate::profile::UserMetadataEntry {
                category: category.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory preference store with a write counter and failure injection.
#[derive(Default)]
pub struct MockPreferenceStore {
    values: DashMap<(String, String, String), Value>,
    writes: AtomicUsize,
    should_fail: AtomicBool,
}

impl MockPreferenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that fails every operation.
    pub fn new_failing() -> Self {
        let store = Self::new();
        store.should_fail.store(true, Ordering::SeqCst);
        store
    }

    /// Preload a value.
    pub fn with_value(
        self,
        user_id: impl Into<String>,
        category: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.values
            .insert((user_id.into(), category.into(), key.into()), value);
        self
    }

    /// Number of successful writes observed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(AuthError::preference("mock store configured to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for MockPreferenceStore {
    async fn get(&self, user_id: &str, category: &str, key: &str) -> Result<Option<Value>> {
        self.check_available()?;
        Ok(self
            .values
            .get(&(user_id.to_string(), category.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, user_id: &str, category: &str, key: &str, value: Value) -> Result<()> {
        self.check_available()?;
        self.values.insert(
            (user_id.to_string(), category.to_string(), key.to_string()),
            value,
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_category(&self, user_id: &str, category: &str) -> Result<HashMap<String, Value>> {
        self.check_available()?;
        Ok(self
            .values
            .iter()
            .filter(|entry| entry.key().0 == user_id && entry.key().1 == category)
            .map(|entry| (entry.key().2.clone(), entry.value().clone()))
            .collect())
    }
}

/// In-memory append-only audit sink with failure injection.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    should_fail: AtomicBool,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that rejects every append.
    pub fn new_failing() -> Self {
        let sink = Self::new();
        sink.should_fail.store(true, Ordering::SeqCst);
        sink
    }

    /// Everything appended so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of records of the given kind.
    pub fn count_of(&self, event_type: AuditEventType) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(AuthError::audit("mock sink configured to fail"));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}
