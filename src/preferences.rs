//! Per-user preference store contract.

use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Per-user, per-category key/value settings store.
///
/// Values travel as JSON; typed access lives on the context cache, which
/// deserializes on read and serializes on write.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Read a single preference value, if set.
    async fn get(&self, user_id: &str, category: &str, key: &str) -> Result<Option<Value>>;

    /// Write a single preference value.
    async fn set(&self, user_id: &str, category: &str, key: &str, value: Value) -> Result<()>;

    /// Read all preferences in a category.
    async fn get_category(&self, user_id: &str, category: &str) -> Result<HashMap<String, Value>>;
}
