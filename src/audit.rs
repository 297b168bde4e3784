//! Audit event records and the append-only sink contract.
//!
//! Only the write contract is consumed here; storage, querying, and
//! retention belong to the audit subsystem that implements [`AuditSink`].

use crate::errors::Result;
use crate::results::AuthErrorCode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Security-relevant event kinds recorded by this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailure,
    UserCreated,
    UserSwitched,
    SessionCreated,
    SessionRefreshed,
    Logout,
}

/// A single append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// User the event concerns, if resolved.
    pub user_id: Option<String>,
    /// Kind of event.
    pub event_type: AuditEventType,
    /// Operation that produced the event (e.g. `"get_or_create_default_user"`).
    pub operation: String,
    /// Human-readable detail.
    pub detail: String,
    /// Machine the event concerns, if applicable.
    pub machine_id: Option<String>,
    /// Additional key/value context.
    pub extra: HashMap<String, String>,
    /// Whether the surrounding operation succeeded.
    pub success: bool,
    /// Error code of the surrounding operation, on failure.
    pub error_code: Option<AuthErrorCode>,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Build a successful-event record.
    pub fn success(
        event_type: AuditEventType,
        operation: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            user_id: None,
            event_type,
            operation: operation.into(),
            detail: detail.into(),
            machine_id: None,
            extra: HashMap::new(),
            success: true,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a failed-event record.
    pub fn failure(
        event_type: AuditEventType,
        operation: impl Into<String>,
        detail: impl Into<String>,
        error_code: AuthErrorCode,
    ) -> Self {
        Self {
            user_id: None,
            event_type,
            operation: operation.into(),
            detail: detail.into(),
            machine_id: None,
            extra: HashMap::new(),
            success: false,
            error_code: Some(error_code),
            timestamp: Utc::now(),
        }
    }

    /// Attach a user id.
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a machine id.
    pub fn machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    /// Attach an extra key/value entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Append-only sink for audit records.
///
/// Delivery is best-effort from the caller's point of view: a failing append
/// is logged and never alters the outcome of the primary operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append a record to the log.
    async fn append(&self, record: AuditRecord) -> Result<()>;
}
