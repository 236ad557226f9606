//! Audit trail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SaveOperation,
    Login,
    LoginFailed,
    LoginLocked,
    Logout,
    AddUser,
    UpdateUserStatus,
    AddSection,
    DeleteSection,
    ArchiveOperations,
    PurgeAuditLog,
}

impl AuditAction {
    pub const ALL: [AuditAction; 11] = [
        AuditAction::SaveOperation,
        AuditAction::Login,
        AuditAction::LoginFailed,
        AuditAction::LoginLocked,
        AuditAction::Logout,
        AuditAction::AddUser,
        AuditAction::UpdateUserStatus,
        AuditAction::AddSection,
        AuditAction::DeleteSection,
        AuditAction::ArchiveOperations,
        AuditAction::PurgeAuditLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::SaveOperation => "SAVE_OPERATION",
            AuditAction::Login => "LOGIN",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::LoginLocked => "LOGIN_LOCKED",
            AuditAction::Logout => "LOGOUT",
            AuditAction::AddUser => "ADD_USER",
            AuditAction::UpdateUserStatus => "UPDATE_USER_STATUS",
            AuditAction::AddSection => "ADD_SECTION",
            AuditAction::DeleteSection => "DELETE_SECTION",
            AuditAction::ArchiveOperations => "ARCHIVE_OPERATIONS",
            AuditAction::PurgeAuditLog => "PURGE_AUDIT_LOG",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown audit action '{s}'"))
    }
}

/// Widest `entity_id` the audit table stores.
pub const MAX_ENTITY_ID_LEN: usize = 100;
/// Widest `ip_address` the audit table stores.
pub const MAX_IP_ADDRESS_LEN: usize = 64;
/// User agents are kept whole up to this many characters.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// First `max` characters of `value`.
fn clamp(mut value: String, max: usize) -> String {
    if let Some((cut, _)) = value.char_indices().nth(max) {
        value.truncate(cut);
    }
    value
}

/// Network context of the caller, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    /// Header-supplied values are cut to what the audit table holds.
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.map(|ip| clamp(ip, MAX_IP_ADDRESS_LEN)),
            user_agent: user_agent.map(|agent| clamp(agent, MAX_USER_AGENT_LEN)),
        }
    }
}

/// An audit record about to be appended.
///
/// ```
/// use cashdesk::model::{AuditAction, AuditEntry};
///
/// let entry = AuditEntry::new(AuditAction::Logout, "user", "7").actor(7);
/// assert_eq!(entry.actor_id, Some(7));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub context: ClientContext,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: None,
            action,
            entity_type: entity_type.into(),
            entity_id: Some(clamp(entity_id.into(), MAX_ENTITY_ID_LEN)),
            old_value: None,
            new_value: None,
            context: ClientContext::default(),
        }
    }

    /// Entry without a single target row (batch maintenance).
    pub fn untargeted(action: AuditAction, entity_type: impl Into<String>) -> Self {
        Self {
            entity_id: None,
            ..Self::new(action, entity_type, String::new())
        }
    }

    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn maybe_actor(mut self, actor_id: Option<i64>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn old_value(mut self, value: serde_json::Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn context(mut self, context: &ClientContext) -> Self {
        self.context = ClientContext::new(context.ip_address.clone(), context.user_agent.clone());
        self
    }
}

/// A stored, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    pub user_id: Option<i64>,
    /// Username of the actor, joined at read time
    pub username: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
