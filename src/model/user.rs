//! Accounts and their credential state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Failure counting and lockout fields of one account.
///
/// Only [`CredentialState::after_failure`] and [`CredentialState::after_success`] produce
/// new states; the stores persist whatever they return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Lockout threshold and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            window: Duration::minutes(30),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_failed_attempts: u32, window: Duration) -> Self {
        Self {
            max_failed_attempts,
            window,
        }
    }
}

impl CredentialState {
    /// Locked iff a lock timestamp exists and is still in the future.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// Count one more failure. From the threshold on, every failure restarts the window.
    pub fn after_failure(&self, now: DateTime<Utc>, policy: &LockoutPolicy) -> Self {
        let failed_attempts = self.failed_attempts.saturating_add(1);
        let locked_until = if failed_attempts >= policy.max_failed_attempts {
            Some(now + policy.window)
        } else {
            self.locked_until
        };
        Self {
            failed_attempts,
            locked_until,
            last_login: self.last_login,
        }
    }

    pub fn after_success(&self, now: DateTime<Utc>) -> Self {
        Self {
            failed_attempts: 0,
            locked_until: None,
            last_login: Some(now),
        }
    }
}

/// A stored account, including its password hash. Never serialized to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub credentials: CredentialState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            role: self.role,
            active: self.active,
            last_login: self.credentials.last_login,
            created_at: self.created_at,
        }
    }
}

/// Identity returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
}

/// Account as listed to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

impl NewUser {
    pub fn validate(&self) -> Result<(), crate::error::CoreError> {
        use crate::error::CoreError;

        let username = self.username.trim();
        if username.is_empty() || self.password.is_empty() || self.name.trim().is_empty() {
            return Err(CoreError::validation(
                "username, password and name are required",
            ));
        }
        if username.len() > 64 || username.chars().any(char::is_whitespace) {
            return Err(CoreError::validation(
                "username must be at most 64 characters without spaces",
            ));
        }
        if self.password.len() < 8 {
            return Err(CoreError::validation(
                "password must be at least 8 characters",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_locks_at_threshold() {
        let policy = LockoutPolicy::default();
        let mut state = CredentialState::default();
        for i in 1..5 {
            state = state.after_failure(t0(), &policy);
            assert_eq!(state.failed_attempts, i);
            assert!(!state.is_locked(t0()));
        }
        state = state.after_failure(t0(), &policy);
        assert_eq!(state.failed_attempts, 5);
        assert_eq!(state.locked_until, Some(t0() + Duration::minutes(30)));
        assert!(state.is_locked(t0() + Duration::minutes(29)));
    }

    #[test]
    fn test_every_failure_past_threshold_extends_lock() {
        let policy = LockoutPolicy::default();
        let mut state = CredentialState::default();
        for _ in 0..5 {
            state = state.after_failure(t0(), &policy);
        }
        let later = t0() + Duration::minutes(20);
        state = state.after_failure(later, &policy);
        assert_eq!(state.failed_attempts, 6);
        assert_eq!(state.locked_until, Some(later + Duration::minutes(30)));
    }

    #[test]
    fn test_expiry_is_lazy_and_keeps_counter() {
        let policy = LockoutPolicy::default();
        let mut state = CredentialState::default();
        for _ in 0..5 {
            state = state.after_failure(t0(), &policy);
        }
        let after_window = t0() + Duration::minutes(31);
        assert!(!state.is_locked(after_window));
        assert_eq!(state.failed_attempts, 5);
        assert!(state.locked_until.is_some());
    }

    #[test]
    fn test_success_resets() {
        let policy = LockoutPolicy::default();
        let state = CredentialState::default()
            .after_failure(t0(), &policy)
            .after_failure(t0(), &policy);
        let now = t0() + Duration::minutes(1);
        let state = state.after_success(now);
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(state.locked_until, None);
        assert_eq!(state.last_login, Some(now));
    }

    #[test]
    fn test_lock_boundary_is_exclusive() {
        let state = CredentialState {
            locked_until: Some(t0()),
            ..CredentialState::default()
        };
        assert!(state.is_locked(t0() - Duration::seconds(1)));
        assert!(!state.is_locked(t0()));
    }

    #[test]
    fn test_new_user_validation() {
        let mut user = NewUser {
            username: "caissier1".into(),
            password: "longenough".into(),
            name: "Caissier".into(),
            role: Role::User,
        };
        assert!(user.validate().is_ok());

        user.password = "short".into();
        assert!(user.validate().is_err());

        user.password = "longenough".into();
        user.username = "two words".into();
        assert!(user.validate().is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
        let json: NewUser = serde_json::from_value(serde_json::json!({
            "username": "a", "password": "b", "name": "c"
        }))
        .unwrap();
        assert_eq!(json.role, Role::User);
    }
}
