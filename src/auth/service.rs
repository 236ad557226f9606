//! Login and logout.

use crate::auth::{PasswordHasher, SessionIdentity, SessionIssuer};
use crate::error::{AuthFailure, CoreError, CoreResult};
use crate::model::{AuditAction, AuditEntry, ClientContext, User, UserSummary};
use crate::pool::StorePool;
use crate::store::{AuditTrail, CredentialGuard, UserStore};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginSuccess {
    pub token: String,
    pub user: UserSummary,
}

/// What the login transaction decided. Rejections still commit their counter update and
/// audit record.
enum LoginOutcome {
    Accepted(LoginSuccess),
    Rejected(AuthFailure),
}

#[derive(Clone)]
pub struct AuthService {
    pool: StorePool,
    users: UserStore,
    guard: CredentialGuard,
    audit: AuditTrail,
    hasher: PasswordHasher,
    sessions: Arc<dyn SessionIssuer>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("policy", self.guard.policy())
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(
        pool: StorePool,
        users: UserStore,
        guard: CredentialGuard,
        audit: AuditTrail,
        hasher: PasswordHasher,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self {
            pool,
            users,
            guard,
            audit,
            hasher,
            sessions,
        }
    }

    pub fn login(
        &self,
        request: &LoginRequest,
        context: &ClientContext,
    ) -> CoreResult<LoginSuccess> {
        self.login_at(request, context, Utc::now())
    }

    /// Authenticate `request` as of `now`.
    ///
    /// Runs in one transaction holding the account's row lock: lock check, then password
    /// verification, then the counter update, token and audit record. Unknown, inactive
    /// and wrongly-authenticated accounts all fail with the same
    /// [`AuthFailure::InvalidCredentials`].
    pub fn login_at(
        &self,
        request: &LoginRequest,
        context: &ClientContext,
        now: DateTime<Utc>,
    ) -> CoreResult<LoginSuccess> {
        let username = request.username.trim();
        if username.is_empty() || request.password.is_empty() {
            return Err(CoreError::validation("Username and password are required"));
        }

        let outcome = self.pool.in_transaction(|tx| {
            self.authenticate(tx, username, &request.password, context, now)
        })?;

        match outcome {
            LoginOutcome::Accepted(success) => {
                #[cfg(feature = "metrics")]
                METRICS.record_login("success");
                log::info!("login succeeded for '{}'", success.user.username);
                Ok(success)
            }
            LoginOutcome::Rejected(failure) => {
                #[cfg(feature = "metrics")]
                METRICS.record_login(match failure {
                    AuthFailure::Locked => "locked",
                    _ => "failed",
                });
                log::info!("login rejected for '{}': {:?}", username, failure);
                Err(CoreError::Auth(failure))
            }
        }
    }

    fn authenticate(
        &self,
        tx: &Transaction,
        username: &str,
        password: &str,
        context: &ClientContext,
        now: DateTime<Utc>,
    ) -> CoreResult<LoginOutcome> {
        let user = match self.users.find_by_username_in(tx, username, true)? {
            Some(user) if user.active => user,
            Some(user) => {
                self.hasher.verify_dummy(password);
                self.audit.append(
                    tx,
                    &self
                        .login_entry(AuditAction::LoginFailed, &user, context)
                        .new_value(serde_json::json!({ "reason": "inactive" })),
                )?;
                return Ok(LoginOutcome::Rejected(AuthFailure::InvalidCredentials));
            }
            None => {
                self.hasher.verify_dummy(password);
                self.audit.append(
                    tx,
                    &AuditEntry::new(AuditAction::LoginFailed, "user", username)
                        .new_value(serde_json::json!({ "reason": "unknown_user" }))
                        .context(context),
                )?;
                return Ok(LoginOutcome::Rejected(AuthFailure::InvalidCredentials));
            }
        };

        if self.guard.is_locked_at(tx, user.id, now)? {
            self.audit.append(
                tx,
                &self
                    .login_entry(AuditAction::LoginLocked, &user, context)
                    .new_value(serde_json::json!({ "lockedUntil": user.credentials.locked_until })),
            )?;
            return Ok(LoginOutcome::Rejected(AuthFailure::Locked));
        }

        if !self.hasher.verify(password, &user.password_hash) {
            let state = self.guard.record_failure_at(tx, user.id, now)?;
            self.audit.append(
                tx,
                &self
                    .login_entry(AuditAction::LoginFailed, &user, context)
                    .new_value(serde_json::json!({
                        "reason": "bad_password",
                        "failedAttempts": state.failed_attempts,
                        "lockedUntil": state.locked_until,
                    })),
            )?;
            return Ok(LoginOutcome::Rejected(AuthFailure::InvalidCredentials));
        }

        self.guard.record_success_at(tx, user.id, now)?;
        let token = self
            .sessions
            .issue(&user, now)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        self.audit
            .append(tx, &self.login_entry(AuditAction::Login, &user, context))?;

        Ok(LoginOutcome::Accepted(LoginSuccess {
            token,
            user: user.summary(),
        }))
    }

    fn login_entry(&self, action: AuditAction, user: &User, context: &ClientContext) -> AuditEntry {
        AuditEntry::new(action, "user", user.id.to_string())
            .actor(user.id)
            .context(context)
    }

    /// Record a logout. Tokens are stateless and stay valid until they expire.
    pub fn logout(&self, identity: &SessionIdentity, context: &ClientContext) -> CoreResult<()> {
        self.audit.record(
            &AuditEntry::new(AuditAction::Logout, "user", identity.user_id.to_string())
                .actor(identity.user_id)
                .context(context),
        )?;
        log::info!("logout for '{}'", identity.username);
        Ok(())
    }

    /// Check a bearer token.
    pub fn verify_token(&self, token: &str) -> CoreResult<SessionIdentity> {
        self.sessions.verify(token, Utc::now()).map_err(|e| {
            log::debug!("rejected bearer token: {}", e);
            CoreError::Auth(AuthFailure::InvalidToken)
        })
    }
}
