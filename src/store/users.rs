//! Accounts.

use crate::auth::PasswordHasher;
use crate::config::BootstrapAdmin;
use crate::error::{CoreError, CoreResult};
use crate::executor::{Executor, StoreError};
use crate::model::{
    AuditAction, AuditEntry, ClientContext, CredentialState, NewUser, Role, User, UserProfile,
};
use crate::pool::StorePool;
use crate::store::{column, AuditTrail};
use may_postgres::Row;

const USER_COLUMNS: &str = "id, username, password_hash, name, role, active, login_attempts, \
                            locked_until, last_login, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct UserStore {
    pool: StorePool,
    audit: AuditTrail,
    hasher: PasswordHasher,
}

impl UserStore {
    pub fn new(pool: StorePool, audit: AuditTrail, hasher: PasswordHasher) -> Self {
        Self {
            pool,
            audit,
            hasher,
        }
    }

    /// Look up an account by username, optionally locking its row for the caller's
    /// transaction.
    pub fn find_by_username_in(
        &self,
        executor: &dyn Executor,
        username: &str,
        for_update: bool,
    ) -> Result<Option<User>, StoreError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        executor
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1{lock}"),
                &[&username],
            )?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    pub fn find_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        let conn = self.pool.acquire()?;
        Ok(self.find_by_username_in(&conn, username, false)?)
    }

    pub fn find_by_id(&self, user_id: i64) -> CoreResult<Option<User>> {
        let conn = self.pool.acquire()?;
        let row = conn.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
            &[&user_id],
        )?;
        Ok(row.map(|row| user_from_row(&row)).transpose()?)
    }

    pub fn list(&self) -> CoreResult<Vec<UserProfile>> {
        let conn = self.pool.acquire()?;
        let rows = conn.query_all(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"), &[])?;
        rows.iter()
            .map(|row| {
                user_from_row(row)
                    .map(|user| user.profile())
                    .map_err(CoreError::from)
            })
            .collect()
    }

    /// Create an account and audit `ADD_USER`. Duplicate usernames are a conflict.
    pub fn create(
        &self,
        actor_id: Option<i64>,
        new_user: &NewUser,
        context: &ClientContext,
    ) -> CoreResult<UserProfile> {
        new_user.validate()?;
        let password_hash = self.hasher.hash(&new_user.password)?;
        let username = new_user.username.trim();
        let name = new_user.name.trim();
        let role = new_user.role.as_str();

        let profile = self.pool.in_transaction(|tx| -> CoreResult<UserProfile> {
            let row = tx
                .query_one(
                    &format!(
                        "INSERT INTO users (username, password_hash, name, role) \
                         VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
                    ),
                    &[&username, &password_hash, &name, &role],
                )
                .map_err(|e| {
                    if e.is_unique_violation() {
                        CoreError::Conflict(format!("username '{username}' already exists"))
                    } else {
                        CoreError::from(e)
                    }
                })?;
            let profile = user_from_row(&row)?.profile();

            self.audit.append(
                tx,
                &AuditEntry::new(AuditAction::AddUser, "user", profile.id.to_string())
                    .maybe_actor(actor_id)
                    .new_value(serde_json::to_value(&profile).unwrap_or_default())
                    .context(context),
            )?;
            Ok(profile)
        })?;

        log::info!("created {} account '{}' (id {})", role, profile.username, profile.id);
        Ok(profile)
    }

    /// Activate or deactivate an account and audit `UPDATE_USER_STATUS`.
    pub fn set_active(
        &self,
        actor_id: i64,
        user_id: i64,
        active: bool,
        context: &ClientContext,
    ) -> CoreResult<UserProfile> {
        if actor_id == user_id && !active {
            return Err(CoreError::validation("you cannot deactivate your own account"));
        }

        self.pool.in_transaction(|tx| -> CoreResult<UserProfile> {
            let before = tx
                .query_opt(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"),
                    &[&user_id],
                )?
                .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))?;
            let before = user_from_row(&before)?.profile();

            let row = tx.query_one(
                &format!(
                    "UPDATE users SET active = $2, updated_at = NOW() WHERE id = $1 \
                     RETURNING {USER_COLUMNS}"
                ),
                &[&user_id, &active],
            )?;
            let after = user_from_row(&row)?.profile();

            self.audit.append(
                tx,
                &AuditEntry::new(AuditAction::UpdateUserStatus, "user", user_id.to_string())
                    .actor(actor_id)
                    .old_value(serde_json::json!({ "active": before.active }))
                    .new_value(serde_json::json!({ "active": after.active }))
                    .context(context),
            )?;
            Ok(after)
        })
    }

    /// Create the configured administrator when no account exists yet.
    ///
    /// Returns the new profile, or `None` when accounts already exist.
    pub fn ensure_bootstrap_admin(
        &self,
        admin: &BootstrapAdmin,
    ) -> CoreResult<Option<UserProfile>> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one("SELECT COUNT(*) AS total FROM users", &[])?;
        let total: i64 = column(&row, "total")?;
        drop(conn);
        if total > 0 {
            return Ok(None);
        }

        let new_user = NewUser {
            username: admin.username.clone(),
            password: admin.password.clone(),
            name: admin.name.clone(),
            role: Role::Admin,
        };
        match self.create(None, &new_user, &ClientContext::default()) {
            Ok(profile) => Ok(Some(profile)),
            // Another instance bootstrapped first
            Err(CoreError::Conflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn user_from_row(row: &Row) -> Result<User, StoreError> {
    let role: String = column(row, "role")?;
    let attempts: i32 = column(row, "login_attempts")?;
    Ok(User {
        id: column(row, "id")?,
        username: column(row, "username")?,
        password_hash: column(row, "password_hash")?,
        name: column(row, "name")?,
        role: role.parse::<Role>().map_err(|e| StoreError::parse("role", e))?,
        active: column(row, "active")?,
        credentials: CredentialState {
            failed_attempts: u32::try_from(attempts).unwrap_or(0),
            locked_until: column(row, "locked_until")?,
            last_login: column(row, "last_login")?,
        },
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}
