//! Per-account failed-login counting and timed lockout.
//!
//! The stored `login_attempts`, `locked_until` and `last_login` columns are written only
//! here, and only with states produced by [`CredentialState`]'s transitions. Expiry is lazy:
//! nothing clears an elapsed lock until the next successful login.

use crate::error::{CoreError, CoreResult};
use crate::executor::{Executor, StoreError};
use crate::model::{CredentialState, LockoutPolicy};
use crate::pool::StorePool;
use crate::store::column;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CredentialGuard {
    pool: StorePool,
    policy: LockoutPolicy,
}

impl CredentialGuard {
    pub fn new(pool: StorePool, policy: LockoutPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn is_locked(&self, user_id: i64) -> CoreResult<bool> {
        let conn = self.pool.acquire()?;
        self.is_locked_at(&conn, user_id, Utc::now())
    }

    pub fn is_locked_at(
        &self,
        executor: &dyn Executor,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        Ok(load_state(executor, user_id, false)?.is_locked(now))
    }

    pub fn record_failure(&self, user_id: i64) -> CoreResult<CredentialState> {
        self.pool
            .in_transaction(|tx| self.record_failure_at(tx, user_id, Utc::now()))
    }

    /// Count a failed attempt; from the threshold on, restart the lock window at `now`.
    pub fn record_failure_at(
        &self,
        executor: &dyn Executor,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<CredentialState> {
        let next = load_state(executor, user_id, true)?.after_failure(now, &self.policy);
        store_state(executor, user_id, &next)?;
        if next.is_locked(now) {
            log::warn!(
                "account {} locked until {:?} after {} failed attempts",
                user_id,
                next.locked_until,
                next.failed_attempts
            );
        }
        Ok(next)
    }

    pub fn record_success(&self, user_id: i64) -> CoreResult<CredentialState> {
        self.pool
            .in_transaction(|tx| self.record_success_at(tx, user_id, Utc::now()))
    }

    /// Reset the counter, clear the lock and stamp the login time.
    pub fn record_success_at(
        &self,
        executor: &dyn Executor,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<CredentialState> {
        let next = load_state(executor, user_id, true)?.after_success(now);
        store_state(executor, user_id, &next)?;
        Ok(next)
    }
}

fn load_state(
    executor: &dyn Executor,
    user_id: i64,
    for_update: bool,
) -> CoreResult<CredentialState> {
    let sql = if for_update {
        "SELECT login_attempts, locked_until, last_login FROM users WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT login_attempts, locked_until, last_login FROM users WHERE id = $1"
    };
    let row = executor
        .query_opt(sql, &[&user_id])?
        .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))?;

    let attempts: i32 = column(&row, "login_attempts")?;
    Ok(CredentialState {
        failed_attempts: u32::try_from(attempts).unwrap_or(0),
        locked_until: column(&row, "locked_until")?,
        last_login: column(&row, "last_login")?,
    })
}

fn store_state(
    executor: &dyn Executor,
    user_id: i64,
    state: &CredentialState,
) -> Result<(), StoreError> {
    let attempts = i32::try_from(state.failed_attempts).unwrap_or(i32::MAX);
    executor.execute(
        "UPDATE users SET login_attempts = $2, locked_until = $3, last_login = $4, updated_at = NOW() \
         WHERE id = $1",
        &[&user_id, &attempts, &state.locked_until, &state.last_login],
    )?;
    Ok(())
}
