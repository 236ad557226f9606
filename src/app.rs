//! Component wiring from [`AppConfig`].

use crate::auth::{AuthService, HmacSessionIssuer, PasswordHasher, SessionIssuer};
use crate::config::AppConfig;
use crate::executor::StoreError;
use crate::maintenance::Maintenance;
use crate::model::LockoutPolicy;
use crate::pool::StorePool;
use crate::store::{AuditTrail, CredentialGuard, OperationStore, UserStore};
use chrono::Duration;
use std::sync::Arc;

/// Every service of one running instance, sharing a single pool.
#[derive(Clone)]
pub struct Services {
    pub pool: StorePool,
    pub audit: AuditTrail,
    pub operations: OperationStore,
    pub users: UserStore,
    pub guard: CredentialGuard,
    pub auth: AuthService,
    pub sessions: Arc<dyn SessionIssuer>,
    pub maintenance: Maintenance,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("pool", &self.pool)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Open the pool described by `config` and wire the services around it.
    ///
    /// An empty `auth.jwt_secret` gets an ephemeral signing key: tokens will not survive a
    /// restart.
    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::Other(format!("invalid configuration: {e}")))?;
        let pool = StorePool::new(&config.database)?;
        let ttl = Duration::hours(config.auth.token_ttl_hours);
        let sessions: Arc<dyn SessionIssuer> = if config.auth.jwt_secret.is_empty() {
            log::warn!("auth.jwt_secret is empty; using an ephemeral signing key");
            Arc::new(HmacSessionIssuer::ephemeral(ttl))
        } else {
            Arc::new(HmacSessionIssuer::new(config.auth.jwt_secret.as_bytes().to_vec(), ttl))
        };
        Ok(Self::assemble(pool, config, sessions))
    }

    /// Wire the services around an existing pool and session issuer.
    pub fn assemble(pool: StorePool, config: &AppConfig, sessions: Arc<dyn SessionIssuer>) -> Self {
        let policy = LockoutPolicy::new(
            config.auth.max_failed_attempts,
            Duration::minutes(config.auth.lockout_minutes),
        );
        let hasher = PasswordHasher::new(config.auth.bcrypt_cost);
        let audit = AuditTrail::new(pool.clone());
        let operations = OperationStore::new(pool.clone(), audit.clone());
        let users = UserStore::new(pool.clone(), audit.clone(), hasher.clone());
        let guard = CredentialGuard::new(pool.clone(), policy);
        let auth = AuthService::new(
            pool.clone(),
            users.clone(),
            guard.clone(),
            audit.clone(),
            hasher,
            Arc::clone(&sessions),
        );
        let maintenance = Maintenance::new(
            pool.clone(),
            operations.clone(),
            audit.clone(),
            config.retention.clone(),
        );

        Self {
            pool,
            audit,
            operations,
            users,
            guard,
            auth,
            sessions,
            maintenance,
        }
    }
}
