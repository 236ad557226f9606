//! Application configuration.
//!
//! Settings come from `config/config.toml` (optional) overlaid with environment variables
//! prefixed `CASHDESK`, using `__` as the section separator
//! (`CASHDESK__DATABASE__URL`, `CASHDESK__AUTH__JWT_SECRET`, ...). Every field has a default.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use crate::pool::config::*;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "CASHDESK";

// Upper bounds keep every derived `chrono::Duration` and deadline in range.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;
const MAX_LOCKOUT_MINUTES: i64 = 60 * 24 * 365;
const MAX_RETENTION_DAYS: i64 = 365 * 100;
const MAX_SWEEP_INTERVAL_MINUTES: u64 = 60 * 24 * 7;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Initial administrator created when the users table is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. An empty secret makes the server generate an
    /// ephemeral one at startup.
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
            max_failed_attempts: default_max_failed_attempts(),
            lockout_minutes: default_lockout_minutes(),
            bootstrap_admin: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_operation_archive_days")]
    pub operation_archive_days: i64,
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: i64,
    #[serde(default = "default_sweep_interval_minutes")]
    pub sweep_interval_minutes: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            operation_archive_days: default_operation_archive_days(),
            audit_retention_days: default_audit_retention_days(),
            sweep_interval_minutes: default_sweep_interval_minutes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_bcrypt_cost() -> u32 {
    12
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_lockout_minutes() -> i64 {
    30
}

fn default_operation_archive_days() -> i64 {
    180
}

fn default_audit_retention_days() -> i64 {
    365
}

fn default_sweep_interval_minutes() -> u64 {
    60
}

impl AppConfig {
    /// Load from `config/config.toml`, falling back to environment variables only.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from an explicit file path (optional) plus the environment.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // File existed but was unreadable: retry with env only
                if std::path::Path::new(path).exists() {
                    log::warn!(
                        "failed to load config file {}, falling back to env: {}",
                        path,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        let config: AppConfig = settings.try_deserialize().map_err(|e| {
            ConfigError::Message(format!("Configuration could not be deserialized: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the stores cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.max_failed_attempts == 0 {
            return Err(ConfigError::Message(
                "auth.max_failed_attempts must be at least 1".to_string(),
            ));
        }
        if self.auth.lockout_minutes <= 0 || self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Message(
                "auth.lockout_minutes and auth.token_ttl_hours must be positive".to_string(),
            ));
        }
        if self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(ConfigError::Message(format!(
                "auth.token_ttl_hours must be at most {MAX_TOKEN_TTL_HOURS}"
            )));
        }
        if self.auth.lockout_minutes > MAX_LOCKOUT_MINUTES {
            return Err(ConfigError::Message(format!(
                "auth.lockout_minutes must be at most {MAX_LOCKOUT_MINUTES}"
            )));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::Message(
                "auth.bcrypt_cost must be between 4 and 31".to_string(),
            ));
        }
        if self.retention.operation_archive_days <= 0 || self.retention.audit_retention_days <= 0
        {
            return Err(ConfigError::Message(
                "retention periods must be positive".to_string(),
            ));
        }
        if self.retention.operation_archive_days > MAX_RETENTION_DAYS
            || self.retention.audit_retention_days > MAX_RETENTION_DAYS
        {
            return Err(ConfigError::Message(format!(
                "retention periods must be at most {MAX_RETENTION_DAYS} days"
            )));
        }
        if !(1..=MAX_SWEEP_INTERVAL_MINUTES).contains(&self.retention.sweep_interval_minutes) {
            return Err(ConfigError::Message(format!(
                "retention.sweep_interval_minutes must be between 1 and {MAX_SWEEP_INTERVAL_MINUTES}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.pool_timeout_seconds, 5);
        assert_eq!(config.auth.max_failed_attempts, 5);
        assert_eq!(config.auth.lockout_minutes, 30);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.retention.audit_retention_days, 365);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let settings = Config::builder()
            .set_override("auth.max_failed_attempts", 3)
            .unwrap()
            .set_override("database.url", "postgres://a:b@db/cash")
            .unwrap()
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.auth.max_failed_attempts, 3);
        assert_eq!(config.auth.lockout_minutes, 30);
        assert_eq!(config.database.url, "postgres://a:b@db/cash");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = AppConfig::default();
        config.auth.max_failed_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.bcrypt_cost = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_periods() {
        let mut config = AppConfig::default();
        config.auth.token_ttl_hours = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.lockout_minutes = i64::MAX / 2;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retention.audit_retention_days = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retention.sweep_interval_minutes = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.token_ttl_hours = MAX_TOKEN_TTL_HOURS;
        config.auth.lockout_minutes = MAX_LOCKOUT_MINUTES;
        config.retention.operation_archive_days = MAX_RETENTION_DAYS;
        config.retention.audit_retention_days = MAX_RETENTION_DAYS;
        config.retention.sweep_interval_minutes = MAX_SWEEP_INTERVAL_MINUTES;
        assert!(config.validate().is_ok());
    }
}
