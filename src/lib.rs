//! # Cashdesk
//!
//! Daily cash ledger, append-only audit trail and credential lockout on PostgreSQL, for the
//! `may` coroutine runtime.
//!
//! - [`store::OperationStore`]: one active ledger snapshot per owner and day, saved as an
//!   upsert together with its audit record
//! - [`store::AuditTrail`]: append-only event log, queried newest first
//! - [`store::CredentialGuard`]: failed-login counter and temporary lockout
//! - [`auth::AuthService`]: the login flow tying the three together
//! - [`http`]: the JSON API served with `may_minihttp`
//!
//! All components share one [`StorePool`] handed to them at construction; see
//! [`app::Services`].

pub mod app;
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod http;
pub mod maintenance;
pub mod metrics;
pub mod migration;
pub mod migrations;
pub mod model;
pub mod pool;
pub mod store;
pub mod transaction;

pub use app::Services;
pub use config::AppConfig;
pub use error::{AuthFailure, CoreError, CoreResult};
pub use executor::{Executor, StoreError};
pub use pool::{PooledConnection, StorePool};
pub use transaction::{IsolationLevel, Transaction};
