//! Connection pool and its configuration.

pub mod config;
mod manager;

pub use config::DatabaseConfig;
pub use manager::{PooledConnection, StorePool};
