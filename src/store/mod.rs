//! Persistent stores over the shared [`StorePool`](crate::pool::StorePool).
//!
//! Every mutating entry point has two forms: one that opens its own unit of work, and an
//! `*_in` / executor-taking form that joins a caller-owned transaction so several writes
//! (a ledger save and its audit record, say) commit or roll back together.

pub mod audit;
pub mod credentials;
pub mod operations;
pub mod users;

pub use audit::AuditTrail;
pub use credentials::CredentialGuard;
pub use operations::{OperationStore, SavedOperation};
pub use users::UserStore;

use crate::error::CoreError;
use crate::executor::StoreError;
use may_postgres::types::FromSql;
use may_postgres::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Limit/offset cursor of a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Page {
    /// Missing values take the defaults; `limit` is clamped to [`MAX_PAGE_SIZE`].
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Result<Self, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        if limit < 0 || offset < 0 {
            return Err(CoreError::validation("limit and offset must not be negative"));
        }
        Ok(Self {
            limit: limit.min(MAX_PAGE_SIZE),
            offset,
        })
    }
}

pub(crate) fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, StoreError> {
    row.try_get(name).map_err(|e| StoreError::parse(name, e))
}

/// Decode a JSONB column into a typed value.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row, name: &str) -> Result<T, StoreError> {
    let value: serde_json::Value = column(row, name)?;
    serde_json::from_value(value).map_err(|e| StoreError::parse(name, e))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::Other(format!("failed to encode JSON column: {e}")))
}
