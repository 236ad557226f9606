//! Service-level error taxonomy.
//!
//! Validation and authentication failures are user-facing as-is. Infrastructure failures
//! carry the storage error for logging, but their public message never exposes it.

use crate::executor::StoreError;
use thiserror::Error;

/// Message shared by every credential rejection, locked accounts included.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";

/// Why an authentication step rejected the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Unknown username, inactive account or wrong password
    InvalidCredentials,
    /// Lockout window is active
    Locked,
    /// No bearer token on a protected route
    MissingToken,
    /// Bearer token failed verification or expired
    InvalidToken,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", auth_message(.0))]
    Auth(AuthFailure),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

fn auth_message(failure: &AuthFailure) -> &'static str {
    match failure {
        AuthFailure::InvalidCredentials | AuthFailure::Locked => INVALID_CREDENTIALS_MESSAGE,
        AuthFailure::MissingToken => "Access token required",
        AuthFailure::InvalidToken => "Invalid or expired token",
    }
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    /// HTTP status used at the boundary.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Auth(AuthFailure::InvalidCredentials | AuthFailure::MissingToken) => 401,
            CoreError::Auth(AuthFailure::Locked) => 423,
            CoreError::Auth(AuthFailure::InvalidToken) => 403,
            CoreError::Forbidden(_) => 403,
            CoreError::NotFound(_) => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Infrastructure(StoreError::PoolExhausted { .. }) => 503,
            CoreError::Infrastructure(_) | CoreError::Internal(_) => 500,
        }
    }

    /// Message safe to send to clients.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Infrastructure(StoreError::PoolExhausted { .. }) => {
                "Service temporarily unavailable".to_string()
            }
            CoreError::Infrastructure(_) | CoreError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
