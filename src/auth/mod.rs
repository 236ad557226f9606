//! Password hashing, session tokens and the login flow.

pub mod password;
pub mod service;
pub mod session;

pub use password::PasswordHasher;
pub use service::{AuthService, LoginRequest, LoginSuccess};
pub use session::{HmacSessionIssuer, SessionError, SessionIdentity, SessionIssuer};
