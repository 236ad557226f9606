//! Bearer session tokens.
//!
//! Tokens are HS256 JSON Web Tokens: `base64url(header).base64url(claims).base64url(mac)`.
//! Sessions are stateless; a token stays valid until `exp`.

use crate::model::{Role, User};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl SessionIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Malformed,
    BadSignature,
    Expired,
    Signing(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Malformed => write!(f, "malformed session token"),
            SessionError::BadSignature => write!(f, "session token signature mismatch"),
            SessionError::Expired => write!(f, "session token expired"),
            SessionError::Signing(e) => write!(f, "session token signing failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Mints and verifies session tokens.
pub trait SessionIssuer: Send + Sync {
    fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String, SessionError>;

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionIdentity, SessionError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    username: String,
    role: Role,
    iat: i64,
    exp: i64,
    jti: String,
}

/// HS256 issuer keyed by a shared secret.
pub struct HmacSessionIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl fmt::Debug for HmacSessionIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSessionIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl HmacSessionIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    /// Issuer with a random per-process secret. Tokens do not survive a restart.
    pub fn ephemeral(ttl: Duration) -> Self {
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self::new(secret.into_bytes(), ttl)
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| SessionError::Signing(e.to_string()))
    }
}

impl SessionIssuer for HmacSessionIssuer {
    fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let claims =
            serde_json::to_vec(&claims).map_err(|e| SessionError::Signing(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(claims)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionIdentity, SessionError> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let header = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| SessionError::Malformed)?;
        let header: serde_json::Value =
            serde_json::from_slice(&header).map_err(|_| SessionError::Malformed)?;
        if header.get("alg").and_then(|alg| alg.as_str()) != Some("HS256") {
            return Err(SessionError::Malformed);
        }

        let claims = URL_SAFE_NO_PAD
            .decode(claims)
            .map_err(|_| SessionError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims).map_err(|_| SessionError::Malformed)?;
        if now.timestamp() >= claims.exp {
            return Err(SessionError::Expired);
        }
        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(SessionError::Malformed)?;

        Ok(SessionIdentity {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CredentialState;
    use chrono::TimeZone;

    fn user() -> User {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        User {
            id: 42,
            username: "caissier".into(),
            password_hash: String::new(),
            name: "Caissier".into(),
            role: Role::User,
            active: true,
            credentials: CredentialState::default(),
            created_at: created,
            updated_at: created,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let issuer = HmacSessionIssuer::new(b"secret".to_vec(), Duration::hours(24));
        let token = issuer.issue(&user(), now()).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let identity = issuer.verify(&token, now() + Duration::hours(1)).unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.username, "caissier");
        assert_eq!(identity.role, Role::User);
        assert!(!identity.is_admin());
        assert_eq!(identity.expires_at, now() + Duration::hours(24));
    }

    #[test]
    fn test_expired_token() {
        let issuer = HmacSessionIssuer::new(b"secret".to_vec(), Duration::hours(24));
        let token = issuer.issue(&user(), now()).unwrap();
        assert_eq!(
            issuer.verify(&token, now() + Duration::hours(24)),
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let issuer = HmacSessionIssuer::new(b"secret".to_vec(), Duration::hours(24));
        let other = HmacSessionIssuer::new(b"other".to_vec(), Duration::hours(24));
        let token = other.issue(&user(), now()).unwrap();
        assert_eq!(issuer.verify(&token, now()), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_tampered_claims_are_rejected() {
        let issuer = HmacSessionIssuer::new(b"secret".to_vec(), Duration::hours(24));
        let token = issuer.issue(&user(), now()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            r#"{"sub":1,"username":"admin","role":"admin","iat":0,"exp":9999999999,"jti":"x"}"#,
        );
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(issuer.verify(&forged, now()), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let issuer = HmacSessionIssuer::ephemeral(Duration::hours(1));
        assert_eq!(issuer.verify("abc", now()), Err(SessionError::Malformed));
        assert_eq!(issuer.verify("a.b.c.d", now()), Err(SessionError::Malformed));
        assert_eq!(issuer.verify("a.b.!!!", now()), Err(SessionError::Malformed));
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = HmacSessionIssuer::ephemeral(Duration::hours(1));
        let a = issuer.issue(&user(), now()).unwrap();
        let b = issuer.issue(&user(), now()).unwrap();
        assert_ne!(a, b);
    }
}
