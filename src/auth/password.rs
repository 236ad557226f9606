//! bcrypt password hashing.

use crate::error::{CoreError, CoreResult};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Hashes and verifies passwords at a fixed bcrypt cost.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: Arc<OnceCell<String>>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, password: &str) -> CoreResult<String> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| CoreError::Internal(format!("password hashing failed: {e}")))
    }

    /// `false` on mismatch and on a malformed stored hash.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                log::warn!("stored password hash could not be checked: {}", e);
                false
            }
        }
    }

    /// Spend the same work as [`verify`](Self::verify) for a username that does not exist.
    pub fn verify_dummy(&self, password: &str) {
        let dummy = self.dummy_hash.get_or_try_init(|| {
            bcrypt::hash("cashdesk-unknown-account", self.cost)
        });
        match dummy {
            Ok(hash) => {
                let _ = bcrypt::verify(password, hash);
            }
            Err(e) => log::warn!("dummy hash unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("s3cret-pass").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(hasher.verify("s3cret-pass", &hash));
        assert!(!hasher.verify("wrong-pass", &hash));
    }

    #[test]
    fn test_malformed_hash_is_rejection() {
        let hasher = PasswordHasher::new(4);
        assert!(!hasher.verify("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_verify_dummy_does_not_panic() {
        let hasher = PasswordHasher::new(4);
        hasher.verify_dummy("whatever");
        hasher.verify_dummy("again");
    }
}
