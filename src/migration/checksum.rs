//! Checksum calculation for migrations

use sha2::{Digest, Sha256};

/// SHA-256 of a migration's statements, hex encoded.
///
/// Statements are hashed in order with a separator so that moving text between two
/// statements changes the checksum.
pub fn calculate_checksum(statements: &[String]) -> String {
    let mut hasher = Sha256::new();
    for statement in statements {
        hasher.update(statement.trim().as_bytes());
        hasher.update(b";\n");
    }
    let hash = hasher.finalize();
    format!("{:x}", hash)
}
