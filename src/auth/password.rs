/// Password Hashing and Verification
///
/// Salted bcrypt hashing with a fixed, configured work factor. Strength rules
/// for new passwords live in `validators`; this module only hashes and checks.

use bcrypt::{hash, verify};

use crate::error::AuthError;

pub const MIN_HASH_COST: u32 = 4;
pub const MAX_HASH_COST: u32 = 31;
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;
/// bcrypt only reads this many bytes of input
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Credential verifier bound to a bcrypt cost
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password
    ///
    /// # Errors
    /// Returns `AuthError::PasswordHash` if bcrypt rejects the input or cost,
    /// or if the password is longer than `MAX_PASSWORD_BYTES`
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::PasswordHash(format!(
                "password exceeds {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }
        hash(password, self.cost).map_err(|e| AuthError::PasswordHash(e.to_string()))
    }

    /// Check a plaintext password against a stored hash
    ///
    /// A malformed stored hash is treated as a mismatch. So is a password
    /// longer than `MAX_PASSWORD_BYTES`, since bcrypt would only compare its
    /// prefix.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        if password.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        match verify(password, password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_HASH_COST)
    }

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123!";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hasher().hash("ValidPassword123!").unwrap();
        let second = hasher().hash("ValidPassword123!").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hasher().hash("ValidPassword123!").unwrap();
        assert!(hasher().verify("ValidPassword123!", &hash));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hasher().hash("ValidPassword123!").unwrap();
        assert!(!hasher().verify("WrongPassword123!", &hash));
    }

    #[test]
    fn test_verify_malformed_hash_returns_false() {
        assert!(!hasher().verify("ValidPassword123!", "not-a-bcrypt-hash"));
        assert!(!hasher().verify("ValidPassword123!", ""));
    }

    #[test]
    fn test_invalid_cost_is_a_hash_error() {
        let result = PasswordHasher::new(MAX_HASH_COST + 1).hash("ValidPassword123!");
        assert!(matches!(result, Err(AuthError::PasswordHash(_))));
    }

    #[test]
    fn test_hash_rejects_password_over_72_bytes() {
        let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
        assert!(hasher().hash(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_PASSWORD_BYTES + 1);
        let result = hasher().hash(&over_limit);
        assert!(matches!(result, Err(AuthError::PasswordHash(_))));
    }

    #[test]
    fn test_verify_rejects_long_password_sharing_a_72_byte_prefix() {
        let prefix = "p".repeat(MAX_PASSWORD_BYTES);
        let hash = hasher().hash(&prefix).unwrap();

        assert!(hasher().verify(&prefix, &hash));
        assert!(!hasher().verify(&format!("{}anything", prefix), &hash));
        assert!(!hasher().verify(&format!("{}else", prefix), &hash));
    }

    #[test]
    fn test_default_cost() {
        assert_eq!(PasswordHasher::default().cost(), 12);
    }
}
