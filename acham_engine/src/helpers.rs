//! Credential helpers: argon2 hashing for passwords and OTP codes, and code generation.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use thiserror::Error;

use crate::db_types::OTP_CODE_LENGTH;

#[derive(Debug, Clone, Error)]
pub enum HashError {
    #[error("Could not hash the secret. {0}")]
    HashingFailed(String),
    #[error("Stored hash is not a valid argon2 hash. {0}")]
    InvalidStoredHash(String),
}

/// Hash a password or OTP code for storage. Plaintext secrets never reach the database.
pub fn hash_secret(secret: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| HashError::HashingFailed(e.to_string()))
}

/// Check a candidate secret against a stored hash. A mismatch is `Ok(false)`, not an error.
pub fn verify_secret(secret: &str, stored_hash: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| HashError::InvalidStoredHash(e.to_string()))?;
    Ok(Argon2::default().verify_password(secret.as_bytes(), &parsed).is_ok())
}

/// Generate a random numeric OTP code.
pub fn generate_otp_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_CODE_LENGTH).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_secret("123456").unwrap();
        assert_ne!(hash, "123456");
        assert!(verify_secret("123456", &hash).unwrap());
        assert!(!verify_secret("654321", &hash).unwrap());
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..20 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_secret("123456", "not-a-hash").is_err());
    }
}
