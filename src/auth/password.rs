//! Password hashing (Argon2id) and the password policy.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::errors::AuthError;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a plaintext password into PHC string format.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal("Failed to hash password", e))
}

/// Verify a plaintext password against a stored PHC hash.
/// A mismatch is `false`; a corrupt stored hash is an internal error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::internal("Stored password hash is invalid", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::internal("Password verification failed", e)),
    }
}

/// Enforce the password policy: length bounds, at least one letter and one
/// digit. Fails with [`AuthError::WeakPassword`] naming the violated rule.
pub fn validate_password_policy(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("NewP@ssw0rd!").unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(verify_password("NewP@ssw0rd!", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("NewP@ssw0rd!").unwrap();
        let b = hash_password("NewP@ssw0rd!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_stored_hash_is_internal_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_policy("NewP@ssw0rd!").is_ok());

        for weak in ["short1", "alllowercaseletters", "0123456789"] {
            assert!(matches!(
                validate_password_policy(weak),
                Err(AuthError::WeakPassword(_))
            ));
        }

        let too_long = format!("a1{}", "x".repeat(130));
        assert!(matches!(
            validate_password_policy(&too_long),
            Err(AuthError::WeakPassword(_))
        ));
    }
}
