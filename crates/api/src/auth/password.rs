//! Password hashing with Argon2

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Generate a cryptographically random unusable password hash.
/// Invited stub accounts get one of these at creation so the column is never
/// null and the password is unknowable until the invitee sets their own.
pub fn generate_unusable_hash() -> Result<String, PasswordError> {
    use argon2::password_hash::rand_core::RngCore;

    let mut random_bytes = [0u8; 64];
    OsRng.fill_bytes(&mut random_bytes);

    hash_password(&hex::encode(random_bytes))
}

/// Verify a password against a hash.
/// Mismatch is `Ok(false)`; only a malformed stored hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash a password on the blocking pool.
/// Argon2 is deliberately expensive; keep it off the async worker threads.
pub async fn hash_blocking(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

/// Verify a password on the blocking pool.
pub async fn verify_blocking(password: String, hash: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

/// Validate password strength.
/// Callers map violations onto the request field that carried the password
/// (`password` or `newPassword`).
pub fn validate_password_strength(password: &str) -> Result<(), PasswordPolicyError> {
    if password.chars().count() < 7 {
        return Err(PasswordPolicyError::TooShort);
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PasswordPolicyError::MissingUppercase);
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PasswordPolicyError::MissingLowercase);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordPolicyError::MissingDigit);
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(PasswordPolicyError::MissingSymbol);
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least 7 characters")]
    TooShort,
    #[error("Password must contain at least one uppercase character")]
    MissingUppercase,
    #[error("Password must contain at least one lowercase character")]
    MissingLowercase,
    #[error("Password must contain at least one number")]
    MissingDigit,
    #[error("Password must contain at least one special character")]
    MissingSymbol,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "Str0ng!Pass";
        let hash = hash_password(password).expect("Failed to hash password");

        assert!(verify_password(password, &hash).expect("Verification failed"));
        assert!(!verify_password("wrong_password", &hash).expect("Verification failed"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let password = "Str0ng!Pass";
        let first = hash_password(password).unwrap();
        let second = hash_password(password).unwrap();

        assert_ne!(first, second);
        assert!(verify_password(password, &first).unwrap());
        assert!(verify_password(password, &second).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_unusable_hash_is_valid_argon2() {
        let hash = generate_unusable_hash().unwrap();
        // Verifies cleanly against any guess without erroring
        assert!(!verify_password("guess", &hash).unwrap());
    }

    #[test]
    fn test_password_policy() {
        assert!(matches!(
            validate_password_strength("Ab1!x"),
            Err(PasswordPolicyError::TooShort)
        ));
        assert!(matches!(
            validate_password_strength("lowercase1!"),
            Err(PasswordPolicyError::MissingUppercase)
        ));
        assert!(matches!(
            validate_password_strength("UPPERCASE1!"),
            Err(PasswordPolicyError::MissingLowercase)
        ));
        assert!(matches!(
            validate_password_strength("NoDigits!!"),
            Err(PasswordPolicyError::MissingDigit)
        ));
        assert!(matches!(
            validate_password_strength("NoSymbol1"),
            Err(PasswordPolicyError::MissingSymbol)
        ));

        // Exactly seven characters with all four classes
        assert!(validate_password_strength("Ab1!xyz").is_ok());
        assert!(validate_password_strength("Str0ng!Pass").is_ok());
    }

    #[tokio::test]
    async fn test_blocking_wrappers_round_trip() {
        let hash = hash_blocking("Str0ng!Pass".to_string()).await.unwrap();
        assert!(verify_blocking("Str0ng!Pass".to_string(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_blocking("other".to_string(), hash).await.unwrap());
    }
}
