use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed")]
    HashingFailed,
}

/// CredentialVerifier
///
/// The credential-verification collaborator consumed by the auth core.
/// Implementations must be cheap to share across request tasks.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// False on mismatch and on an unparseable stored hash alike.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// CredentialState
///
/// The shared handle stored in the application state.
pub type CredentialState = Arc<dyn CredentialVerifier>;

/// Argon2Verifier
///
/// Argon2id with a fresh random salt per hash; hashes are stored in PHC form.
#[derive(Clone, Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| PasswordError::HashingFailed)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::error!("stored password hash is unreadable: {:?}", e);
                false
            }
        }
    }
}
