//! Credential manager: Argon2id hashing with a server-side pepper.
//!
//! Hashing is deliberately slow. The `*_blocking` variants move the work onto
//! tokio's blocking pool so request workers are never stalled by it.

use crate::identity::{IdentityError, IdentityResult};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::{Rng, distr::Alphanumeric};
use subtle::ConstantTimeEq;

/// Argon2 work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,

    /// Number of passes
    pub iterations: u32,

    /// Degree of parallelism
    pub parallelism: u32,
}

impl HashingConfig {
    fn params(&self) -> IdentityResult<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|_| IdentityError::HashingFailed)
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Credential manager
#[derive(Clone)]
pub struct CredentialManager {
    pepper: String,
    params: Params,
}

impl CredentialManager {
    /// Create a new credential manager
    ///
    /// # Arguments
    ///
    /// * `pepper` - Server-side pepper appended to every password
    /// * `config` - Argon2 work factor
    ///
    /// # Errors
    ///
    /// * `IdentityError::HashingFailed` - The work factor is outside argon2's limits
    pub fn new(pepper: String, config: HashingConfig) -> IdentityResult<Self> {
        Ok(Self {
            pepper,
            params: config.params()?,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn peppered(&self, password: &str) -> String {
        format!("{}{}", password, self.pepper)
    }

    /// Hash password with Argon2id + pepper
    pub fn hash(&self, password: &str) -> IdentityResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon2()
            .hash_password(self.peppered(password).as_bytes(), &salt)
            .map_err(|_| IdentityError::HashingFailed)?
            .to_string())
    }

    /// Hash `password` after checking it equals `confirmation`
    ///
    /// # Errors
    ///
    /// * `IdentityError::PasswordMismatch` - The two inputs differ
    pub fn confirm_and_hash(&self, password: &str, confirmation: &str) -> IdentityResult<String> {
        confirm(password, confirmation)?;
        self.hash(password)
    }

    /// Verify password against a stored PHC hash
    ///
    /// A stored hash that does not parse is treated as a failed match.
    pub fn verify(&self, password: &str, stored_hash: &str) -> IdentityResult<()> {
        let parsed_hash =
            PasswordHash::new(stored_hash).map_err(|_| IdentityError::InvalidCredentials)?;

        self.argon2()
            .verify_password(self.peppered(password).as_bytes(), &parsed_hash)
            .map_err(|_| IdentityError::InvalidCredentials)
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_blocking(&self, password: String) -> IdentityResult<String> {
        let manager = self.clone();
        run_blocking(move || manager.hash(&password)).await
    }

    /// [`confirm_and_hash`](Self::confirm_and_hash) on the blocking pool
    ///
    /// The confirmation check runs before anything is scheduled.
    pub async fn confirm_and_hash_blocking(
        &self,
        password: String,
        confirmation: &str,
    ) -> IdentityResult<String> {
        confirm(&password, confirmation)?;
        self.hash_blocking(password).await
    }

    /// [`verify`](Self::verify) on the blocking pool
    pub async fn verify_blocking(&self, password: String, stored_hash: String) -> IdentityResult<()> {
        let manager = self.clone();
        run_blocking(move || manager.verify(&password, &stored_hash)).await
    }
}

fn confirm(password: &str, confirmation: &str) -> IdentityResult<()> {
    if bool::from(password.as_bytes().ct_eq(confirmation.as_bytes())) {
        Ok(())
    } else {
        Err(IdentityError::PasswordMismatch)
    }
}

async fn run_blocking<T, F>(work: F) -> IdentityResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> IdentityResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        log::error!("Credential worker failed: {}", e);
        IdentityError::HashingFailed
    })?
}

/// Random alphanumeric string, used for generated secrets and suffixes
pub fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> CredentialManager {
        let config = HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        CredentialManager::new("test_pepper".to_string(), config).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let credentials = manager();
        let hash = credentials.hash("hunter2").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter2"));
        assert!(credentials.verify("hunter2", &hash).is_ok());
    }

    #[test]
    fn test_hash_is_salted() {
        let credentials = manager();
        let a = credentials.hash("same").unwrap();
        let b = credentials.hash("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_wrong_password() {
        let credentials = manager();
        let hash = credentials.hash("right").unwrap();

        let err = credentials.verify("wrong", &hash).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn test_verify_requires_same_pepper() {
        let hash = manager().hash("pw").unwrap();
        let other = CredentialManager::new(
            "other_pepper".to_string(),
            HashingConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        )
        .unwrap();

        assert!(other.verify("pw", &hash).is_err());
    }

    #[test]
    fn test_verify_malformed_hash() {
        let err = manager().verify("pw", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn test_confirm_and_hash_mismatch() {
        let err = manager().confirm_and_hash("pw1", "pw2").unwrap_err();
        assert!(matches!(err, IdentityError::PasswordMismatch));

        let err = manager().confirm_and_hash("pw1", "pw1 ").unwrap_err();
        assert!(matches!(err, IdentityError::PasswordMismatch));
    }

    #[test]
    fn test_invalid_work_factor() {
        let config = HashingConfig {
            memory_kib: 1,
            iterations: 1,
            parallelism: 1,
        };
        assert!(CredentialManager::new("p".to_string(), config).is_err());
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let credentials = manager();
        let hash = credentials
            .confirm_and_hash_blocking("pw".to_string(), "pw")
            .await
            .unwrap();

        credentials
            .verify_blocking("pw".to_string(), hash.clone())
            .await
            .unwrap();

        let err = credentials
            .verify_blocking("nope".to_string(), hash)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn test_random_alphanumeric() {
        let s = random_alphanumeric(16);
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, random_alphanumeric(16));
    }
}
