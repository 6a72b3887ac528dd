use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Lodestar password hashing.
///
/// Hashes are Argon2id (RFC 9106 recommended variant) encoded in the PHC string
/// format, so the parameters travel with every stored hash and can be raised later
/// without invalidating existing accounts.
///
/// Params are expressed as:
/// - m_cost: memory cost in KiB
/// - t_cost: iterations
/// - p_cost: parallelism
///
/// Current default: 19 MiB memory, 2 iterations, parallelism 1.
pub const DEFAULT_M_COST_KIB: u32 = 19_456;
pub const DEFAULT_T_COST: u32 = 2;
pub const DEFAULT_P_COST: u32 = 1;

/// Hashes and checks account passwords.
///
/// Handlers only see this trait, never the storage record, so the hashing
/// scheme can change without touching the entity type.
pub trait CredentialVerifier: Send + Sync {
    /// Hash a plaintext password and return a self-describing hash string.
    fn hash(&self, password: &str) -> anyhow::Result<String>;

    /// Verify a plaintext password against a stored hash.
    ///
    /// Returns:
    /// - Ok(true)  if password matches
    /// - Ok(false) if password does not match
    /// - Err(_)    if the stored hash is malformed or an unexpected error occurs
    fn verify(&self, password: &str, password_hash: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct Argon2Credentials {
    params: Params,
}

impl Argon2Credentials {
    pub fn new(m_cost_kib: u32, t_cost: u32, p_cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(m_cost_kib, t_cost, p_cost, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {e}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Credentials {
    fn default() -> Self {
        Self {
            params: Params::new(DEFAULT_M_COST_KIB, DEFAULT_T_COST, DEFAULT_P_COST, None)
                .unwrap_or_default(),
        }
    }
}

impl CredentialVerifier for Argon2Credentials {
    fn hash(&self, password: &str) -> anyhow::Result<String> {
        // Salt must be generated from a CSPRNG.
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?
            .to_string();

        Ok(hash)
    }

    fn verify(&self, password: &str, password_hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        // Verification uses the parameters encoded in the hash, not `self.params`.
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Failed to verify password: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Credentials {
        Argon2Credentials::new(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_then_verify() {
        let creds = cheap();
        let hash = creds.hash("pw123456").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("pw123456"));
        assert!(creds.verify("pw123456", &hash).unwrap());
        assert!(!creds.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differ() {
        let creds = cheap();
        let a = creds.hash("same").unwrap();
        let b = creds.hash("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(cheap().verify("pw", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_invalid_params() {
        assert!(Argon2Credentials::new(1, 0, 0).is_err());
    }
}
