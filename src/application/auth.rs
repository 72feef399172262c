//! Authorization for administrative writes.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminAuthError {
    #[error("admin credential missing")]
    Missing,
    #[error("admin credential rejected")]
    Invalid,
}

/// Decides whether a submitted credential may perform admin writes.
pub trait AdminAuthorizer: Send + Sync {
    fn authorize(&self, credential: Option<&str>) -> Result<(), AdminAuthError>;
}

/// One configured secret shared by every administrator.
pub struct SharedSecretAuthorizer {
    hashed_secret: Vec<u8>,
}

impl SharedSecretAuthorizer {
    pub fn new(secret: &str) -> Self {
        Self {
            hashed_secret: hash_secret(secret),
        }
    }
}

impl AdminAuthorizer for SharedSecretAuthorizer {
    fn authorize(&self, credential: Option<&str>) -> Result<(), AdminAuthError> {
        let credential = credential
            .filter(|value| !value.is_empty())
            .ok_or(AdminAuthError::Missing)?;

        // Fixed-length digests, compared in constant time.
        let hashed_input = hash_secret(credential);
        if self.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AdminAuthError::Invalid);
        }
        Ok(())
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secret_is_accepted() {
        let auth = SharedSecretAuthorizer::new("hunter2");
        assert_eq!(auth.authorize(Some("hunter2")), Ok(()));
    }

    #[test]
    fn wrong_or_missing_secret_is_rejected() {
        let auth = SharedSecretAuthorizer::new("hunter2");
        assert_eq!(auth.authorize(Some("hunter3")), Err(AdminAuthError::Invalid));
        assert_eq!(auth.authorize(Some("")), Err(AdminAuthError::Missing));
        assert_eq!(auth.authorize(None), Err(AdminAuthError::Missing));
    }
}
