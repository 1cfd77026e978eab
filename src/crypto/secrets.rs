//! Shared secret pair used to parametrize every seal/open call.

use std::fmt;

use crate::error::ConfigurationError;

/// Two shared secrets, immutable once constructed.
///
/// Never printed: `Debug` redacts both values.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretPair {
    secret1: String,
    secret2: String,
}

impl SecretPair {
    /// Build a pair, rejecting empty secrets.
    pub fn new(secret1: impl Into<String>, secret2: impl Into<String>) -> Result<Self, ConfigurationError> {
        let secret1 = secret1.into();
        let secret2 = secret2.into();
        if secret1.is_empty() {
            return Err(ConfigurationError::EmptySecret("secret1"));
        }
        if secret2.is_empty() {
            return Err(ConfigurationError::EmptySecret("secret2"));
        }
        Ok(Self { secret1, secret2 })
    }

    /// Build a pair only when both halves are present and non-empty.
    pub fn from_parts(secret1: Option<&str>, secret2: Option<&str>) -> Option<Self> {
        match (secret1, secret2) {
            (Some(s1), Some(s2)) => Self::new(s1, s2).ok(),
            _ => None,
        }
    }

    pub fn secret1(&self) -> &[u8] {
        self.secret1.as_bytes()
    }

    pub fn secret2(&self) -> &[u8] {
        self.secret2.as_bytes()
    }
}

impl fmt::Debug for SecretPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPair")
            .field("secret1", &"<redacted>")
            .field("secret2", &"<redacted>")
            .finish()
    }
}
