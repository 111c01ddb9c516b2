//! Trusted Discovery Keys
//!
//! The set of public keys allowed to sign discovery catalogues. Key
//! management (rotation, distribution) is external; the baked-in
//! provider keys mirror the upstream discovery server's published set.

use crate::signature::{KeyId, PublicKey, SignatureError};

/// Baked-in provider signing keys, base64 minisign form.
const PROVIDER_KEYS: &[&str] = &[
    "RWRtBSX1alxyGX+Xn3LuZnWUT0w//B6EmTJvgaAxBMYzlQeI+jdrO6KF",
    "RWQKqtqvd0R7rUDp0rWzbtYPA3towPWcLDCl7eY9pBMMI/ohCmrS0WiM",
];

/// An ordered set of trusted public keys, looked up by key id.
#[derive(Debug, Clone)]
pub struct TrustedKeys {
    keys: Vec<PublicKey>,
}

impl TrustedKeys {
    /// The provider's published signing keys.
    pub fn provider_defaults() -> Self {
        let keys = PROVIDER_KEYS
            .iter()
            .map(|k| PublicKey::from_base64(k))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default();
        Self { keys }
    }

    /// A custom key set, e.g. for tests or a private deployment.
    pub fn from_encoded(encoded: &[&str]) -> Result<Self, SignatureError> {
        let keys = encoded
            .iter()
            .map(|k| PublicKey::from_base64(k))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }

    /// Build from already-decoded keys.
    pub fn from_keys(keys: Vec<PublicKey>) -> Self {
        Self { keys }
    }

    /// Find the trusted key with the given id, if any.
    pub fn find(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.keys.iter().find(|k| k.key_id() == key_id)
    }

    /// Number of trusted keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
