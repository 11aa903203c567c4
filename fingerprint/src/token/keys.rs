//! Symmetric sealing keys.

use crate::identity::{IdentityError, IdentityResult};
use std::fmt;

/// Length of a sealing key in bytes
pub const SEALING_KEY_LEN: usize = 32;

/// 32-byte symmetric key, optionally tagged with an id carried in the token
/// footer so tokens can be matched to the key that sealed them.
#[derive(Clone, PartialEq, Eq)]
pub struct SealingKey {
    id: Option<String>,
    bytes: [u8; SEALING_KEY_LEN],
}

impl SealingKey {
    pub fn new(bytes: [u8; SEALING_KEY_LEN]) -> Self {
        Self { id: None, bytes }
    }

    /// Parse a key from 64 hex characters
    ///
    /// # Errors
    ///
    /// * `IdentityError::Crypto` - Input is not exactly 32 hex-encoded bytes
    pub fn from_hex(encoded: &str) -> IdentityResult<Self> {
        let decoded = hex::decode(encoded.trim())
            .map_err(|_| IdentityError::Crypto("sealing key is not valid hex".to_string()))?;

        let bytes: [u8; SEALING_KEY_LEN] = decoded.try_into().map_err(|_| {
            IdentityError::Crypto(format!(
                "sealing key must be {SEALING_KEY_LEN} bytes ({} hex characters)",
                SEALING_KEY_LEN * 2
            ))
        })?;

        Ok(Self::new(bytes))
    }

    /// Parse `kid:hex` (or bare `hex`)
    pub fn from_tagged_hex(tagged: &str) -> IdentityResult<Self> {
        match tagged.split_once(':') {
            Some((id, encoded)) => Ok(Self::from_hex(encoded)?.with_id(id.trim())),
            None => Self::from_hex(tagged),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.id = (!id.is_empty()).then_some(id);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn bytes(&self) -> &[u8; SEALING_KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealingKey")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_from_hex() {
        let key = SealingKey::from_hex(HEX).unwrap();
        assert_eq!(key.bytes()[0], 0);
        assert_eq!(key.bytes()[31], 0x1f);
        assert_eq!(key.id(), None);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(SealingKey::from_hex("zz").is_err());
        assert!(SealingKey::from_hex(&HEX[..62]).is_err());
        assert!(SealingKey::from_hex(&format!("{HEX}00")).is_err());
    }

    #[test]
    fn test_from_tagged_hex() {
        let key = SealingKey::from_tagged_hex(&format!("2024-01:{HEX}")).unwrap();
        assert_eq!(key.id(), Some("2024-01"));

        let key = SealingKey::from_tagged_hex(HEX).unwrap();
        assert_eq!(key.id(), None);
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let key = SealingKey::new([0xab; 32]).with_id("k1");
        let debug = format!("{key:?}");
        assert!(debug.contains("k1"));
        assert!(!debug.contains("171"));
        assert!(debug.contains("redacted"));
    }
}
