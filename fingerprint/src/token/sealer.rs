//! Token sealing service.

use super::{
    keys::SealingKey,
    paseto,
    representation::{Representation, ScopeGrant},
};
use crate::identity::{IdentityError, IdentityResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct KeyFooter {
    kid: String,
}

/// Builds, seals and opens session representations.
///
/// Holds no mutable state; share one instance behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TokenSealer {
    active: SealingKey,
    retired: Vec<SealingKey>,
}

impl TokenSealer {
    pub fn new(active: SealingKey) -> Self {
        Self {
            active,
            retired: Vec::new(),
        }
    }

    /// Accept tokens sealed under `key` without sealing new ones with it.
    /// Retired keys are only selectable by id.
    pub fn with_retired_key(mut self, key: SealingKey) -> Self {
        self.retired.push(key);
        self
    }

    /// See [`Representation::build`]
    pub fn build(
        &self,
        subject_id: Uuid,
        session_id: Uuid,
        scope_groupings: Vec<ScopeGrant>,
    ) -> IdentityResult<Representation> {
        Representation::build(subject_id, session_id, scope_groupings)
    }

    /// Serialize and encrypt a representation under the active key
    ///
    /// # Errors
    ///
    /// * `IdentityError::EmptyScopes` - The representation has no groupings
    /// * `IdentityError::Crypto` - Serialization or encryption failed
    pub fn seal(&self, representation: &Representation) -> IdentityResult<String> {
        if representation.scope_groupings.is_empty() {
            return Err(IdentityError::EmptyScopes);
        }

        let payload = representation.to_json()?;
        let footer = match self.active.id() {
            Some(kid) => serde_json::to_vec(&KeyFooter {
                kid: kid.to_string(),
            })
            .map_err(|e| IdentityError::Crypto(format!("failed to encode footer: {e}")))?,
            None => Vec::new(),
        };

        paseto::encrypt(self.active.bytes(), payload.as_bytes(), &footer)
    }

    /// Authenticate, decrypt and parse a token
    ///
    /// # Errors
    ///
    /// * `IdentityError::Crypto` - The token was not sealed by a known key, was
    ///   altered, or does not carry a valid representation
    pub fn open(&self, token: &str) -> IdentityResult<Representation> {
        let key = self.key_for(token)?;
        let plaintext = paseto::decrypt(key.bytes(), token)?;

        let representation = Representation::from_json(&plaintext)?;
        if representation.scope_groupings.is_empty() {
            return Err(IdentityError::Crypto(
                "token carries no scope groupings".to_string(),
            ));
        }
        Ok(representation)
    }

    fn key_for(&self, token: &str) -> IdentityResult<&SealingKey> {
        let footer = paseto::footer(token)?;
        if footer.is_empty() {
            return Ok(&self.active);
        }

        let KeyFooter { kid } = serde_json::from_slice(&footer)
            .map_err(|_| IdentityError::Crypto("unrecognized token footer".to_string()))?;

        std::iter::once(&self.active)
            .chain(&self.retired)
            .find(|key| key.id() == Some(kid.as_str()))
            .ok_or_else(|| IdentityError::Crypto(format!("unknown key id {kid}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn representation() -> Representation {
        Representation::build(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![
                ScopeGrant::new(["read"], Utc::now() + Duration::hours(1)),
                ScopeGrant::new(["write", "admin"], Utc::now() + Duration::minutes(5)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_seal_and_open() {
        let sealer = TokenSealer::new(SealingKey::new([1; 32]));
        let rep = representation();

        let token = sealer.seal(&rep).unwrap();
        assert!(token.starts_with("v2.local."));
        assert!(!token.contains("customer_uuid"));
        assert_eq!(sealer.open(&token).unwrap(), rep);
    }

    #[test]
    fn test_seal_rejects_empty_groupings() {
        let sealer = TokenSealer::new(SealingKey::new([1; 32]));
        let mut rep = representation();
        rep.scope_groupings.clear();

        assert!(matches!(sealer.seal(&rep), Err(IdentityError::EmptyScopes)));
    }

    #[test]
    fn test_open_with_other_key_fails() {
        let token = TokenSealer::new(SealingKey::new([1; 32]))
            .seal(&representation())
            .unwrap();
        let err = TokenSealer::new(SealingKey::new([2; 32]))
            .open(&token)
            .unwrap_err();
        assert!(matches!(err, IdentityError::Crypto(_)));
    }

    #[test]
    fn test_key_id_footer() {
        let sealer = TokenSealer::new(SealingKey::new([1; 32]).with_id("k1"));
        let token = sealer.seal(&representation()).unwrap();

        assert_eq!(token.matches('.').count(), 3);
        assert_eq!(paseto::footer(&token).unwrap(), b"{\"kid\":\"k1\"}");
        assert!(sealer.open(&token).is_ok());
    }

    #[test]
    fn test_retired_key_still_opens() {
        let old = TokenSealer::new(SealingKey::new([1; 32]).with_id("old"));
        let token = old.seal(&representation()).unwrap();

        let rotated = TokenSealer::new(SealingKey::new([2; 32]).with_id("new"))
            .with_retired_key(SealingKey::new([1; 32]).with_id("old"));
        assert!(rotated.open(&token).is_ok());

        let forgotten = TokenSealer::new(SealingKey::new([2; 32]).with_id("new"));
        let err = forgotten.open(&token).unwrap_err();
        assert!(matches!(err, IdentityError::Crypto(_)));
    }

    #[test]
    fn test_unfooted_token_uses_active_key() {
        let token = TokenSealer::new(SealingKey::new([1; 32]))
            .seal(&representation())
            .unwrap();
        let sealer = TokenSealer::new(SealingKey::new([1; 32]).with_id("k1"));
        assert!(sealer.open(&token).is_ok());
    }

    #[test]
    fn test_authenticated_non_representation_is_crypto_error() {
        let key = SealingKey::new([1; 32]);
        let token = paseto::encrypt(key.bytes(), b"{\"hello\":true}", b"").unwrap();
        let err = TokenSealer::new(key).open(&token).unwrap_err();
        assert!(matches!(err, IdentityError::Crypto(_)));
    }
}
