//! Canonical session representation sealed into tokens.

use crate::identity::{IdentityError, IdentityResult};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version written into every representation
pub const REPRESENTATION_VERSION: u32 = 1;

/// A set of capabilities expiring together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGrant {
    pub scopes: Vec<String>,
    pub expiration: DateTime<Utc>,
}

impl ScopeGrant {
    pub fn new<I, S>(scopes: I, expiration: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            expiration,
        }
    }

    /// Expired at `now` (a grant expiring exactly at `now` is expired)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    fn truncated(mut self) -> Self {
        self.expiration = self.expiration.trunc_subsecs(0);
        self
    }
}

/// Session contents as sealed into a token.
///
/// Field order is the serialization order and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    pub version: u32,
    #[serde(rename = "customer_uuid")]
    pub subject_id: Uuid,
    #[serde(rename = "session_uuid")]
    pub session_id: Uuid,
    pub scope_groupings: Vec<ScopeGrant>,
}

impl Representation {
    /// Build a representation, truncating expirations to whole seconds
    ///
    /// # Errors
    ///
    /// * `IdentityError::EmptyScopes` - `scope_groupings` is empty
    pub fn build(
        subject_id: Uuid,
        session_id: Uuid,
        scope_groupings: Vec<ScopeGrant>,
    ) -> IdentityResult<Self> {
        if scope_groupings.is_empty() {
            return Err(IdentityError::EmptyScopes);
        }

        Ok(Self {
            version: REPRESENTATION_VERSION,
            subject_id,
            session_id,
            scope_groupings: scope_groupings
                .into_iter()
                .map(ScopeGrant::truncated)
                .collect(),
        })
    }

    /// Plaintext JSON rendering, identical to the sealed payload
    pub fn to_json(&self) -> IdentityResult<String> {
        serde_json::to_string(self)
            .map_err(|e| IdentityError::Crypto(format!("failed to serialize representation: {e}")))
    }

    pub(crate) fn from_json(bytes: &[u8]) -> IdentityResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|_| IdentityError::Crypto("token payload is not a representation".to_string()))
    }

    /// Groupings that have not expired at `now`
    pub fn active_groupings(&self, now: DateTime<Utc>) -> impl Iterator<Item = &ScopeGrant> {
        self.scope_groupings.iter().filter(move |g| !g.is_expired(now))
    }

    /// Whether any unexpired grouping contains `scope`
    pub fn grants(&self, scope: &str, now: DateTime<Utc>) -> bool {
        self.active_groupings(now)
            .any(|g| g.scopes.iter().any(|s| s == scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_build_rejects_empty() {
        let err = Representation::build(Uuid::new_v4(), Uuid::new_v4(), vec![]).unwrap_err();
        assert!(matches!(err, IdentityError::EmptyScopes));
    }

    #[test]
    fn test_build_truncates_expirations() {
        let exp = at(1_700_000_000) + Duration::milliseconds(750);
        let rep =
            Representation::build(Uuid::new_v4(), Uuid::new_v4(), vec![ScopeGrant::new(["read"], exp)])
                .unwrap();

        assert_eq!(rep.version, REPRESENTATION_VERSION);
        assert_eq!(rep.scope_groupings[0].expiration, at(1_700_000_000));
    }

    #[test]
    fn test_json_field_names_and_order() {
        let subject = Uuid::nil();
        let session = Uuid::from_u128(1);
        let rep = Representation::build(
            subject,
            session,
            vec![ScopeGrant::new(["read", "write"], at(1_704_067_200))],
        )
        .unwrap();

        assert_eq!(
            rep.to_json().unwrap(),
            format!(
                "{{\"version\":1,\"customer_uuid\":\"{subject}\",\"session_uuid\":\"{session}\",\
                 \"scope_groupings\":[{{\"scopes\":[\"read\",\"write\"],\
                 \"expiration\":\"2024-01-01T00:00:00Z\"}}]}}"
            )
        );
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            Representation::from_json(b"not json"),
            Err(IdentityError::Crypto(_))
        ));
    }

    #[test]
    fn test_grants_respects_expiration() {
        let now = at(1_000);
        let rep = Representation::build(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![
                ScopeGrant::new(["read"], now + Duration::hours(1)),
                ScopeGrant::new(["admin"], now - Duration::seconds(1)),
            ],
        )
        .unwrap();

        assert!(rep.grants("read", now));
        assert!(!rep.grants("admin", now));
        assert!(!rep.grants("write", now));
        assert_eq!(rep.active_groupings(now).count(), 1);
        assert!(!rep.grants("read", now + Duration::hours(2)));
    }
}
