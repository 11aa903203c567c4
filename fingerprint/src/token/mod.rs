//! Session representations and the sealing service.
//!
//! A [`Representation`] names the subject, the session and the scope
//! groupings granted to it. [`TokenSealer::seal`] turns it into an opaque
//! PASETO `v2.local` bearer token; [`TokenSealer::open`] reverses that after
//! authenticating the token under the key named in its footer.

pub mod keys;
mod paseto;
pub mod representation;
pub mod sealer;

pub use keys::{SEALING_KEY_LEN, SealingKey};
pub use representation::{REPRESENTATION_VERSION, Representation, ScopeGrant};
pub use sealer::TokenSealer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityError;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn grant_strategy() -> impl Strategy<Value = ScopeGrant> {
        (
            prop::collection::vec("[a-z:_]{1,12}", 1..4),
            0i64..4_102_444_800,
            0u32..1_000_000_000,
        )
            .prop_map(|(scopes, secs, nanos)| {
                let expiration: DateTime<Utc> = Utc.timestamp_opt(secs, nanos).unwrap();
                ScopeGrant::new(scopes, expiration)
            })
    }

    proptest! {
        #[test]
        fn prop_open_inverts_seal(
            subject in any::<u128>(),
            session in any::<u128>(),
            grants in prop::collection::vec(grant_strategy(), 1..5),
            key in any::<[u8; 32]>(),
        ) {
            let sealer = TokenSealer::new(SealingKey::new(key));
            let rep = sealer
                .build(Uuid::from_u128(subject), Uuid::from_u128(session), grants)
                .unwrap();

            let token = sealer.seal(&rep).unwrap();
            prop_assert_eq!(sealer.open(&token).unwrap(), rep);
        }

        #[test]
        fn prop_flipped_byte_is_rejected(index in any::<prop::sample::Index>()) {
            let sealer = TokenSealer::new(SealingKey::new([9; 32]));
            let rep = sealer
                .build(Uuid::new_v4(), Uuid::new_v4(), vec![ScopeGrant::new(["read"], Utc::now())])
                .unwrap();
            let token = sealer.seal(&rep).unwrap();

            let body = token.strip_prefix("v2.local.").unwrap();
            let mut raw = URL_SAFE_NO_PAD.decode(body).unwrap();
            let i = index.index(raw.len());
            raw[i] ^= 0x01;
            let tampered = format!("v2.local.{}", URL_SAFE_NO_PAD.encode(&raw));

            let err = sealer.open(&tampered).unwrap_err();
            prop_assert!(matches!(err, IdentityError::Crypto(_)));
        }
    }
}
