//! PASETO `v2.local` codec.
//!
//! `v2.local.` || b64(nonce || ciphertext) [ `.` || b64(footer) ], where the
//! nonce is BLAKE2b-192 of the message keyed with 24 random bytes and the
//! ciphertext is XChaCha20-Poly1305 over the message with PAE(header, nonce,
//! footer) as associated data.

use crate::identity::{IdentityError, IdentityResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use blake2::{
    Blake2bMac,
    digest::{Mac, consts::U24},
};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

pub(crate) const HEADER: &str = "v2.local.";
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Encrypt `message` under `key` with a fresh random nonce key
pub(crate) fn encrypt(key: &[u8; 32], message: &[u8], footer: &[u8]) -> IdentityResult<String> {
    let mut nonce_key = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_key);
    encrypt_with_nonce_key(key, message, footer, &nonce_key)
}

fn encrypt_with_nonce_key(
    key: &[u8; 32],
    message: &[u8],
    footer: &[u8],
    nonce_key: &[u8],
) -> IdentityResult<String> {
    let nonce = derive_nonce(nonce_key, message)?;
    let aad = pae(&[HEADER.as_bytes(), &nonce, footer]);

    let cipher = <XChaCha20Poly1305 as KeyInit>::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: message,
                aad: &aad,
            },
        )
        .map_err(|_| IdentityError::Crypto("encryption failed".to_string()))?;

    let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);

    let mut token = format!("{HEADER}{}", URL_SAFE_NO_PAD.encode(&body));
    if !footer.is_empty() {
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(footer));
    }
    Ok(token)
}

/// Split a token into its encoded body and decoded footer
fn split(token: &str) -> IdentityResult<(&str, Vec<u8>)> {
    let rest = token
        .strip_prefix(HEADER)
        .ok_or_else(|| IdentityError::Crypto("unsupported token header".to_string()))?;

    match rest.split_once('.') {
        Some((_, "")) => Err(IdentityError::Crypto("empty footer".to_string())),
        Some((body, footer)) => {
            let footer = URL_SAFE_NO_PAD
                .decode(footer)
                .map_err(|_| IdentityError::Crypto("malformed footer".to_string()))?;
            Ok((body, footer))
        }
        None => Ok((rest, Vec::new())),
    }
}

/// Footer bytes, unauthenticated until the token is decrypted
pub(crate) fn footer(token: &str) -> IdentityResult<Vec<u8>> {
    split(token).map(|(_, footer)| footer)
}

/// Authenticate and decrypt `token`, returning the plaintext
pub(crate) fn decrypt(key: &[u8; 32], token: &str) -> IdentityResult<Vec<u8>> {
    let (body, footer) = split(token)?;
    let body = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| IdentityError::Crypto("malformed token body".to_string()))?;

    if body.len() < NONCE_LEN + TAG_LEN {
        return Err(IdentityError::Crypto("token too short".to_string()));
    }

    let (nonce, ciphertext) = body.split_at(NONCE_LEN);
    let aad = pae(&[HEADER.as_bytes(), nonce, &footer]);

    let cipher = <XChaCha20Poly1305 as KeyInit>::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| IdentityError::Crypto("token authentication failed".to_string()))
}

fn derive_nonce(nonce_key: &[u8], message: &[u8]) -> IdentityResult<[u8; NONCE_LEN]> {
    let mut mac = <Blake2bMac<U24> as KeyInit>::new_from_slice(nonce_key)
        .map_err(|_| IdentityError::Crypto("invalid nonce key".to_string()))?;
    mac.update(message);

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&mac.finalize().into_bytes());
    Ok(nonce)
}

/// Pre-authentication encoding
fn pae(pieces: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + pieces.iter().map(|p| 8 + p.len()).sum::<usize>());
    out.extend_from_slice(&le64(pieces.len() as u64));
    for piece in pieces {
        out.extend_from_slice(&le64(piece.len() as u64));
        out.extend_from_slice(piece);
    }
    out
}

fn le64(n: u64) -> [u8; 8] {
    (n & (u64::MAX >> 1)).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    /// Official PASETO v2 test vector 2-E-1
    #[test]
    fn test_official_vector_2_e_1() {
        let key: [u8; 32] =
            hex::decode("707172737475767778797a7b7c7d7e7f808182838485868788898a8b8c8d8e8f")
                .unwrap()
                .try_into()
                .unwrap();
        let message = br#"{"data":"this is a signed message","exp":"2019-01-01T00:00:00+00:00"}"#;
        let expected = "v2.local.97TTOvgwIxNGvV80XKiGZg_kD3tsXM_-qB4dZGHOeN1cTkgQ4PnW8888l802W8d9AvEGnoNBY3BnqHORy8a5cC8aKpbA0En8XELw2yDk2f1sVODyfnDbi6rEGMY3pSfCbLWMM2oHJxvlEl2XbQ";

        let token = encrypt_with_nonce_key(&key, message, b"", &[0u8; NONCE_LEN]).unwrap();
        assert_eq!(token, expected);
        assert_eq!(decrypt(&key, expected).unwrap(), message);
    }

    #[test]
    fn test_empty_footer_segment_rejected() {
        let token = encrypt(&KEY, b"payload", b"").unwrap();
        let err = decrypt(&KEY, &format!("{token}.")).unwrap_err();
        assert!(matches!(err, IdentityError::Crypto(_)));
    }

    #[test]
    fn test_pae_vectors() {
        assert_eq!(pae(&[]), vec![0u8; 8]);
        assert_eq!(
            pae(&[b""]),
            vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            pae(&[b"test"]),
            [
                &[1u8, 0, 0, 0, 0, 0, 0, 0][..],
                &[4u8, 0, 0, 0, 0, 0, 0, 0][..],
                b"test",
            ]
            .concat()
        );
    }

    #[test]
    fn test_le64_clears_top_bit() {
        assert_eq!(le64(u64::MAX), [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
    }

    #[test]
    fn test_round_trip() {
        let token = encrypt(&KEY, b"{\"a\":1}", b"").unwrap();
        assert!(token.starts_with(HEADER));
        assert_eq!(token.matches('.').count(), 2);
        assert_eq!(decrypt(&KEY, &token).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn test_round_trip_with_footer() {
        let token = encrypt(&KEY, b"payload", b"{\"kid\":\"k1\"}").unwrap();
        assert_eq!(token.matches('.').count(), 3);
        assert_eq!(footer(&token).unwrap(), b"{\"kid\":\"k1\"}");
        assert_eq!(decrypt(&KEY, &token).unwrap(), b"payload");
    }

    #[test]
    fn test_nonce_is_deterministic_per_nonce_key() {
        let nonce_key = [0u8; NONCE_LEN];
        let a = encrypt_with_nonce_key(&KEY, b"same", b"", &nonce_key).unwrap();
        let b = encrypt_with_nonce_key(&KEY, b"same", b"", &nonce_key).unwrap();
        let c = encrypt_with_nonce_key(&KEY, b"different", b"", &nonce_key).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let a = encrypt(&KEY, b"same", b"").unwrap();
        let b = encrypt(&KEY, b"same", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = encrypt(&KEY, b"payload", b"").unwrap();
        let err = decrypt(&[0x43; 32], &token).unwrap_err();
        assert!(matches!(err, IdentityError::Crypto(_)));
    }

    #[test]
    fn test_footer_is_authenticated() {
        let token = encrypt(&KEY, b"payload", b"{\"kid\":\"k1\"}").unwrap();
        let (body, _) = token.rsplit_once('.').unwrap();
        let forged = format!("{body}.{}", URL_SAFE_NO_PAD.encode(b"{\"kid\":\"k2\"}"));

        assert!(decrypt(&KEY, &forged).is_err());
    }

    #[test]
    fn test_malformed_tokens() {
        for token in [
            "",
            "v1.local.abc",
            "v2.public.abc",
            "v2.local.",
            "v2.local.!!!",
            "v2.local.AAAA",
        ] {
            let err = decrypt(&KEY, token).unwrap_err();
            assert!(matches!(err, IdentityError::Crypto(_)), "{token}");
        }
    }
}
