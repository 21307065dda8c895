//! Access-token codec and opaque-token helpers.
//!
//! Access tokens are `HS256` JWTs signed with the server secret. Refresh,
//! verification, and reset tokens are opaque random secrets; the database
//! stores only their SHA-256 hash.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl AccessTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Member id.
    pub sub: String,
    /// Pair id.
    pub pair: String,
    /// Member role within the pair (`first` or `second`).
    pub role: String,
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    #[must_use]
    pub fn access(
        sub: impl Into<String>,
        pair: impl Into<String>,
        role: impl Into<String>,
        iat: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            sub: sub.into(),
            pair: pair.into(),
            role: role.into(),
            typ: "access".to_string(),
            iat,
            exp: iat + ttl_seconds,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token type")]
    InvalidType,
    #[error("invalid key")]
    InvalidKey,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Create an `HS256` signed access token (JWT).
///
/// # Errors
///
/// Returns an error if the header/claims JSON cannot be encoded or the secret
/// cannot be used as an HMAC key.
pub fn sign_hs256(secret: &[u8], claims: &AccessTokenClaims) -> Result<String, Error> {
    let header_b64 = b64e_json(&AccessTokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::InvalidKey)?;
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an `HS256` access token and return its decoded claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the signature does not match,
/// - the claims fail validation (`typ`, `exp`).
pub fn verify_hs256(
    token: &str,
    secret: &[u8],
    now_unix_seconds: i64,
) -> Result<AccessTokenClaims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: AccessTokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::InvalidKey)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature_bytes)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: AccessTokenClaims = b64d_json(claims_b64)?;
    if claims.typ != "access" {
        return Err(Error::InvalidType);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}

/// Create a new opaque token (refresh, verification, or reset).
///
/// The raw value is only ever sent to the user; callers store its hash.
///
/// # Errors
///
/// Returns an error if the OS entropy source fails.
pub fn generate_opaque_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate opaque token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash an opaque token so raw values never touch the database.
#[must_use]
pub fn hash_opaque_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Current time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const SECRET: &[u8] = b"test-secret-test-secret-test-secr";

    fn test_claims() -> AccessTokenClaims {
        AccessTokenClaims::access("member-1", "pair-1", "first", NOW, 900)
    }

    #[test]
    fn sign_and_verify_round_trip() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims())?;
        let verified = verify_hs256(&token, SECRET, NOW)?;

        assert_eq!(verified.sub, "member-1");
        assert_eq!(verified.pair, "pair-1");
        assert_eq!(verified.role, "first");
        assert_eq!(verified.exp, NOW + 900);
        Ok(())
    }

    #[test]
    fn rejects_wrong_secret() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims())?;
        let result = verify_hs256(&token, b"another-secret", NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_tampered_claims() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims())?;
        let mut parts: Vec<&str> = token.split('.').collect();

        let forged = AccessTokenClaims::access("member-2", "pair-1", "first", NOW, 900);
        let forged_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&forged)?);
        parts[1] = &forged_b64;
        let tampered = parts.join(".");

        let result = verify_hs256(&tampered, SECRET, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_expired_token() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims())?;
        let result = verify_hs256(&token, SECRET, NOW + 901);
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn rejects_wrong_type() -> Result<(), Error> {
        let mut claims = test_claims();
        claims.typ = "refresh".to_string();
        let token = sign_hs256(SECRET, &claims)?;
        let result = verify_hs256(&token, SECRET, NOW);
        assert!(matches!(result, Err(Error::InvalidType)));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            verify_hs256("only.two", SECRET, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify_hs256("a.b.c.d", SECRET, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify_hs256("!.!.!", SECRET, NOW),
            Err(Error::Base64)
        ));
    }

    #[test]
    fn rejects_unsupported_algorithm() -> Result<(), Error> {
        let header = AccessTokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        };
        let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
        let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&test_claims())?);
        let token = format!("{header_b64}.{claims_b64}.AA");

        let result = verify_hs256(&token, SECRET, NOW);
        assert!(matches!(result, Err(Error::UnsupportedAlg(alg)) if alg == "none"));
        Ok(())
    }

    #[test]
    fn opaque_token_decodes_to_32_bytes() {
        let decoded_len = generate_opaque_token()
            .ok()
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn opaque_tokens_are_unique() {
        let first = generate_opaque_token().ok();
        let second = generate_opaque_token().ok();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn hash_opaque_token_stable() {
        let first = hash_opaque_token("token");
        let second = hash_opaque_token("token");
        let different = hash_opaque_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }
}
