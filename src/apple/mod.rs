//! Sign in with Apple identity-token verification.
//!
//! Apple publishes its RS256 signing keys as a JWKS document. The verifier
//! keeps a TTL'd in-process copy so a burst of logins does not hammer the
//! endpoint; refills happen under the cache lock, so concurrent misses
//! collapse into a single fetch.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::{errors::Error as RsaError, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

pub mod jwks;
pub use jwks::{Jwk, Jwks};

use crate::token::now_unix;

pub const APPLE_ISSUER: &str = "https://appleid.apple.com";
pub const APPLE_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";

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
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("failed to fetch signing keys")]
    Fetch(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppleTokenHeader {
    pub alg: String,
    pub kid: String,
}

/// Claims extracted from a verified Apple identity token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppleIdentityClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Parse the unverified header of an identity token and return its `kid`.
///
/// # Errors
///
/// Returns an error if the token is malformed or uses an algorithm other than RS256.
pub fn parse_kid(token: &str) -> Result<String, Error> {
    let header_b64 = token.split('.').next().ok_or(Error::TokenFormat)?;
    let header: AppleTokenHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }
    Ok(header.kid)
}

/// Verify an RS256 identity token against a JWKS and return its claims.
///
/// Checks, in order: token shape, algorithm, key id, signature, issuer,
/// audience (when one is configured), and expiry.
///
/// # Errors
///
/// Returns an error if any of those checks fail.
pub fn verify_identity_token(
    token: &str,
    jwks: &Jwks,
    expected_audience: Option<&str>,
    now_unix_seconds: i64,
) -> Result<AppleIdentityClaims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: AppleTokenHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let jwk = jwks
        .find_by_kid(&header.kid)
        .ok_or_else(|| Error::UnknownKid(header.kid.clone()))?;

    let public_key: RsaPublicKey = jwk.to_rsa_public_key()?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: AppleIdentityClaims = b64d_json(claims_b64)?;
    if claims.iss != APPLE_ISSUER {
        return Err(Error::InvalidIssuer);
    }
    if let Some(audience) = expected_audience {
        if claims.aud != audience {
            return Err(Error::InvalidAudience);
        }
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}

struct CachedJwks {
    jwks: Jwks,
    fetched_at: Instant,
}

/// Fetches and caches Apple's JWKS, and verifies identity tokens against it.
pub struct AppleVerifier {
    client: reqwest::Client,
    jwks_url: String,
    audience: Option<String>,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedJwks>>,
}

impl AppleVerifier {
    #[must_use]
    pub fn new(client: reqwest::Client, audience: Option<String>, cache_ttl: Duration) -> Self {
        Self {
            client,
            jwks_url: APPLE_JWKS_URL.to_string(),
            audience,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_jwks_url(mut self, jwks_url: String) -> Self {
        self.jwks_url = jwks_url;
        self
    }

    /// Verify an Apple identity token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWKS cannot be fetched or the token fails any
    /// verification check.
    pub async fn verify(&self, token: &str) -> Result<AppleIdentityClaims, Error> {
        let kid = parse_kid(token)?;
        let jwks = self.jwks_for_kid(&kid).await?;
        verify_identity_token(token, &jwks, self.audience.as_deref(), now_unix())
    }

    /// Return a JWKS known to contain `kid`, refetching on cache miss.
    ///
    /// A stale cache that still carries the requested key is served as-is;
    /// an unknown `kid` forces a refetch so key rotation is picked up early.
    async fn jwks_for_kid(&self, kid: &str) -> Result<Jwks, Error> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.cache_ttl && cached.jwks.find_by_kid(kid).is_some()
            {
                return Ok(cached.jwks.clone());
            }
        }

        let jwks: Jwks = self
            .client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        *cache = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });

        Ok(jwks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn b64e_json(value: &serde_json::Value) -> String {
        Base64UrlUnpadded::encode_string(value.to_string().as_bytes())
    }

    fn sign_identity_token(
        key: &RsaPrivateKey,
        kid: &str,
        claims: &serde_json::Value,
    ) -> String {
        let header = json!({"alg": "RS256", "kid": kid});
        let signing_input = format!("{}.{}", b64e_json(&header), b64e_json(claims));
        let signing_key = SigningKey::<Sha256>::new(key.clone());
        let signature = signing_key.sign(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());
        format!("{signing_input}.{signature_b64}")
    }

    fn test_key_and_jwks(kid: &str) -> (RsaPrivateKey, Jwks) {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key");
        let jwk = Jwk::from_rsa_public_key(&RsaPublicKey::from(&key), kid);
        (key, Jwks { keys: vec![jwk] })
    }

    fn test_claims() -> serde_json::Value {
        json!({
            "iss": APPLE_ISSUER,
            "aud": "app.tandem.client",
            "sub": "001234.abcdef",
            "email": "pat@example.com",
            "iat": NOW,
            "exp": NOW + 600,
        })
    }

    #[test]
    fn verifies_valid_identity_token() -> Result<(), Error> {
        let (key, jwks) = test_key_and_jwks("k1");
        let token = sign_identity_token(&key, "k1", &test_claims());

        let claims = verify_identity_token(&token, &jwks, Some("app.tandem.client"), NOW)?;
        assert_eq!(claims.sub, "001234.abcdef");
        assert_eq!(claims.email.as_deref(), Some("pat@example.com"));
        Ok(())
    }

    #[test]
    fn audience_check_is_skipped_when_unconfigured() -> Result<(), Error> {
        let (key, jwks) = test_key_and_jwks("k1");
        let token = sign_identity_token(&key, "k1", &test_claims());

        assert!(verify_identity_token(&token, &jwks, None, NOW).is_ok());
        Ok(())
    }

    #[test]
    fn rejects_wrong_audience_and_issuer() {
        let (key, jwks) = test_key_and_jwks("k1");
        let token = sign_identity_token(&key, "k1", &test_claims());
        let result = verify_identity_token(&token, &jwks, Some("other.app"), NOW);
        assert!(matches!(result, Err(Error::InvalidAudience)));

        let mut claims = test_claims();
        claims["iss"] = json!("https://not-apple.example");
        let token = sign_identity_token(&key, "k1", &claims);
        let result = verify_identity_token(&token, &jwks, None, NOW);
        assert!(matches!(result, Err(Error::InvalidIssuer)));
    }

    #[test]
    fn rejects_expired_token() {
        let (key, jwks) = test_key_and_jwks("k1");
        let token = sign_identity_token(&key, "k1", &test_claims());
        let result = verify_identity_token(&token, &jwks, None, NOW + 601);
        assert!(matches!(result, Err(Error::Expired)));
    }

    #[test]
    fn rejects_unknown_kid() {
        let (key, jwks) = test_key_and_jwks("k1");
        let token = sign_identity_token(&key, "rotated-kid", &test_claims());
        let result = verify_identity_token(&token, &jwks, None, NOW);
        assert!(matches!(result, Err(Error::UnknownKid(kid)) if kid == "rotated-kid"));
    }

    #[test]
    fn rejects_signature_from_another_key() {
        let (_key, jwks) = test_key_and_jwks("k1");
        let (other_key, _) = test_key_and_jwks("k1");
        let token = sign_identity_token(&other_key, "k1", &test_claims());
        let result = verify_identity_token(&token, &jwks, None, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
    }

    #[test]
    fn parse_kid_reads_header() -> Result<(), Error> {
        let (key, _) = test_key_and_jwks("k7");
        let token = sign_identity_token(&key, "k7", &test_claims());
        assert_eq!(parse_kid(&token)?, "k7");
        Ok(())
    }

    #[test]
    fn parse_kid_rejects_wrong_alg() {
        let header = json!({"alg": "HS256", "kid": "k1"});
        let token = format!("{}.claims.sig", b64e_json(&header));
        assert!(matches!(
            parse_kid(&token),
            Err(Error::UnsupportedAlg(alg)) if alg == "HS256"
        ));
    }
}
