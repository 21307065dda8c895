//! JWKS types for Sign in with Apple public keys.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid JSON or doesn't match the expected JWKS shape.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Find a key by `kid` (Key ID).
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// Build a JWK from an `RsaPublicKey`.
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        use rsa::traits::PublicKeyParts;

        let n = Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be());
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            n,
            e,
        }
    }

    /// Convert this JWK to an `RsaPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64url values cannot be decoded or the RSA key is invalid.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        let n_bytes = Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| Error::Base64)?;
        let e_bytes = Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| Error::Base64)?;
        let n = BigUint::from_bytes_be(&n_bytes);
        let e = BigUint::from_bytes_be(&e_bytes);
        RsaPublicKey::new(n, e).map_err(Error::Rsa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;

    #[test]
    fn find_by_kid_picks_matching_key() -> Result<(), rsa::errors::Error> {
        let key = RsaPrivateKey::new(&mut OsRng, 2048)?;
        let public_key = RsaPublicKey::from(&key);
        let jwks = Jwks {
            keys: vec![
                Jwk::from_rsa_public_key(&public_key, "apple-k1"),
                Jwk::from_rsa_public_key(&public_key, "apple-k2"),
            ],
        };

        assert_eq!(jwks.find_by_kid("apple-k2").map(|k| k.kid.as_str()), Some("apple-k2"));
        assert!(jwks.find_by_kid("missing").is_none());
        Ok(())
    }

    #[test]
    fn jwk_round_trips_to_rsa_public_key() -> Result<(), Error> {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).map_err(Error::Rsa)?;
        let public_key = RsaPublicKey::from(&key);
        let jwk = Jwk::from_rsa_public_key(&public_key, "k1");

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.to_rsa_public_key()?, public_key);
        Ok(())
    }

    #[test]
    fn to_rsa_public_key_rejects_bad_base64() {
        let jwk = Jwk {
            kty: "RSA".to_string(),
            alg: None,
            key_use: None,
            kid: "k".to_string(),
            n: "!not-base64!".to_string(),
            e: "AQAB".to_string(),
        };
        assert!(matches!(jwk.to_rsa_public_key(), Err(Error::Base64)));
    }

    #[test]
    fn jwks_parses_from_json() -> Result<(), serde_json::Error> {
        let json = r#"{"keys":[{"kty":"RSA","kid":"abc","use":"sig","alg":"RS256","n":"AQAB","e":"AQAB"}]}"#;
        let jwks = Jwks::from_json(json)?;
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].key_use.as_deref(), Some("sig"));
        Ok(())
    }
}
