//! Authenticated principal extraction for bearer-protected endpoints.
//!
//! Access tokens are verified offline against the server secret; no database
//! round trip happens until a handler needs account state.

use axum::http::HeaderMap;
use uuid::Uuid;

use super::error::AuthError;
use super::session::extract_bearer_token;
use super::state::AuthState;
use crate::token::{now_unix, verify_hs256};

/// Authenticated member context derived from a bearer access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub member_id: Uuid,
    pub pair_id: Uuid,
    pub role: String,
}

/// Resolve the `Authorization` header into a principal, or return 401.
pub fn require_auth(headers: &HeaderMap, auth_state: &AuthState) -> Result<Principal, AuthError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(AuthError::Unauthorized(
            "missing bearer token".to_string(),
        ));
    };

    let claims = verify_hs256(&token, auth_state.jwt_secret(), now_unix())
        .map_err(|_| AuthError::Unauthorized("invalid or expired access token".to_string()))?;

    let member_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::Unauthorized("invalid or expired access token".to_string()))?;
    let pair_id = Uuid::parse_str(&claims.pair)
        .map_err(|_| AuthError::Unauthorized("invalid or expired access token".to_string()))?;

    Ok(Principal {
        member_id,
        pair_id,
        role: claims.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogEmailSender;
    use crate::apple::AppleVerifier;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::token::{sign_hs256, AccessTokenClaims};
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AuthState {
        AuthState::new(
            AuthConfig::new("https://tandem.dev".to_string()),
            SecretString::from("test-jwt-secret"),
            Arc::new(LogEmailSender),
            AppleVerifier::new(reqwest::Client::new(), None, Duration::from_secs(3600)),
        )
    }

    #[test]
    fn accepts_valid_access_token() -> anyhow::Result<()> {
        let state = test_state();
        let member_id = Uuid::new_v4();
        let pair_id = Uuid::new_v4();
        let claims = AccessTokenClaims::access(
            member_id.to_string(),
            pair_id.to_string(),
            "second",
            now_unix(),
            900,
        );
        let token = sign_hs256(state.jwt_secret(), &claims)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );

        let principal = require_auth(&headers, &state).map_err(|err| anyhow::anyhow!("{err}"))?;
        assert_eq!(principal.member_id, member_id);
        assert_eq!(principal.pair_id, pair_id);
        assert_eq!(principal.role, "second");
        Ok(())
    }

    #[test]
    fn rejects_missing_and_garbage_tokens() {
        let state = test_state();

        let headers = HeaderMap::new();
        assert!(matches!(
            require_auth(&headers, &state),
            Err(AuthError::Unauthorized(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer not-a-jwt"),
        );
        assert!(matches!(
            require_auth(&headers, &state),
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[test]
    fn rejects_expired_access_token() -> anyhow::Result<()> {
        let state = test_state();
        let claims = AccessTokenClaims::access(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            "first",
            now_unix() - 3600,
            900,
        );
        let token = sign_hs256(state.jwt_secret(), &claims)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
        assert!(matches!(
            require_auth(&headers, &state),
            Err(AuthError::Unauthorized(_))
        ));
        Ok(())
    }
}
