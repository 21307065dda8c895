//! Auth state and configuration.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::api::email::EmailSender;
use crate::apple::AppleVerifier;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 2 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub(crate) fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    pub(super) fn verification_token_ttl_seconds(&self) -> i64 {
        self.verification_token_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    jwt_secret: SecretString,
    email: Arc<dyn EmailSender>,
    apple: AppleVerifier,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        jwt_secret: SecretString,
        email: Arc<dyn EmailSender>,
        apple: AppleVerifier,
    ) -> Self {
        Self {
            config,
            jwt_secret,
            email,
            apple,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }

    pub(super) fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }

    pub(super) fn apple(&self) -> &AppleVerifier {
        &self.apple
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogEmailSender;
    use std::time::Duration;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://tandem.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://tandem.dev");
        assert_eq!(
            config.access_token_ttl_seconds(),
            super::DEFAULT_ACCESS_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.refresh_token_ttl_seconds(),
            super::DEFAULT_REFRESH_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.verification_token_ttl_seconds(),
            super::DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );

        let config = config
            .with_access_token_ttl_seconds(60)
            .with_refresh_token_ttl_seconds(120)
            .with_verification_token_ttl_seconds(180)
            .with_reset_token_ttl_seconds(240);

        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 120);
        assert_eq!(config.verification_token_ttl_seconds(), 180);
        assert_eq!(config.reset_token_ttl_seconds(), 240);
    }

    #[test]
    fn auth_state_exposes_secret_bytes() {
        let config = AuthConfig::new("https://tandem.dev".to_string());
        let apple = crate::apple::AppleVerifier::new(
            reqwest::Client::new(),
            None,
            Duration::from_secs(3600),
        );
        let state = AuthState::new(
            config,
            SecretString::from("jwt-secret"),
            Arc::new(LogEmailSender),
            apple,
        );
        assert_eq!(state.jwt_secret(), b"jwt-secret");
    }
}
