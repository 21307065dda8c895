use crate::api::{
    self,
    email::{EmailSender, LogEmailSender, ResendEmailSender},
    AuthConfig, AuthState,
};
use crate::apple::AppleVerifier;
use crate::cli::actions::Action;
use crate::APP_USER_AGENT;
use anyhow::Result;
use std::{sync::Arc, time::Duration};

/// How long fetched Apple signing keys are reused before a refetch.
const APPLE_JWKS_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            jwt_secret,
            frontend_url,
            apple_bundle_id,
            resend_api_key,
            email_from,
        } => {
            let client = reqwest::Client::builder()
                .user_agent(APP_USER_AGENT)
                .timeout(Duration::from_secs(5))
                .build()?;

            let email: Arc<dyn EmailSender> = match resend_api_key {
                Some(api_key) => Arc::new(ResendEmailSender::new(
                    client.clone(),
                    api_key,
                    email_from,
                )),
                None => Arc::new(LogEmailSender),
            };

            let apple = AppleVerifier::new(client, apple_bundle_id, APPLE_JWKS_CACHE_TTL);

            let auth_state = Arc::new(AuthState::new(
                AuthConfig::new(frontend_url),
                jwt_secret,
                email,
                apple,
            ));

            api::new(port, &dsn, auth_state).await?;
        }
    }

    Ok(())
}
