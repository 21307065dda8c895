//! Outbound email delivery abstractions.
//!
//! Verification and reset emails are delivered inline from the handlers, after
//! the database transaction commits. Delivery failures are logged and never
//! roll back committed state; the user can request a new token.
//!
//! The default sender for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`. Production deployments configure `ResendEmailSender`
//! with an API key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::info;

/// Email delivery abstraction used by the auth handlers.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a verification email carrying the verify link.
    async fn send_verification(&self, to: &str, verify_url: &str, pair_name: &str) -> Result<()>;

    /// Deliver a password-reset email carrying the reset link.
    async fn send_password_reset(&self, to: &str, reset_url: &str) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_verification(&self, to: &str, verify_url: &str, pair_name: &str) -> Result<()> {
        info!(
            to_email = %to,
            pair_name = %pair_name,
            verify_url = %verify_url,
            "verification email send stub"
        );
        Ok(())
    }

    async fn send_password_reset(&self, to: &str, reset_url: &str) -> Result<()> {
        info!(
            to_email = %to,
            reset_url = %reset_url,
            "password reset email send stub"
        );
        Ok(())
    }
}

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Sender backed by the Resend HTTP API.
pub struct ResendEmailSender {
    client: reqwest::Client,
    api_key: SecretString,
    from: String,
}

impl ResendEmailSender {
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: SecretString, from: String) -> Self {
        Self {
            client,
            api_key,
            from,
        }
    }

    async fn deliver(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let body = json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("failed to reach email provider")?;

        response
            .error_for_status()
            .context("email provider rejected the message")?;

        Ok(())
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send_verification(&self, to: &str, verify_url: &str, pair_name: &str) -> Result<()> {
        let subject = format!("Verify your email for {pair_name}");
        let html = format!(
            "<p>You were invited to the pair <strong>{pair_name}</strong>.</p>\
             <p><a href=\"{verify_url}\">Verify your email</a> to continue. \
             The link expires in 24 hours.</p>"
        );
        self.deliver(to, &subject, &html).await
    }

    async fn send_password_reset(&self, to: &str, reset_url: &str) -> Result<()> {
        let html = format!(
            "<p><a href=\"{reset_url}\">Reset your password</a>. \
             The link expires in 2 hours.</p>\
             <p>If you did not request this, you can ignore this email.</p>"
        );
        self.deliver(to, "Reset your password", &html).await
    }
}
