//! Request/response types for auth and account endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct InitiateRegistrationRequest {
    pub pair_name: String,
    pub first_email: String,
    pub second_email: String,
    /// Optional `YYYY-MM-DD`, stored on the pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anniversary_date: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct InitiateRegistrationResponse {
    pub pair_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailResponse {
    pub both_verified: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MemberCredentials {
    pub password: String,
    pub display_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteRegistrationRequest {
    pub pair_id: String,
    pub first: MemberCredentials,
    pub second: MemberCredentials,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteRegistrationResponse {
    pub pair_id: String,
    pub status: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AppleLoginRequest {
    pub identity_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub member_id: String,
    pub pair_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub pair_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at_unix: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountUpdateRequest {
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn initiate_registration_request_round_trips() -> Result<()> {
        let request = InitiateRegistrationRequest {
            pair_name: "Sam & Alex".to_string(),
            first_email: "sam@example.com".to_string(),
            second_email: "alex@example.com".to_string(),
            anniversary_date: Some("2021-06-15".to_string()),
        };
        let value = serde_json::to_value(&request)?;
        let pair_name = value
            .get("pair_name")
            .and_then(serde_json::Value::as_str)
            .context("missing pair_name")?;
        assert_eq!(pair_name, "Sam & Alex");
        let decoded: InitiateRegistrationRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.second_email, "alex@example.com");
        assert_eq!(decoded.anniversary_date.as_deref(), Some("2021-06-15"));
        Ok(())
    }

    #[test]
    fn initiate_registration_request_anniversary_is_optional() -> Result<()> {
        let decoded: InitiateRegistrationRequest = serde_json::from_str(
            r#"{"pair_name":"p","first_email":"a@example.com","second_email":"b@example.com"}"#,
        )?;
        assert!(decoded.anniversary_date.is_none());
        Ok(())
    }

    #[test]
    fn token_pair_response_round_trips() -> Result<()> {
        let response = TokenPairResponse {
            access_token: "header.claims.sig".to_string(),
            refresh_token: "opaque".to_string(),
            token_type: "bearer".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: TokenPairResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.token_type, "bearer");
        Ok(())
    }

    #[test]
    fn account_response_omits_deleted_at_when_live() -> Result<()> {
        let response = AccountResponse {
            member_id: "m".to_string(),
            pair_id: "p".to_string(),
            email: "sam@example.com".to_string(),
            display_name: "Sam".to_string(),
            role: "first".to_string(),
            pair_status: "active".to_string(),
            deleted_at_unix: None,
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("deleted_at_unix").is_none());
        Ok(())
    }
}
