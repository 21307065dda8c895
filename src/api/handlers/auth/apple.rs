//! Sign in with Apple login endpoint.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::error::AuthError;
use super::session::issue_tokens;
use super::state::AuthState;
use super::storage::{link_apple_sub, lookup_member_by_apple_sub, lookup_member_by_email};
use super::types::{AppleLoginRequest, TokenPairResponse};
use super::utils::normalize_email;

#[utoipa::path(
    post,
    path = "/api/v1/auth/apple",
    request_body = AppleLoginRequest,
    responses(
        (status = 200, description = "Tokens issued", body = TokenPairResponse),
        (status = 401, description = "Identity token rejected", body = String),
        (status = 403, description = "Pair not active", body = String),
        (status = 404, description = "No account for this Apple identity", body = String)
    ),
    tag = "auth"
)]
pub async fn apple_login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AppleLoginRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    // Every verification failure collapses to the same 401; the reason stays
    // in the logs.
    let claims = match auth_state.apple().verify(&request.identity_token).await {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Apple identity token rejected: {err}");
            return Err(AuthError::Unauthorized(
                "invalid apple identity token".to_string(),
            ));
        }
    };

    let member = match lookup_member_by_apple_sub(&pool, &claims.sub).await? {
        Some(member) => member,
        None => {
            // First Apple login for an existing account: match on the email
            // claim and link the subject for future logins.
            let Some(email) = claims.email.as_deref().map(normalize_email) else {
                return Err(AuthError::NotFound(
                    "no account for this apple identity".to_string(),
                ));
            };
            let Some(member) = lookup_member_by_email(&pool, &email).await? else {
                return Err(AuthError::NotFound(
                    "no account for this apple identity".to_string(),
                ));
            };
            // The subject must be linked before tokens are issued; a failed
            // link fails the login.
            link_apple_sub(&pool, member.member_id, &claims.sub).await?;
            member
        }
    };

    if member.pair_status != "active" {
        return Err(AuthError::Forbidden("pair is not active".to_string()));
    }

    let tokens = issue_tokens(
        &pool,
        &auth_state,
        member.member_id,
        member.pair_id,
        &member.role,
    )
    .await?;

    Ok((StatusCode::OK, Json(tokens)))
}
