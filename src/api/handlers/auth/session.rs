//! Session endpoints: password login, refresh rotation, password reset.

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::error::AuthError;
use super::state::AuthState;
use super::storage::{
    consume_reset_token, issue_refresh_token, lookup_member_by_email, redeem_refresh_token,
    set_reset_token, RedeemOutcome, ResetOutcome,
};
use super::types::{
    LoginRequest, MessageResponse, PasswordResetConfirmRequest, PasswordResetRequest,
    RefreshRequest, TokenPairResponse,
};
use super::utils::{build_reset_url, normalize_email, valid_email, valid_password};
use crate::password::{hash_password, verify_password};
use crate::token::{hash_opaque_token, now_unix, sign_hs256, AccessTokenClaims};

const LOGIN_FAILED: &str = "invalid email or password";

/// Sign an access token and persist a fresh refresh token for the member.
pub(super) async fn issue_tokens(
    pool: &PgPool,
    auth_state: &AuthState,
    member_id: Uuid,
    pair_id: Uuid,
    role: &str,
) -> Result<TokenPairResponse, AuthError> {
    let claims = AccessTokenClaims::access(
        member_id.to_string(),
        pair_id.to_string(),
        role,
        now_unix(),
        auth_state.config().access_token_ttl_seconds(),
    );
    let access_token = sign_hs256(auth_state.jwt_secret(), &claims)
        .map_err(|err| AuthError::Internal(err.into()))?;

    let refresh_token = issue_refresh_token(
        pool,
        member_id,
        auth_state.config().refresh_token_ttl_seconds(),
    )
    .await?;

    Ok(TokenPairResponse {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued", body = TokenPairResponse),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 403, description = "Email unverified or pair not active", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Malformed emails fail the same way unknown ones do.
        return Err(AuthError::Unauthorized(LOGIN_FAILED.to_string()));
    }

    // Unknown email, password-less account, and wrong password are
    // indistinguishable to the caller.
    let Some(member) = lookup_member_by_email(&pool, &email).await? else {
        return Err(AuthError::Unauthorized(LOGIN_FAILED.to_string()));
    };
    let Some(password_hash) = member.password_hash.as_deref() else {
        return Err(AuthError::Unauthorized(LOGIN_FAILED.to_string()));
    };
    if !verify_password(&request.password, password_hash)? {
        return Err(AuthError::Unauthorized(LOGIN_FAILED.to_string()));
    }

    if !member.email_verified {
        return Err(AuthError::Forbidden("email not verified".to_string()));
    }
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

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPairResponse),
        (status = 401, description = "Invalid, revoked, or expired refresh token", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let token = request.refresh_token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidInput("Missing refresh token".to_string()));
    }

    let token_hash = hash_opaque_token(token);
    let outcome = redeem_refresh_token(
        &pool,
        &token_hash,
        auth_state.config().refresh_token_ttl_seconds(),
    )
    .await?;

    match outcome {
        RedeemOutcome::NotFound => Err(AuthError::Unauthorized(
            "invalid or revoked refresh token".to_string(),
        )),
        RedeemOutcome::Expired => Err(AuthError::Unauthorized(
            "refresh token expired".to_string(),
        )),
        RedeemOutcome::Redeemed {
            member_id,
            pair_id,
            role,
            refresh_token,
        } => {
            let claims = AccessTokenClaims::access(
                member_id.to_string(),
                pair_id.to_string(),
                &role,
                now_unix(),
                auth_state.config().access_token_ttl_seconds(),
            );
            let access_token = sign_hs256(auth_state.jwt_secret(), &claims)
                .map_err(|err| AuthError::Internal(err.into()))?;

            Ok((
                StatusCode::OK,
                Json(TokenPairResponse {
                    access_token,
                    refresh_token,
                    token_type: "bearer".to_string(),
                }),
            ))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Accepted; response is identical whether or not the account exists", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if valid_email(&email) {
        if let Some(token) = set_reset_token(&pool, &email, auth_state.config()).await? {
            let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
            if let Err(err) = auth_state.email().send_password_reset(&email, &reset_url).await {
                error!("Failed to send password reset email: {err}");
            }
        }
    }

    // Uniform response shape regardless of whether the account exists.
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If the account exists, a reset email has been sent".to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 404, description = "Unknown reset token", body = String),
        (status = 410, description = "Reset token expired", body = String)
    ),
    tag = "auth"
)]
pub async fn confirm_password_reset(
    pool: Extension<PgPool>,
    payload: Option<Json<PasswordResetConfirmRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    if !valid_password(&request.new_password) {
        return Err(AuthError::InvalidInput(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidInput("Missing token".to_string()));
    }

    let token_hash = hash_opaque_token(token);
    let new_password_hash = hash_password(&request.new_password)?;

    match consume_reset_token(&pool, &token_hash, &new_password_hash).await? {
        ResetOutcome::NotFound => Err(AuthError::NotFound("reset token not found".to_string())),
        ResetOutcome::Expired => Err(AuthError::Expired("reset token expired".to_string())),
        ResetOutcome::Updated => Ok((
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password updated".to_string(),
            }),
        )),
    }
}

/// Pull a bearer token out of the `Authorization` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
