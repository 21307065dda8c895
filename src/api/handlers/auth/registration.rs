//! Registration endpoints: initiate, verify, complete.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::error::AuthError;
use super::state::AuthState;
use super::storage::{
    complete_registration, insert_pair_and_members, verify_member, CompleteOutcome,
    InitiateOutcome, MemberSetup, VerifyOutcome,
};
use super::types::{
    CompleteRegistrationRequest, CompleteRegistrationResponse, InitiateRegistrationRequest,
    InitiateRegistrationResponse, VerifyEmailRequest, VerifyEmailResponse,
};
use super::utils::{
    build_verify_url, normalize_email, valid_anniversary_date, valid_email, valid_password,
};
use crate::password::hash_password;
use crate::token::hash_opaque_token;

#[utoipa::path(
    post,
    path = "/api/v1/auth/register/initiate",
    request_body = InitiateRegistrationRequest,
    responses(
        (status = 201, description = "Pending pair created", body = InitiateRegistrationResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Email already registered", body = String)
    ),
    tag = "auth"
)]
pub async fn initiate(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<InitiateRegistrationRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let pair_name = request.pair_name.trim().to_string();
    if pair_name.is_empty() {
        return Err(AuthError::InvalidInput("Pair name is required".to_string()));
    }

    let first_email = normalize_email(&request.first_email);
    let second_email = normalize_email(&request.second_email);
    if !valid_email(&first_email) || !valid_email(&second_email) {
        return Err(AuthError::InvalidInput("Invalid email".to_string()));
    }
    if first_email == second_email {
        return Err(AuthError::InvalidInput(
            "Member emails must be distinct".to_string(),
        ));
    }

    let anniversary_date = request
        .anniversary_date
        .as_deref()
        .map(str::trim)
        .filter(|date| !date.is_empty());
    if let Some(date) = anniversary_date {
        if !valid_anniversary_date(date) {
            return Err(AuthError::InvalidInput(
                "Invalid anniversary date (expected YYYY-MM-DD)".to_string(),
            ));
        }
    }

    let outcome = insert_pair_and_members(
        &pool,
        &pair_name,
        anniversary_date,
        &first_email,
        &second_email,
        auth_state.config(),
    )
    .await?;

    let (pair_id, first_token, second_token) = match outcome {
        InitiateOutcome::Created {
            pair_id,
            first_token,
            second_token,
        } => (pair_id, first_token, second_token),
        InitiateOutcome::Conflict => {
            return Err(AuthError::Conflict(
                "An account with one of these emails already exists".to_string(),
            ));
        }
    };

    // Delivery failures never undo the committed registration; the token can
    // be reissued by starting over.
    let frontend = auth_state.config().frontend_base_url();
    for (email, token) in [(&first_email, &first_token), (&second_email, &second_token)] {
        let verify_url = build_verify_url(frontend, token);
        if let Err(err) = auth_state
            .email()
            .send_verification(email, &verify_url, &pair_name)
            .await
        {
            error!("Failed to send verification email: {err}");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(InitiateRegistrationResponse {
            pair_id: pair_id.to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 404, description = "Unknown verification token", body = String),
        (status = 409, description = "Email already verified", body = String),
        (status = 410, description = "Verification token expired", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidInput("Missing token".to_string()));
    }

    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_opaque_token(token);
    match verify_member(&pool, &token_hash).await? {
        VerifyOutcome::NotFound => Err(AuthError::NotFound(
            "verification token not found".to_string(),
        )),
        VerifyOutcome::AlreadyVerified => {
            Err(AuthError::Conflict("email already verified".to_string()))
        }
        VerifyOutcome::Expired => Err(AuthError::Expired(
            "verification token expired".to_string(),
        )),
        VerifyOutcome::Verified { both_verified } => {
            Ok((StatusCode::OK, Json(VerifyEmailResponse { both_verified })))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register/complete",
    request_body = CompleteRegistrationRequest,
    responses(
        (status = 200, description = "Pair activated", body = CompleteRegistrationResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 404, description = "No pending pair with that id", body = String)
    ),
    tag = "auth"
)]
pub async fn complete(
    pool: Extension<PgPool>,
    payload: Option<Json<CompleteRegistrationRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let pair_id = Uuid::parse_str(request.pair_id.trim())
        .map_err(|_| AuthError::InvalidInput("Invalid pair id".to_string()))?;

    for member in [&request.first, &request.second] {
        if !valid_password(&member.password) {
            return Err(AuthError::InvalidInput(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        if member.display_name.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "Display name is required".to_string(),
            ));
        }
    }

    let first = MemberSetup {
        password_hash: hash_password(&request.first.password)?,
        display_name: request.first.display_name.trim().to_string(),
    };
    let second = MemberSetup {
        password_hash: hash_password(&request.second.password)?,
        display_name: request.second.display_name.trim().to_string(),
    };

    match complete_registration(&pool, pair_id, &first, &second).await? {
        // A missing, deleted, or already-active pair all read the same to the
        // caller; the ambiguity is deliberate.
        CompleteOutcome::PairNotFound => Err(AuthError::NotFound("pair not found".to_string())),
        CompleteOutcome::NotBothVerified => Err(AuthError::InvalidInput(
            "both members must verify their email first".to_string(),
        )),
        CompleteOutcome::Completed => Ok((
            StatusCode::OK,
            Json(CompleteRegistrationResponse {
                pair_id: pair_id.to_string(),
                status: "active".to_string(),
            }),
        )),
    }
}
