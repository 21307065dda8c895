//! Account endpoints: profile, soft delete, restore.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::auth::storage::{
    lookup_account, restore_account, soft_delete_account, update_display_name, AccountRecord,
};
use super::auth::types::{AccountResponse, AccountUpdateRequest};
use super::auth::{principal::require_auth, AuthError, AuthState};
use crate::token::now_unix;

/// How long a soft-deleted account stays restorable.
const RESTORE_WINDOW_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Whether a deletion timestamp is still inside the restore window.
pub(crate) fn is_restorable(deleted_at_unix: i64, now_unix: i64) -> bool {
    now_unix.saturating_sub(deleted_at_unix) <= RESTORE_WINDOW_SECONDS
}

fn account_response(record: AccountRecord) -> AccountResponse {
    AccountResponse {
        member_id: record.member_id.to_string(),
        pair_id: record.pair_id.to_string(),
        email: record.email,
        display_name: record.display_name,
        role: record.role,
        pair_status: record.pair_status,
        deleted_at_unix: record.deleted_at_unix,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/account",
    responses(
        (status = 200, description = "Account profile", body = AccountResponse),
        (status = 401, description = "Missing or invalid bearer token", body = String)
    ),
    tag = "account"
)]
pub async fn get_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &auth_state)?;

    let Some(record) = lookup_account(&pool, principal.member_id).await? else {
        return Err(AuthError::NotFound("account not found".to_string()));
    };

    Ok((StatusCode::OK, Json(account_response(record))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/account",
    request_body = AccountUpdateRequest,
    responses(
        (status = 200, description = "Account updated", body = AccountResponse),
        (status = 401, description = "Missing or invalid bearer token", body = String)
    ),
    tag = "account"
)]
pub async fn update_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AccountUpdateRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &auth_state)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    if let Some(display_name) = request.display_name.as_deref() {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::InvalidInput(
                "Display name cannot be empty".to_string(),
            ));
        }
        update_display_name(&pool, principal.member_id, display_name).await?;
    }

    let Some(record) = lookup_account(&pool, principal.member_id).await? else {
        return Err(AuthError::NotFound("account not found".to_string()));
    };

    Ok((StatusCode::OK, Json(account_response(record))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/account",
    responses(
        (status = 204, description = "Account soft-deleted"),
        (status = 401, description = "Missing or invalid bearer token", body = String)
    ),
    tag = "account"
)]
pub async fn delete_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &auth_state)?;

    // Deleting twice is a no-op; the second call still returns 204.
    soft_delete_account(&pool, principal.member_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/account/restore",
    responses(
        (status = 200, description = "Account restored", body = AccountResponse),
        (status = 400, description = "Account is not deleted", body = String),
        (status = 401, description = "Missing or invalid bearer token", body = String),
        (status = 410, description = "Restore window expired", body = String)
    ),
    tag = "account"
)]
pub async fn restore(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &auth_state)?;

    let Some(record) = lookup_account(&pool, principal.member_id).await? else {
        return Err(AuthError::NotFound("account not found".to_string()));
    };
    let Some(deleted_at_unix) = record.deleted_at_unix else {
        return Err(AuthError::InvalidInput(
            "account is not deleted".to_string(),
        ));
    };
    if !is_restorable(deleted_at_unix, now_unix()) {
        return Err(AuthError::Expired(
            "restore window expired (over 30 days)".to_string(),
        ));
    }

    restore_account(&pool, principal.member_id).await?;

    let Some(record) = lookup_account(&pool, principal.member_id).await? else {
        return Err(AuthError::NotFound("account not found".to_string()));
    };

    Ok((StatusCode::OK, Json(account_response(record))))
}

#[cfg(test)]
mod tests {
    use super::{is_restorable, RESTORE_WINDOW_SECONDS};

    #[test]
    fn restorable_inside_window() {
        let deleted_at = 1_700_000_000;
        assert!(is_restorable(deleted_at, deleted_at));
        assert!(is_restorable(deleted_at, deleted_at + 1));
        assert!(is_restorable(deleted_at, deleted_at + RESTORE_WINDOW_SECONDS));
    }

    #[test]
    fn not_restorable_past_window() {
        let deleted_at = 1_700_000_000;
        assert!(!is_restorable(
            deleted_at,
            deleted_at + RESTORE_WINDOW_SECONDS + 1
        ));
    }

    #[test]
    fn clock_skew_before_deletion_is_restorable() {
        // deleted_at marginally in the future relative to the checking clock
        let deleted_at = 1_700_000_000;
        assert!(is_restorable(deleted_at, deleted_at - 5));
    }
}
