//! Failure taxonomy shared by every auth and account endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Every handler failure maps onto one of these variants; `IntoResponse`
/// renders the status and message the client sees.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Expired(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Expired(_) => StatusCode::GONE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Internal details stay in the logs; the client gets a generic body.
        if let Self::Internal(err) = &self {
            error!("Internal error: {err:?}");
            return (self.status(), "Internal server error".to_string()).into_response();
        }
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn statuses_match_variants() {
        assert_eq!(
            AuthError::InvalidInput("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Unauthorized("x".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden("x".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::NotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::Conflict("x".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Expired("x".to_string()).status(),
            StatusCode::GONE
        );
        assert_eq!(
            AuthError::Internal(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn message_renders_from_variant() {
        let err = AuthError::Unauthorized("invalid email or password".to_string());
        assert_eq!(err.to_string(), "invalid email or password");
    }

    #[test]
    fn internal_response_hides_details() {
        let response = AuthError::Internal(anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
